//! HTTP client abstraction.
//!
//! The generator only needs GET, HEAD, and file downloads with progress.
//! [`ReqwestHttpClient`] is the real implementation; [`OfflineHttpClient`]
//! fails every request and is swapped in to prove a run needs no network.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::io::AsyncWriteExt;

/// Maximum redirects followed before a request fails.
pub const MAX_REDIRECTS: usize = 5;

/// HTTP errors. Download failures carry the final status observed.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("download of {url} failed with HTTP status {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("offline mode: refusing to request {url}")]
    Offline { url: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    ClientConstruction(#[source] reqwest::Error),

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One progress observation of an in-flight download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received_bytes: u64,
    pub total_bytes: Option<u64>,
}

/// Lazy sequence of download progress events; the download advances only as
/// the stream is polled, and the file is complete when the stream ends.
pub type ProgressStream = Pin<Box<dyn Stream<Item = Result<DownloadProgress, HttpError>> + Send>>;

/// Minimal HTTP surface used by the generator.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url`, returning the final status and body.
    async fn get(&self, url: &str) -> Result<(u16, Vec<u8>), HttpError>;

    /// HEAD `url` with extra headers; true when the final status is a success.
    async fn head(&self, url: &str, headers: &[(String, String)]) -> Result<bool, HttpError>;

    /// Download `url` to `dest`, failing unless the response is 200 OK.
    async fn download_file(&self, url: &str, dest: &Utf8Path) -> Result<(), HttpError>;

    /// Download `url` to `dest`, yielding one progress event per received
    /// chunk.
    async fn download_file_with_progress(
        &self,
        url: &str,
        dest: &Utf8Path,
    ) -> Result<ProgressStream, HttpError>;
}

/// Real client backed by reqwest. Follows up to [`MAX_REDIRECTS`] redirects;
/// loops exhaust the limit and fail.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Construct a client. `http1_only` disables HTTP/2 for servers that
    /// misbehave on multiplexed downloads.
    pub fn new(http1_only: bool) -> Result<Self, HttpError> {
        let mut builder =
            reqwest::Client::builder().redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));
        if http1_only {
            builder = builder.http1_only();
        }
        let client = builder.build().map_err(HttpError::ClientConstruction)?;
        Ok(Self { client })
    }

    async fn response(&self, url: &str) -> Result<reqwest::Response, HttpError> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|source| HttpError::Request {
                url: url.to_string(),
                source,
            })
    }
}

/// Run `f` with a freshly constructed client; the client's connection pool is
/// torn down when `f` returns on any path.
pub async fn with_client<T, E, F, Fut>(http1_only: bool, f: F) -> Result<T, E>
where
    E: From<HttpError>,
    F: FnOnce(ReqwestHttpClient) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let client = ReqwestHttpClient::new(http1_only)?;
    f(client).await
}

async fn open_dest(dest: &Utf8Path) -> Result<tokio::fs::File, HttpError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent.as_std_path())
            .await
            .map_err(|source| HttpError::Io {
                path: parent.to_owned(),
                source,
            })?;
    }
    tokio::fs::File::create(dest.as_std_path())
        .await
        .map_err(|source| HttpError::Io {
            path: dest.to_owned(),
            source,
        })
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<(u16, Vec<u8>), HttpError> {
        let response = self.response(url).await?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|source| HttpError::Request {
                url: url.to_string(),
                source,
            })?;
        Ok((status, body.to_vec()))
    }

    async fn head(&self, url: &str, headers: &[(String, String)]) -> Result<bool, HttpError> {
        let mut request = self.client.head(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(|source| HttpError::Request {
            url: url.to_string(),
            source,
        })?;
        Ok(response.status().is_success())
    }

    async fn download_file(&self, url: &str, dest: &Utf8Path) -> Result<(), HttpError> {
        let mut stream = self.download_file_with_progress(url, dest).await?;
        while let Some(event) = stream.next().await {
            event?;
        }
        Ok(())
    }

    async fn download_file_with_progress(
        &self,
        url: &str,
        dest: &Utf8Path,
    ) -> Result<ProgressStream, HttpError> {
        let response = self.response(url).await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(HttpError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let total_bytes = response.content_length();
        let file = open_dest(dest).await?;
        let body = response.bytes_stream().boxed();

        let state = (body, file, 0u64, dest.to_owned(), url.to_string());
        let stream = futures::stream::try_unfold(
            state,
            move |(mut body, mut file, received, dest, url)| async move {
                match body.next().await {
                    Some(Ok(chunk)) => {
                        file.write_all(&chunk)
                            .await
                            .map_err(|source| HttpError::Io {
                                path: dest.clone(),
                                source,
                            })?;
                        let received = received + chunk.len() as u64;
                        let progress = DownloadProgress {
                            received_bytes: received,
                            total_bytes,
                        };
                        Ok(Some((progress, (body, file, received, dest, url))))
                    }
                    Some(Err(source)) => Err(HttpError::Request { url, source }),
                    None => {
                        file.flush().await.map_err(|source| HttpError::Io {
                            path: dest.clone(),
                            source,
                        })?;
                        Ok(None)
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }
}

/// Client that fails every request. Swapped in via `SDKGEN_OFFLINE=1` to
/// enforce cache-only runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineHttpClient;

#[async_trait]
impl HttpClient for OfflineHttpClient {
    async fn get(&self, url: &str) -> Result<(u16, Vec<u8>), HttpError> {
        Err(HttpError::Offline {
            url: url.to_string(),
        })
    }

    async fn head(&self, url: &str, _headers: &[(String, String)]) -> Result<bool, HttpError> {
        Err(HttpError::Offline {
            url: url.to_string(),
        })
    }

    async fn download_file(&self, url: &str, _dest: &Utf8Path) -> Result<(), HttpError> {
        Err(HttpError::Offline {
            url: url.to_string(),
        })
    }

    async fn download_file_with_progress(
        &self,
        url: &str,
        _dest: &Utf8Path,
    ) -> Result<ProgressStream, HttpError> {
        Err(HttpError::Offline {
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_client_refuses_everything() {
        let client = OfflineHttpClient;
        let err = client.get("https://example.invalid/x").await.unwrap_err();
        assert!(matches!(err, HttpError::Offline { .. }));
        let err = client
            .download_file("https://example.invalid/x", Utf8Path::new("/tmp/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Offline { .. }));
    }
}
