//! Concrete queries executed through the cache engine.
//!
//! Each query hashes over its named inputs only and reaches all I/O through
//! the engine, so identical steps are shared across recipes and across
//! concurrent calls within a run.

use anyhow::Context;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use futures::StreamExt;
use sdkgen_catalog::DownloadableArtifact;
use sdkgen_engine::{HashEncodable, HashEncoder, Query, QueryEngine, QueryOutput};
use sdkgen_fs::FileSystem;
use sdkgen_http::HttpClient;
use sdkgen_runner::{CommandSpec, ProcessSpec, run_log_output};
use std::time::{Duration, Instant};

/// Progress events are spaced at least this far apart in time.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
/// And at least this many bytes apart.
const PROGRESS_STRIDE: u64 = 1024 * 1024;

/// Download a URL into a directory, named after the URL's last path
/// component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFileQuery {
    pub url: String,
    pub local_dir: Utf8PathBuf,
}

impl HashEncodable for DownloadFileQuery {
    fn encode(&self, encoder: &mut HashEncoder) {
        self.url.encode(encoder);
        self.local_dir.encode(encoder);
    }
}

impl DownloadFileQuery {
    /// Where the downloaded file lands.
    #[must_use]
    pub fn destination(&self) -> Utf8PathBuf {
        let name = self
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("download");
        self.local_dir.join(name)
    }
}

#[async_trait]
impl Query for DownloadFileQuery {
    fn type_name(&self) -> &'static str {
        "queries.DownloadFileQuery"
    }

    async fn run(&self, engine: &QueryEngine) -> anyhow::Result<QueryOutput> {
        let dest = self.destination();
        engine.file_system().create_dir_all(&self.local_dir).await?;
        engine
            .http()
            .download_file(&self.url, &dest)
            .await
            .with_context(|| format!("downloading {}", self.url))?;
        Ok(QueryOutput::Path(dest))
    }
}

/// Download a cataloged artifact with progress reporting and optional
/// checksum verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifactQuery {
    pub artifact: DownloadableArtifact,
}

impl HashEncodable for DownloadArtifactQuery {
    fn encode(&self, encoder: &mut HashEncoder) {
        self.artifact.remote_url.encode(encoder);
        self.artifact.local_path.encode(encoder);
        self.artifact.checksum.encode(encoder);
        self.artifact.is_prebuilt.encode(encoder);
    }
}

#[async_trait]
impl Query for DownloadArtifactQuery {
    fn type_name(&self) -> &'static str {
        "queries.DownloadArtifactQuery"
    }

    async fn run(&self, engine: &QueryEngine) -> anyhow::Result<QueryOutput> {
        let url = &self.artifact.remote_url;
        let dest = &self.artifact.local_path;
        tracing::info!(url = %url, "downloading artifact");

        let mut progress = engine
            .http()
            .download_file_with_progress(url, dest)
            .await
            .with_context(|| format!("downloading {url}"))?;

        // Coalesce progress: one report per second and per mebibyte.
        let mut last_report = Instant::now();
        let mut last_bytes = 0u64;
        let mut received = 0u64;
        let mut total = None;
        while let Some(event) = progress.next().await {
            let event = event.with_context(|| format!("downloading {url}"))?;
            received = event.received_bytes;
            total = event.total_bytes;
            if last_report.elapsed() >= PROGRESS_INTERVAL
                && received.saturating_sub(last_bytes) >= PROGRESS_STRIDE
            {
                report_progress(url, received, total);
                last_report = Instant::now();
                last_bytes = received;
            }
        }
        report_progress(url, received, total);

        if let Some(expected) = &self.artifact.checksum {
            let actual = engine.file_system().sha256_hex(dest).await?;
            anyhow::ensure!(
                actual.eq_ignore_ascii_case(expected),
                "checksum mismatch for {url}: expected {expected}, got {actual}"
            );
        }
        Ok(QueryOutput::Path(dest.clone()))
    }
}

fn report_progress(url: &str, received: u64, total: Option<u64>) {
    match total {
        Some(total) if total > 0 => {
            let percent = (received as f64 / total as f64) * 100.0;
            tracing::info!(
                url = %url,
                "downloaded {:.1} MiB of {:.1} MiB ({percent:.0}%)",
                received as f64 / (1024.0 * 1024.0),
                total as f64 / (1024.0 * 1024.0),
            );
        }
        _ => {
            tracing::info!(
                url = %url,
                "downloaded {:.1} MiB",
                received as f64 / (1024.0 * 1024.0),
            );
        }
    }
}

/// Extract an archive and return one tracked path inside the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarExtractQuery {
    pub archive: Utf8PathBuf,
    pub dest: Utf8PathBuf,
    /// The path (relative to `dest`) this extraction is tracked by.
    pub output_subpath: Utf8PathBuf,
    pub strip_components: Option<u32>,
}

impl HashEncodable for TarExtractQuery {
    fn encode(&self, encoder: &mut HashEncoder) {
        self.archive.encode(encoder);
        self.dest.encode(encoder);
        self.output_subpath.encode(encoder);
        self.strip_components.encode(encoder);
    }
}

#[async_trait]
impl Query for TarExtractQuery {
    fn type_name(&self) -> &'static str {
        "queries.TarExtractQuery"
    }

    async fn run(&self, _engine: &QueryEngine) -> anyhow::Result<QueryOutput> {
        sdkgen_archive::extract(&self.archive, &self.dest, self.strip_components)
            .await
            .with_context(|| format!("extracting {}", self.archive))?;
        Ok(QueryOutput::Path(self.dest.join(&self.output_subpath)))
    }
}

/// Configure and build a CMake project, returning one produced binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CMakeBuildQuery {
    pub sources_dir: Utf8PathBuf,
    pub output_binary_subpath: Utf8PathBuf,
    pub options: Vec<String>,
}

impl HashEncodable for CMakeBuildQuery {
    fn encode(&self, encoder: &mut HashEncoder) {
        self.sources_dir.encode(encoder);
        self.output_binary_subpath.encode(encoder);
        self.options.encode(encoder);
    }
}

#[async_trait]
impl Query for CMakeBuildQuery {
    fn type_name(&self) -> &'static str {
        "queries.CMakeBuildQuery"
    }

    async fn run(&self, _engine: &QueryEngine) -> anyhow::Result<QueryOutput> {
        let build_dir = self
            .sources_dir
            .parent()
            .map(|parent| parent.join("build"))
            .unwrap_or_else(|| Utf8PathBuf::from("build"));

        let configure = CommandSpec::new("cmake")
            .arg("-S")
            .arg(self.sources_dir.as_str())
            .arg("-B")
            .arg(build_dir.as_str())
            .args(self.options.iter().cloned());
        let exit = run_log_output(ProcessSpec::new(configure), tracing::Level::DEBUG, "cmake")
            .await
            .context("running cmake configure")?;
        anyhow::ensure!(exit.success(), "cmake configure failed: {exit:?}");

        let build = CommandSpec::new("cmake")
            .arg("--build")
            .arg(build_dir.as_str());
        let exit = run_log_output(ProcessSpec::new(build), tracing::Level::DEBUG, "cmake")
            .await
            .context("running cmake build")?;
        anyhow::ensure!(exit.success(), "cmake build failed: {exit:?}");

        Ok(QueryOutput::Path(
            build_dir.join(&self.output_binary_subpath),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdkgen_engine::HashEncoder;

    #[test]
    fn download_file_destination_uses_last_component() {
        let query = DownloadFileQuery {
            url: "https://example.com/pool/libc6_2.35_amd64.deb".to_string(),
            local_dir: Utf8PathBuf::from("/cache/packages"),
        };
        assert_eq!(
            query.destination(),
            Utf8PathBuf::from("/cache/packages/libc6_2.35_amd64.deb")
        );
    }

    #[test]
    fn query_hashes_cover_all_fields() {
        let base = TarExtractQuery {
            archive: Utf8PathBuf::from("/cache/a.tar.gz"),
            dest: Utf8PathBuf::from("/tmp/out"),
            output_subpath: Utf8PathBuf::from("usr"),
            strip_components: None,
        };
        let with_strip = TarExtractQuery {
            strip_components: Some(1),
            ..base.clone()
        };

        let hash = |q: &TarExtractQuery| {
            let mut encoder = HashEncoder::new();
            encoder.encode_type_name(q.type_name());
            q.encode(&mut encoder);
            encoder.finalize()
        };
        assert_ne!(hash(&base), hash(&with_strip));
    }

    /// The documented regression vector: this exact query must keep hashing
    /// to the same key as the hand-assembled byte encoding.
    #[test]
    fn download_file_cache_key_vector() {
        let query = DownloadFileQuery {
            url: "https://download.example/foo-1.0.tar.gz".to_string(),
            local_dir: Utf8PathBuf::from("/cache"),
        };
        let mut encoder = HashEncoder::new();
        encoder.encode_type_name(query.type_name());
        query.encode(&mut encoder);
        let key = encoder.finalize();

        let mut bytes = Vec::new();
        for s in [
            "queries.DownloadFileQuery",
            "https://download.example/foo-1.0.tar.gz",
            "/cache",
        ] {
            bytes.extend((s.len() as u64).to_le_bytes());
            bytes.extend(s.as_bytes());
        }
        let expected = sdkgen_engine::CacheKey::from_bytes(*blake3::hash(&bytes).as_bytes());
        assert_eq!(key, expected, "cache key encoding drifted: {key}");
    }
}
