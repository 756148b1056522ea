//! Debian-style `Packages.gz` index parsing.

use regex::Regex;
use sdkgen_http::HttpClient;
use sdkgen_runner::{CommandSpec, ProcessSpec, StdinSource, run_capturing_stdout};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::CatalogError;

/// One complete stanza: `Package:`, then `Filename:`, then
/// `Description-md5:`, in order, without crossing a blank line.
static PACKAGE_STANZA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Package: (.+)\n(?:[^\n]+\n)*?Filename: (.+)\n(?:[^\n]+\n)*?Description-md5: [0-9a-fA-F]+",
    )
    .expect("stanza pattern compiles")
});

/// URL of the `Packages.gz` index for one component of a release.
#[must_use]
pub fn packages_file_url(
    mirror: &str,
    release: &str,
    release_suffix: &str,
    component: &str,
    debian_arch: &str,
) -> String {
    format!("{mirror}/dists/{release}{release_suffix}/{component}/binary-{debian_arch}/Packages.gz")
}

/// Extract `package name -> repository-relative file path` pairs from a
/// decompressed index.
///
/// A stanza only counts when it carries `Package:`, `Filename:`, and a
/// `Description-md5:` field, in that order.
#[must_use]
pub fn parse_packages_index(text: &str) -> HashMap<String, String> {
    PACKAGE_STANZA
        .captures_iter(text)
        .map(|captures| (captures[1].to_string(), captures[2].to_string()))
        .collect()
}

/// Download, decompress, and parse the index, then resolve each required
/// package to an absolute URL.
///
/// Missing packages fail the whole call with the expected/actual counts.
pub async fn fetch_package_urls(
    http: &dyn HttpClient,
    mirror: &str,
    release: &str,
    release_suffix: &str,
    component: &str,
    debian_arch: &str,
    required_packages: &[&str],
) -> Result<Vec<(String, String)>, CatalogError> {
    let url = packages_file_url(mirror, release, release_suffix, component, debian_arch);
    tracing::debug!(url = %url, "fetching package index");
    let (status, body) = http.get(&url).await?;
    if status != 200 {
        return Err(CatalogError::Http(sdkgen_http::HttpError::DownloadFailed {
            url,
            status,
        }));
    }

    // The index is gzip-compressed; decompress through the platform gzip,
    // fed on stdin.
    let decompressed = run_capturing_stdout(
        ProcessSpec::new(CommandSpec::new("gzip").arg("-cd")).stdin(StdinSource::Bytes(body)),
    )
    .await
    .map_err(|_| CatalogError::PackageListDecompressionFailure)?;
    let text = String::from_utf8_lossy(&decompressed);

    let index = parse_packages_index(&text);
    let mut resolved = Vec::with_capacity(required_packages.len());
    for name in required_packages {
        if let Some(path) = index.get(*name) {
            resolved.push(((*name).to_string(), format!("{mirror}/{path}")));
        }
    }
    if resolved.len() != required_packages.len() {
        return Err(CatalogError::PackageListParsingFailure {
            expected: required_packages.len(),
            actual: resolved.len(),
        });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = "\
Package: libc6
Architecture: amd64
Version: 2.35-0ubuntu3
Filename: pool/main/g/glibc/libc6_2.35-0ubuntu3_amd64.deb
Size: 3235300
Description: GNU C Library: Shared libraries
Description-md5: fc3001b0b90a1c8e6690b283a619d57f

Package: libc6-dev
Architecture: amd64
Version: 2.35-0ubuntu3
Filename: pool/main/g/glibc/libc6-dev_2.35-0ubuntu3_amd64.deb
Description: GNU C Library: Development Libraries
Description-md5: 1bbdc717d9acdbd2b7b6301a4d5a6f1a

Package: incomplete-stanza
Version: 1.0
Description: no filename here
Description-md5: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
";

    #[test]
    fn url_construction() {
        assert_eq!(
            packages_file_url(
                "http://archive.ubuntu.com/ubuntu",
                "jammy",
                "",
                "main",
                "amd64"
            ),
            "http://archive.ubuntu.com/ubuntu/dists/jammy/main/binary-amd64/Packages.gz"
        );
        assert_eq!(
            packages_file_url(
                "http://archive.ubuntu.com/ubuntu",
                "jammy",
                "-updates",
                "main",
                "arm64"
            ),
            "http://archive.ubuntu.com/ubuntu/dists/jammy-updates/main/binary-arm64/Packages.gz"
        );
    }

    #[test]
    fn parses_complete_stanzas_only() {
        let index = parse_packages_index(INDEX);
        assert_eq!(
            index.get("libc6").map(String::as_str),
            Some("pool/main/g/glibc/libc6_2.35-0ubuntu3_amd64.deb")
        );
        assert_eq!(
            index.get("libc6-dev").map(String::as_str),
            Some("pool/main/g/glibc/libc6-dev_2.35-0ubuntu3_amd64.deb")
        );
        assert!(!index.contains_key("incomplete-stanza"));
    }

    #[tokio::test]
    async fn fetch_resolves_required_packages() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(INDEX.as_bytes()).unwrap();
        let gz = encoder.finish().unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ubuntu/dists/jammy/main/binary-amd64/Packages.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gz))
            .mount(&server)
            .await;

        let mirror = format!("{}/ubuntu", server.uri());
        let client = sdkgen_http::ReqwestHttpClient::new(false).unwrap();
        let urls = fetch_package_urls(
            &client,
            &mirror,
            "jammy",
            "",
            "main",
            "amd64",
            &["libc6", "libc6-dev"],
        )
        .await
        .unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(
            urls[0].1,
            format!("{mirror}/pool/main/g/glibc/libc6_2.35-0ubuntu3_amd64.deb")
        );

        let err = fetch_package_urls(
            &client,
            &mirror,
            "jammy",
            "",
            "main",
            "amd64",
            &["libc6", "not-a-package"],
        )
        .await
        .unwrap_err();
        match err {
            CatalogError::PackageListParsingFailure { expected, actual } => {
                assert_eq!((expected, actual), (2, 1));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
