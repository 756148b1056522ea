//! Remote artifact catalog: canonical URLs, cache-local paths, checksums.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use sdkgen_triple::{Arch, Triple};

use crate::error::CatalogError;
use crate::paths::PathsConfiguration;
use crate::versions::VersionsConfiguration;

const SWIFT_DOWNLOAD_BASE: &str = "https://download.swift.org";
const LLVM_RELEASE_BASE: &str = "https://github.com/llvm/llvm-project/releases/download";
const FREEBSD_RELEASE_BASE: &str = "https://download.freebsd.org/releases";

/// A single remote artifact the generator may need.
///
/// Mutated only to redirect to an alternate source (the LLVM source-tarball
/// fallback); everything else treats it as immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadableArtifact {
    pub remote_url: String,
    pub local_path: Utf8PathBuf,
    /// Advisory SHA-256; verified when present, skipped when absent.
    pub checksum: Option<String>,
    pub is_prebuilt: bool,
}

impl DownloadableArtifact {
    fn new(remote_url: String, local_path: Utf8PathBuf) -> Self {
        Self {
            remote_url,
            local_path,
            checksum: None,
            is_prebuilt: true,
        }
    }

    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

fn host_arch_suffix(host: &Triple) -> &'static str {
    if host.arch.is_some_and(Arch::is_aarch64) {
        "-aarch64"
    } else {
        ""
    }
}

/// LLVM's release-asset platform component for a host.
fn llvm_platform_component(host: &Triple) -> String {
    if host.is_macos() {
        if host.arch.is_some_and(Arch::is_aarch64) {
            "arm64-apple-darwin22.0".to_string()
        } else {
            "x86_64-apple-darwin".to_string()
        }
    } else if host.arch == Some(Arch::Aarch64) {
        "aarch64-linux-gnu".to_string()
    } else {
        "x86_64-linux-gnu-ubuntu-22.04".to_string()
    }
}

/// Host Swift toolchain: macOS installer package, or the Amazon Linux 2
/// tarball on Linux hosts (chosen for the broadest glibc compatibility).
pub fn host_swift_artifact(
    host: &Triple,
    versions: &VersionsConfiguration,
    paths: &PathsConfiguration,
) -> DownloadableArtifact {
    let tag = versions.swift_version.tag();
    let branch = &versions.swift_branch;
    if host.is_macos() {
        let url = format!("{SWIFT_DOWNLOAD_BASE}/{branch}/osx/{tag}/{tag}-osx.pkg");
        let local = paths.cache_path.join(format!(
            "host_swift_{}_{}.pkg",
            versions.swift_version,
            host.canonical()
        ));
        DownloadableArtifact::new(url, local)
    } else {
        let suffix = host_arch_suffix(host);
        let url = format!(
            "{SWIFT_DOWNLOAD_BASE}/{branch}/amazonlinux2{suffix}/{tag}/{tag}-amazonlinux2{suffix}.tar.gz"
        );
        let local = paths.cache_path.join(format!(
            "host_swift_{}_{}.tar.gz",
            versions.swift_version,
            host.canonical()
        ));
        DownloadableArtifact::new(url, local)
    }
}

/// Prebuilt `clang+llvm` release archive for the host (the bundled `lld`
/// becomes the cross-linker).
pub fn host_llvm_artifact(
    host: &Triple,
    versions: &VersionsConfiguration,
    paths: &PathsConfiguration,
) -> DownloadableArtifact {
    let lld = &versions.lld_version;
    let component = llvm_platform_component(host);
    let url = format!(
        "{LLVM_RELEASE_BASE}/llvmorg-{lld}/clang+llvm-{lld}-{component}.tar.xz"
    );
    let local = paths.cache_path.join(format!(
        "host_llvm_{}_{}.tar.xz",
        lld,
        host.canonical()
    ));
    DownloadableArtifact::new(url, local)
}

/// Target Swift distribution tarball for the configured distribution.
pub fn target_swift_artifact(
    target: &Triple,
    versions: &VersionsConfiguration,
    paths: &PathsConfiguration,
) -> Result<DownloadableArtifact, CatalogError> {
    let distribution =
        versions
            .linux_distribution
            .ok_or_else(|| CatalogError::UnknownDistribution {
                name: "<none>".to_string(),
                version: None,
            })?;
    let (platform_dir, platform_file) = distribution.swift_platform(&versions.swift_version)?;
    let suffix = &versions.linux_arch_suffix;
    let tag = versions.swift_version.tag();
    let branch = &versions.swift_branch;
    let url = format!(
        "{SWIFT_DOWNLOAD_BASE}/{branch}/{platform_dir}{suffix}/{tag}/{tag}-{platform_file}{suffix}.tar.gz"
    );
    let local = paths.cache_path.join(format!(
        "target_swift_{}_{}.tar.gz",
        versions.swift_version,
        target.canonical()
    ));
    Ok(DownloadableArtifact::new(url, local))
}

/// FreeBSD `base.txz` for a release like `14.3`.
pub fn freebsd_base_artifact(
    target: &Triple,
    release: &str,
    paths: &PathsConfiguration,
) -> Result<DownloadableArtifact, CatalogError> {
    let arch_dir = match target.arch {
        Some(Arch::X86_64) => "amd64",
        Some(Arch::Aarch64) => "arm64/aarch64",
        Some(other) => {
            return Err(CatalogError::DistributionDoesNotSupportArchitecture {
                distribution: format!("freebsd {release}"),
                architecture: other.as_str().to_string(),
            });
        }
        None => {
            return Err(CatalogError::UnknownArchitecture(
                target.original().to_string(),
            ));
        }
    };
    let url = format!("{FREEBSD_RELEASE_BASE}/{arch_dir}/{release}-RELEASE/base.txz");
    let local = paths.cache_path.join(format!(
        "target_freebsd_{}_{}.txz",
        release,
        target.canonical()
    ));
    Ok(DownloadableArtifact::new(url, local))
}

/// Redirect an LLVM artifact at the source tarball. Used when the prebuilt
/// release asset is missing for this host; the checksum no longer applies
/// and is cleared.
pub fn apply_llvm_source_fallback(
    artifact: &mut DownloadableArtifact,
    versions: &VersionsConfiguration,
) {
    let lld = &versions.lld_version;
    artifact.remote_url =
        format!("{LLVM_RELEASE_BASE}/llvmorg-{lld}/llvm-project-{lld}.src.tar.xz");
    artifact.local_path = artifact
        .local_path
        .parent()
        .unwrap_or_else(|| camino::Utf8Path::new("."))
        .join(format!("host_llvm_{lld}_src.tar.xz"));
    artifact.checksum = None;
    artifact.is_prebuilt = false;
}
