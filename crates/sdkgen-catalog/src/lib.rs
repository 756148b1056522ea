//! Artifact catalog: what to download, from where, and where to cache it.
//!
//! Pure derivation from `(host, target, versions, paths)`; the only
//! networked pieces are the package-index fetch and nothing else.

pub mod artifact;
pub mod distribution;
pub mod error;
pub mod package_index;
pub mod paths;
pub mod versions;

pub use artifact::{
    DownloadableArtifact, apply_llvm_source_fallback, freebsd_base_artifact, host_llvm_artifact,
    host_swift_artifact, target_swift_artifact,
};
pub use distribution::{DebianRelease, LinuxDistribution, UbuntuRelease, debian_arch_name};
pub use error::CatalogError;
pub use package_index::{fetch_package_urls, packages_file_url, parse_packages_index};
pub use paths::PathsConfiguration;
pub use versions::{SwiftVersion, SwiftVersionKind, VersionsConfiguration};
