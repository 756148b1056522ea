//! On-disk layout of the artifact bundle being assembled.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Paths derived from the source root and artifact id.
///
/// Layout:
///
/// ```text
/// <source_root>/
///   Artifacts/                              downloaded archives + cache db
///   Bundles/<id>.artifactbundle/
///     info.json
///     <id>/<target-triple>/                 sdk_root_path
///       swift-sdk.json
///       toolset.json
///       swift.xctoolchain/usr/bin/          toolchain_bin_dir_path
///       <dist>-<release>.sdk/               sysroot_path
/// ```
///
/// `toolchain_bin_dir_path` is always a descendant of `sdk_root_path`,
/// which is a descendant of `artifact_bundle_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfiguration {
    pub source_root: Utf8PathBuf,
    pub artifact_id: String,
    pub artifact_bundle_path: Utf8PathBuf,
    pub cache_path: Utf8PathBuf,
    pub sdk_root_path: Utf8PathBuf,
    pub sysroot_path: Utf8PathBuf,
    pub toolchain_dir_path: Utf8PathBuf,
    pub toolchain_bin_dir_path: Utf8PathBuf,
}

impl PathsConfiguration {
    /// Derive the full layout.
    ///
    /// `target_dir_name` is the per-target directory (normally the target
    /// triple string); `sysroot_dir_name` is e.g. `ubuntu-jammy.sdk` or
    /// `WASI.sdk`.
    #[must_use]
    pub fn new(
        source_root: &Utf8Path,
        artifact_id: &str,
        target_dir_name: &str,
        sysroot_dir_name: &str,
    ) -> Self {
        let artifact_bundle_path = source_root
            .join("Bundles")
            .join(format!("{artifact_id}.artifactbundle"));
        let sdk_root_path = artifact_bundle_path.join(artifact_id).join(target_dir_name);
        let toolchain_dir_path = sdk_root_path.join("swift.xctoolchain");
        Self {
            source_root: source_root.to_owned(),
            artifact_id: artifact_id.to_string(),
            cache_path: source_root.join("Artifacts"),
            sysroot_path: sdk_root_path.join(sysroot_dir_name),
            toolchain_bin_dir_path: toolchain_dir_path.join("usr/bin"),
            toolchain_dir_path,
            sdk_root_path,
            artifact_bundle_path,
        }
    }

    /// Path of the bundle manifest.
    #[must_use]
    pub fn bundle_manifest_path(&self) -> Utf8PathBuf {
        self.artifact_bundle_path.join("info.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_nesting_invariant() {
        let paths = PathsConfiguration::new(
            Utf8Path::new("/work"),
            "6.0.3-RELEASE_ubuntu_jammy_x86_64",
            "x86_64-unknown-linux-gnu",
            "ubuntu-jammy.sdk",
        );
        assert!(paths.sdk_root_path.starts_with(&paths.artifact_bundle_path));
        assert!(paths
            .toolchain_bin_dir_path
            .starts_with(&paths.sdk_root_path));
        assert!(paths.sysroot_path.starts_with(&paths.sdk_root_path));
        assert_eq!(
            paths.artifact_bundle_path,
            Utf8PathBuf::from("/work/Bundles/6.0.3-RELEASE_ubuntu_jammy_x86_64.artifactbundle")
        );
        assert_eq!(
            paths.sysroot_path,
            Utf8PathBuf::from(
                "/work/Bundles/6.0.3-RELEASE_ubuntu_jammy_x86_64.artifactbundle/6.0.3-RELEASE_ubuntu_jammy_x86_64/x86_64-unknown-linux-gnu/ubuntu-jammy.sdk"
            )
        );
        assert_eq!(
            paths.bundle_manifest_path(),
            paths.artifact_bundle_path.join("info.json")
        );
    }
}
