//! The bundle generator: owns the output tree a recipe assembles into.

use camino::{Utf8Path, Utf8PathBuf};
use sdkgen_catalog::PathsConfiguration;
use sdkgen_fs::FileSystem;
use sdkgen_metadata::{
    BundleManifest, SwiftSdkMetadata, SwiftSdkTripleProperties, Toolset, to_json_bytes,
};
use sdkgen_runner::{CommandSpec, ProcessSpec, run_checking_success};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::RecipeError;

/// Owns the on-disk bundle tree being built. Exactly one generator exists
/// per recipe run.
pub struct BundleGenerator {
    pub paths: PathsConfiguration,
    /// Version recorded in the bundle manifest.
    pub bundle_version: String,
    /// Leave existing files in place instead of starting from scratch.
    pub incremental: bool,
    fs: Arc<dyn FileSystem>,
}

impl BundleGenerator {
    #[must_use]
    pub fn new(
        paths: PathsConfiguration,
        bundle_version: String,
        incremental: bool,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            paths,
            bundle_version,
            incremental,
            fs,
        }
    }

    #[must_use]
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Create the bundle skeleton. Non-incremental runs delete the existing
    /// output tree first; incremental runs leave it in place.
    pub async fn prepare_bundle(&self) -> Result<(), RecipeError> {
        if !self.incremental {
            self.fs
                .remove_recursively(&self.paths.artifact_bundle_path)
                .await?;
        }
        self.fs.create_dir_all(&self.paths.sdk_root_path).await?;
        self.fs.create_dir_all(&self.paths.sysroot_path).await?;
        Ok(())
    }

    /// Copy the contents of `src` into `dst` (created if missing).
    pub async fn copy_tree(&self, src: &Utf8Path, dst: &Utf8Path) -> Result<(), RecipeError> {
        self.fs.create_dir_all(dst).await?;
        run_checking_success(ProcessSpec::new(
            CommandSpec::new("cp")
                .arg("-R")
                .arg(format!("{src}/."))
                .arg(dst.as_str()),
        ))
        .await?;
        Ok(())
    }

    /// Mirror the contents of `src` into `dst` with rsync, preserving
    /// attributes; used where repeated runs must converge in place.
    pub async fn rsync_tree(&self, src: &Utf8Path, dst: &Utf8Path) -> Result<(), RecipeError> {
        self.fs.create_dir_all(dst).await?;
        run_checking_success(ProcessSpec::new(
            CommandSpec::new("rsync")
                .arg("-a")
                .arg(format!("{src}/"))
                .arg(dst.as_str()),
        ))
        .await?;
        Ok(())
    }

    /// Write one JSON document in the bundle's canonical form.
    pub async fn write_json<T: Serialize>(
        &self,
        path: &Utf8Path,
        document: &T,
    ) -> Result<(), RecipeError> {
        let bytes = to_json_bytes(document)?;
        self.fs.write(path, &bytes).await?;
        Ok(())
    }

    /// Emit the per-target descriptors and the bundle manifest.
    ///
    /// `target_triples` maps each triple string to its descriptor entry;
    /// `supported_host_triples` of `None` marks a universal bundle.
    pub async fn emit_metadata(
        &self,
        toolset: &Toolset,
        target_triples: BTreeMap<String, SwiftSdkTripleProperties>,
        supported_host_triples: Option<Vec<String>>,
    ) -> Result<(), RecipeError> {
        let sdk_root = &self.paths.sdk_root_path;
        self.write_json(&sdk_root.join("toolset.json"), toolset)
            .await?;
        self.write_json(
            &sdk_root.join("swift-sdk.json"),
            &SwiftSdkMetadata::new(target_triples),
        )
        .await?;

        let variant_path = format!(
            "{}/{}",
            self.paths.artifact_id,
            sdk_root.file_name().unwrap_or(&self.paths.artifact_id)
        );
        let manifest = BundleManifest::swift_sdk(
            &self.paths.artifact_id,
            &self.bundle_version,
            &variant_path,
            supported_host_triples,
        );
        self.write_json(&self.paths.bundle_manifest_path(), &manifest)
            .await?;
        Ok(())
    }

    /// Relative path from the SDK root, for descriptor fields.
    pub fn descriptor_path(&self, path: &Utf8Path) -> Result<String, RecipeError> {
        Ok(sdkgen_metadata::relative_to_root(
            path,
            &self.paths.sdk_root_path,
        )?)
    }

    /// Extracted-artifact directory in the cache for a given archive.
    #[must_use]
    pub fn extraction_dir(&self, archive: &Utf8Path) -> Utf8PathBuf {
        let stem = archive.file_name().unwrap_or("archive");
        self.paths.cache_path.join("extracted").join(stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdkgen_fs::VirtualFileSystem;
    use sdkgen_metadata::ToolProperties;

    fn generator(fs: &VirtualFileSystem, incremental: bool) -> BundleGenerator {
        let paths = PathsConfiguration::new(
            Utf8Path::new("/work"),
            "6.0.3-RELEASE_ubuntu_jammy_x86_64",
            "x86_64-unknown-linux-gnu",
            "ubuntu-jammy.sdk",
        );
        BundleGenerator::new(paths, "0.0.1".to_string(), incremental, Arc::new(fs.clone()))
    }

    #[tokio::test]
    async fn non_incremental_prepare_clears_the_tree() {
        let fs = VirtualFileSystem::new();
        let generator = generator(&fs, false);
        let stale = generator.paths.sysroot_path.join("stale-file");
        fs.write(&stale, b"old").await.unwrap();

        generator.prepare_bundle().await.unwrap();
        assert!(!fs.exists(&stale).await);
        assert!(fs.exists(&generator.paths.sysroot_path).await);
    }

    #[tokio::test]
    async fn incremental_prepare_keeps_existing_files() {
        let fs = VirtualFileSystem::new();
        let generator = generator(&fs, true);
        let kept = generator.paths.sysroot_path.join("kept-file");
        fs.write(&kept, b"keep me").await.unwrap();

        generator.prepare_bundle().await.unwrap();
        assert!(fs.exists(&kept).await);
    }

    #[tokio::test]
    async fn emitted_metadata_is_byte_stable_across_runs() {
        let fs = VirtualFileSystem::new();
        let generator = generator(&fs, true);
        generator.prepare_bundle().await.unwrap();

        let toolset = Toolset {
            root_path: Some("swift.xctoolchain/usr/bin".to_string()),
            linker: Some(ToolProperties::with_path("ld.lld")),
            ..Toolset::default()
        };
        let mut triples = BTreeMap::new();
        triples.insert(
            "x86_64-unknown-linux-gnu".to_string(),
            SwiftSdkTripleProperties {
                sdk_root_path: "ubuntu-jammy.sdk".to_string(),
                toolset_paths: Some(vec!["toolset.json".to_string()]),
                ..SwiftSdkTripleProperties::default()
            },
        );

        generator
            .emit_metadata(&toolset, triples.clone(), None)
            .await
            .unwrap();
        let manifest_path = generator.paths.bundle_manifest_path();
        let sdk_json_path = generator.paths.sdk_root_path.join("swift-sdk.json");
        let first_manifest = fs.read_to_end(&manifest_path, 1 << 20).await.unwrap();
        let first_sdk = fs.read_to_end(&sdk_json_path, 1 << 20).await.unwrap();

        generator
            .emit_metadata(&toolset, triples, None)
            .await
            .unwrap();
        assert_eq!(
            fs.read_to_end(&manifest_path, 1 << 20).await.unwrap(),
            first_manifest
        );
        assert_eq!(
            fs.read_to_end(&sdk_json_path, 1 << 20).await.unwrap(),
            first_sdk
        );

        let manifest_text = String::from_utf8(first_manifest).unwrap();
        assert!(manifest_text.contains("\"6.0.3-RELEASE_ubuntu_jammy_x86_64\""));
        assert!(manifest_text.contains("\"type\": \"swiftSDK\""));
    }
}
