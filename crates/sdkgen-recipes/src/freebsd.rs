//! FreeBSD SDK assembly from a release `base.txz`.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use sdkgen_catalog::{CatalogError, freebsd_base_artifact};
use sdkgen_engine::QueryEngine;
use sdkgen_fs::FileSystem;
use sdkgen_metadata::{SwiftSdkTripleProperties, ToolProperties, Toolset};
use sdkgen_queries::DownloadArtifactQuery;
use sdkgen_runner::{CommandSpec, ProcessSpec, run_checking_success};
use sdkgen_triple::Triple;
use std::collections::BTreeMap;

use crate::error::RecipeError;
use crate::generator::BundleGenerator;
use crate::{SdkProduct, SdkRecipe};

/// Runtime library paths baked into produced binaries.
const RUNTIME_RPATHS: &str = "/usr/local/swift/lib:/usr/local/swift/lib/swift/freebsd";

/// Only these subtrees of the base system land in the sysroot.
const BASE_MEMBERS: [&str; 3] = ["./lib", "./usr/include", "./usr/lib"];

/// The FreeBSD recipe.
pub struct FreeBsdRecipe {
    pub target_triple: Triple,
    /// Release like `14.3`; 14.3 and newer are supported.
    pub release: String,
    /// A FreeBSD Swift toolchain whose runtime libraries overlay the
    /// sysroot.
    pub swift_toolchain_overlay: Option<Utf8PathBuf>,
}

impl FreeBsdRecipe {
    pub fn new(
        target_triple: Triple,
        release: String,
        swift_toolchain_overlay: Option<Utf8PathBuf>,
    ) -> Result<Self, RecipeError> {
        let supported = release
            .split_once('.')
            .and_then(|(major, minor)| {
                Some((major.parse::<u32>().ok()?, minor.parse::<u32>().ok()?))
            })
            .is_some_and(|(major, minor)| (major == 14 && minor >= 3) || major >= 15);
        if !supported {
            return Err(CatalogError::UnknownDistribution {
                name: "freebsd".to_string(),
                version: Some(release),
            }
            .into());
        }
        Ok(Self {
            target_triple,
            release,
            swift_toolchain_overlay,
        })
    }

    async fn overlay_swift_toolchain(
        &self,
        generator: &BundleGenerator,
        overlay: &Utf8PathBuf,
    ) -> Result<(), RecipeError> {
        let fs = generator.fs();
        let sysroot = &generator.paths.sysroot_path;
        let swift_root = overlay.join("usr/local/swift");

        // Runtime and static libraries: usr/local/swift/lib/swift* under
        // the sysroot's usr/lib.
        let lib_dir = swift_root.join("lib");
        if fs.exists(&lib_dir).await {
            for entry in fs.read_dir(&lib_dir).await? {
                let name = entry.file_name().unwrap_or_default();
                if name.starts_with("swift") {
                    generator
                        .copy_tree(&entry, &sysroot.join("usr/lib").join(name))
                        .await?;
                }
            }
        }

        let include_dir = swift_root.join("include");
        if fs.exists(&include_dir).await {
            generator
                .copy_tree(&include_dir, &sysroot.join("usr/include"))
                .await?;
        }
        Ok(())
    }

    fn toolset(&self) -> Toolset {
        Toolset {
            swift_compiler: Some(ToolProperties::with_options(["-use-ld=lld"])),
            linker: Some(ToolProperties::with_options([
                "-rpath".to_string(),
                RUNTIME_RPATHS.to_string(),
            ])),
            ..Toolset::default()
        }
    }
}

#[async_trait]
impl SdkRecipe for FreeBsdRecipe {
    fn name(&self) -> &'static str {
        "freebsd"
    }

    async fn make_sdk(
        &self,
        generator: &BundleGenerator,
        engine: &QueryEngine,
    ) -> Result<SdkProduct, RecipeError> {
        let paths = &generator.paths;
        generator.prepare_bundle().await?;

        let artifact = freebsd_base_artifact(&self.target_triple, &self.release, paths)?;
        let base_txz = engine
            .execute(&DownloadArtifactQuery { artifact })
            .await
            .map_err(RecipeError::Engine)?
            .into_path()?;

        // Extract only the sysroot-relevant subtrees of the base system.
        run_checking_success(ProcessSpec::new(
            CommandSpec::new("tar")
                .arg("-xJf")
                .arg(base_txz.as_str())
                .args(["-C", paths.sysroot_path.as_str()])
                .args(BASE_MEMBERS),
        ))
        .await?;

        if let Some(overlay) = &self.swift_toolchain_overlay {
            self.overlay_swift_toolchain(generator, overlay).await?;
        }

        let sysroot_rel = generator.descriptor_path(&paths.sysroot_path)?;
        let mut triples = BTreeMap::new();
        triples.insert(
            self.target_triple.canonical(),
            SwiftSdkTripleProperties {
                sdk_root_path: sysroot_rel.clone(),
                include_search_paths: Some(vec![format!("{sysroot_rel}/usr/include")]),
                library_search_paths: Some(vec![format!("{sysroot_rel}/usr/lib")]),
                toolset_paths: Some(vec!["toolset.json".to_string()]),
                ..SwiftSdkTripleProperties::default()
            },
        );

        generator
            .emit_metadata(&self.toolset(), triples, None)
            .await?;

        Ok(SdkProduct {
            sdk_dir_path: paths.sdk_root_path.clone(),
            supported_host_triples: None,
        })
    }
}
