//! WebAssembly/WASI SDK assembly.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use sdkgen_catalog::SwiftVersion;
use sdkgen_engine::QueryEngine;
use sdkgen_fs::FileSystem;
use sdkgen_metadata::{SwiftSdkTripleProperties, ToolProperties, Toolset};
use sdkgen_triple::Triple;
use std::collections::BTreeMap;

use crate::error::RecipeError;
use crate::generator::BundleGenerator;
use crate::{SdkProduct, SdkRecipe, default_host_triples};

/// Target Swift package subdirectories mirrored into the toolchain's
/// `usr/lib`.
const TARGET_LIB_SUBDIRS: [&str; 6] = [
    "clang",
    "swift/clang",
    "swift/wasi",
    "swift_static/clang",
    "swift_static/wasi",
    "swift_static/shims",
];

/// A host toolchain shipped inside the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSwiftPackage {
    pub path: Utf8PathBuf,
    pub triple: Triple,
}

/// The three supported WASI flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasmTargetVariant {
    /// Single-threaded `wasm32-unknown-wasi`.
    Plain,
    /// `wasm32-unknown-wasip1-threads` with shared memory.
    Threads,
    /// Embedded Swift on `wasm32-unknown-wasip1`.
    Embedded,
}

impl WasmTargetVariant {
    #[must_use]
    pub fn triple(self) -> Triple {
        match self {
            Self::Plain => Triple::parse("wasm32-unknown-wasi", true),
            Self::Threads => Triple::parse("wasm32-unknown-wasip1-threads", true),
            Self::Embedded => Triple::parse("wasm32-unknown-wasip1", true),
        }
    }

    /// File name of this variant's toolset inside the SDK root.
    #[must_use]
    pub fn toolset_file_name(self) -> &'static str {
        match self {
            Self::Plain => "toolset.json",
            Self::Threads => "toolset-threads.json",
            Self::Embedded => "toolset-embedded.json",
        }
    }

    /// Compiler and linker adjustments this flavor needs.
    #[must_use]
    pub fn toolset(self) -> Toolset {
        match self {
            Self::Plain => Toolset {
                swift_compiler: Some(ToolProperties::with_options(["-static-stdlib"])),
                ..Toolset::default()
            },
            Self::Threads => {
                let c_options = [
                    "-matomics",
                    "-mbulk-memory",
                    "-mthread-model",
                    "posix",
                    "-pthread",
                    "-ftls-model=local-exec",
                ];
                let mut swift_options: Vec<String> = Vec::new();
                for option in c_options {
                    swift_options.push("-Xcc".to_string());
                    swift_options.push(option.to_string());
                }
                Toolset {
                    swift_compiler: Some(ToolProperties {
                        path: None,
                        extra_cli_options: Some(swift_options),
                    }),
                    c_compiler: Some(ToolProperties::with_options(c_options)),
                    cxx_compiler: Some(ToolProperties::with_options(c_options)),
                    linker: Some(ToolProperties::with_options([
                        "--import-memory",
                        "--export-memory",
                        "--shared-memory",
                        "--max-memory=1073741824",
                    ])),
                    ..Toolset::default()
                }
            }
            Self::Embedded => Toolset {
                swift_compiler: Some(ToolProperties::with_options([
                    "-static-stdlib",
                    "-enable-experimental-feature",
                    "Embedded",
                    "-wmo",
                    "-Xlinker",
                    "-lc++",
                    "-Xlinker",
                    "-lswift_Concurrency",
                ])),
                c_compiler: Some(ToolProperties::with_options(["-D__EMBEDDED_SWIFT__"])),
                cxx_compiler: Some(ToolProperties::with_options(["-D__EMBEDDED_SWIFT__"])),
                ..Toolset::default()
            },
        }
    }
}

/// The WebAssembly recipe: everything comes from caller-supplied packages,
/// nothing is downloaded.
pub struct WebAssemblyRecipe {
    pub host_swift_package: Option<HostSwiftPackage>,
    pub target_swift_package: Utf8PathBuf,
    pub wasi_sysroot: Utf8PathBuf,
    pub swift_version: SwiftVersion,
    pub variants: Vec<WasmTargetVariant>,
}

impl WebAssemblyRecipe {
    async fn install_host_toolchain(
        &self,
        generator: &BundleGenerator,
        package: &HostSwiftPackage,
    ) -> Result<(), RecipeError> {
        let toolchain_usr = generator.paths.toolchain_dir_path.join("usr");
        generator
            .copy_tree(&package.path.join("usr"), &toolchain_usr)
            .await?;

        // Debugger bits are dead weight in a cross-compilation bundle.
        let fs = generator.fs();
        let bin = generator.paths.toolchain_bin_dir_path.clone();
        if fs.exists(&bin).await {
            for entry in fs.read_dir(&bin).await? {
                let name = entry.file_name().unwrap_or_default();
                if name.starts_with("lldb") {
                    fs.remove_recursively(&entry).await?;
                }
            }
        }
        let lib = toolchain_usr.join("lib");
        if fs.exists(&lib).await {
            for entry in fs.read_dir(&lib).await? {
                let name = entry.file_name().unwrap_or_default();
                if name.starts_with("liblldb") || name == "lldb" {
                    fs.remove_recursively(&entry).await?;
                }
            }
        }
        Ok(())
    }

    async fn install_target_runtime(
        &self,
        generator: &BundleGenerator,
    ) -> Result<(), RecipeError> {
        let toolchain_lib = generator.paths.toolchain_dir_path.join("usr/lib");
        let package_lib = self.target_swift_package.join("usr/lib");
        for subdir in TARGET_LIB_SUBDIRS {
            generator
                .rsync_tree(&package_lib.join(subdir), &toolchain_lib.join(subdir))
                .await?;
        }
        // Static CoreFoundation only exists in newer target packages.
        let core_foundation = package_lib.join("swift_static/CoreFoundation");
        if generator.fs().exists(&core_foundation).await {
            generator
                .rsync_tree(
                    &core_foundation,
                    &toolchain_lib.join("swift_static/CoreFoundation"),
                )
                .await?;
        }
        Ok(())
    }

    fn descriptor_entry(&self, sysroot_rel: &str, variant: WasmTargetVariant) -> SwiftSdkTripleProperties {
        SwiftSdkTripleProperties {
            sdk_root_path: sysroot_rel.to_string(),
            swift_resources_path: Some("swift.xctoolchain/usr/lib/swift".to_string()),
            swift_static_resources_path: Some(
                "swift.xctoolchain/usr/lib/swift_static".to_string(),
            ),
            include_search_paths: Some(vec![format!("{sysroot_rel}/include")]),
            library_search_paths: Some(vec![format!("{sysroot_rel}/lib")]),
            toolset_paths: Some(vec![variant.toolset_file_name().to_string()]),
        }
    }
}

#[async_trait]
impl SdkRecipe for WebAssemblyRecipe {
    fn name(&self) -> &'static str {
        "wasm"
    }

    async fn make_sdk(
        &self,
        generator: &BundleGenerator,
        _engine: &QueryEngine,
    ) -> Result<SdkProduct, RecipeError> {
        let fs = generator.fs().clone();
        let paths = &generator.paths;
        generator.prepare_bundle().await?;

        if let Some(package) = &self.host_swift_package {
            self.install_host_toolchain(generator, package).await?;
        }
        self.install_target_runtime(generator).await?;

        // swift-autolink-extract must exist for wasm object handling.
        if self.host_swift_package.is_some() {
            let autolink = paths.toolchain_bin_dir_path.join("swift-autolink-extract");
            if !fs.exists(&autolink).await {
                fs.create_symlink(&autolink, Utf8Path::new("swift")).await?;
            }
        }

        generator
            .rsync_tree(&self.wasi_sysroot, &paths.sysroot_path)
            .await?;

        let sysroot_rel = generator.descriptor_path(&paths.sysroot_path)?;
        let mut triples = BTreeMap::new();
        for variant in &self.variants {
            generator
                .write_json(
                    &paths.sdk_root_path.join(variant.toolset_file_name()),
                    &variant.toolset(),
                )
                .await?;
            triples.insert(
                variant.triple().canonical(),
                self.descriptor_entry(&sysroot_rel, *variant),
            );
        }

        let supported_host_triples = self
            .host_swift_package
            .as_ref()
            .map(|package| default_host_triples(&package.triple));
        generator
            .emit_metadata(
                &WasmTargetVariant::Plain.toolset(),
                triples,
                supported_host_triples.clone(),
            )
            .await?;

        Ok(SdkProduct {
            sdk_dir_path: paths.sdk_root_path.clone(),
            supported_host_triples,
        })
    }
}
