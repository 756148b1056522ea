//! Linux-glibc SDK assembly.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use futures::future::try_join_all;
use sdkgen_catalog::{
    LinuxDistribution, VersionsConfiguration, apply_llvm_source_fallback, debian_arch_name,
    fetch_package_urls, host_llvm_artifact, host_swift_artifact, target_swift_artifact,
};
use sdkgen_engine::QueryEngine;
use sdkgen_fs::FileSystem;
use sdkgen_http::HttpClient;
use sdkgen_metadata::{SdkSettings, SwiftSdkTripleProperties, ToolProperties, Toolset};
use sdkgen_queries::{CMakeBuildQuery, DownloadArtifactQuery, DownloadFileQuery, TarExtractQuery};
use sdkgen_runner::{CommandSpec, ProcessSpec, StdinSource, run_capturing_stdout,
    run_checking_success};
use sdkgen_triple::Triple;
use std::collections::BTreeMap;

use crate::error::RecipeError;
use crate::generator::BundleGenerator;
use crate::packages::required_packages;
use crate::rewrite::{fix_absolute_symlinks, rewrite_glibc_modulemap};
use crate::{SdkProduct, SdkRecipe, default_host_triples};

/// Where the target Swift distribution and sysroot come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSwiftSource {
    /// Download the platform tarball from swift.org.
    RemoteTarball,
    /// A Swift distribution already unpacked on disk.
    LocalPackage(Utf8PathBuf),
    /// Assemble the sysroot out of a container image.
    Docker { base_image: Option<String> },
}

/// Where the host toolchain comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSwiftSource {
    RemoteTarball,
    LocalPackage(Utf8PathBuf),
    /// The host already has a toolchain; ship the bundle without one.
    Preinstalled,
}

/// Swift runtime subdirectories copied out of the target distribution's
/// `usr/lib` into the sysroot.
const TARGET_SWIFT_LIB_SUBDIRS: [&str; 6] = [
    "swift/linux",
    "swift_static/linux",
    "swift_static/shims",
    "swift/dispatch",
    "swift/os",
    "swift/CoreFoundation",
];

/// Darwin platform directories a Linux SDK can never target.
const UNTARGETABLE_PLATFORMS: [&str; 6] = [
    "iphoneos",
    "iphonesimulator",
    "watchos",
    "watchsimulator",
    "appletvos",
    "appletvsimulator",
];

/// Host toolchain binaries with no role in cross-compilation.
const REDUNDANT_BINARIES: [&str; 4] = ["sourcekit-lsp", "docc", "dsymutil", "clangd"];

/// The Linux-glibc recipe.
pub struct LinuxRecipe {
    pub host_triple: Triple,
    pub target_triple: Triple,
    pub distribution: LinuxDistribution,
    pub versions: VersionsConfiguration,
    pub target_source: TargetSwiftSource,
    pub host_source: HostSwiftSource,
    pub include_host_toolchain: bool,
}

impl LinuxRecipe {
    /// Validate the configuration up front: architecture support and the
    /// Docker requirement for distributions without prebuilt Swift.
    pub fn new(
        host_triple: Triple,
        target_triple: Triple,
        distribution: LinuxDistribution,
        versions: VersionsConfiguration,
        target_source: TargetSwiftSource,
        host_source: HostSwiftSource,
        include_host_toolchain: bool,
    ) -> Result<Self, RecipeError> {
        distribution.check_target_support(&target_triple)?;
        if distribution.requires_docker()
            && !matches!(target_source, TargetSwiftSource::Docker { .. })
        {
            return Err(sdkgen_catalog::CatalogError::DistributionRequiresDocker(
                distribution.to_string(),
            )
            .into());
        }
        Ok(Self {
            host_triple,
            target_triple,
            distribution,
            versions,
            target_source,
            host_source,
            include_host_toolchain,
        })
    }

    fn needs_host_llvm(&self) -> bool {
        self.include_host_toolchain
            && !self.host_triple.is_linux()
            && self.versions.swift_version.major < 6
    }

    fn multiarch_dir(&self) -> String {
        format!("{}-linux-gnu", self.target_triple.arch_component())
    }

    /// Step 2: resolve and download everything in parallel through the
    /// engine, with the LLVM prebuilt-to-source fallback.
    async fn download_artifacts(
        &self,
        generator: &BundleGenerator,
        engine: &QueryEngine,
    ) -> Result<DownloadedArtifacts, RecipeError> {
        let paths = &generator.paths;

        let mut queries: Vec<DownloadArtifactQuery> = Vec::new();
        let host_swift = if self.include_host_toolchain {
            Some(match &self.host_source {
                HostSwiftSource::RemoteTarball => {
                    let artifact = host_swift_artifact(&self.host_triple, &self.versions, paths);
                    let local_path = artifact.local_path.clone();
                    queries.push(DownloadArtifactQuery { artifact });
                    ResolvedHostSource::Tarball(local_path)
                }
                HostSwiftSource::LocalPackage(package) => {
                    ResolvedHostSource::LocalPackage(package.clone())
                }
                HostSwiftSource::Preinstalled => ResolvedHostSource::Preinstalled,
            })
        } else {
            None
        };

        let host_llvm = if self.needs_host_llvm() {
            let mut artifact = host_llvm_artifact(&self.host_triple, &self.versions, paths);
            // Some hosts have no prebuilt clang+llvm asset; probe and fall
            // back to building lld from the source tarball.
            let prebuilt_available = engine
                .http()
                .head(&artifact.remote_url, &[])
                .await
                .unwrap_or(true);
            if !prebuilt_available {
                tracing::info!("no prebuilt LLVM for this host, falling back to sources");
                apply_llvm_source_fallback(&mut artifact, &self.versions);
            }
            queries.push(DownloadArtifactQuery {
                artifact: artifact.clone(),
            });
            Some(artifact)
        } else {
            None
        };

        let target_swift = match &self.target_source {
            TargetSwiftSource::RemoteTarball => {
                let artifact = target_swift_artifact(&self.target_triple, &self.versions, paths)?;
                let local_path = artifact.local_path.clone();
                queries.push(DownloadArtifactQuery { artifact });
                ResolvedTargetSource::Tarball(local_path)
            }
            TargetSwiftSource::LocalPackage(package) => {
                ResolvedTargetSource::LocalPackage(package.clone())
            }
            TargetSwiftSource::Docker { base_image } => ResolvedTargetSource::Docker {
                base_image: base_image.clone(),
            },
        };

        try_join_all(queries.iter().map(|query| engine.execute(query)))
            .await
            .map_err(RecipeError::Engine)?;

        Ok(DownloadedArtifacts {
            host_swift,
            host_llvm,
            target_swift,
        })
    }

    /// Step 3: populate the sysroot's Swift runtime directories.
    async fn acquire_target_sysroot(
        &self,
        generator: &BundleGenerator,
        engine: &QueryEngine,
        target: &ResolvedTargetSource,
    ) -> Result<(), RecipeError> {
        match target {
            ResolvedTargetSource::Tarball(archive) => {
                let extract = TarExtractQuery {
                    dest: generator.extraction_dir(archive),
                    archive: archive.clone(),
                    output_subpath: Utf8PathBuf::from("usr"),
                    strip_components: Some(1),
                };
                let package_usr = engine
                    .execute(&extract)
                    .await
                    .map_err(RecipeError::Engine)?
                    .into_path()?;
                self.copy_target_swift_subset(generator, &package_usr).await
            }
            ResolvedTargetSource::LocalPackage(package) => {
                self.copy_target_swift_subset(generator, &package.join("usr"))
                    .await
            }
            ResolvedTargetSource::Docker { base_image } => {
                self.docker_sysroot(generator, base_image.as_deref()).await
            }
        }
    }

    async fn copy_target_swift_subset(
        &self,
        generator: &BundleGenerator,
        package_usr: &Utf8Path,
    ) -> Result<(), RecipeError> {
        let sysroot_lib = generator.paths.sysroot_path.join("usr/lib");
        for subdir in TARGET_SWIFT_LIB_SUBDIRS {
            let src = package_usr.join("lib").join(subdir);
            if !generator.fs().exists(&src).await {
                tracing::debug!(dir = %src, "target package has no such directory, skipping");
                continue;
            }
            generator.copy_tree(&src, &sysroot_lib.join(subdir)).await?;
        }
        Ok(())
    }

    /// Step 3, Docker flavor: build an ephemeral image, create (never
    /// start) a container, copy the sysroot pieces out, and always remove
    /// the container.
    async fn docker_sysroot(
        &self,
        generator: &BundleGenerator,
        base_image: Option<&str>,
    ) -> Result<(), RecipeError> {
        let image = base_image.map_or_else(
            || {
                self.distribution
                    .default_docker_image(&self.versions.swift_version)
            },
            str::to_string,
        );
        let dockerfile = self.dockerfile(&image);

        let image_id = run_capturing_stdout(
            ProcessSpec::new(CommandSpec::new("docker").args(["build", "-q", "-"]))
                .stdin(StdinSource::Bytes(dockerfile.into_bytes())),
        )
        .await?;
        let image_id = String::from_utf8_lossy(&image_id).trim().to_string();

        let container_id = run_capturing_stdout(ProcessSpec::new(
            CommandSpec::new("docker").args(["create", &image_id]),
        ))
        .await?;
        let container_id = String::from_utf8_lossy(&container_id).trim().to_string();

        let result = self
            .copy_out_of_container(generator, &container_id)
            .await;
        // The container is removed on every path, success or failure.
        let removal = run_checking_success(ProcessSpec::new(
            CommandSpec::new("docker").args(["rm", "-f", &container_id]),
        ))
        .await;
        if let Err(e) = removal {
            tracing::warn!(container = %container_id, "failed to remove container: {e}");
        }
        result
    }

    fn dockerfile(&self, image: &str) -> String {
        let mut dockerfile = format!("FROM {image}\n");
        if matches!(self.distribution, LinuxDistribution::RhelUbi9) {
            // lib64 on RHEL is full of absolute symlinks and a libc.so
            // linker script that both break outside the image; repair them
            // in a writable layer before anything is copied out.
            dockerfile.push_str(concat!(
                "RUN set -e; chmod -R u+w /usr/lib64; cd /usr/lib64; \\\n",
                "    for l in $(find . -maxdepth 1 -type l); do \\\n",
                "      t=$(readlink \"$l\"); \\\n",
                "      case \"$t\" in /*) ln -sf \"$(basename \"$t\")\" \"$l\";; esac; \\\n",
                "    done; \\\n",
                "    rm -rf /usr/lib64/pm-utils; \\\n",
                "    rm -f /usr/lib64/libc.so; \\\n",
                "    ln -s libc.so.6 /usr/lib64/libc.so\n",
            ));
        }
        dockerfile
    }

    async fn copy_out_of_container(
        &self,
        generator: &BundleGenerator,
        container_id: &str,
    ) -> Result<(), RecipeError> {
        let sysroot = &generator.paths.sysroot_path;
        let fs = generator.fs();
        fs.create_dir_all(&sysroot.join("usr/lib")).await?;

        let docker_cp = |from: String, to: Utf8PathBuf| {
            run_checking_success(ProcessSpec::new(
                CommandSpec::new("docker")
                    .arg("cp")
                    .arg(from)
                    .arg(to.as_str()),
            ))
        };

        docker_cp(
            format!("{container_id}:/usr/include"),
            sysroot.join("usr"),
        )
        .await?;

        let mut lib_subdirs = vec!["swift", "swift_static"];
        if !matches!(self.distribution, LinuxDistribution::RhelUbi9) {
            lib_subdirs.push("gcc");
        }
        let multiarch = self.multiarch_dir();
        if !matches!(self.distribution, LinuxDistribution::RhelUbi9) {
            lib_subdirs.push(multiarch.as_str());
        }
        for subdir in lib_subdirs {
            let copy = docker_cp(
                format!("{container_id}:/usr/lib/{subdir}"),
                sysroot.join("usr/lib"),
            )
            .await;
            if let Err(e) = copy {
                // Not every image carries every directory.
                tracing::warn!(dir = subdir, "container copy skipped: {e}");
            }
        }

        if matches!(self.distribution, LinuxDistribution::RhelUbi9) {
            docker_cp(format!("{container_id}:/usr/lib64"), sysroot.join("usr"))
                .await?;
        }
        Ok(())
    }

    /// Step 4: unpack the host toolchain and trim what a cross-SDK cannot
    /// use.
    async fn install_host_toolchain(
        &self,
        generator: &BundleGenerator,
        engine: &QueryEngine,
        host: &ResolvedHostSource,
    ) -> Result<(), RecipeError> {
        let toolchain_usr = generator.paths.toolchain_dir_path.join("usr");
        match host {
            ResolvedHostSource::Tarball(archive) => {
                let strip = if archive.as_str().ends_with(".pkg") {
                    None
                } else {
                    Some(1)
                };
                let extract = TarExtractQuery {
                    dest: generator.extraction_dir(archive),
                    archive: archive.clone(),
                    output_subpath: Utf8PathBuf::from("usr"),
                    strip_components: strip,
                };
                let package_usr = engine
                    .execute(&extract)
                    .await
                    .map_err(RecipeError::Engine)?
                    .into_path()?;
                generator.copy_tree(&package_usr, &toolchain_usr).await?;
            }
            ResolvedHostSource::LocalPackage(package) => {
                generator
                    .copy_tree(&package.join("usr"), &toolchain_usr)
                    .await?;
            }
            ResolvedHostSource::Preinstalled => return Ok(()),
        }
        self.prune_host_toolchain(generator).await
    }

    async fn prune_host_toolchain(&self, generator: &BundleGenerator) -> Result<(), RecipeError> {
        let fs = generator.fs();
        let toolchain_usr = generator.paths.toolchain_dir_path.join("usr");
        for family in ["swift", "swift_static"] {
            for platform in UNTARGETABLE_PLATFORMS {
                let dir = toolchain_usr.join("lib").join(family).join(platform);
                if fs.exists(&dir).await {
                    fs.remove_recursively(&dir).await?;
                }
            }
        }

        let bin_dir = &generator.paths.toolchain_bin_dir_path;
        if !fs.exists(bin_dir).await {
            return Ok(());
        }
        for entry in fs.read_dir(bin_dir).await? {
            let name = entry.file_name().unwrap_or_default();
            if REDUNDANT_BINARIES.contains(&name) || name.starts_with("swift-package") {
                fs.remove_recursively(&entry).await?;
            }
        }
        Ok(())
    }

    /// Step 5: provide `ld.lld`, from the prebuilt archive or by building
    /// it from sources.
    async fn install_lld(
        &self,
        generator: &BundleGenerator,
        engine: &QueryEngine,
        downloaded: &DownloadedArtifacts,
    ) -> Result<(), RecipeError> {
        let Some(llvm) = &downloaded.host_llvm else {
            return Ok(());
        };
        let lld_binary = if llvm.is_prebuilt {
            let extract = TarExtractQuery {
                dest: generator.extraction_dir(&llvm.local_path),
                archive: llvm.local_path.clone(),
                output_subpath: Utf8PathBuf::from("bin/lld"),
                strip_components: Some(1),
            };
            engine
                .execute(&extract)
                .await
                .map_err(RecipeError::Engine)?
                .into_path()?
        } else {
            let sources_dest = generator.extraction_dir(&llvm.local_path);
            let extract = TarExtractQuery {
                dest: sources_dest.clone(),
                archive: llvm.local_path.clone(),
                output_subpath: Utf8PathBuf::from("llvm"),
                strip_components: Some(1),
            };
            let llvm_dir = engine
                .execute(&extract)
                .await
                .map_err(RecipeError::Engine)?
                .into_path()?;
            let build = CMakeBuildQuery {
                sources_dir: llvm_dir,
                output_binary_subpath: Utf8PathBuf::from("bin/lld"),
                options: vec![
                    "-DLLVM_ENABLE_PROJECTS=lld".to_string(),
                    "-DCMAKE_BUILD_TYPE=Release".to_string(),
                    "-DLLVM_TARGETS_TO_BUILD=X86;AArch64".to_string(),
                ],
            };
            engine
                .execute(&build)
                .await
                .map_err(RecipeError::Engine)?
                .into_path()?
        };

        let fs = generator.fs();
        fs.create_dir_all(&generator.paths.toolchain_bin_dir_path)
            .await?;
        fs.copy(
            &lld_binary,
            &generator.paths.toolchain_bin_dir_path.join("ld.lld"),
        )
        .await?;
        Ok(())
    }

    /// Step 6: distribution headers and libraries for non-Docker builds.
    async fn install_distribution_packages(
        &self,
        generator: &BundleGenerator,
        engine: &QueryEngine,
    ) -> Result<(), RecipeError> {
        let required = required_packages(&self.distribution);
        if required.is_empty() {
            return Ok(());
        }
        let arch = self
            .target_triple
            .arch
            .ok_or_else(|| {
                sdkgen_catalog::CatalogError::UnknownArchitecture(
                    self.target_triple.original().to_string(),
                )
            })?;
        let mirror = self.distribution.package_mirror(arch);
        let urls = fetch_package_urls(
            engine.http().as_ref(),
            mirror,
            self.distribution.release(),
            "",
            "main",
            debian_arch_name(arch)?,
            required,
        )
        .await?;

        let package_dir = generator.paths.cache_path.join("packages");
        let queries: Vec<DownloadFileQuery> = urls
            .into_iter()
            .map(|(_, url)| DownloadFileQuery {
                url,
                local_dir: package_dir.clone(),
            })
            .collect();
        let downloaded = try_join_all(queries.iter().map(|query| engine.execute(query)))
            .await
            .map_err(RecipeError::Engine)?;

        for output in downloaded {
            let deb = output.into_path()?;
            sdkgen_archive::extract(&deb, &generator.paths.sysroot_path, None).await?;
        }
        Ok(())
    }

    /// Step 8: rewrite absolute header paths in whichever glibc module maps
    /// the sysroot ended up with.
    async fn patch_modulemaps(&self, generator: &BundleGenerator) -> Result<(), RecipeError> {
        let fs = generator.fs();
        let sysroot = &generator.paths.sysroot_path;
        let arch = self.target_triple.arch_component();
        for family in ["swift", "swift_static"] {
            for candidate in [
                sysroot.join(format!("usr/lib/{family}/linux/glibc.modulemap")),
                sysroot.join(format!("usr/lib/{family}/linux/{arch}/glibc.modulemap")),
            ] {
                if fs.exists(&candidate).await {
                    rewrite_glibc_modulemap(fs, &candidate).await?;
                }
            }
        }
        Ok(())
    }

    fn toolset(&self) -> Toolset {
        let mut toolset = Toolset {
            swift_compiler: Some(ToolProperties::with_options(["-use-ld=lld"])),
            ..Toolset::default()
        };
        if self.include_host_toolchain {
            toolset.root_path = Some("swift.xctoolchain/usr/bin".to_string());
            toolset.linker = Some(ToolProperties::with_path("ld.lld"));
        }
        toolset
    }

    fn sdk_descriptor_entry(
        &self,
        generator: &BundleGenerator,
    ) -> Result<SwiftSdkTripleProperties, RecipeError> {
        let sysroot_rel = generator.descriptor_path(&generator.paths.sysroot_path)?;
        let mut properties = SwiftSdkTripleProperties {
            sdk_root_path: sysroot_rel.clone(),
            include_search_paths: Some(vec![format!("{sysroot_rel}/usr/include")]),
            library_search_paths: Some(vec![format!("{sysroot_rel}/usr/lib")]),
            toolset_paths: Some(vec!["toolset.json".to_string()]),
            ..SwiftSdkTripleProperties::default()
        };
        if self.include_host_toolchain {
            properties.swift_resources_path =
                Some("swift.xctoolchain/usr/lib/swift".to_string());
            properties.swift_static_resources_path =
                Some("swift.xctoolchain/usr/lib/swift_static".to_string());
        }
        Ok(properties)
    }
}

/// Target source after step 2: the tarball variant carries the archive it
/// downloaded, so later steps cannot observe a missing path.
enum ResolvedTargetSource {
    Tarball(Utf8PathBuf),
    LocalPackage(Utf8PathBuf),
    Docker { base_image: Option<String> },
}

/// Host toolchain source after step 2, same shape as the target.
enum ResolvedHostSource {
    Tarball(Utf8PathBuf),
    LocalPackage(Utf8PathBuf),
    Preinstalled,
}

/// Everything step 2 resolved. `host_swift` is `None` exactly when the
/// bundle ships without a host toolchain.
struct DownloadedArtifacts {
    host_swift: Option<ResolvedHostSource>,
    host_llvm: Option<sdkgen_catalog::DownloadableArtifact>,
    target_swift: ResolvedTargetSource,
}

#[async_trait]
impl SdkRecipe for LinuxRecipe {
    fn name(&self) -> &'static str {
        "linux"
    }

    async fn make_sdk(
        &self,
        generator: &BundleGenerator,
        engine: &QueryEngine,
    ) -> Result<SdkProduct, RecipeError> {
        let fs = generator.fs().clone();
        let paths = &generator.paths;

        // 1. Fresh (or incrementally reused) bundle skeleton.
        generator.prepare_bundle().await?;

        // 2. Downloads, fanned out through the cache engine.
        let downloaded = self.download_artifacts(generator, engine).await?;

        // 3. Target sysroot.
        self.acquire_target_sysroot(generator, engine, &downloaded.target_swift)
            .await?;

        // 4. Host toolchain.
        if let Some(host) = &downloaded.host_swift {
            self.install_host_toolchain(generator, engine, host).await?;
        }

        // 5. Cross linker.
        self.install_lld(generator, engine, &downloaded).await?;

        // 6. Distribution packages.
        if !matches!(downloaded.target_swift, ResolvedTargetSource::Docker { .. }) {
            self.install_distribution_packages(generator, engine)
                .await?;
        }

        // 7. Absolute symlinks become sysroot-relative.
        fix_absolute_symlinks(&fs, &paths.sysroot_path).await?;

        // 8. glibc module maps stop referencing host headers.
        self.patch_modulemaps(generator).await?;

        // 9. `lib -> usr/lib` at the sysroot root.
        let lib_link = paths.sysroot_path.join("lib");
        if !fs.exists(&lib_link).await {
            fs.create_symlink(&lib_link, Utf8Path::new("usr/lib"))
                .await?;
        }

        // 10. `swift-autolink-extract` must exist next to `swift`.
        if self.include_host_toolchain {
            let autolink = paths.toolchain_bin_dir_path.join("swift-autolink-extract");
            if !fs.exists(&autolink).await {
                fs.create_symlink(&autolink, Utf8Path::new("swift")).await?;
            }
        }

        // 11. Legacy SDK settings for Swift versions that warn without it.
        if self.versions.swift_version.needs_legacy_sdk_settings() {
            let settings = SdkSettings {
                canonical_name: paths.artifact_id.clone(),
                display_name: format!("Swift SDK for {}", self.distribution),
                version: generator.bundle_version.clone(),
                version_map: BTreeMap::new(),
            };
            generator
                .write_json(&paths.sysroot_path.join("SDKSettings.json"), &settings)
                .await?;
        }

        // 12. Machine-readable descriptors.
        let mut triples = BTreeMap::new();
        triples.insert(
            self.target_triple.canonical(),
            self.sdk_descriptor_entry(generator)?,
        );
        let supported_host_triples = self
            .include_host_toolchain
            .then(|| default_host_triples(&self.host_triple));
        generator
            .emit_metadata(&self.toolset(), triples, supported_host_triples.clone())
            .await?;

        Ok(SdkProduct {
            sdk_dir_path: paths.sdk_root_path.clone(),
            supported_host_triples,
        })
    }
}
