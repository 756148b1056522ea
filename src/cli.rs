//! Command-line surface of the generator.
//!
//! All policy lives in flags; the only load-bearing environment variable is
//! `SDKGEN_OFFLINE`, which swaps in the offline HTTP client to prove a run
//! needs no network.

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{ArgAction, Args, Parser, Subcommand};
use sdkgen_catalog::{LinuxDistribution, PathsConfiguration, SwiftVersion, VersionsConfiguration};
use sdkgen_engine::QueryEngine;
use sdkgen_fs::OsFileSystem;
use sdkgen_http::{HttpClient, OfflineHttpClient, ReqwestHttpClient};
use sdkgen_recipes::{
    BundleGenerator, FreeBsdRecipe, HostSwiftPackage, HostSwiftSource, LinuxRecipe, SdkRecipe,
    TargetSwiftSource, WasmTargetVariant, WebAssemblyRecipe,
};
use sdkgen_triple::{Arch, Triple};
use sdkgen_utils::ExitCode;
use std::sync::Arc;

/// Environment variable forcing the offline HTTP client.
pub const OFFLINE_ENV_VAR: &str = "SDKGEN_OFFLINE";

#[derive(Debug, Parser)]
#[command(
    name = "sdkgen",
    about = "Assembles cross-compilation Swift SDK artifact bundles",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub shared: SharedArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Args)]
pub struct SharedArgs {
    /// Version recorded in the bundle manifest.
    #[arg(long, default_value = "0.0.1")]
    pub bundle_version: String,

    /// Override the artifact bundle name.
    #[arg(long)]
    pub sdk_name: Option<String>,

    /// Reuse the existing bundle tree instead of rebuilding from scratch.
    #[arg(long)]
    pub incremental: bool,

    /// Enable debug logging.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Host triple the toolchain runs on; detected when omitted.
    #[arg(long)]
    pub host: Option<String>,

    /// Target triple to cross-compile for.
    #[arg(long)]
    pub target: Option<String>,

    /// Target architecture, combined with the flavor's default OS triple.
    #[arg(long)]
    pub target_arch: Option<String>,

    /// Deprecated alias for selecting the host architecture.
    #[arg(long, hide = true)]
    pub host_arch: Option<String>,

    /// Swift version tag, e.g. `6.0.3-RELEASE`.
    #[arg(long, default_value = "6.0.3-RELEASE")]
    pub swift_version: String,

    /// Override the derived swift.org branch directory.
    #[arg(long)]
    pub swift_branch: Option<String>,

    /// Use an already-unpacked host Swift package.
    #[arg(long)]
    pub host_swift_package_path: Option<Utf8PathBuf>,

    /// Use an already-unpacked target Swift package.
    #[arg(long)]
    pub target_swift_package_path: Option<Utf8PathBuf>,

    /// Ship the host toolchain inside the bundle (default).
    #[arg(long, overrides_with = "no_host_toolchain", action = ArgAction::SetTrue)]
    pub host_toolchain: bool,

    /// Produce a universal bundle without a host toolchain.
    #[arg(long, overrides_with = "host_toolchain", action = ArgAction::SetTrue)]
    pub no_host_toolchain: bool,
}

impl SharedArgs {
    fn include_host_toolchain(&self) -> bool {
        !self.no_host_toolchain
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Assemble a Linux-glibc SDK (the default).
    MakeLinuxSdk(LinuxArgs),
    /// Assemble a WebAssembly/WASI SDK from local packages.
    MakeWasmSdk(WasmArgs),
    /// Assemble a FreeBSD SDK from a release base system.
    MakeFreebsdSdk(FreeBsdArgs),
}

#[derive(Debug, Args)]
pub struct LinuxArgs {
    /// Assemble the sysroot out of a container image.
    #[arg(long)]
    pub with_docker: bool,

    /// Base image overriding the distribution default.
    #[arg(long)]
    pub from_container_image: Option<String>,

    /// LLVM release providing `lld` for pre-6.0 toolchains.
    #[arg(long, default_value = "17.0.6")]
    pub lld_version: String,

    /// Linux distribution family.
    #[arg(long, default_value = "ubuntu")]
    pub distribution_name: String,

    /// Distribution release, by version or codename.
    #[arg(long, default_value = "22.04")]
    pub distribution_version: String,
}

impl Default for LinuxArgs {
    /// Mirrors the clap defaults, for the bare `sdkgen` invocation that
    /// falls through to `make-linux-sdk`.
    fn default() -> Self {
        Self {
            with_docker: false,
            from_container_image: None,
            lld_version: "17.0.6".to_string(),
            distribution_name: "ubuntu".to_string(),
            distribution_version: "22.04".to_string(),
        }
    }
}

#[derive(Debug, Args)]
pub struct WasmArgs {
    /// WASI sysroot to bundle.
    #[arg(long)]
    pub wasi_sysroot_path: Utf8PathBuf,

    /// Skip the threads variant.
    #[arg(long)]
    pub no_threads_variant: bool,

    /// Skip the Embedded Swift variant.
    #[arg(long)]
    pub no_embedded_variant: bool,
}

#[derive(Debug, Args)]
pub struct FreeBsdArgs {
    /// FreeBSD release, e.g. `14.3`; derived from `--target` when omitted.
    #[arg(long)]
    pub freebsd_version: Option<String>,

    /// FreeBSD Swift toolchain overlaying the sysroot.
    #[arg(long)]
    pub toolchain_overlay_path: Option<Utf8PathBuf>,
}

/// Entry point: parse, set up logging and the runtime, map failures to exit
/// codes.
pub fn main() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    if let Err(e) = sdkgen_utils::init_tracing(cli.shared.verbose) {
        eprintln!("error: failed to initialize logging: {e}");
        return Err(ExitCode::FAILURE);
    }

    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        eprintln!("error: failed to start async runtime: {e}");
        ExitCode::FAILURE
    })?;
    runtime.block_on(run(cli)).map_err(|e| {
        eprintln!("error: {e:#}");
        ExitCode::FAILURE
    })
}

async fn run(cli: Cli) -> Result<()> {
    let command = cli
        .command
        .unwrap_or(Command::MakeLinuxSdk(LinuxArgs::default()));
    match command {
        Command::MakeLinuxSdk(args) => make_linux_sdk(&cli.shared, &args).await,
        Command::MakeWasmSdk(args) => make_wasm_sdk(&cli.shared, &args).await,
        Command::MakeFreebsdSdk(args) => make_freebsd_sdk(&cli.shared, &args).await,
    }
}

/// The triple of the machine this process runs on.
fn detected_host_triple() -> Triple {
    let spelled = if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            "arm64-apple-macosx"
        } else {
            "x86_64-apple-macosx"
        }
    } else if cfg!(target_arch = "aarch64") {
        "aarch64-unknown-linux-gnu"
    } else {
        "x86_64-unknown-linux-gnu"
    };
    Triple::parse(spelled, true)
}

fn host_triple(shared: &SharedArgs) -> Triple {
    match (&shared.host, &shared.host_arch) {
        (Some(host), _) => Triple::parse(host, true),
        (None, Some(arch)) => {
            tracing::warn!("--host-arch is deprecated, use --host with a full triple");
            if cfg!(target_os = "macos") {
                Triple::parse(&format!("{arch}-apple-macosx"), true)
            } else {
                Triple::parse(&format!("{arch}-unknown-linux-gnu"), true)
            }
        }
        (None, None) => detected_host_triple(),
    }
}

fn validated_arch(spelled: &str) -> Result<Arch> {
    match Arch::parse(spelled) {
        Some((arch, _)) => Ok(arch),
        None => bail!(sdkgen_catalog::CatalogError::UnknownArchitecture(
            spelled.to_string()
        )),
    }
}

fn linux_target_triple(shared: &SharedArgs) -> Result<Triple> {
    if let Some(target) = &shared.target {
        return Ok(Triple::parse(target, true));
    }
    let arch = shared.target_arch.as_deref().unwrap_or("x86_64");
    validated_arch(arch)?;
    Ok(Triple::parse(&format!("{arch}-unknown-linux-gnu"), true))
}

fn source_root() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| anyhow::anyhow!("working directory is not UTF-8: {}", p.display()))
}

fn http_client() -> Result<Arc<dyn HttpClient>> {
    if std::env::var_os(OFFLINE_ENV_VAR).is_some_and(|v| v != "0") {
        tracing::info!("offline mode: all network access disabled");
        Ok(Arc::new(OfflineHttpClient))
    } else {
        Ok(Arc::new(ReqwestHttpClient::new(false)?))
    }
}

async fn run_recipe(
    recipe: &dyn SdkRecipe,
    shared: &SharedArgs,
    paths: PathsConfiguration,
) -> Result<()> {
    let fs = Arc::new(OsFileSystem::default());
    let engine = QueryEngine::new(fs.clone(), http_client()?, &paths.cache_path)?;
    let generator = BundleGenerator::new(
        paths,
        shared.bundle_version.clone(),
        shared.incremental,
        fs,
    );

    tracing::info!(
        recipe = recipe.name(),
        bundle = %generator.paths.artifact_bundle_path,
        "assembling SDK bundle"
    );
    // SIGINT cancels the assembly; dropping the in-flight future tears down
    // any running subprocesses. The cache never records interrupted steps,
    // so the next run retries them.
    let assembly = recipe.make_sdk(&generator, &engine);
    let product = tokio::select! {
        result = assembly => result?,
        _ = tokio::signal::ctrl_c() => {
            anyhow::bail!("interrupted");
        }
    };
    tracing::info!(sdk = %product.sdk_dir_path, "bundle assembled");
    tracing::debug!(
        hits = engine.hit_count(),
        misses = engine.miss_count(),
        "cache statistics"
    );
    println!("{}", generator.paths.artifact_bundle_path);
    Ok(())
}

async fn make_linux_sdk(shared: &SharedArgs, args: &LinuxArgs) -> Result<()> {
    let distribution =
        LinuxDistribution::parse(&args.distribution_name, &args.distribution_version)?;
    let swift_version = SwiftVersion::parse(&shared.swift_version)?;
    let host = host_triple(shared);
    let target = linux_target_triple(shared)?;
    let target_is_aarch64 = target.arch.is_some_and(Arch::is_aarch64);

    let versions = VersionsConfiguration::new(
        swift_version,
        shared.swift_branch.clone(),
        args.lld_version.clone(),
        Some(distribution),
        target_is_aarch64,
    );

    let artifact_id = shared.sdk_name.clone().unwrap_or_else(|| {
        format!(
            "{}_{}_{}_{}",
            versions.swift_version,
            distribution.name(),
            distribution.release(),
            target.arch_component(),
        )
    });
    let paths = PathsConfiguration::new(
        &source_root()?,
        &artifact_id,
        &target.canonical(),
        &distribution.sdk_dir_name(),
    );

    let target_source = if args.with_docker || distribution.requires_docker() {
        TargetSwiftSource::Docker {
            base_image: args.from_container_image.clone(),
        }
    } else if let Some(package) = &shared.target_swift_package_path {
        TargetSwiftSource::LocalPackage(package.clone())
    } else {
        TargetSwiftSource::RemoteTarball
    };
    let host_source = match &shared.host_swift_package_path {
        Some(package) => HostSwiftSource::LocalPackage(package.clone()),
        None => HostSwiftSource::RemoteTarball,
    };

    let recipe = LinuxRecipe::new(
        host,
        target,
        distribution,
        versions,
        target_source,
        host_source,
        shared.include_host_toolchain(),
    )?;
    run_recipe(&recipe, shared, paths).await
}

async fn make_wasm_sdk(shared: &SharedArgs, args: &WasmArgs) -> Result<()> {
    let swift_version = SwiftVersion::parse(&shared.swift_version)?;
    let target_package = shared
        .target_swift_package_path
        .clone()
        .context("--target-swift-package-path is required for WebAssembly SDKs")?;

    let host_swift_package = shared
        .host_swift_package_path
        .clone()
        .map(|path| HostSwiftPackage {
            path,
            triple: host_triple(shared),
        });

    let mut variants = vec![WasmTargetVariant::Plain];
    if !args.no_threads_variant {
        variants.push(WasmTargetVariant::Threads);
    }
    if !args.no_embedded_variant {
        variants.push(WasmTargetVariant::Embedded);
    }

    let artifact_id = shared
        .sdk_name
        .clone()
        .unwrap_or_else(|| format!("{swift_version}_wasm"));
    let paths = PathsConfiguration::new(
        &source_root()?,
        &artifact_id,
        "wasm32-unknown-wasi",
        "WASI.sdk",
    );

    let recipe = WebAssemblyRecipe {
        host_swift_package,
        target_swift_package: target_package,
        wasi_sysroot: args.wasi_sysroot_path.clone(),
        swift_version,
        variants,
    };
    run_recipe(&recipe, shared, paths).await
}

async fn make_freebsd_sdk(shared: &SharedArgs, args: &FreeBsdArgs) -> Result<()> {
    let target = match &shared.target {
        Some(target) => Triple::parse(target, true),
        None => {
            let arch = shared.target_arch.as_deref().unwrap_or("x86_64");
            validated_arch(arch)?;
            let release = args.freebsd_version.as_deref().unwrap_or("14.3");
            Triple::parse(&format!("{arch}-unknown-freebsd{release}"), true)
        }
    };
    let release = match &args.freebsd_version {
        Some(release) => release.clone(),
        None => {
            let version = target
                .os_version()
                .context("cannot determine the FreeBSD release; pass --freebsd-version")?;
            format!("{}.{}", version.major, version.minor)
        }
    };

    let artifact_id = shared
        .sdk_name
        .clone()
        .unwrap_or_else(|| format!("freebsd_{}_{}", release, target.arch_component()));
    let paths = PathsConfiguration::new(
        &source_root()?,
        &artifact_id,
        &target.canonical(),
        &format!("freebsd-{release}.sdk"),
    );

    let recipe = FreeBsdRecipe::new(target, release, args.toolchain_overlay_path.clone())?;
    run_recipe(&recipe, shared, paths).await
}
