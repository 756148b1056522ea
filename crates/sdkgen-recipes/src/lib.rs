//! SDK assembly recipes.
//!
//! A recipe is a value describing one SDK flavor; running it twice yields
//! the same bundle tree. Each recipe drives queries through the cache
//! engine, transforms the filesystem through the bundle generator, and ends
//! by emitting the bundle's JSON descriptors.

pub mod error;
pub mod freebsd;
pub mod generator;
pub mod linux;
pub mod packages;
pub mod rewrite;
pub mod wasm;

pub use error::RecipeError;
pub use freebsd::FreeBsdRecipe;
pub use generator::BundleGenerator;
pub use linux::{HostSwiftSource, LinuxRecipe, TargetSwiftSource};
pub use wasm::{HostSwiftPackage, WasmTargetVariant, WebAssemblyRecipe};

use async_trait::async_trait;
use camino::Utf8PathBuf;
use sdkgen_engine::QueryEngine;
use sdkgen_triple::Triple;

/// The final typed result of a recipe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkProduct {
    pub sdk_dir_path: Utf8PathBuf,
    /// Host triples the bundle supports, or `None` for a universal bundle.
    pub supported_host_triples: Option<Vec<String>>,
}

/// One SDK flavor's assembly pipeline.
#[async_trait]
pub trait SdkRecipe: Send + Sync {
    /// Short flavor name for logs.
    fn name(&self) -> &'static str;

    /// Assemble the SDK into the generator's bundle tree.
    ///
    /// Must be idempotent: a second run over an existing tree converges to
    /// the same bytes.
    async fn make_sdk(
        &self,
        generator: &BundleGenerator,
        engine: &QueryEngine,
    ) -> Result<SdkProduct, RecipeError>;
}

/// Host triples a bundle with a packaged toolchain supports.
#[must_use]
pub fn default_host_triples(host: &Triple) -> Vec<String> {
    if host.is_macos() {
        vec![
            "arm64-apple-macosx".to_string(),
            "x86_64-apple-macosx".to_string(),
        ]
    } else {
        vec![host.canonical()]
    }
}
