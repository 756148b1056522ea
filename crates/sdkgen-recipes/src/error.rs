//! Umbrella error for recipe execution.
//!
//! Subsystem errors surface to the recipe driver unchanged; nothing is
//! wrapped in strings on the way up.

use camino::Utf8PathBuf;
use sdkgen_archive::ArchiveError;
use sdkgen_catalog::CatalogError;
use sdkgen_fs::FsError;
use sdkgen_http::HttpError;
use sdkgen_metadata::MetadataError;
use sdkgen_runner::RunnerError;

#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("failed to fix up symlink {link} -> {target}")]
    SymlinkFixupFailed {
        link: Utf8PathBuf,
        target: Utf8PathBuf,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Failures from queries executed through the cache engine.
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}
