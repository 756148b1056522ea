//! Input validation and acquisition errors for the catalog layer.

use sdkgen_http::HttpError;
use sdkgen_runner::RunnerError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown distribution: {name}{}", .version.as_ref().map(|v| format!(" {v}")).unwrap_or_default())]
    UnknownDistribution {
        name: String,
        version: Option<String>,
    },

    #[error("unknown architecture: {0}")]
    UnknownArchitecture(String),

    #[error("invalid version string `{input}`: {reason}")]
    InvalidVersionString { input: String, reason: String },

    #[error("{distribution} has no Swift distribution for architecture {architecture}")]
    DistributionDoesNotSupportArchitecture {
        distribution: String,
        architecture: String,
    },

    #[error("{0} has no prebuilt Swift distribution; rerun with Docker mode")]
    DistributionRequiresDocker(String),

    #[error("failed to decompress the package list")]
    PackageListDecompressionFailure,

    #[error("package list resolved {actual} of {expected} required packages")]
    PackageListParsingFailure { expected: usize, actual: usize },

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}
