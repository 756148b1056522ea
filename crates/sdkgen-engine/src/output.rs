//! Query results.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// What a query produces: a filesystem path to an artifact, or a small
/// inline value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutput {
    Path(Utf8PathBuf),
    Value(String),
}

impl QueryOutput {
    /// The artifact path, if this output is one.
    #[must_use]
    pub fn as_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Value(_) => None,
        }
    }

    /// Unwrap a path output; queries that produce paths use this on their
    /// sub-query results.
    pub fn into_path(self) -> anyhow::Result<Utf8PathBuf> {
        match self {
            Self::Path(path) => Ok(path),
            Self::Value(value) => anyhow::bail!("expected a path output, got value `{value}`"),
        }
    }
}
