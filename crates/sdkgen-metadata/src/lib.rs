//! The four JSON documents emitted into an artifact bundle.
//!
//! All documents are written with two-space indentation, unescaped slashes,
//! and sorted keys, so re-running the generator produces byte-identical
//! files. Maps use `BTreeMap` and `serde_json`'s default map preserves
//! sorted order.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("path {path} is not under the SDK root {root}")]
    PathNotUnderRoot {
        path: Utf8PathBuf,
        root: Utf8PathBuf,
    },

    #[error("failed to serialize metadata: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Compute a path relative to the descriptor's directory.
///
/// All paths inside the documents are relative; a path outside the root is
/// a programming error in the recipe and fails the run.
pub fn relative_to_root(path: &Utf8Path, root: &Utf8Path) -> Result<String, MetadataError> {
    path.strip_prefix(root)
        .map(|relative| relative.as_str().to_string())
        .map_err(|_| MetadataError::PathNotUnderRoot {
            path: path.to_owned(),
            root: root.to_owned(),
        })
}

/// Serialize a document in the bundle's canonical form: sorted keys,
/// two-space indent, trailing newline.
pub fn to_json_bytes<T: Serialize>(document: &T) -> Result<Vec<u8>, MetadataError> {
    // Round-trip through Value so struct fields end up sorted like map keys.
    let value = serde_json::to_value(document)?;
    let mut bytes = serde_json::to_vec_pretty(&value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// One tool's entry in a toolset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "extraCLIOptions", skip_serializing_if = "Option::is_none")]
    pub extra_cli_options: Option<Vec<String>>,
}

impl ToolProperties {
    #[must_use]
    pub fn with_options<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: None,
            extra_cli_options: Some(options.into_iter().map(Into::into).collect()),
        }
    }

    #[must_use]
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            extra_cli_options: None,
        }
    }
}

/// `toolset.json`: compiler and linker flags for one SDK. Unset tools are
/// omitted from the document entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toolset {
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swift_compiler: Option<ToolProperties>,
    #[serde(rename = "cCompiler", skip_serializing_if = "Option::is_none")]
    pub c_compiler: Option<ToolProperties>,
    #[serde(rename = "cxxCompiler", skip_serializing_if = "Option::is_none")]
    pub cxx_compiler: Option<ToolProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linker: Option<ToolProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub librarian: Option<ToolProperties>,
}

impl Default for Toolset {
    fn default() -> Self {
        Self {
            schema_version: "1.0".to_string(),
            root_path: None,
            swift_compiler: None,
            c_compiler: None,
            cxx_compiler: None,
            linker: None,
            librarian: None,
        }
    }
}

/// Per-triple paths in the SDK descriptor. All relative to the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwiftSdkTripleProperties {
    pub sdk_root_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swift_resources_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swift_static_resources_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_search_paths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_search_paths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolset_paths: Option<Vec<String>>,
}

/// `swift-sdk.json`, schema v4.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwiftSdkMetadata {
    pub schema_version: String,
    pub target_triples: BTreeMap<String, SwiftSdkTripleProperties>,
}

impl SwiftSdkMetadata {
    #[must_use]
    pub fn new(target_triples: BTreeMap<String, SwiftSdkTripleProperties>) -> Self {
        Self {
            schema_version: "4.0".to_string(),
            target_triples,
        }
    }
}

/// One variant inside the bundle manifest. `supportedTriples` is omitted
/// entirely when the variant is universal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactVariant {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_triples: Option<Vec<String>>,
}

/// One artifact inside the bundle manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleArtifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub version: String,
    pub variants: Vec<ArtifactVariant>,
}

/// `info.json`: the artifact-bundle manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub schema_version: String,
    pub artifacts: BTreeMap<String, BundleArtifact>,
}

impl BundleManifest {
    /// A manifest with one Swift SDK artifact.
    #[must_use]
    pub fn swift_sdk(
        artifact_id: &str,
        version: &str,
        variant_path: &str,
        supported_triples: Option<Vec<String>>,
    ) -> Self {
        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            artifact_id.to_string(),
            BundleArtifact {
                artifact_type: "swiftSDK".to_string(),
                version: version.to_string(),
                variants: vec![ArtifactVariant {
                    path: variant_path.to_string(),
                    supported_triples,
                }],
            },
        );
        Self {
            schema_version: "1.0".to_string(),
            artifacts,
        }
    }
}

/// Legacy `SDKSettings.json`, emitted into the sysroot for Swift versions
/// that warn without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkSettings {
    #[serde(rename = "CanonicalName")]
    pub canonical_name: String,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "VersionMap")]
    pub version_map: BTreeMap<String, String>,
}
