//! Swift version strings and the version configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::distribution::LinuxDistribution;
use crate::error::CatalogError;

/// Kind of Swift distribution a version string names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwiftVersionKind {
    Release,
    Snapshot,
}

/// A parsed `--swift-version` value.
///
/// Accepted forms are `X.Y[.Z]-RELEASE` and snapshot tags containing
/// `DEVELOPMENT-SNAPSHOT`. The raw tag is kept verbatim because it appears
/// in download URLs and bundle names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwiftVersion {
    raw: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub kind: SwiftVersionKind,
}

impl SwiftVersion {
    pub fn parse(input: &str) -> Result<Self, CatalogError> {
        let invalid = |reason: &str| CatalogError::InvalidVersionString {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("empty version"));
        }

        if input.contains("DEVELOPMENT-SNAPSHOT") {
            // `swift-DEVELOPMENT-SNAPSHOT-…` (main) or `X.Y-DEVELOPMENT-SNAPSHOT-…`.
            let (major, minor) = match input.split('-').next() {
                Some(lead) if lead.starts_with(|c: char| c.is_ascii_digit()) => {
                    let mut nums = lead.splitn(2, '.');
                    let major = nums
                        .next()
                        .and_then(|n| n.parse().ok())
                        .ok_or_else(|| invalid("malformed snapshot branch version"))?;
                    let minor = nums
                        .next()
                        .and_then(|n| n.parse().ok())
                        .ok_or_else(|| invalid("malformed snapshot branch version"))?;
                    (major, minor)
                }
                // Main-branch snapshots have no numeric component; treat
                // them as newer than any release.
                _ => (u32::MAX, 0),
            };
            return Ok(Self {
                raw: input.to_string(),
                major,
                minor,
                patch: 0,
                kind: SwiftVersionKind::Snapshot,
            });
        }

        let numeric = input.strip_suffix("-RELEASE").unwrap_or(input);
        if numeric.contains('-') {
            return Err(invalid("expected X.Y[.Z]-RELEASE or a snapshot tag"));
        }
        let mut parts = numeric.splitn(3, '.');
        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| invalid("missing major version"))?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| invalid("missing minor version"))?;
        let patch = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid("malformed patch version"))?,
            None => 0,
        };

        Ok(Self {
            raw: input.to_string(),
            major,
            minor,
            patch,
            kind: SwiftVersionKind::Release,
        })
    }

    /// The tag exactly as given (`6.0.3-RELEASE`).
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The release tag used in swift.org URLs (`swift-6.0.3-RELEASE`).
    #[must_use]
    pub fn tag(&self) -> String {
        match self.kind {
            SwiftVersionKind::Release => format!("swift-{}", self.raw),
            SwiftVersionKind::Snapshot if self.raw.starts_with("swift-") => self.raw.clone(),
            SwiftVersionKind::Snapshot => format!("swift-{}", self.raw),
        }
    }

    /// The branch directory used in swift.org URLs
    /// (`swift-6.0-release`, `development`).
    #[must_use]
    pub fn branch(&self) -> String {
        match self.kind {
            SwiftVersionKind::Release => {
                format!("swift-{}.{}{}-release", self.major, self.minor, match self.patch {
                    0 => String::new(),
                    patch => format!(".{patch}"),
                })
            }
            SwiftVersionKind::Snapshot if self.major == u32::MAX => "development".to_string(),
            SwiftVersionKind::Snapshot => {
                format!("swift-{}.{}-branch", self.major, self.minor)
            }
        }
    }

    /// True when this version sorts before `major.minor`.
    #[must_use]
    pub fn is_older_than(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) < (major, minor)
    }

    /// Versions that still need the legacy `SDKSettings.json` shim:
    /// everything before 5.10, plus the 6.0 series.
    #[must_use]
    pub fn needs_legacy_sdk_settings(&self) -> bool {
        self.is_older_than(5, 10) || (self.major == 6 && self.minor == 0)
    }
}

impl fmt::Display for SwiftVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Versions driving URL derivation. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionsConfiguration {
    pub swift_version: SwiftVersion,
    pub swift_branch: String,
    pub lld_version: String,
    pub linux_distribution: Option<LinuxDistribution>,
    /// `-aarch64` on 64-bit ARM targets, empty otherwise; spliced into
    /// swift.org artifact names.
    pub linux_arch_suffix: String,
}

impl VersionsConfiguration {
    pub fn new(
        swift_version: SwiftVersion,
        swift_branch: Option<String>,
        lld_version: String,
        linux_distribution: Option<LinuxDistribution>,
        target_is_aarch64: bool,
    ) -> Self {
        let swift_branch = swift_branch.unwrap_or_else(|| swift_version.branch());
        Self {
            swift_version,
            swift_branch,
            lld_version,
            linux_distribution,
            linux_arch_suffix: if target_is_aarch64 {
                "-aarch64".to_string()
            } else {
                String::new()
            },
        }
    }
}
