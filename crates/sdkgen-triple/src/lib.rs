//! Target triple parsing and normalization.
//!
//! A triple names a compilation target as `arch-vendor-os[-environment]`.
//! Parsing is total: components that match nothing simply stay unset, so an
//! unrecognized triple is still a usable value. Normalized parsing accepts
//! components in permuted order (`x86_64-linux-gnu`) and writes unmatched
//! positions as `unknown` in the canonical form.

pub mod arch;
pub mod os;

pub use arch::Arch;
pub use os::{Environment, EnvironmentKind, ObjectFormat, Os, OsKind, OsVersion};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Vendor component of a triple. Closed set; anything else parses to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    Amd,
    Apple,
    Espressif,
    Ibm,
    Mesa,
    Nvidia,
    OpenEmbedded,
    Pc,
    Suse,
}

impl Vendor {
    /// Canonical spelling used when the triple is formatted.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amd => "amd",
            Self::Apple => "apple",
            Self::Espressif => "espressif",
            Self::Ibm => "ibm",
            Self::Mesa => "mesa",
            Self::Nvidia => "nvidia",
            Self::OpenEmbedded => "oe",
            Self::Pc => "pc",
            Self::Suse => "suse",
        }
    }

    /// Match a triple component against the vendor set.
    #[must_use]
    pub fn parse(component: &str) -> Option<Self> {
        match component {
            "amd" => Some(Self::Amd),
            "apple" => Some(Self::Apple),
            "espressif" => Some(Self::Espressif),
            "ibm" => Some(Self::Ibm),
            "mesa" => Some(Self::Mesa),
            "nvidia" => Some(Self::Nvidia),
            "oe" | "openembedded" => Some(Self::OpenEmbedded),
            "pc" => Some(Self::Pc),
            "suse" => Some(Self::Suse),
            _ => None,
        }
    }
}

/// A parsed target triple.
///
/// Immutable value type. Unknown components are `None`; the original input
/// string is retained verbatim but does not take part in equality, so a
/// permuted spelling compares equal to its canonical form.
#[derive(Debug, Clone)]
pub struct Triple {
    original: String,
    pub arch: Option<Arch>,
    pub sub_arch: Option<String>,
    pub vendor: Option<Vendor>,
    pub os: Option<Os>,
    pub environment: Option<Environment>,
    pub object_format: Option<ObjectFormat>,
}

/// Roles a component can fill, tried in rematch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Arch,
    Vendor,
    Os,
    Environment,
    ObjectFormat,
}

/// Preferred role order for each component position. The positional role
/// comes first; the rest allow permuted inputs to settle into place.
fn role_order(position: usize) -> [Role; 5] {
    match position {
        0 => [
            Role::Arch,
            Role::Vendor,
            Role::Os,
            Role::Environment,
            Role::ObjectFormat,
        ],
        1 => [
            Role::Vendor,
            Role::Os,
            Role::Environment,
            Role::ObjectFormat,
            Role::Arch,
        ],
        2 => [
            Role::Os,
            Role::Environment,
            Role::ObjectFormat,
            Role::Vendor,
            Role::Arch,
        ],
        _ => [
            Role::Environment,
            Role::ObjectFormat,
            Role::Os,
            Role::Vendor,
            Role::Arch,
        ],
    }
}

impl Triple {
    /// Parse a triple string.
    ///
    /// With `normalize` the string is split on every `-` and each component
    /// is rematched against the roles it could fill; without it at most four
    /// components are considered and trailing `-`s stay in the last one.
    #[must_use]
    pub fn parse(s: &str, normalize: bool) -> Self {
        let components: Vec<&str> = if normalize {
            s.split('-').collect()
        } else {
            s.splitn(4, '-').collect()
        };

        let mut triple = Self {
            original: s.to_string(),
            arch: None,
            sub_arch: None,
            vendor: None,
            os: None,
            environment: None,
            object_format: None,
        };
        let mut filled = [false; 5];
        let slot = |role: Role| -> usize {
            match role {
                Role::Arch => 0,
                Role::Vendor => 1,
                Role::Os => 2,
                Role::Environment => 3,
                Role::ObjectFormat => 4,
            }
        };

        for (position, component) in components.into_iter().enumerate() {
            if component.is_empty() {
                continue;
            }
            let roles = role_order(position.min(3));
            if component == "unknown" {
                // An explicit unknown consumes its positional slot without
                // setting anything.
                if let Some(role) = roles.into_iter().find(|r| !filled[slot(*r)]) {
                    filled[slot(role)] = true;
                }
                continue;
            }
            for role in roles {
                if filled[slot(role)] {
                    continue;
                }
                let matched = match role {
                    Role::Arch => {
                        if let Some((arch, sub_arch)) = Arch::parse(component) {
                            triple.arch = Some(arch);
                            triple.sub_arch = sub_arch;
                            true
                        } else {
                            false
                        }
                    }
                    Role::Vendor => {
                        if let Some(vendor) = Vendor::parse(component) {
                            triple.vendor = Some(vendor);
                            true
                        } else {
                            false
                        }
                    }
                    Role::Os => {
                        if let Some(os) = Os::parse(component) {
                            triple.os = Some(os);
                            true
                        } else {
                            false
                        }
                    }
                    Role::Environment => {
                        if let Some(environment) = Environment::parse(component) {
                            triple.environment = Some(environment);
                            true
                        } else {
                            false
                        }
                    }
                    Role::ObjectFormat => {
                        if let Some(format) = ObjectFormat::parse(component) {
                            triple.object_format = Some(format);
                            true
                        } else {
                            false
                        }
                    }
                };
                if matched {
                    filled[slot(role)] = true;
                    break;
                }
            }
        }
        triple
    }

    /// Parse in normalized mode.
    #[must_use]
    pub fn parse_normalized(s: &str) -> Self {
        Self::parse(s, true)
    }

    /// The verbatim input string this triple was parsed from.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The canonical `arch-vendor-os[-env][-objfmt]` form with `unknown`
    /// placeholders. Round-trips through [`Triple::parse`].
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.arch_component());
        out.push('-');
        out.push_str(self.vendor.map_or("unknown", Vendor::as_str));
        out.push('-');
        match &self.os {
            Some(os) => out.push_str(&os.component()),
            None => out.push_str("unknown"),
        }
        if let Some(environment) = &self.environment {
            out.push('-');
            out.push_str(&environment.component());
        }
        if let Some(format) = self.object_format {
            out.push('-');
            out.push_str(format.as_str());
        }
        out
    }

    /// The architecture component including any ARM sub-architecture suffix.
    #[must_use]
    pub fn arch_component(&self) -> String {
        match (self.arch, &self.sub_arch) {
            (Some(arch), Some(sub)) => format!("{}{sub}", arch.as_str()),
            (Some(arch), None) => arch.as_str().to_string(),
            (None, _) => "unknown".to_string(),
        }
    }

    /// OS family checks used by the recipes and the artifact catalog.
    #[must_use]
    pub fn is_linux(&self) -> bool {
        self.os.as_ref().is_some_and(|os| os.kind == OsKind::Linux)
    }

    #[must_use]
    pub fn is_macos(&self) -> bool {
        self.os
            .as_ref()
            .is_some_and(|os| matches!(os.kind, OsKind::MacOsx | OsKind::Darwin))
    }

    #[must_use]
    pub fn is_darwin_family(&self) -> bool {
        self.os.as_ref().is_some_and(|os| os.kind.is_darwin_family())
    }

    #[must_use]
    pub fn is_wasi(&self) -> bool {
        self.os.as_ref().is_some_and(|os| os.kind == OsKind::Wasi)
    }

    #[must_use]
    pub fn is_freebsd(&self) -> bool {
        self.os.as_ref().is_some_and(|os| os.kind == OsKind::FreeBsd)
    }

    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os.as_ref().is_some_and(|os| os.kind == OsKind::Windows)
    }

    /// Version parsed from the OS component, if any (`macosx14.0` → 14.0.0).
    #[must_use]
    pub fn os_version(&self) -> Option<OsVersion> {
        self.os.as_ref().and_then(Os::version)
    }

    /// The effective object format: explicit if one was parsed, otherwise
    /// inferred from the OS and architecture.
    #[must_use]
    pub fn object_format(&self) -> ObjectFormat {
        if let Some(format) = self.object_format {
            return format;
        }
        if let Some(os) = &self.os {
            if os.kind.is_darwin_family() {
                return ObjectFormat::MachO;
            }
            match os.kind {
                OsKind::Windows => return ObjectFormat::Coff,
                OsKind::Wasi | OsKind::Emscripten => return ObjectFormat::Wasm,
                OsKind::Aix => {
                    if self.arch.is_some_and(Arch::is_powerpc) {
                        return ObjectFormat::XCoff;
                    }
                    return ObjectFormat::Elf;
                }
                _ => {}
            }
        }
        if self.arch.is_some_and(Arch::is_wasm) {
            return ObjectFormat::Wasm;
        }
        ObjectFormat::Elf
    }
}

impl PartialEq for Triple {
    fn eq(&self, other: &Self) -> bool {
        self.arch == other.arch
            && self.sub_arch == other.sub_arch
            && self.vendor == other.vendor
            && self.os == other.os
            && self.environment == other.environment
            && self.object_format == other.object_format
    }
}

impl Eq for Triple {}

impl std::hash::Hash for Triple {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.arch.hash(state);
        self.sub_arch.hash(state);
        self.vendor.hash(state);
        self.os.hash(state);
        self.environment.hash(state);
        self.object_format.hash(state);
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl Serialize for Triple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for Triple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(D::Error::custom("empty triple string"));
        }
        Ok(Self::parse(&s, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_four_component_parse() {
        let t = Triple::parse("x86_64-unknown-linux-gnu", true);
        assert_eq!(t.arch, Some(Arch::X86_64));
        assert_eq!(t.vendor, None);
        assert_eq!(t.os.as_ref().unwrap().kind, OsKind::Linux);
        assert_eq!(
            t.environment.as_ref().unwrap().kind,
            EnvironmentKind::Gnu
        );
        assert_eq!(t.canonical(), "x86_64-unknown-linux-gnu");
    }

    #[test]
    fn permuted_components_rematch() {
        let t = Triple::parse("x86_64-linux-gnu", true);
        assert_eq!(t.arch, Some(Arch::X86_64));
        assert_eq!(t.vendor, None);
        assert_eq!(t.os.as_ref().unwrap().kind, OsKind::Linux);
        assert_eq!(t.environment.as_ref().unwrap().kind, EnvironmentKind::Gnu);
        assert_eq!(t.canonical(), "x86_64-unknown-linux-gnu");
    }

    #[test]
    fn apple_triple() {
        let t = Triple::parse("arm64-apple-macosx14.0", true);
        assert_eq!(t.arch, Some(Arch::Aarch64));
        assert_eq!(t.vendor, Some(Vendor::Apple));
        assert_eq!(t.os.as_ref().unwrap().kind, OsKind::MacOsx);
        assert_eq!(
            t.os_version(),
            Some(OsVersion {
                major: 14,
                minor: 0,
                micro: 0
            })
        );
        assert_eq!(t.object_format(), ObjectFormat::MachO);
        assert_eq!(t.canonical(), "aarch64-apple-macosx14.0");
    }

    #[test]
    fn wasi_threads_triple() {
        let t = Triple::parse("wasm32-unknown-wasip1-threads", true);
        assert_eq!(t.arch, Some(Arch::Wasm32));
        assert_eq!(t.os.as_ref().unwrap().component(), "wasip1");
        assert_eq!(
            t.environment.as_ref().unwrap().kind,
            EnvironmentKind::Threads
        );
        assert_eq!(t.object_format(), ObjectFormat::Wasm);
        assert_eq!(t.canonical(), "wasm32-unknown-wasip1-threads");
    }

    #[test]
    fn arm_sub_arch_round_trip() {
        let t = Triple::parse("armv7-unknown-linux-gnueabihf", true);
        assert_eq!(t.arch, Some(Arch::Arm));
        assert_eq!(t.sub_arch.as_deref(), Some("v7"));
        assert_eq!(t.canonical(), "armv7-unknown-linux-gnueabihf");
    }

    #[test]
    fn empty_string_yields_unset_triple() {
        let t = Triple::parse("", true);
        assert_eq!(t.arch, None);
        assert_eq!(t.vendor, None);
        assert_eq!(t.os, None);
        assert_eq!(t.environment, None);
        assert_eq!(t.original(), "");
        assert_eq!(t.canonical(), "unknown-unknown-unknown");
    }

    #[test]
    fn garbage_components_preserve_original() {
        let t = Triple::parse("notanarch-notavendor-notanos", true);
        assert_eq!(t.arch, None);
        assert_eq!(t.os, None);
        assert_eq!(t.original(), "notanarch-notavendor-notanos");
    }

    #[test]
    fn object_format_defaults() {
        assert_eq!(
            Triple::parse("x86_64-unknown-linux-gnu", true).object_format(),
            ObjectFormat::Elf
        );
        assert_eq!(
            Triple::parse("x86_64-pc-windows-msvc", true).object_format(),
            ObjectFormat::Coff
        );
        assert_eq!(
            Triple::parse("powerpc-ibm-aix", true).object_format(),
            ObjectFormat::XCoff
        );
        assert_eq!(
            Triple::parse("wasm32-unknown-wasi", true).object_format(),
            ObjectFormat::Wasm
        );
    }

    #[test]
    fn explicit_object_format_component() {
        let t = Triple::parse("armv7-unknown-linux-gnueabihf-elf", true);
        assert_eq!(t.object_format, Some(ObjectFormat::Elf));
        assert_eq!(t.canonical(), "armv7-unknown-linux-gnueabihf-elf");
    }

    #[test]
    fn freebsd_triple() {
        let t = Triple::parse("aarch64-unknown-freebsd14.3", true);
        assert!(t.is_freebsd());
        assert_eq!(
            t.os_version(),
            Some(OsVersion {
                major: 14,
                minor: 3,
                micro: 0
            })
        );
    }

    #[test]
    fn serde_round_trip() {
        let t = Triple::parse("aarch64-unknown-linux-gnu", true);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"aarch64-unknown-linux-gnu\"");
        let back: Triple = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
