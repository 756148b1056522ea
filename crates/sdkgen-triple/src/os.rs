//! Operating system, environment, and object format triple components.

use serde::{Deserialize, Serialize};

/// Operating system family, matched by prefix from the OS component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsKind {
    Aix,
    Cuda,
    Darwin,
    Dragonfly,
    Emscripten,
    FreeBsd,
    Fuchsia,
    Haiku,
    Ios,
    Linux,
    MacOsx,
    NetBsd,
    OpenBsd,
    Solaris,
    TvOs,
    Wasi,
    WatchOs,
    Windows,
}

impl OsKind {
    /// Canonical prefix used when the triple is formatted.
    #[must_use]
    pub fn canonical_prefix(self) -> &'static str {
        match self {
            Self::Aix => "aix",
            Self::Cuda => "cuda",
            Self::Darwin => "darwin",
            Self::Dragonfly => "dragonfly",
            Self::Emscripten => "emscripten",
            Self::FreeBsd => "freebsd",
            Self::Fuchsia => "fuchsia",
            Self::Haiku => "haiku",
            Self::Ios => "ios",
            Self::Linux => "linux",
            Self::MacOsx => "macosx",
            Self::NetBsd => "netbsd",
            Self::OpenBsd => "openbsd",
            Self::Solaris => "solaris",
            Self::TvOs => "tvos",
            Self::Wasi => "wasi",
            Self::WatchOs => "watchos",
            Self::Windows => "windows",
        }
    }

    /// Whether this OS belongs to the Darwin family.
    #[must_use]
    pub fn is_darwin_family(self) -> bool {
        matches!(
            self,
            Self::Darwin | Self::MacOsx | Self::Ios | Self::TvOs | Self::WatchOs
        )
    }
}

/// OS component: the recognized family plus whatever followed the prefix
/// (a version like `22.04`, a WASI revision like `p1`, or nothing).
///
/// Keeping the raw remainder means formatting reproduces the input exactly
/// (`wasip1` stays `wasip1`, `macosx14.0` stays `macosx14.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Os {
    pub kind: OsKind,
    pub rest: String,
}

/// Version number parsed out of an OS component (`major.minor.micro`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl Os {
    /// Match a triple component against the OS prefix table.
    #[must_use]
    pub fn parse(component: &str) -> Option<Self> {
        // Longer aliases first so `macosx` is not consumed as `macos` + `x`.
        const PREFIXES: [(&str, OsKind); 21] = [
            ("macosx", OsKind::MacOsx),
            ("macos", OsKind::MacOsx),
            ("osx", OsKind::MacOsx),
            ("darwin", OsKind::Darwin),
            ("ios", OsKind::Ios),
            ("tvos", OsKind::TvOs),
            ("watchos", OsKind::WatchOs),
            ("linux", OsKind::Linux),
            ("wasi", OsKind::Wasi),
            ("windows", OsKind::Windows),
            ("win32", OsKind::Windows),
            ("freebsd", OsKind::FreeBsd),
            ("openbsd", OsKind::OpenBsd),
            ("netbsd", OsKind::NetBsd),
            ("dragonfly", OsKind::Dragonfly),
            ("solaris", OsKind::Solaris),
            ("haiku", OsKind::Haiku),
            ("fuchsia", OsKind::Fuchsia),
            ("aix", OsKind::Aix),
            ("cuda", OsKind::Cuda),
            ("emscripten", OsKind::Emscripten),
        ];
        for (prefix, kind) in PREFIXES {
            if let Some(rest) = component.strip_prefix(prefix) {
                return Some(Self {
                    kind,
                    rest: rest.to_string(),
                });
            }
        }
        None
    }

    /// The canonical component string (`linux`, `wasip1`, `macosx14.0`).
    #[must_use]
    pub fn component(&self) -> String {
        format!("{}{}", self.kind.canonical_prefix(), self.rest)
    }

    /// Parse `major[.minor[.micro]]` out of the post-prefix remainder.
    ///
    /// Returns `None` when the remainder does not start with a digit.
    #[must_use]
    pub fn version(&self) -> Option<OsVersion> {
        let rest = self.rest.as_str();
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        let mut parts = rest.splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts
            .next()
            .map(|p| p.parse().ok())
            .unwrap_or(Some(0))?;
        let micro = parts
            .next()
            .map(|p| p.parse().ok())
            .unwrap_or(Some(0))?;
        Some(OsVersion {
            major,
            minor,
            micro,
        })
    }
}

/// Environment / ABI component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
    Android,
    Cygnus,
    Eabi,
    Eabihf,
    Gnu,
    GnuAbi64,
    GnuEabi,
    GnuEabihf,
    GnuX32,
    Macabi,
    Msvc,
    Musl,
    MuslEabi,
    MuslEabihf,
    Simulator,
    Threads,
}

impl EnvironmentKind {
    /// Canonical prefix used when the triple is formatted.
    #[must_use]
    pub fn canonical_prefix(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Cygnus => "cygnus",
            Self::Eabi => "eabi",
            Self::Eabihf => "eabihf",
            Self::Gnu => "gnu",
            Self::GnuAbi64 => "gnuabi64",
            Self::GnuEabi => "gnueabi",
            Self::GnuEabihf => "gnueabihf",
            Self::GnuX32 => "gnux32",
            Self::Macabi => "macabi",
            Self::Msvc => "msvc",
            Self::Musl => "musl",
            Self::MuslEabi => "musleabi",
            Self::MuslEabihf => "musleabihf",
            Self::Simulator => "simulator",
            Self::Threads => "threads",
        }
    }
}

/// Environment component, with the raw remainder retained for round-trips
/// (`android21` keeps its API level).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment {
    pub kind: EnvironmentKind,
    pub rest: String,
}

impl Environment {
    /// Match a triple component against the environment prefix table.
    #[must_use]
    pub fn parse(component: &str) -> Option<Self> {
        const PREFIXES: [(&str, EnvironmentKind); 16] = [
            ("gnueabihf", EnvironmentKind::GnuEabihf),
            ("gnueabi", EnvironmentKind::GnuEabi),
            ("gnuabi64", EnvironmentKind::GnuAbi64),
            ("gnux32", EnvironmentKind::GnuX32),
            ("gnu", EnvironmentKind::Gnu),
            ("musleabihf", EnvironmentKind::MuslEabihf),
            ("musleabi", EnvironmentKind::MuslEabi),
            ("musl", EnvironmentKind::Musl),
            ("eabihf", EnvironmentKind::Eabihf),
            ("eabi", EnvironmentKind::Eabi),
            ("android", EnvironmentKind::Android),
            ("msvc", EnvironmentKind::Msvc),
            ("cygnus", EnvironmentKind::Cygnus),
            ("macabi", EnvironmentKind::Macabi),
            ("simulator", EnvironmentKind::Simulator),
            ("threads", EnvironmentKind::Threads),
        ];
        for (prefix, kind) in PREFIXES {
            if let Some(rest) = component.strip_prefix(prefix) {
                return Some(Self {
                    kind,
                    rest: rest.to_string(),
                });
            }
        }
        None
    }

    /// The canonical component string.
    #[must_use]
    pub fn component(&self) -> String {
        format!("{}{}", self.kind.canonical_prefix(), self.rest)
    }
}

/// Binary object format, either parsed from the last triple component or
/// inferred from the OS and architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectFormat {
    Coff,
    Elf,
    MachO,
    Wasm,
    XCoff,
}

impl ObjectFormat {
    /// Canonical spelling used when the triple is formatted.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coff => "coff",
            Self::Elf => "elf",
            Self::MachO => "macho",
            Self::Wasm => "wasm",
            Self::XCoff => "xcoff",
        }
    }

    /// Match an explicit object-format component.
    #[must_use]
    pub fn parse(component: &str) -> Option<Self> {
        match component {
            "coff" => Some(Self::Coff),
            "elf" => Some(Self::Elf),
            "macho" => Some(Self::MachO),
            "wasm" => Some(Self::Wasm),
            "xcoff" => Some(Self::XCoff),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_prefix_matching() {
        let os = Os::parse("linux").unwrap();
        assert_eq!(os.kind, OsKind::Linux);
        assert_eq!(os.rest, "");

        let os = Os::parse("wasip1").unwrap();
        assert_eq!(os.kind, OsKind::Wasi);
        assert_eq!(os.component(), "wasip1");

        assert!(Os::parse("plan9").is_none());
    }

    #[test]
    fn win32_normalizes_to_windows() {
        let os = Os::parse("win32").unwrap();
        assert_eq!(os.kind, OsKind::Windows);
        assert_eq!(os.component(), "windows");
    }

    #[test]
    fn os_version_parsing() {
        let os = Os::parse("macosx14.2.1").unwrap();
        assert_eq!(
            os.version(),
            Some(OsVersion {
                major: 14,
                minor: 2,
                micro: 1
            })
        );

        let os = Os::parse("linux").unwrap();
        assert_eq!(os.version(), None);

        let os = Os::parse("freebsd14.3").unwrap();
        assert_eq!(
            os.version(),
            Some(OsVersion {
                major: 14,
                minor: 3,
                micro: 0
            })
        );
    }

    #[test]
    fn environment_longest_prefix_wins() {
        assert_eq!(
            Environment::parse("gnueabihf").unwrap().kind,
            EnvironmentKind::GnuEabihf
        );
        assert_eq!(
            Environment::parse("gnu").unwrap().kind,
            EnvironmentKind::Gnu
        );
        let android = Environment::parse("android21").unwrap();
        assert_eq!(android.kind, EnvironmentKind::Android);
        assert_eq!(android.component(), "android21");
    }
}
