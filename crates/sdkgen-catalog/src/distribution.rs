//! Linux distribution model.

use serde::{Deserialize, Serialize};
use sdkgen_triple::{Arch, Triple};
use std::fmt;

use crate::error::CatalogError;
use crate::versions::SwiftVersion;

/// Ubuntu releases with prebuilt Swift distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UbuntuRelease {
    Focal,
    Jammy,
    Noble,
}

impl UbuntuRelease {
    #[must_use]
    pub fn version(self) -> &'static str {
        match self {
            Self::Focal => "20.04",
            Self::Jammy => "22.04",
            Self::Noble => "24.04",
        }
    }

    #[must_use]
    pub fn codename(self) -> &'static str {
        match self {
            Self::Focal => "focal",
            Self::Jammy => "jammy",
            Self::Noble => "noble",
        }
    }
}

/// Debian releases the generator knows how to assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebianRelease {
    Bullseye,
    Bookworm,
}

impl DebianRelease {
    #[must_use]
    pub fn version(self) -> &'static str {
        match self {
            Self::Bullseye => "11",
            Self::Bookworm => "12",
        }
    }

    #[must_use]
    pub fn codename(self) -> &'static str {
        match self {
            Self::Bullseye => "bullseye",
            Self::Bookworm => "bookworm",
        }
    }
}

/// A distribution/release pair accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinuxDistribution {
    Ubuntu(UbuntuRelease),
    Debian(DebianRelease),
    /// Red Hat Universal Base Image 9.
    RhelUbi9,
}

impl LinuxDistribution {
    /// Parse `--distribution-name` / `--distribution-version`.
    pub fn parse(name: &str, version: &str) -> Result<Self, CatalogError> {
        let unknown = || CatalogError::UnknownDistribution {
            name: name.to_string(),
            version: Some(version.to_string()),
        };
        match name.to_ascii_lowercase().as_str() {
            "ubuntu" => match version {
                "20.04" | "focal" => Ok(Self::Ubuntu(UbuntuRelease::Focal)),
                "22.04" | "jammy" => Ok(Self::Ubuntu(UbuntuRelease::Jammy)),
                "24.04" | "noble" => Ok(Self::Ubuntu(UbuntuRelease::Noble)),
                _ => Err(unknown()),
            },
            "debian" => match version {
                "11" | "bullseye" => Ok(Self::Debian(DebianRelease::Bullseye)),
                "12" | "bookworm" => Ok(Self::Debian(DebianRelease::Bookworm)),
                _ => Err(unknown()),
            },
            "rhel" => match version {
                "9" | "ubi9" => Ok(Self::RhelUbi9),
                _ => Err(unknown()),
            },
            _ => Err(CatalogError::UnknownDistribution {
                name: name.to_string(),
                version: None,
            }),
        }
    }

    /// Lowercase distribution family name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ubuntu(_) => "ubuntu",
            Self::Debian(_) => "debian",
            Self::RhelUbi9 => "rhel",
        }
    }

    /// Release identifier used in bundle and sysroot directory names
    /// (`jammy`, `bookworm`, `ubi9`).
    #[must_use]
    pub fn release(&self) -> &'static str {
        match self {
            Self::Ubuntu(release) => release.codename(),
            Self::Debian(release) => release.codename(),
            Self::RhelUbi9 => "ubi9",
        }
    }

    /// Sysroot directory name inside the bundle.
    #[must_use]
    pub fn sdk_dir_name(&self) -> String {
        format!("{}-{}.sdk", self.name(), self.release())
    }

    /// Whether assembly must go through Docker because no prebuilt Swift
    /// distribution exists.
    #[must_use]
    pub fn requires_docker(&self) -> bool {
        matches!(self, Self::RhelUbi9)
    }

    /// Default Docker base image for this distribution.
    #[must_use]
    pub fn default_docker_image(&self, swift_version: &SwiftVersion) -> String {
        match self {
            Self::Ubuntu(release) => {
                format!("swift:{}-{}", swift_version.raw(), release.codename())
            }
            Self::Debian(release) => {
                format!("swift:{}-{}", swift_version.raw(), release.codename())
            }
            Self::RhelUbi9 => format!("swift:{}-rhel-ubi9", swift_version.raw()),
        }
    }

    /// The swift.org platform identifier for the target Swift tarball:
    /// directory component and file-name component.
    ///
    /// Debian releases fall back to the closest Ubuntu artifact for Swift
    /// versions that predate native Debian builds (11 uses the 20.04
    /// artifact, 12 uses the 22.04 artifact before Swift 5.10.1).
    pub fn swift_platform(
        &self,
        swift_version: &SwiftVersion,
    ) -> Result<(String, String), CatalogError> {
        match self {
            Self::Ubuntu(release) => {
                let version = release.version();
                Ok((
                    format!("ubuntu{}", version.replace('.', "")),
                    format!("ubuntu{version}"),
                ))
            }
            Self::Debian(DebianRelease::Bullseye) => {
                Ok(("ubuntu2004".to_string(), "ubuntu20.04".to_string()))
            }
            Self::Debian(DebianRelease::Bookworm) => {
                let has_native_build = !(swift_version.is_older_than(5, 10)
                    || (swift_version.major == 5
                        && swift_version.minor == 10
                        && swift_version.patch == 0));
                if has_native_build {
                    Ok(("debian12".to_string(), "debian12".to_string()))
                } else {
                    Ok(("ubuntu2204".to_string(), "ubuntu22.04".to_string()))
                }
            }
            Self::RhelUbi9 => Err(CatalogError::DistributionRequiresDocker(
                self.to_string(),
            )),
        }
    }

    /// Debian-style package mirror for `arch`. Ubuntu serves non-x86_64
    /// architectures from the ports mirror.
    #[must_use]
    pub fn package_mirror(&self, arch: Arch) -> &'static str {
        match self {
            Self::Ubuntu(_) => {
                if arch == Arch::X86_64 {
                    "http://archive.ubuntu.com/ubuntu"
                } else {
                    "http://ports.ubuntu.com/ubuntu-ports"
                }
            }
            Self::Debian(_) => "http://deb.debian.org/debian",
            Self::RhelUbi9 => "",
        }
    }

    /// Validate that we can assemble this distribution for `target`.
    pub fn check_target_support(&self, target: &Triple) -> Result<(), CatalogError> {
        let arch = target
            .arch
            .ok_or_else(|| CatalogError::UnknownArchitecture(target.original().to_string()))?;
        match arch {
            Arch::X86_64 | Arch::Aarch64 => Ok(()),
            Arch::Arm if matches!(self, Self::Debian(_)) => Ok(()),
            other => Err(CatalogError::DistributionDoesNotSupportArchitecture {
                distribution: self.to_string(),
                architecture: other.as_str().to_string(),
            }),
        }
    }
}

impl fmt::Display for LinuxDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.release())
    }
}

/// Debian architecture name for a triple's architecture (`amd64`, `arm64`).
pub fn debian_arch_name(arch: Arch) -> Result<&'static str, CatalogError> {
    match arch {
        Arch::X86_64 => Ok("amd64"),
        Arch::Aarch64 => Ok("arm64"),
        Arch::Arm => Ok("armhf"),
        Arch::X86 => Ok("i386"),
        Arch::PowerPc64Le => Ok("ppc64el"),
        Arch::SystemZ => Ok("s390x"),
        Arch::Riscv64 => Ok("riscv64"),
        other => Err(CatalogError::UnknownArchitecture(
            other.as_str().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SwiftVersion {
        SwiftVersion::parse(s).unwrap()
    }

    #[test]
    fn parses_known_distributions() {
        assert_eq!(
            LinuxDistribution::parse("ubuntu", "22.04").unwrap(),
            LinuxDistribution::Ubuntu(UbuntuRelease::Jammy)
        );
        assert_eq!(
            LinuxDistribution::parse("Ubuntu", "jammy").unwrap(),
            LinuxDistribution::Ubuntu(UbuntuRelease::Jammy)
        );
        assert_eq!(
            LinuxDistribution::parse("debian", "12").unwrap(),
            LinuxDistribution::Debian(DebianRelease::Bookworm)
        );
        assert_eq!(
            LinuxDistribution::parse("rhel", "ubi9").unwrap(),
            LinuxDistribution::RhelUbi9
        );
    }

    #[test]
    fn rejects_unknown_distributions() {
        assert!(matches!(
            LinuxDistribution::parse("gentoo", "latest"),
            Err(CatalogError::UnknownDistribution { .. })
        ));
        assert!(matches!(
            LinuxDistribution::parse("ubuntu", "10.04"),
            Err(CatalogError::UnknownDistribution { .. })
        ));
    }

    #[test]
    fn sdk_dir_names() {
        assert_eq!(
            LinuxDistribution::parse("ubuntu", "22.04").unwrap().sdk_dir_name(),
            "ubuntu-jammy.sdk"
        );
        assert_eq!(
            LinuxDistribution::RhelUbi9.sdk_dir_name(),
            "rhel-ubi9.sdk"
        );
    }

    #[test]
    fn swift_platform_for_ubuntu() {
        let dist = LinuxDistribution::parse("ubuntu", "22.04").unwrap();
        assert_eq!(
            dist.swift_platform(&v("6.0.3-RELEASE")).unwrap(),
            ("ubuntu2204".to_string(), "ubuntu22.04".to_string())
        );
    }

    #[test]
    fn debian_falls_back_to_ubuntu_artifacts() {
        let bullseye = LinuxDistribution::parse("debian", "11").unwrap();
        assert_eq!(
            bullseye.swift_platform(&v("5.9.2-RELEASE")).unwrap().0,
            "ubuntu2004"
        );

        let bookworm = LinuxDistribution::parse("debian", "12").unwrap();
        assert_eq!(
            bookworm.swift_platform(&v("5.10-RELEASE")).unwrap().0,
            "ubuntu2204"
        );
        assert_eq!(
            bookworm.swift_platform(&v("5.10.1-RELEASE")).unwrap().0,
            "debian12"
        );
        assert_eq!(
            bookworm.swift_platform(&v("6.0.3-RELEASE")).unwrap().0,
            "debian12"
        );
    }

    #[test]
    fn rhel_needs_docker() {
        let rhel = LinuxDistribution::RhelUbi9;
        assert!(rhel.requires_docker());
        assert!(matches!(
            rhel.swift_platform(&v("6.0.3-RELEASE")),
            Err(CatalogError::DistributionRequiresDocker(_))
        ));
    }

    #[test]
    fn mirrors_depend_on_architecture() {
        let ubuntu = LinuxDistribution::parse("ubuntu", "22.04").unwrap();
        assert_eq!(
            ubuntu.package_mirror(Arch::X86_64),
            "http://archive.ubuntu.com/ubuntu"
        );
        assert_eq!(
            ubuntu.package_mirror(Arch::Aarch64),
            "http://ports.ubuntu.com/ubuntu-ports"
        );
    }

    #[test]
    fn debian_arch_names() {
        assert_eq!(debian_arch_name(Arch::X86_64).unwrap(), "amd64");
        assert_eq!(debian_arch_name(Arch::Aarch64).unwrap(), "arm64");
        assert!(debian_arch_name(Arch::Msp430).is_err());
    }
}
