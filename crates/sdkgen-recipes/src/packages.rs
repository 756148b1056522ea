//! Distribution packages unpacked into the sysroot for non-Docker builds.

use sdkgen_catalog::{DebianRelease, LinuxDistribution, UbuntuRelease};

/// Packages whose headers and libraries the sysroot needs. Compiler and ICU
/// package names track each release's default toolchain.
#[must_use]
pub fn required_packages(distribution: &LinuxDistribution) -> &'static [&'static str] {
    match distribution {
        LinuxDistribution::Ubuntu(UbuntuRelease::Focal) => &[
            "libc6",
            "libc6-dev",
            "linux-libc-dev",
            "libicu66",
            "libicu-dev",
            "libgcc-s1",
            "libgcc-10-dev",
            "libstdc++-10-dev",
            "libstdc++6",
            "zlib1g",
            "zlib1g-dev",
        ],
        LinuxDistribution::Ubuntu(UbuntuRelease::Jammy) => &[
            "libc6",
            "libc6-dev",
            "linux-libc-dev",
            "libicu70",
            "libicu-dev",
            "libgcc-s1",
            "libgcc-12-dev",
            "libstdc++-12-dev",
            "libstdc++6",
            "zlib1g",
            "zlib1g-dev",
        ],
        LinuxDistribution::Ubuntu(UbuntuRelease::Noble) => &[
            "libc6",
            "libc6-dev",
            "linux-libc-dev",
            "libicu74",
            "libicu-dev",
            "libgcc-s1",
            "libgcc-14-dev",
            "libstdc++-14-dev",
            "libstdc++6",
            "zlib1g",
            "zlib1g-dev",
        ],
        LinuxDistribution::Debian(DebianRelease::Bullseye) => &[
            "libc6",
            "libc6-dev",
            "linux-libc-dev",
            "libicu67",
            "libicu-dev",
            "libgcc-s1",
            "libgcc-10-dev",
            "libstdc++-10-dev",
            "libstdc++6",
            "zlib1g",
            "zlib1g-dev",
        ],
        LinuxDistribution::Debian(DebianRelease::Bookworm) => &[
            "libc6",
            "libc6-dev",
            "linux-libc-dev",
            "libicu72",
            "libicu-dev",
            "libgcc-s1",
            "libgcc-12-dev",
            "libstdc++-12-dev",
            "libstdc++6",
            "zlib1g",
            "zlib1g-dev",
        ],
        // RHEL sysroots are only assembled out of a container image.
        LinuxDistribution::RhelUbi9 => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_debian_family_release_has_a_package_list() {
        for (name, version) in [
            ("ubuntu", "20.04"),
            ("ubuntu", "22.04"),
            ("ubuntu", "24.04"),
            ("debian", "11"),
            ("debian", "12"),
        ] {
            let distribution = LinuxDistribution::parse(name, version).unwrap();
            let packages = required_packages(&distribution);
            assert!(packages.contains(&"libc6-dev"), "{name} {version}");
            assert!(packages.contains(&"linux-libc-dev"), "{name} {version}");
        }
    }

    #[test]
    fn rhel_has_no_package_list() {
        assert!(required_packages(&LinuxDistribution::RhelUbi9).is_empty());
    }
}
