//! Architecture component of a target triple.

use serde::{Deserialize, Serialize};

/// CPU architecture, matched from the first triple component.
///
/// The recognized set is closed; anything outside it parses to `None` at the
/// triple level rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Aarch64,
    Aarch64Be,
    Aarch64_32,
    Amdgcn,
    Arm,
    ArmBe,
    Avr,
    Bpfeb,
    Bpfel,
    Csky,
    Hexagon,
    Lanai,
    LoongArch32,
    LoongArch64,
    M68k,
    Mips,
    Mips64,
    Mips64el,
    Mipsel,
    Msp430,
    Nvptx,
    Nvptx64,
    PowerPc,
    PowerPc64,
    PowerPc64Le,
    PowerPcLe,
    R600,
    Riscv32,
    Riscv64,
    Sparc,
    SparcEl,
    SparcV9,
    Spirv32,
    Spirv64,
    SystemZ,
    Tce,
    TceLe,
    Thumb,
    ThumbBe,
    Ve,
    Wasm32,
    Wasm64,
    X86,
    X86_64,
    Xcore,
    Xtensa,
}

impl Arch {
    /// Canonical spelling used when the triple is formatted.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aarch64 => "aarch64",
            Self::Aarch64Be => "aarch64_be",
            Self::Aarch64_32 => "aarch64_32",
            Self::Amdgcn => "amdgcn",
            Self::Arm => "arm",
            Self::ArmBe => "armeb",
            Self::Avr => "avr",
            Self::Bpfeb => "bpfeb",
            Self::Bpfel => "bpfel",
            Self::Csky => "csky",
            Self::Hexagon => "hexagon",
            Self::Lanai => "lanai",
            Self::LoongArch32 => "loongarch32",
            Self::LoongArch64 => "loongarch64",
            Self::M68k => "m68k",
            Self::Mips => "mips",
            Self::Mips64 => "mips64",
            Self::Mips64el => "mips64el",
            Self::Mipsel => "mipsel",
            Self::Msp430 => "msp430",
            Self::Nvptx => "nvptx",
            Self::Nvptx64 => "nvptx64",
            Self::PowerPc => "powerpc",
            Self::PowerPc64 => "powerpc64",
            Self::PowerPc64Le => "powerpc64le",
            Self::PowerPcLe => "powerpcle",
            Self::R600 => "r600",
            Self::Riscv32 => "riscv32",
            Self::Riscv64 => "riscv64",
            Self::Sparc => "sparc",
            Self::SparcEl => "sparcel",
            Self::SparcV9 => "sparcv9",
            Self::Spirv32 => "spirv32",
            Self::Spirv64 => "spirv64",
            Self::SystemZ => "s390x",
            Self::Tce => "tce",
            Self::TceLe => "tcele",
            Self::Thumb => "thumb",
            Self::ThumbBe => "thumbeb",
            Self::Ve => "ve",
            Self::Wasm32 => "wasm32",
            Self::Wasm64 => "wasm64",
            Self::X86 => "i686",
            Self::X86_64 => "x86_64",
            Self::Xcore => "xcore",
            Self::Xtensa => "xtensa",
        }
    }

    /// Whether this is a 64-bit ARM architecture.
    #[must_use]
    pub fn is_aarch64(self) -> bool {
        matches!(self, Self::Aarch64 | Self::Aarch64Be | Self::Aarch64_32)
    }

    /// Whether this is a 32-bit ARM or Thumb architecture.
    #[must_use]
    pub fn is_arm32(self) -> bool {
        matches!(self, Self::Arm | Self::ArmBe | Self::Thumb | Self::ThumbBe)
    }

    /// Whether this architecture targets WebAssembly.
    #[must_use]
    pub fn is_wasm(self) -> bool {
        matches!(self, Self::Wasm32 | Self::Wasm64)
    }

    /// Whether this is a PowerPC architecture (any width or endianness).
    #[must_use]
    pub fn is_powerpc(self) -> bool {
        matches!(
            self,
            Self::PowerPc | Self::PowerPcLe | Self::PowerPc64 | Self::PowerPc64Le
        )
    }

    /// Match a triple component against the closed architecture set.
    ///
    /// Returns the architecture and, for the ARM families, the canonical
    /// sub-architecture suffix (`v7`, `v8m.base`, ...).
    #[must_use]
    pub fn parse(component: &str) -> Option<(Self, Option<String>)> {
        let plain = match component {
            "aarch64" | "arm64" => Some(Self::Aarch64),
            "aarch64_be" => Some(Self::Aarch64Be),
            "aarch64_32" | "arm64_32" => Some(Self::Aarch64_32),
            "amdgcn" => Some(Self::Amdgcn),
            "avr" => Some(Self::Avr),
            "bpfeb" => Some(Self::Bpfeb),
            "bpfel" => Some(Self::Bpfel),
            "csky" => Some(Self::Csky),
            "hexagon" => Some(Self::Hexagon),
            "lanai" => Some(Self::Lanai),
            "loongarch32" => Some(Self::LoongArch32),
            "loongarch64" => Some(Self::LoongArch64),
            "m68k" => Some(Self::M68k),
            "mips" | "mipseb" => Some(Self::Mips),
            "mips64" | "mips64eb" => Some(Self::Mips64),
            "mips64el" => Some(Self::Mips64el),
            "mipsel" => Some(Self::Mipsel),
            "msp430" => Some(Self::Msp430),
            "nvptx" => Some(Self::Nvptx),
            "nvptx64" => Some(Self::Nvptx64),
            "powerpc" | "ppc" | "ppc32" => Some(Self::PowerPc),
            "powerpc64" | "ppc64" => Some(Self::PowerPc64),
            "powerpc64le" | "ppc64le" => Some(Self::PowerPc64Le),
            "powerpcle" | "ppcle" => Some(Self::PowerPcLe),
            "r600" => Some(Self::R600),
            "riscv32" => Some(Self::Riscv32),
            "riscv64" => Some(Self::Riscv64),
            "sparc" => Some(Self::Sparc),
            "sparcel" => Some(Self::SparcEl),
            "sparcv9" | "sparc64" => Some(Self::SparcV9),
            "spirv32" => Some(Self::Spirv32),
            "spirv64" => Some(Self::Spirv64),
            "s390x" | "systemz" => Some(Self::SystemZ),
            "tce" => Some(Self::Tce),
            "tcele" => Some(Self::TceLe),
            "ve" => Some(Self::Ve),
            "wasm32" => Some(Self::Wasm32),
            "wasm64" => Some(Self::Wasm64),
            "i386" | "i486" | "i586" | "i686" | "x86" => Some(Self::X86),
            "x86_64" | "amd64" | "x86_64h" => Some(Self::X86_64),
            "xcore" => Some(Self::Xcore),
            "xtensa" => Some(Self::Xtensa),
            _ => None,
        };
        if let Some(arch) = plain {
            return Some((arch, None));
        }
        parse_arm_family(component)
    }
}

/// Parameterized ARM/Thumb/AArch64 matching.
///
/// Strips the family prefix and an optional big-endian marker, then requires
/// the remainder to be empty, a `vN...` revision, or a known marketing name.
fn parse_arm_family(component: &str) -> Option<(Arch, Option<String>)> {
    const FAMILIES: [(&str, Arch, Arch); 4] = [
        ("aarch64_32", Arch::Aarch64_32, Arch::Aarch64_32),
        ("aarch64", Arch::Aarch64, Arch::Aarch64Be),
        ("thumb", Arch::Thumb, Arch::ThumbBe),
        ("arm", Arch::Arm, Arch::ArmBe),
    ];

    for (prefix, little, big) in FAMILIES {
        let Some(mut rest) = component.strip_prefix(prefix) else {
            continue;
        };
        let mut arch = little;
        if let Some(r) = rest.strip_prefix("eb") {
            arch = big;
            rest = r;
        } else if let Some(r) = rest.strip_prefix("_be") {
            arch = big;
            rest = r;
        }
        let sub_arch = match rest {
            "" => None,
            "xscale" => Some("v5e".to_string()),
            _ => {
                let digits = rest.strip_prefix('v')?;
                if !digits.starts_with(|c: char| c.is_ascii_digit()) {
                    return None;
                }
                Some(rest.to_string())
            }
        };
        return Some((arch, sub_arch));
    }
    None
}
