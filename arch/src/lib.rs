//! Architecture descriptors: the small, closed set of guest CPU architectures this framework
//! can target, plus the geometry (pointer width, endianness, address space) each implies.
#![no_std]

use core::fmt;

/// A guest CPU architecture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Arch {
    /// 32-bit x86.
    X86,
    /// 64-bit x86 (AMD64/Intel 64).
    X8664,
    /// 32-bit ARM.
    Arm,
    /// 64-bit ARM (AArch64).
    Arm64,
    /// 32-bit MIPS.
    Mips32,
}

/// Byte order a guest architecture's integers are encoded in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

/// Fixed geometry implied by an [`Arch`]: pointer width, default endianness, and native
/// address-space bit width, matching the memory manager's `archbit` parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor {
    /// The architecture this describes.
    pub arch: Arch,
    /// Native pointer width, in bytes.
    pub ptr_size: u8,
    /// Byte order integers are encoded in by default. ARM and MIPS can run bi-endian in
    /// practice; this is the common default, not a hard guarantee.
    pub endian: Endian,
    /// Address-space width in bits, matching the `archbit` parameter of the memory manager.
    pub archbit: u32,
}

impl Arch {
    /// Returns the fixed [`Descriptor`] for this architecture.
    #[must_use]
    pub const fn descriptor(self) -> Descriptor {
        match self {
            Self::X86 => Descriptor { arch: self, ptr_size: 4, endian: Endian::Little, archbit: 32 },
            Self::X8664 => Descriptor { arch: self, ptr_size: 8, endian: Endian::Little, archbit: 64 },
            Self::Arm => Descriptor { arch: self, ptr_size: 4, endian: Endian::Little, archbit: 32 },
            Self::Arm64 => Descriptor { arch: self, ptr_size: 8, endian: Endian::Little, archbit: 64 },
            Self::Mips32 => Descriptor { arch: self, ptr_size: 4, endian: Endian::Big, archbit: 32 },
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X86 => "x86",
            Self::X8664 => "x86_64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
            Self::Mips32 => "mips32",
        })
    }
}

/// Parses a user- or configuration-supplied architecture name.
///
/// Preserves a known quirk verbatim: `"arm"` resolves to [`Arch::Arm64`], not [`Arch::Arm`].
/// This is almost certainly a bug in the system this is modeled on, not an intentional alias;
/// it's kept rather than silently "corrected" because programs may already depend on it.
#[must_use]
pub fn arch_convert(name: &str) -> Option<Arch> {
    Some(match name {
        "x86" => Arch::X86,
        "x8664" | "x86_64" => Arch::X8664,
        "arm" => Arch::Arm64,
        "arm64" | "aarch64" => Arch::Arm64,
        "mips32" | "mips" => Arch::Mips32,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_convert_arm_resolves_to_arm64() {
        assert_eq!(arch_convert("arm"), Some(Arch::Arm64));
    }

    #[test]
    fn arch_convert_arm64_resolves_to_arm64_too() {
        assert_eq!(arch_convert("arm64"), Some(Arch::Arm64));
    }

    #[test]
    fn descriptor_matches_known_geometry() {
        assert_eq!(Arch::X8664.descriptor().ptr_size, 8);
        assert_eq!(Arch::X86.descriptor().archbit, 32);
        assert_eq!(Arch::Mips32.descriptor().endian, Endian::Big);
    }
}
