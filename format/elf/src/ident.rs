//! The architecture-independent prefix of every ELF file: `e_ident`, plus the handful of
//! `e_machine`/`e_ident[EI_OSABI]` values needed to classify an image.

use core::fmt;

/// Errors returned while reading an [`ElfIdent`] out of a byte slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElfIdentError {
    /// `slice` was too short to contain an `e_ident` plus `e_machine`.
    TooShort {
        /// Number of bytes actually available.
        available: usize,
    },
    /// The first four bytes were not `\x7FELF`.
    InvalidMagicBytes([u8; 4]),
}

impl fmt::Display for ElfIdentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { available } => {
                write!(f, "slice of {available} bytes is too short to contain an ELF ident")
            }
            Self::InvalidMagicBytes(bytes) => write!(f, "invalid magic bytes: {bytes:x?}"),
        }
    }
}

impl core::error::Error for ElfIdentError {}

/// Specifier of the ELF file class: whether addresses and offsets are 32-bit or 64-bit.
#[repr(transparent)]
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Class(pub u8);

impl Class {
    /// Invalid class specifier.
    pub const NONE: Self = Self(0);
    /// ELF file is formatted in its 32-bit format.
    pub const CLASS32: Self = Self(1);
    /// ELF file is formatted in its 64-bit format.
    pub const CLASS64: Self = Self(2);
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.pad("Invalid"),
            Self::CLASS32 => f.pad("Class32"),
            Self::CLASS64 => f.pad("Class64"),
            class => f.debug_tuple("Class").field(&class.0).finish(),
        }
    }
}

/// Specifier of the ELF file's byte order.
#[repr(transparent)]
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Encoding(pub u8);

impl Encoding {
    /// Invalid encoding specifier.
    pub const NONE: Self = Self(0);
    /// Little-endian.
    pub const LSB2: Self = Self(1);
    /// Big-endian.
    pub const MSB2: Self = Self(2);
}

impl fmt::Debug for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.pad("NoEncoding"),
            Self::LSB2 => f.pad("LittleEndian"),
            Self::MSB2 => f.pad("BigEndian"),
            encoding => f.debug_tuple("Encoding").field(&encoding.0).finish(),
        }
    }
}

/// Specifier of the OS/ABI extensions a file targets.
#[repr(transparent)]
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct OsAbi(pub u8);

impl OsAbi {
    /// No extensions, or a System V-compatible file.
    pub const NONE: Self = Self(0x00);
    /// HP-UX.
    pub const HPUX: Self = Self(0x01);
    /// Linux.
    pub const LINUX: Self = Self(0x03);
    /// FreeBSD.
    pub const FREEBSD: Self = Self(0x09);
    /// ARM.
    pub const ARM: Self = Self(0x61);
    /// Embedded, standalone.
    pub const STANDALONE: Self = Self(0xFF);
}

impl fmt::Debug for OsAbi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.pad("None"),
            Self::LINUX => f.pad("Linux"),
            Self::FREEBSD => f.pad("FreeBsd"),
            os_abi => f.debug_tuple("OsAbi").field(&os_abi.0).finish(),
        }
    }
}

/// Target machine, read out of `e_machine`.
#[repr(transparent)]
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Machine(pub u16);

impl Machine {
    /// No machine.
    pub const NONE: Self = Self(0);
    /// Intel 80386.
    pub const X86: Self = Self(0x0003);
    /// MIPS.
    pub const MIPS: Self = Self(0x0008);
    /// ARM.
    pub const ARM: Self = Self(0x0028);
    /// AMD x86-64.
    pub const X86_64: Self = Self(0x003E);
    /// ARM AArch64.
    pub const AARCH64: Self = Self(0x00B7);
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.pad("None"),
            Self::X86 => f.pad("X86"),
            Self::MIPS => f.pad("Mips"),
            Self::ARM => f.pad("Arm"),
            Self::X86_64 => f.pad("X86_64"),
            Self::AARCH64 => f.pad("Aarch64"),
            machine => f.debug_tuple("Machine").field(&machine.0).finish(),
        }
    }
}

/// The architecture-independent prefix of an ELF file (`e_ident`) plus `e_machine`, the minimum
/// needed to classify an image without decoding the rest of the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElfIdent {
    /// 32-bit vs 64-bit.
    pub class: Class,
    /// Byte order of the rest of the file.
    pub encoding: Encoding,
    /// Target OS/ABI.
    pub os_abi: OsAbi,
    /// Target machine.
    pub machine: Machine,
}

impl ElfIdent {
    /// The four magic bytes every ELF file starts with.
    pub const MAGIC_BYTES: [u8; 4] = [0x7F, b'E', b'L', b'F'];

    /// `e_machine` lives at this offset in every ELF file, regardless of class.
    const E_MACHINE_OFFSET: usize = 0x12;

    /// Reads an [`ElfIdent`] out of the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ElfIdentError::TooShort`] if `bytes` doesn't reach the `e_machine` field, or
    /// [`ElfIdentError::InvalidMagicBytes`] if the first four bytes aren't `\x7FELF`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ElfIdentError> {
        if bytes.len() < Self::E_MACHINE_OFFSET + 2 {
            return Err(ElfIdentError::TooShort {
                available: bytes.len(),
            });
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != Self::MAGIC_BYTES {
            return Err(ElfIdentError::InvalidMagicBytes(magic));
        }

        let class = Class(bytes[4]);
        let encoding = Encoding(bytes[5]);
        let os_abi = OsAbi(bytes[7]);

        let machine_bytes = [
            bytes[Self::E_MACHINE_OFFSET],
            bytes[Self::E_MACHINE_OFFSET + 1],
        ];
        let machine = Machine(match encoding {
            Encoding::MSB2 => u16::from_be_bytes(machine_bytes),
            _ => u16::from_le_bytes(machine_bytes),
        });

        Ok(Self {
            class,
            encoding,
            os_abi,
            machine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x86_64_linux() -> [u8; 0x14] {
        let mut buf = [0u8; 0x14];
        buf[0..4].copy_from_slice(&ElfIdent::MAGIC_BYTES);
        buf[4] = Class::CLASS64.0;
        buf[5] = Encoding::LSB2.0;
        buf[7] = OsAbi::LINUX.0;
        buf[0x12..0x14].copy_from_slice(&Machine::X86_64.0.to_le_bytes());
        buf
    }

    #[test]
    fn parses_x86_64_linux_ident() {
        let ident = ElfIdent::parse(&x86_64_linux()).unwrap();
        assert_eq!(ident.class, Class::CLASS64);
        assert_eq!(ident.machine, Machine::X86_64);
        assert_eq!(ident.os_abi, OsAbi::LINUX);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = x86_64_linux();
        buf[0] = 0;
        assert!(matches!(
            ElfIdent::parse(&buf),
            Err(ElfIdentError::InvalidMagicBytes(_))
        ));
    }

    #[test]
    fn rejects_truncated_slice() {
        assert!(matches!(
            ElfIdent::parse(&[0x7F, b'E', b'L', b'F']),
            Err(ElfIdentError::TooShort { .. })
        ));
    }

    #[test]
    fn reads_big_endian_machine_field() {
        let mut buf = x86_64_linux();
        buf[5] = Encoding::MSB2.0;
        buf[0x12..0x14].copy_from_slice(&Machine::ARM.0.to_be_bytes());
        let ident = ElfIdent::parse(&buf).unwrap();
        assert_eq!(ident.machine, Machine::ARM);
    }
}
