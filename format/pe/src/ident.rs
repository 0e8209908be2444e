//! Just enough of the DOS header and COFF file header to classify a PE image's target machine.

use core::fmt;

/// Errors returned while reading a [`PeIdent`] out of a byte slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeIdentError {
    /// `bytes` was too short to contain a DOS header.
    TooShort {
        /// Offset the read would have required.
        offset: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// The first two bytes weren't `MZ`.
    InvalidDosMagic([u8; 2]),
    /// The four bytes at `e_lfanew` weren't `PE\0\0`.
    InvalidPeSignature([u8; 4]),
}

impl fmt::Display for PeIdentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { offset, available } => {
                write!(f, "read at {offset:#x} exceeds the {available}-byte slice")
            }
            Self::InvalidDosMagic(bytes) => write!(f, "invalid DOS magic: {bytes:x?}"),
            Self::InvalidPeSignature(bytes) => write!(f, "invalid PE signature: {bytes:x?}"),
        }
    }
}

impl core::error::Error for PeIdentError {}

/// Target machine, read out of `IMAGE_FILE_HEADER.Machine`.
#[repr(transparent)]
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Machine(pub u16);

impl Machine {
    /// Unknown/unspecified.
    pub const UNKNOWN: Self = Self(0x0000);
    /// Intel 386.
    pub const I386: Self = Self(0x014C);
    /// ARM little-endian.
    pub const ARM: Self = Self(0x01C0);
    /// ARM Thumb-2 little-endian.
    pub const THUMB: Self = Self(0x01C2);
    /// ARM64 little-endian.
    pub const ARM64: Self = Self(0xAA64);
    /// x64.
    pub const AMD64: Self = Self(0x8664);
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UNKNOWN => f.pad("Unknown"),
            Self::I386 => f.pad("I386"),
            Self::ARM => f.pad("Arm"),
            Self::THUMB => f.pad("Thumb"),
            Self::ARM64 => f.pad("Arm64"),
            Self::AMD64 => f.pad("Amd64"),
            machine => f.debug_tuple("Machine").field(&machine.0).finish(),
        }
    }
}

/// The handful of PE fields needed to classify an image: the target machine read out of
/// `IMAGE_FILE_HEADER`, reached through the DOS header's `e_lfanew`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeIdent {
    /// Target machine of the image.
    pub machine: Machine,
}

impl PeIdent {
    /// DOS header magic bytes.
    pub const DOS_MAGIC: [u8; 2] = *b"MZ";
    /// PE signature bytes, found at `e_lfanew`.
    pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";

    /// Offset of `e_lfanew` within the DOS header.
    const E_LFANEW_OFFSET: usize = 0x3C;

    /// Reads a [`PeIdent`] out of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`PeIdentError::TooShort`] if `bytes` doesn't reach the COFF file header,
    /// [`PeIdentError::InvalidDosMagic`] if the first two bytes aren't `MZ`, or
    /// [`PeIdentError::InvalidPeSignature`] if the four bytes at `e_lfanew` aren't `PE\0\0`.
    pub fn parse(bytes: &[u8]) -> Result<Self, PeIdentError> {
        if bytes.len() < Self::E_LFANEW_OFFSET + 4 {
            return Err(PeIdentError::TooShort {
                offset: Self::E_LFANEW_OFFSET,
                available: bytes.len(),
            });
        }

        let dos_magic = [bytes[0], bytes[1]];
        if dos_magic != Self::DOS_MAGIC {
            return Err(PeIdentError::InvalidDosMagic(dos_magic));
        }

        let e_lfanew = u32::from_le_bytes([
            bytes[Self::E_LFANEW_OFFSET],
            bytes[Self::E_LFANEW_OFFSET + 1],
            bytes[Self::E_LFANEW_OFFSET + 2],
            bytes[Self::E_LFANEW_OFFSET + 3],
        ]) as usize;

        let signature_end = e_lfanew + 4;
        let machine_end = signature_end + 2;
        if bytes.len() < machine_end {
            return Err(PeIdentError::TooShort {
                offset: signature_end,
                available: bytes.len(),
            });
        }

        let signature = [
            bytes[e_lfanew],
            bytes[e_lfanew + 1],
            bytes[e_lfanew + 2],
            bytes[e_lfanew + 3],
        ];
        if signature != Self::PE_SIGNATURE {
            return Err(PeIdentError::InvalidPeSignature(signature));
        }

        let machine = Machine(u16::from_le_bytes([
            bytes[signature_end],
            bytes[signature_end + 1],
        ]));

        Ok(Self { machine })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amd64_image() -> [u8; 0x200] {
        let mut buf = [0u8; 0x200];
        buf[0..2].copy_from_slice(&PeIdent::DOS_MAGIC);
        buf[0x3C..0x40].copy_from_slice(&0x80u32.to_le_bytes());
        buf[0x80..0x84].copy_from_slice(&PeIdent::PE_SIGNATURE);
        buf[0x84..0x86].copy_from_slice(&Machine::AMD64.0.to_le_bytes());
        buf
    }

    #[test]
    fn parses_amd64_machine() {
        let ident = PeIdent::parse(&amd64_image()).unwrap();
        assert_eq!(ident.machine, Machine::AMD64);
    }

    #[test]
    fn rejects_bad_dos_magic() {
        let mut buf = amd64_image();
        buf[0] = 0;
        assert!(matches!(PeIdent::parse(&buf), Err(PeIdentError::InvalidDosMagic(_))));
    }

    #[test]
    fn rejects_bad_pe_signature() {
        let mut buf = amd64_image();
        buf[0x80] = 0;
        assert!(matches!(PeIdent::parse(&buf), Err(PeIdentError::InvalidPeSignature(_))));
    }
}
