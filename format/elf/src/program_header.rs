//! Just enough of the ELF program header table to find loadable segments.

use alloc::vec::Vec;
use core::fmt;

use crate::ident::{Class, ElfIdent, Encoding};

/// Errors returned while reading a [`ProgramHeaders`] table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramHeaderError {
    /// `bytes` ended before the program header table did.
    TooShort {
        /// Offset the read would have required.
        offset: usize,
        /// Number of bytes actually available.
        available: usize,
    },
}

impl fmt::Display for ProgramHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { offset, available } => {
                write!(f, "program header table entry at {offset:#x} exceeds the {available}-byte slice")
            }
        }
    }
}

impl core::error::Error for ProgramHeaderError {}

/// The kind of segment a [`ProgramHeader`] describes.
#[repr(transparent)]
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentType(pub u32);

impl SegmentType {
    /// Unused entry.
    pub const NULL: Self = Self(0);
    /// Loadable segment.
    pub const LOAD: Self = Self(1);
    /// Dynamic linking information.
    pub const DYNAMIC: Self = Self(2);
    /// Interpreter path.
    pub const INTERP: Self = Self(3);
}

impl fmt::Debug for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NULL => f.pad("Null"),
            Self::LOAD => f.pad("Load"),
            Self::DYNAMIC => f.pad("Dynamic"),
            Self::INTERP => f.pad("Interp"),
            ty => f.debug_tuple("SegmentType").field(&ty.0).finish(),
        }
    }
}

/// One entry of the program header table, with class-specific fields widened to `u64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramHeader {
    /// What kind of segment this is.
    pub segment_type: SegmentType,
    /// Segment permission flags: bit 0 executable, bit 1 writable, bit 2 readable (per the ELF
    /// spec's `PF_X`/`PF_W`/`PF_R`, in that bit order).
    pub flags: u32,
    /// Offset of the segment's first byte within the file.
    pub offset: u64,
    /// Address the segment's first byte should be placed at in memory.
    pub virtual_address: u64,
    /// Size of the segment within the file.
    pub file_size: u64,
    /// Size of the segment once loaded into memory; may exceed `file_size` (the remainder is
    /// zero-filled, e.g. for `.bss`).
    pub memory_size: u64,
}

/// A parsed program header table.
#[derive(Clone, Debug)]
pub struct ProgramHeaders {
    entries: Vec<ProgramHeader>,
}

impl ProgramHeaders {
    /// Parses the program header table out of a full ELF image, given its already-parsed
    /// [`ElfIdent`].
    ///
    /// # Errors
    ///
    /// Returns [`ProgramHeaderError::TooShort`] if the table extends past the end of `bytes`.
    pub fn parse(bytes: &[u8], ident: &ElfIdent) -> Result<Self, ProgramHeaderError> {
        let read_u16 = |offset: usize| -> Result<u16, ProgramHeaderError> {
            let slice = bytes
                .get(offset..offset + 2)
                .ok_or(ProgramHeaderError::TooShort { offset, available: bytes.len() })?;
            Ok(match ident.encoding {
                Encoding::MSB2 => u16::from_be_bytes([slice[0], slice[1]]),
                _ => u16::from_le_bytes([slice[0], slice[1]]),
            })
        };
        let read_u32 = |offset: usize| -> Result<u32, ProgramHeaderError> {
            let slice = bytes
                .get(offset..offset + 4)
                .ok_or(ProgramHeaderError::TooShort { offset, available: bytes.len() })?;
            let arr = [slice[0], slice[1], slice[2], slice[3]];
            Ok(match ident.encoding {
                Encoding::MSB2 => u32::from_be_bytes(arr),
                _ => u32::from_le_bytes(arr),
            })
        };
        let read_u64 = |offset: usize| -> Result<u64, ProgramHeaderError> {
            let slice = bytes
                .get(offset..offset + 8)
                .ok_or(ProgramHeaderError::TooShort { offset, available: bytes.len() })?;
            let mut arr = [0u8; 8];
            arr.copy_from_slice(slice);
            Ok(match ident.encoding {
                Encoding::MSB2 => u64::from_be_bytes(arr),
                _ => u64::from_le_bytes(arr),
            })
        };

        let (phoff, phentsize, phnum) = if ident.class == Class::CLASS64 {
            (read_u64(0x20)?, read_u16(0x36)?, read_u16(0x38)?)
        } else {
            (u64::from(read_u32(0x1C)?), read_u16(0x2A)?, read_u16(0x2C)?)
        };

        let mut entries = Vec::with_capacity(usize::from(phnum));
        for i in 0..phnum {
            #[expect(clippy::cast_possible_truncation, reason = "phoff/phentsize come from a real image; failure surfaces as TooShort")]
            let base = phoff as usize + usize::from(phentsize) * usize::from(i);

            let entry = if ident.class == Class::CLASS64 {
                ProgramHeader {
                    segment_type: SegmentType(read_u32(base)?),
                    flags: read_u32(base + 4)?,
                    offset: read_u64(base + 8)?,
                    virtual_address: read_u64(base + 16)?,
                    file_size: read_u64(base + 32)?,
                    memory_size: read_u64(base + 40)?,
                }
            } else {
                ProgramHeader {
                    segment_type: SegmentType(read_u32(base)?),
                    offset: u64::from(read_u32(base + 4)?),
                    virtual_address: u64::from(read_u32(base + 8)?),
                    file_size: u64::from(read_u32(base + 16)?),
                    memory_size: u64::from(read_u32(base + 20)?),
                    flags: read_u32(base + 24)?,
                }
            };
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    /// Every program header, in table order.
    #[must_use]
    pub fn entries(&self) -> &[ProgramHeader] {
        &self.entries
    }

    /// Every `PT_LOAD` segment, in table order.
    pub fn loadable_segments(&self) -> impl Iterator<Item = &ProgramHeader> {
        self.entries.iter().filter(|e| e.segment_type == SegmentType::LOAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{Encoding as ElfEncoding, OsAbi};

    fn minimal_elf64_one_load_segment() -> alloc::vec::Vec<u8> {
        let mut buf = alloc::vec![0u8; 0x20 + 56];
        buf[0..4].copy_from_slice(&ElfIdent::MAGIC_BYTES);
        buf[4] = Class::CLASS64.0;
        buf[5] = ElfEncoding::LSB2.0;
        buf[7] = OsAbi::LINUX.0;
        buf[0x20..0x28].copy_from_slice(&64u64.to_le_bytes()); // e_phoff
        buf[0x36..0x38].copy_from_slice(&56u16.to_le_bytes()); // e_phentsize
        buf[0x38..0x3A].copy_from_slice(&1u16.to_le_bytes()); // e_phnum

        let ph_base = 64;
        buf[ph_base..ph_base + 4].copy_from_slice(&SegmentType::LOAD.0.to_le_bytes());
        buf[ph_base + 4..ph_base + 8].copy_from_slice(&5u32.to_le_bytes()); // R+X
        buf[ph_base + 8..ph_base + 16].copy_from_slice(&0u64.to_le_bytes());
        buf[ph_base + 16..ph_base + 24].copy_from_slice(&0x400000u64.to_le_bytes());
        buf[ph_base + 32..ph_base + 40].copy_from_slice(&0x1000u64.to_le_bytes());
        buf[ph_base + 40..ph_base + 48].copy_from_slice(&0x1000u64.to_le_bytes());
        buf
    }

    #[test]
    fn parses_single_load_segment() {
        let bytes = minimal_elf64_one_load_segment();
        let ident = ElfIdent::parse(&bytes).unwrap();
        let headers = ProgramHeaders::parse(&bytes, &ident).unwrap();

        let loads: alloc::vec::Vec<_> = headers.loadable_segments().collect();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].virtual_address, 0x400000);
        assert_eq!(loads[0].memory_size, 0x1000);
    }
}
