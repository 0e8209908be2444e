//! Image loaders: given a program image's bytes, place its loadable segments into a
//! [`MemoryManager`] and report where execution should begin.
//!
//! The dispatcher's `loader_str` is derived from the OS, not declared directly: `ELF` for
//! Linux/FreeBSD, `MACHO` for macOS, `PE` for Windows.
#![no_std]

extern crate alloc;

use alloc::vec::Vec;

use binhost_memory::{Engine, Label, MemoryError, MemoryManager, Perms};

/// Result of successfully loading an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Loaded {
    /// Address execution should begin at.
    pub entry_point: u64,
    /// Lowest address any segment was placed at.
    pub base: u64,
}

/// Errors a [`Loader`] can report.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The image could not be parsed as this loader's format.
    #[error("malformed image: {0}")]
    Malformed(alloc::string::String),
    /// This loader doesn't implement the requested format yet.
    #[error("loading is not implemented for this format")]
    Unsupported,
    /// Placing a segment failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Places an image's segments into a guest address space.
pub trait Loader {
    /// Parses `image` and maps its loadable segments into `mm`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError`] if the image is malformed or a segment could not be mapped.
    fn load<E: Engine>(&self, image: &[u8], mm: &mut MemoryManager<E>) -> Result<Loaded, LoaderError>;
}

/// Loads ELF images by mapping every `PT_LOAD` segment at its declared virtual address.
#[derive(Clone, Copy, Debug, Default)]
pub struct ElfLoader;

impl ElfLoader {
    /// Reads `e_entry` out of a validated ELF image.
    fn entry_point(bytes: &[u8], ident: &binhost_elf::ElfIdent) -> u64 {
        let (offset, width) = if ident.class == binhost_elf::Class::CLASS64 {
            (0x18, 8)
        } else {
            (0x18, 4)
        };
        let Some(slice) = bytes.get(offset..offset + width) else {
            return 0;
        };
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(slice);
        match ident.encoding {
            binhost_elf::Encoding::MSB2 if width == 4 => u64::from(u32::from_be_bytes([
                slice[0], slice[1], slice[2], slice[3],
            ])),
            binhost_elf::Encoding::MSB2 => u64::from_be_bytes(buf),
            _ if width == 4 => u64::from(u32::from_le_bytes([
                slice[0], slice[1], slice[2], slice[3],
            ])),
            _ => u64::from_le_bytes(buf),
        }
    }
}

impl Loader for ElfLoader {
    fn load<E: Engine>(&self, image: &[u8], mm: &mut MemoryManager<E>) -> Result<Loaded, LoaderError> {
        let ident = binhost_elf::ElfIdent::parse(image)
            .map_err(|err| LoaderError::Malformed(alloc::format!("{err}")))?;
        let headers = binhost_elf::ProgramHeaders::parse(image, &ident)
            .map_err(|err| LoaderError::Malformed(alloc::format!("{err}")))?;

        let mut base: Option<u64> = None;

        for segment in headers.loadable_segments() {
            let page_start = (segment.virtual_address >> 12) << 12;
            let misalign = segment.virtual_address - page_start;
            let mapped_size = mm.align(segment.memory_size + misalign, 0x1000);

            let mut perms = Perms::NONE;
            if segment.flags & 0x4 != 0 {
                perms = perms | Perms::READ;
            }
            if segment.flags & 0x2 != 0 {
                perms = perms | Perms::WRITE;
            }
            if segment.flags & 0x1 != 0 {
                perms = perms | Perms::EXEC;
            }

            mm.map(page_start, mapped_size, perms, Some(Label::from("[elf-segment]")))?;

            let file_start = usize::try_from(segment.offset).unwrap_or(0);
            let file_len = usize::try_from(segment.file_size).unwrap_or(0);
            if let Some(bytes) = image.get(file_start..file_start + file_len) {
                mm.write(segment.virtual_address, bytes)?;
            }

            base = Some(base.map_or(page_start, |b: u64| b.min(page_start)));
        }

        Ok(Loaded {
            entry_point: Self::entry_point(image, &ident),
            base: base.unwrap_or(0),
        })
    }
}

/// Loads Mach-O images.
///
/// Segment placement for Mach-O load commands is not yet implemented; this exists so the
/// dispatcher's OS-to-loader resolution has a registrable target for macOS images.
#[derive(Clone, Copy, Debug, Default)]
pub struct MachOLoader;

impl Loader for MachOLoader {
    fn load<E: Engine>(&self, _image: &[u8], _mm: &mut MemoryManager<E>) -> Result<Loaded, LoaderError> {
        Err(LoaderError::Unsupported)
    }
}

/// Loads PE images.
///
/// Section placement for the PE/COFF section table is not yet implemented; this exists so the
/// dispatcher's OS-to-loader resolution has a registrable target for Windows images.
#[derive(Clone, Copy, Debug, Default)]
pub struct PeLoader;

impl Loader for PeLoader {
    fn load<E: Engine>(&self, _image: &[u8], _mm: &mut MemoryManager<E>) -> Result<Loaded, LoaderError> {
        Err(LoaderError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binhost_memory::HostEngine;

    fn minimal_elf64_one_load_segment() -> Vec<u8> {
        let mut buf = alloc::vec![0u8; 0x2000];
        buf[0..4].copy_from_slice(&binhost_elf::ElfIdent::MAGIC_BYTES);
        buf[4] = binhost_elf::Class::CLASS64.0;
        buf[5] = binhost_elf::Encoding::LSB2.0;
        buf[7] = binhost_elf::OsAbi::LINUX.0;
        buf[0x18..0x20].copy_from_slice(&0x401000u64.to_le_bytes()); // e_entry
        buf[0x20..0x28].copy_from_slice(&64u64.to_le_bytes()); // e_phoff
        buf[0x36..0x38].copy_from_slice(&56u16.to_le_bytes()); // e_phentsize
        buf[0x38..0x3A].copy_from_slice(&1u16.to_le_bytes()); // e_phnum

        let ph = 64;
        buf[ph..ph + 4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        buf[ph + 4..ph + 8].copy_from_slice(&5u32.to_le_bytes()); // R+X
        buf[ph + 8..ph + 16].copy_from_slice(&0u64.to_le_bytes()); // p_offset
        buf[ph + 16..ph + 24].copy_from_slice(&0x401000u64.to_le_bytes()); // p_vaddr
        buf[ph + 32..ph + 40].copy_from_slice(&0x1000u64.to_le_bytes()); // p_filesz
        buf[ph + 40..ph + 48].copy_from_slice(&0x1000u64.to_le_bytes()); // p_memsz

        buf[0x500] = 0x90; // a byte inside the segment's file image
        buf
    }

    #[test]
    fn elf_loader_maps_load_segment_and_reports_entry() {
        let image = minimal_elf64_one_load_segment();
        let mut mm = MemoryManager::new(64, HostEngine::new());

        let loaded = ElfLoader.load(&image, &mut mm).unwrap();
        assert_eq!(loaded.entry_point, 0x401000);
        assert_eq!(loaded.base, 0x401000);
        assert!(mm.is_mapped(0x401000, 0x1000));
        assert_eq!(mm.read(0x401500, 1).unwrap(), alloc::vec![0x90]);
    }

    #[test]
    fn macho_and_pe_loaders_report_unsupported() {
        let mut mm = MemoryManager::new(64, HostEngine::new());
        assert!(matches!(MachOLoader.load(&[], &mut mm), Err(LoaderError::Unsupported)));
        assert!(matches!(PeLoader.load(&[], &mut mm), Err(LoaderError::Unsupported)));
    }
}
