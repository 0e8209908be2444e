//! Image sniffer (C5): infers `(arch, os)` from the leading bytes of a program image, without
//! needing the caller to declare either ahead of time.
//!
//! Classification is sequential and mirrors `ql_checkostype`: try ELF first, then Mach-O, then
//! PE; the first format whose magic, OS indicator, and machine value all resolve wins. A file
//! can have ELF magic bytes and still fall through to the next check if its `e_ident[EI_OSABI]`
//! or `e_machine` isn't one this framework recognizes.
#![no_std]

use binhost_arch::Arch;
use binhost_os::Os;

/// Errors returned by [`sniff`].
#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
pub enum SniffError {
    /// None of the ELF, Mach-O, or PE checks could classify the image.
    #[error("could not classify image: not a recognized ELF, Mach-O, or PE file")]
    UnknownOs,
}

/// Classifies the architecture and operating system an image targets from its first bytes.
///
/// `bytes` should contain at least the first 64 bytes of the file; PE images additionally need
/// enough of the file to reach the COFF header via `e_lfanew` (typically under 512 bytes).
///
/// # Errors
///
/// Returns [`SniffError::UnknownOs`] if no supported format could be classified.
pub fn sniff(bytes: &[u8]) -> Result<(Arch, Os), SniffError> {
    try_elf(bytes)
        .or_else(|| try_macho(bytes))
        .or_else(|| try_pe(bytes))
        .ok_or(SniffError::UnknownOs)
}

fn try_elf(bytes: &[u8]) -> Option<(Arch, Os)> {
    let ident = binhost_elf::ElfIdent::parse(bytes).ok()?;

    let os = match ident.os_abi.0 {
        0x00 | 0x03 | 0x11 => Os::Linux,
        0x09 => Os::FreeBsd,
        _ => return None,
    };

    let arch = match ident.machine {
        binhost_elf::Machine::X86 => Arch::X86,
        binhost_elf::Machine::MIPS => Arch::Mips32,
        binhost_elf::Machine::ARM => Arch::Arm,
        binhost_elf::Machine::AARCH64 => Arch::Arm64,
        binhost_elf::Machine::X86_64 => Arch::X8664,
        _ => return None,
    };

    Some((arch, os))
}

/// The three Mach-O magic numbers: 32-bit, 64-bit, and fat/universal binaries.
const MACHO_MAGICS: [[u8; 4]; 3] = [
    [0xCF, 0xFA, 0xED, 0xFE],
    [0xCE, 0xFA, 0xED, 0xFE],
    [0xCA, 0xFE, 0xBA, 0xBE],
];

fn try_macho(bytes: &[u8]) -> Option<(Arch, Os)> {
    let magic = bytes.get(0..4)?;
    if !MACHO_MAGICS.iter().any(|m| m == magic) {
        return None;
    }

    let cpu_type = *bytes.get(4)?;
    let cpu_subtype_byte = *bytes.get(7)?;

    let arch = match (cpu_type, cpu_subtype_byte) {
        (7, 1) => Arch::X8664,
        (12, 1) => Arch::Arm64,
        _ => return None,
    };

    Some((arch, Os::MacOs))
}

fn try_pe(bytes: &[u8]) -> Option<(Arch, Os)> {
    let ident = binhost_pe::PeIdent::parse(bytes).ok()?;

    let arch = match ident.machine {
        binhost_pe::Machine::I386 => Arch::X86,
        binhost_pe::Machine::AMD64 => Arch::X8664,
        binhost_pe::Machine::ARM | binhost_pe::Machine::THUMB => Arch::Arm,
        binhost_pe::Machine::ARM64 => Arch::Arm64,
        _ => return None,
    };

    Some((arch, Os::Windows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_x86_linux_elf() {
        let mut bytes = [0u8; 0x14];
        bytes[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        bytes[4] = 1; // 32-bit
        bytes[5] = 1; // little-endian
        bytes[7] = 0x00; // Linux
        bytes[0x12..0x14].copy_from_slice(&3u16.to_le_bytes());

        assert_eq!(sniff(&bytes), Ok((Arch::X86, Os::Linux)));
    }

    #[test]
    fn sniffs_arm64_macos() {
        let mut bytes = [0u8; 8];
        bytes[0..4].copy_from_slice(&[0xCF, 0xFA, 0xED, 0xFE]);
        bytes[4] = 12;
        bytes[7] = 1;

        assert_eq!(sniff(&bytes), Ok((Arch::Arm64, Os::MacOs)));
    }

    #[test]
    fn sniffs_amd64_windows_pe() {
        let mut bytes = [0u8; 0x200];
        bytes[0..2].copy_from_slice(b"MZ");
        bytes[0x3C..0x40].copy_from_slice(&0x80u32.to_le_bytes());
        bytes[0x80..0x84].copy_from_slice(b"PE\0\0");
        bytes[0x84..0x86].copy_from_slice(&0x8664u16.to_le_bytes());

        assert_eq!(sniff(&bytes), Ok((Arch::X8664, Os::Windows)));
    }

    #[test]
    fn falls_through_elf_with_unrecognized_osabi_to_unknown() {
        let mut bytes = [0u8; 0x14];
        bytes[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        bytes[4] = 1;
        bytes[5] = 1;
        bytes[7] = 0xFF; // not Linux or FreeBSD
        bytes[0x12..0x14].copy_from_slice(&3u16.to_le_bytes());

        assert_eq!(sniff(&bytes), Err(SniffError::UnknownOs));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(sniff(&[0u8; 16]), Err(SniffError::UnknownOs));
    }
}
