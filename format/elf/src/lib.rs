//! A trimmed-down, `no_std` ELF reader: just enough of `e_ident` and `e_machine` to classify an
//! image and to locate its program headers.
#![no_std]

extern crate alloc;

pub mod ident;
pub mod program_header;

pub use ident::{Class, ElfIdent, ElfIdentError, Encoding, Machine, OsAbi};
pub use program_header::{ProgramHeader, ProgramHeaderError, ProgramHeaders, SegmentType};
