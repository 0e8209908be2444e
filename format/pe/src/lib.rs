//! A trimmed-down PE/COFF reader: just enough to classify a Windows image's target machine.
#![no_std]

pub mod ident;

pub use ident::{Machine, PeIdent, PeIdentError};
