//! Errors produced by the memory manager and heap allocator.

use crate::engine::EngineError;

/// Errors surfaced by [`MemoryManager`][crate::manager::MemoryManager].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MemoryError {
    /// [`map`][crate::manager::MemoryManager::map] was asked to map a range that is already
    /// (partially) mapped.
    #[error("address {addr:#x} is already mapped")]
    MappedAlready {
        /// The address the caller attempted to map.
        addr: u64,
    },
    /// No gap large enough for the requested size could be found by
    /// [`map_anywhere`][crate::manager::MemoryManager::map_anywhere] or
    /// [`find_free_space`][crate::manager::MemoryManager::find_free_space].
    #[error("no free region of size {size:#x} found")]
    OutOfMemory {
        /// The requested size, in bytes.
        size: u64,
    },
    /// The address space's bit width cannot represent a pointer-sized value on the host.
    #[error("{archbit}-bit address space cannot host a native pointer")]
    UnsupportedPointerSize {
        /// The offending address space width.
        archbit: u32,
    },
    /// The underlying [`Engine`][crate::engine::Engine] reported a failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
