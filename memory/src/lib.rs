//! Sparse, page-aligned virtual memory manager and heap allocator.
//!
//! [`MemoryManager`][manager::MemoryManager] tracks what is mapped where through a
//! [`MapIndex`][index::MapIndex], independent of the [`Engine`][engine::Engine] that actually
//! stores bytes. [`Heap`][heap::Heap] layers a best-fit allocator on top of a manager.
//!
//! This crate is `no_std` plus `alloc`: it has no opinion on whether it's hosted by a CLI
//! binary, a firmware stub, or an embedded target, only on having a heap to allocate
//! [`Vec`][alloc::vec::Vec]s and [`String`][alloc::string::String]s from.
#![no_std]

extern crate alloc;

pub mod engine;
pub mod error;
pub mod heap;
pub mod index;
pub mod label;
pub mod manager;
pub mod perms;

pub use engine::{Engine, EngineError, EngineRegion, HostEngine, PAGE_SIZE};
pub use error::MemoryError;
pub use heap::{Heap, HeapSnapshot};
pub use index::{MapIndex, RangeEntry};
pub use label::Label;
pub use manager::{MemoryManager, Snapshot};
pub use perms::Perms;
