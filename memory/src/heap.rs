//! Heap allocator (C4) built on top of a [`MemoryManager`], matching `QlMemoryHeap`.
//!
//! The heap owns a fixed `[start, end)` arena. Chunks are bump-allocated within the arena's
//! already-mapped capacity; pages are only mapped in when capacity runs out, and never beyond
//! `end`. Best-fit reuse of a freed chunk is deliberately strict (`chunk.size > size`, never
//! `>=`): an exact-size free chunk is skipped over rather than reused.

use alloc::vec::Vec;

use crate::engine::{Engine, PAGE_SIZE};
use crate::error::MemoryError;
use crate::label::Label;
use crate::manager::MemoryManager;
use crate::perms::Perms;

/// One heap-managed allocation unit.
#[derive(Clone, Copy, Debug)]
struct Chunk {
    /// Start address of the chunk, somewhere within the arena.
    address: u64,
    /// Size requested by the allocation that created this chunk.
    size: u64,
    /// Whether the chunk is currently handed out to a caller.
    in_use: bool,
}

/// A best-fit-by-reuse bump allocator over a fixed `[start, end)` arena, layered on a
/// [`MemoryManager`].
#[derive(Clone, Debug)]
pub struct Heap {
    start: u64,
    end: u64,
    /// Bytes handed out to chunks so far (bump pointer offset from `start`).
    current_use: u64,
    /// Bytes currently backed by mapped pages (offset from `start`).
    current_alloc: u64,
    /// `(addr, size)` of every page range this heap has mapped.
    mem_alloc: Vec<(u64, u64)>,
    chunks: Vec<Chunk>,
}

/// A point-in-time copy of a [`Heap`]'s bookkeeping state.
pub type HeapSnapshot = Heap;

impl Heap {
    /// Creates a heap arena over `[start, end)`. No pages are mapped until the first
    /// [`alloc`][Self::alloc].
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            current_use: 0,
            current_alloc: 0,
            mem_alloc: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Finds the smallest free chunk strictly larger than `size`, if any.
    fn find_free(&self, size: u64) -> Option<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.in_use && c.size > size)
            .min_by_key(|(_, c)| c.size)
            .map(|(i, _)| i)
    }

    /// Allocates `size` bytes and returns its address, or `0` on failure.
    ///
    /// A `0` return is not a [`Result`] error: it mirrors the sentinel `QlMemoryHeap.alloc`
    /// returns on out-of-memory, which callers are expected to check for explicitly.
    pub fn alloc<E: Engine>(&mut self, mm: &mut MemoryManager<E>, size: u64) -> u64 {
        if let Some(i) = self.find_free(size) {
            self.chunks[i].in_use = true;
            return self.chunks[i].address;
        }

        if self.current_use + size > self.current_alloc {
            let real_size = mm.align(size, PAGE_SIZE);
            if self.start + self.current_use + real_size > self.end {
                return 0;
            }

            let map_addr = self.start + self.current_alloc;
            if mm.map(map_addr, real_size, Perms::RW, Some(Label::heap())).is_err() {
                return 0;
            }
            self.mem_alloc.push((map_addr, real_size));

            let chunk_addr = self.start + self.current_use;
            self.chunks.push(Chunk { address: chunk_addr, size, in_use: true });
            self.current_alloc += real_size;
            self.current_use += size;
            chunk_addr
        } else {
            let chunk_addr = self.start + self.current_use;
            self.chunks.push(Chunk { address: chunk_addr, size, in_use: true });
            self.current_use += size;
            chunk_addr
        }
    }

    /// Marks the in-use chunk at `addr` as free for reuse. Returns `false` if no in-use chunk
    /// starts at `addr`. The chunk's pages are not returned to the engine.
    pub fn free(&mut self, addr: u64) -> bool {
        match self.chunks.iter_mut().find(|c| c.address == addr && c.in_use) {
            Some(chunk) => {
                chunk.in_use = false;
                true
            }
            None => false,
        }
    }

    /// Returns the size of the in-use chunk at `addr`, or `0` if there isn't one.
    #[must_use]
    pub fn size(&self, addr: u64) -> u64 {
        self.chunks
            .iter()
            .find(|c| c.address == addr && c.in_use)
            .map_or(0, |c| c.size)
    }

    /// Frees every chunk, unmaps every page range this heap ever mapped, and resets the arena
    /// to its initial empty state.
    ///
    /// # Errors
    ///
    /// Propagates an [`EngineError`][crate::engine::EngineError] if a mapped range has since
    /// gone missing from the engine.
    pub fn clear<E: Engine>(&mut self, mm: &mut MemoryManager<E>) -> Result<(), MemoryError> {
        for (addr, size) in self.mem_alloc.drain(..) {
            mm.unmap(addr, size)?;
        }
        self.chunks.clear();
        self.current_use = 0;
        self.current_alloc = 0;
        Ok(())
    }

    /// Captures a point-in-time copy of this heap's bookkeeping state.
    ///
    /// Page contents live in the owning [`MemoryManager`]'s own
    /// [`save`][crate::manager::MemoryManager::save]; this only preserves chunk/arena
    /// bookkeeping, matching `QlMemoryHeap.save`'s state-tuple serialization.
    #[must_use]
    pub fn save(&self) -> HeapSnapshot {
        self.clone()
    }

    /// Restores this heap's bookkeeping state from a previous [`save`][Self::save].
    pub fn restore(&mut self, snapshot: &HeapSnapshot) {
        *self = snapshot.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HostEngine;

    fn manager() -> MemoryManager<HostEngine> {
        MemoryManager::new(64, HostEngine::new())
    }

    #[test]
    fn scenario_matches_spec_worked_example() {
        let mut mm = manager();
        let mut heap = Heap::new(0x10000, 0x11000);

        assert_eq!(heap.alloc(&mut mm, 0x500), 0x10000);
        assert_eq!(heap.alloc(&mut mm, 0x500), 0x10500);
        assert_eq!(heap.alloc(&mut mm, 0x800), 0);
    }

    #[test]
    fn exact_size_free_chunk_is_never_reused() {
        let mut mm = manager();
        let mut heap = Heap::new(0x0, 0x10000);

        let a = heap.alloc(&mut mm, 0x10);
        heap.free(a);

        let b = heap.alloc(&mut mm, 0x10);
        assert_ne!(b, a);
    }

    #[test]
    fn larger_free_chunk_is_reused() {
        let mut mm = manager();
        let mut heap = Heap::new(0x0, 0x10000);

        let big = heap.alloc(&mut mm, 0x100);
        heap.free(big);

        let reused = heap.alloc(&mut mm, 0x10);
        assert_eq!(reused, big);
        assert_eq!(heap.size(reused), 0x100);
    }

    #[test]
    fn clear_unmaps_every_mapped_range() {
        let mut mm = manager();
        let mut heap = Heap::new(0x10000, 0x20000);

        heap.alloc(&mut mm, 0x10);
        heap.clear(&mut mm).unwrap();
        assert!(mm.is_free(0x10000, 0x1000));
    }

    #[test]
    fn save_restore_round_trips_bookkeeping() {
        let mut mm = manager();
        let mut heap = Heap::new(0x10000, 0x20000);
        let a = heap.alloc(&mut mm, 0x10);
        let snap = heap.save();

        heap.free(a);
        assert_eq!(heap.find_free(0x1), Some(0));

        heap.restore(&snap);
        assert_eq!(heap.size(a), 0x10);
    }
}
