//! The memory manager (C3): the sparse, page-aligned address space that every engine access
//! and every loader/OS component goes through.
//!
//! Mirrors `QlMemoryManager`: an [`Engine`] does the actual byte storage, a [`MapIndex`] tracks
//! what is mapped where with what permissions and label, and this type ties the two together
//! with the alignment, search, and snapshot logic the original performs.

use alloc::string::String;
use alloc::vec::Vec;

use crate::engine::{Engine, PAGE_SIZE};
use crate::error::MemoryError;
use crate::index::{MapIndex, RangeEntry};
use crate::label::Label;
use crate::perms::Perms;

/// A point-in-time copy of a manager's mappings and their contents, produced by
/// [`MemoryManager::save`] and consumed by [`MemoryManager::restore`].
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Copy of the map index at save time.
    index: MapIndex,
    /// `(start, end, perms, data)` for every engine-known region at save time.
    regions: Vec<(u64, u64, Perms, Vec<u8>)>,
}

/// The sparse virtual address space of one emulated process or image.
#[derive(Debug)]
pub struct MemoryManager<E: Engine> {
    engine: E,
    index: MapIndex,
    /// Width of the address space, in bits: 64, 32, or 16 (20-bit real-mode addressing).
    archbit: u32,
    /// Highest addressable byte, inclusive.
    max_addr: u64,
}

/// Returns the archbit-width address mask: `(1 << archbit) - 1`, saturating at `u64::MAX` for
/// `archbit >= 64`.
fn arch_mask(archbit: u32) -> u64 {
    if archbit >= 64 {
        u64::MAX
    } else {
        (1u64 << archbit) - 1
    }
}

impl<E: Engine> MemoryManager<E> {
    /// Creates a manager over `engine` with an address space of `archbit` bits.
    ///
    /// `archbit` of 16 models 8086-style real-mode addressing and yields a 20-bit (1 MiB)
    /// address space, not a 16-bit one, matching the `archbit: 16 -> (1 << 20) - 1` table this
    /// is built from.
    #[must_use]
    pub fn new(archbit: u32, engine: E) -> Self {
        let max_addr = if archbit == 16 { (1u64 << 20) - 1 } else { arch_mask(archbit) };
        Self {
            engine,
            index: MapIndex::new(),
            archbit,
            max_addr,
        }
    }

    /// Highest addressable byte, inclusive.
    #[must_use]
    pub fn max_addr(&self) -> u64 {
        self.max_addr
    }

    /// Width of the address space, in bits.
    #[must_use]
    pub fn archbit(&self) -> u32 {
        self.archbit
    }

    /// A read-only view of the recorded mappings, in ascending address order.
    #[must_use]
    pub fn get_mapinfo(&self) -> &[RangeEntry] {
        self.index.entries()
    }

    /// Logs the mapping table at `info` level, one line per entry, matching `show_mapinfo`'s
    /// `"[+] %08x - %08x - %s    %s"` layout.
    pub fn show_mapinfo(&self) {
        tracing::info!("[+] Start      End        Perm.  Path");
        for entry in self.index.entries() {
            tracing::info!(
                "[+] {:08x} - {:08x} - {}    {}",
                entry.start,
                entry.end,
                entry.perms,
                entry.label
            );
        }
    }

    /// Rounds `addr` up to the next multiple of `alignment`, masked to the address space width.
    ///
    /// `alignment` must be a power of two.
    #[must_use]
    pub fn align(&self, addr: u64, alignment: u64) -> u64 {
        let mask = arch_mask(self.archbit) & alignment.wrapping_neg();
        addr.wrapping_add(alignment).wrapping_sub(1) & mask
    }

    /// Maps `[addr, addr + size)` with `perms`, recording `label` (or `"[mapped]"` if absent).
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::MappedAlready`] if any byte in the range is already mapped, or
    /// propagates an [`EngineError`][crate::engine::EngineError] from the backend.
    pub fn map(
        &mut self,
        addr: u64,
        size: u64,
        perms: Perms,
        label: Option<Label>,
    ) -> Result<(), MemoryError> {
        if self.index.overlaps_any(addr, size) {
            return Err(MemoryError::MappedAlready { addr });
        }

        self.engine.map_pages(addr, size, perms)?;
        self.index.insert(addr, addr + size, perms, label.unwrap_or_else(Label::mapped));
        tracing::debug!(addr = format_args!("{addr:#x}"), size = format_args!("{size:#x}"), %perms, "mapped");
        Ok(())
    }

    /// Maps `[addr, addr + size)` backed by an externally-owned host buffer.
    ///
    /// Calls straight through to [`Engine::map_pages_ptr`] with no overlap check and no
    /// [`MapIndex`] update, matching spec.md §4.3.3's `host_ptr`-path contract verbatim: this
    /// range is invisible to [`get_mapinfo`][Self::get_mapinfo]/[`show_mapinfo`][Self::show_mapinfo]
    /// and to [`is_mapped`][Self::is_mapped], unlike a range mapped through [`map`][Self::map].
    ///
    /// # Safety
    ///
    /// See [`Engine::map_pages_ptr`]: `host_ptr` must stay valid for `size` bytes until a
    /// matching [`MemoryManager::unmap`].
    ///
    /// # Errors
    ///
    /// Propagates an [`EngineError`][crate::engine::EngineError] if the engine itself rejects
    /// the range (e.g. it overlaps an existing engine-level mapping).
    pub unsafe fn map_ptr(
        &mut self,
        addr: u64,
        size: u64,
        perms: Perms,
        host_ptr: *mut u8,
    ) -> Result<(), MemoryError> {
        // SAFETY: forwarded verbatim; caller upholds the same contract documented above.
        unsafe { self.engine.map_pages_ptr(addr, size, perms, host_ptr)? };
        Ok(())
    }

    /// Unmaps `[addr, addr + size)`.
    ///
    /// # Errors
    ///
    /// Propagates an [`EngineError`][crate::engine::EngineError] if the range is not (fully)
    /// mapped in the engine.
    pub fn unmap(&mut self, addr: u64, size: u64) -> Result<(), MemoryError> {
        self.engine.unmap_pages(addr, size)?;
        self.index.remove(addr, addr + size);
        Ok(())
    }

    /// Unmaps every currently-mapped range.
    ///
    /// # Errors
    ///
    /// Propagates an [`EngineError`][crate::engine::EngineError] if a recorded range has since
    /// gone missing from the engine.
    pub fn unmap_all(&mut self) -> Result<(), MemoryError> {
        let ranges: Vec<(u64, u64)> = self.index.entries().iter().map(|e| (e.start, e.end)).collect();
        for (start, end) in ranges {
            self.unmap(start, end - start)?;
        }
        Ok(())
    }

    /// Changes permissions on the pages covering `[addr, addr + size)`.
    ///
    /// Deliberately does not update the recorded [`MapIndex`] permissions: `protect_pages`
    /// changes what the engine enforces, but `get_mapinfo`/`show_mapinfo` keep reporting the
    /// permissions the range was mapped with. This mirrors `protect()`'s behavior, which never
    /// touches `map_info` either.
    ///
    /// # Errors
    ///
    /// Propagates an [`EngineError`][crate::engine::EngineError] if the range is not (fully)
    /// mapped.
    pub fn protect(&mut self, addr: u64, size: u64, perms: Perms) -> Result<(), MemoryError> {
        let aligned_addr = (addr >> 12) << 12;
        let aligned_size = self.align((addr & 0xFFF) + size, PAGE_SIZE);
        self.engine.protect_pages(aligned_addr, aligned_size, perms)?;
        Ok(())
    }

    /// Returns `true` if any byte of `[addr, addr + size)` is mapped.
    #[must_use]
    pub fn is_mapped(&self, addr: u64, size: u64) -> bool {
        self.index.overlaps_any(addr, size)
    }

    /// Returns `true` if `[addr, addr + size)` is unmapped, or if it's mapped but every byte in
    /// it currently reads as `0x00` or `0xFF`.
    ///
    /// A mapped-but-still-zeroed-or-erased range counts as free: this matches scratch regions a
    /// loader has reserved but not yet written into.
    #[must_use]
    pub fn is_free(&self, addr: u64, size: u64) -> bool {
        if !self.index.overlaps_any(addr, size) {
            return true;
        }
        match self.read(addr, size) {
            Ok(bytes) => bytes.iter().all(|&b| b == 0x00 || b == 0xFF),
            Err(_) => false,
        }
    }

    /// Returns `true` if `[addr, addr + size)` can be mapped right now.
    ///
    /// Implemented by attempting the map and immediately undoing it on success, rather than by
    /// inspecting the index directly, so that it always agrees with what [`map`][Self::map]
    /// would actually do.
    pub fn is_available(&mut self, addr: u64, size: u64) -> bool {
        match self.map(addr, size, Perms::NONE, None) {
            Ok(()) => {
                let _ = self.unmap(addr, size);
                true
            }
            Err(_) => false,
        }
    }

    /// Finds the lowest `alignment`-aligned address of a free gap of at least `size` bytes at
    /// or above `min_addr`.
    ///
    /// On an empty index, the sole candidate is `align(min_addr, alignment)`. Otherwise every
    /// candidate is generated *after* a region — `align(region.end, alignment)`, capped below by
    /// `min_addr` — never in the space before the first region, matching the per-region walk
    /// `find_free_space` performs in the original. A candidate is valid only when
    /// `candidate + size` lands *strictly before* the next region's start (or
    /// [`max_addr`][Self::max_addr] for the final gap) and the candidate range isn't mapped —
    /// a gap that reaches exactly to that boundary is rejected even though it would technically
    /// fit.
    #[must_use]
    pub fn find_free_space(&self, size: u64, min_addr: u64, alignment: u64) -> Option<u64> {
        let mut candidate = self.align(min_addr, alignment);
        let entries = self.index.entries();

        if entries.is_empty() {
            return (candidate + size < self.max_addr).then_some(candidate);
        }

        for (i, entry) in entries.iter().enumerate() {
            candidate = candidate.max(self.align(entry.end, alignment));
            let gap_end = entries.get(i + 1).map_or(self.max_addr, |next| next.start);
            if candidate + size < gap_end && !self.index.overlaps_any(candidate, size) {
                return Some(candidate);
            }
        }

        None
    }

    /// Finds a free gap of `align(size, PAGE_SIZE)` bytes at or above `min_addr`, aligned to
    /// `alignment`, and maps it.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfMemory`] if no gap of that size exists.
    pub fn map_anywhere(
        &mut self,
        size: u64,
        perms: Perms,
        label: Option<Label>,
        min_addr: u64,
        alignment: u64,
    ) -> Result<u64, MemoryError> {
        let size = self.align(size, PAGE_SIZE);
        let addr = self
            .find_free_space(size, min_addr, alignment)
            .ok_or(MemoryError::OutOfMemory { size })?;
        self.map(addr, size, perms, label)?;
        Ok(addr)
    }

    /// Reads `size` bytes starting at `addr`.
    ///
    /// # Errors
    ///
    /// Propagates an [`EngineError`][crate::engine::EngineError] if the range is not (fully)
    /// mapped.
    pub fn read(&self, addr: u64, size: u64) -> Result<Vec<u8>, MemoryError> {
        Ok(self.engine.read_bytes(addr, size)?)
    }

    /// Writes `data` starting at `addr`.
    ///
    /// On failure, logs the mapping table before propagating the error, matching `write`'s
    /// `show_mapinfo()`-then-log-then-raise behavior.
    ///
    /// # Errors
    ///
    /// Propagates an [`EngineError`][crate::engine::EngineError] if the range is not (fully)
    /// mapped.
    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemoryError> {
        self.engine.write_bytes(addr, data).inspect_err(|err| {
            self.show_mapinfo();
            tracing::error!(addr = format_args!("{addr:#x}"), len = data.len(), %err, "write failed");
        })?;
        Ok(())
    }

    /// Reads a NUL-terminated byte string starting at `addr`, not including the terminator.
    ///
    /// # Errors
    ///
    /// Propagates an [`EngineError`][crate::engine::EngineError] if a byte cannot be read before
    /// a NUL terminator is found.
    pub fn read_cstring(&self, addr: u64) -> Result<Vec<u8>, MemoryError> {
        let mut out = Vec::new();
        let mut cursor = addr;
        loop {
            let byte = self.read(cursor, 1)?[0];
            if byte == 0 {
                return Ok(out);
            }
            out.push(byte);
            cursor += 1;
        }
    }

    /// Reads a NUL-terminated byte string and lossily decodes it as UTF-8.
    ///
    /// # Errors
    ///
    /// See [`read_cstring`][Self::read_cstring].
    pub fn read_cstring_lossy(&self, addr: u64) -> Result<String, MemoryError> {
        Ok(String::from_utf8_lossy(&self.read_cstring(addr)?).into_owned())
    }

    /// Writes `data` followed by a NUL terminator starting at `addr`.
    ///
    /// # Errors
    ///
    /// See [`write`][Self::write].
    pub fn write_cstring(&mut self, addr: u64, data: &[u8]) -> Result<(), MemoryError> {
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.extend_from_slice(data);
        buf.push(0);
        self.write(addr, &buf)
    }

    /// Reads a little-endian pointer-sized value starting at `addr`.
    ///
    /// `ptr_size` is the pointer width in bytes for the architecture being emulated (2, 4, or
    /// 8), independent of the manager's own `archbit`-wide address space.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::UnsupportedPointerSize`] if `ptr_size` exceeds 8 bytes, or
    /// propagates an [`EngineError`][crate::engine::EngineError] if the address is not mapped.
    pub fn read_ptr(&self, addr: u64, ptr_size: u8) -> Result<u64, MemoryError> {
        if ptr_size > 8 {
            return Err(MemoryError::UnsupportedPointerSize {
                archbit: u32::from(ptr_size) * 8,
            });
        }
        let bytes = self.read(addr, u64::from(ptr_size))?;
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Searches every mapped byte within `[begin, end)` for `needle`, returning every match
    /// start address in ascending order. `begin`/`end` default to the full address space when
    /// `None`.
    #[must_use]
    pub fn search(&self, needle: &[u8], begin: Option<u64>, end: Option<u64>) -> Vec<u64> {
        if needle.is_empty() {
            return Vec::new();
        }

        let begin = begin.unwrap_or(0);
        let end = end.unwrap_or(self.max_addr);
        let mut hits = Vec::new();

        for entry in self.index.entries() {
            let scan_start = entry.start.max(begin);
            let scan_end = entry.end.min(end);
            if scan_end <= scan_start {
                continue;
            }
            let Ok(bytes) = self.read(scan_start, scan_end - scan_start) else {
                continue;
            };
            for (offset, window) in bytes.windows(needle.len()).enumerate() {
                if window == needle {
                    hits.push(scan_start + conversion::usize_to_u64_truncating(offset));
                }
            }
        }

        hits
    }

    /// Returns the base address of the mapped range whose label's basename is `filename`.
    #[must_use]
    pub fn get_lib_base(&self, filename: &str) -> Option<u64> {
        self.index.find_by_basename(filename).map(|e| e.start)
    }

    /// Captures a point-in-time copy of every mapping and its contents.
    #[must_use]
    pub fn save(&self) -> Snapshot {
        let regions = self
            .engine
            .regions()
            .into_iter()
            .map(|r| {
                let data = self.engine.read_bytes(r.start, r.end - r.start).unwrap_or_default();
                (r.start, r.end, r.perms, data)
            })
            .collect();
        Snapshot {
            index: self.index.clone(),
            regions,
        }
    }

    /// Restores the manager to a previously [`save`][Self::save]d state, discarding every
    /// mapping made since.
    ///
    /// # Errors
    ///
    /// Propagates an [`EngineError`][crate::engine::EngineError] if the snapshot cannot be
    /// replayed onto the engine.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), MemoryError> {
        self.unmap_all()?;
        for (start, end, perms, data) in &snapshot.regions {
            self.engine.map_pages(*start, end - start, *perms)?;
            self.engine.write_bytes(*start, data)?;
        }
        self.index = snapshot.index.clone();
        Ok(())
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
    fn map_rejects_overlap_and_records_label() {
        let mut mm = manager();
        mm.map(0x1000, 0x1000, Perms::RW, Some(Label::from("/bin/a"))).unwrap();
        assert!(matches!(
            mm.map(0x1800, 0x100, Perms::RW, None),
            Err(MemoryError::MappedAlready { addr: 0x1800 })
        ));
        assert_eq!(mm.get_lib_base("a"), Some(0x1000));
    }

    #[test]
    fn protect_does_not_touch_index_perms() {
        let mut mm = manager();
        mm.map(0x1000, 0x1000, Perms::RW, None).unwrap();
        mm.protect(0x1000, 0x1000, Perms::RX).unwrap();
        assert_eq!(mm.get_mapinfo()[0].perms, Perms::RW);
    }

    #[test]
    fn find_free_space_on_empty_map_returns_aligned_min_addr() {
        let mm = MemoryManager::new(32, HostEngine::new());
        assert_eq!(mm.find_free_space(0x1000, 0x10000, 0x10000), Some(0x10000));
    }

    #[test]
    fn find_free_space_skips_occupied_region() {
        let mut mm = manager();
        mm.map(0x10000, 0x10000, Perms::RW, None).unwrap();
        assert_eq!(mm.find_free_space(0x1000, 0x0, 0x10000), Some(0x20000));
    }

    #[test]
    fn is_available_round_trips_without_leaving_a_mapping() {
        let mut mm = manager();
        assert!(mm.is_available(0x5000, 0x1000));
        assert!(mm.is_free(0x5000, 0x1000));
    }

    #[test]
    fn read_write_cstring_round_trips() {
        let mut mm = manager();
        mm.map(0x1000, 0x1000, Perms::RW, None).unwrap();
        mm.write_cstring(0x1000, b"hello").unwrap();
        assert_eq!(mm.read_cstring(0x1000).unwrap(), b"hello");
    }

    #[test]
    fn search_finds_needle_across_regions() {
        let mut mm = manager();
        mm.map(0x1000, 0x1000, Perms::RW, None).unwrap();
        mm.map(0x2000, 0x1000, Perms::RW, None).unwrap();
        mm.write(0x1FFE, b"MZ").unwrap();
        assert_eq!(mm.search(b"MZ", None, None), alloc::vec![0x1FFE]);
    }

    #[test]
    fn save_restore_round_trips_contents_and_mappings() {
        let mut mm = manager();
        mm.map(0x1000, 0x1000, Perms::RW, Some(Label::from("x"))).unwrap();
        mm.write(0x1000, b"abcd").unwrap();
        let snap = mm.save();

        mm.write(0x1000, b"zzzz").unwrap();
        mm.map(0x2000, 0x1000, Perms::RW, None).unwrap();

        mm.restore(&snap).unwrap();
        assert_eq!(mm.read(0x1000, 4).unwrap(), b"abcd");
        assert!(mm.is_free(0x2000, 0x1000));
    }

    #[test]
    fn read_ptr_rejects_oversized_width() {
        let mm = manager();
        assert!(matches!(
            mm.read_ptr(0x1000, 16),
            Err(MemoryError::UnsupportedPointerSize { .. })
        ));
    }
}
