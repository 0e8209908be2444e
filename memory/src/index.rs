//! The map index (C2): the authoritative record of what is mapped where, independent of the
//! engine backing it.
//!
//! Mirrors `QlMemoryManager.map_info`'s destructive insert/delete walk: inserting or deleting a
//! range clips or removes every existing entry it overlaps, rather than merging or erroring.

use alloc::vec::Vec;

use crate::label::Label;
use crate::perms::Perms;

/// One record in the [`MapIndex`]: a `[start, end)` range with its permissions and label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeEntry {
    /// Inclusive start address.
    pub start: u64,
    /// Exclusive end address.
    pub end: u64,
    /// Permissions recorded for this range.
    pub perms: Perms,
    /// Label recorded for this range.
    pub label: Label,
}

impl RangeEntry {
    /// Size of the range in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` if `addr` falls within `[start, end)`.
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }
}

/// A flat, sorted record of mapped ranges, kept distinct from the [`Engine`][crate::engine::Engine]
/// so that permissions/labels can be queried and bookkept without a backend round-trip.
///
/// Entries are always kept sorted by `start` and never overlap one another; `insert` and
/// `remove` both clip any pre-existing entry they overlap, matching `add_mapinfo`/`del_mapinfo`.
#[derive(Clone, Debug, Default)]
pub struct MapIndex {
    entries: Vec<RangeEntry>,
}

impl MapIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Returns the entries, in ascending address order.
    #[must_use]
    pub fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }

    /// Records `[start, end)` with `perms`/`label`, clipping or splitting any entry it overlaps.
    ///
    /// This is destructive: unlike a typical interval map, overlapping entries are not merged
    /// with the new one — they are trimmed to the boundary and the new range wins outright,
    /// matching `add_mapinfo`'s walk-and-rebuild behavior.
    pub fn insert(&mut self, start: u64, end: u64, perms: Perms, label: Label) {
        self.clip(start, end);

        let pos = self
            .entries
            .iter()
            .position(|e| e.start >= start)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            pos,
            RangeEntry {
                start,
                end,
                perms,
                label,
            },
        );
    }

    /// Removes `[start, end)` from the index, clipping or splitting any entry it overlaps.
    pub fn remove(&mut self, start: u64, end: u64) {
        self.clip(start, end);
    }

    /// Clips every existing entry against `[start, end)`: entries entirely inside are dropped,
    /// entries straddling a boundary are truncated, entries strictly containing the range are
    /// split in two.
    fn clip(&mut self, start: u64, end: u64) {
        let mut rebuilt = Vec::with_capacity(self.entries.len() + 1);

        for entry in core::mem::take(&mut self.entries) {
            if entry.end <= start || entry.start >= end {
                rebuilt.push(entry);
                continue;
            }

            if entry.start < start {
                rebuilt.push(RangeEntry {
                    start: entry.start,
                    end: start,
                    perms: entry.perms,
                    label: entry.label.clone(),
                });
            }
            if entry.end > end {
                rebuilt.push(RangeEntry {
                    start: end,
                    end: entry.end,
                    perms: entry.perms,
                    label: entry.label,
                });
            }
        }

        rebuilt.sort_by_key(|e| e.start);
        self.entries = rebuilt;
    }

    /// Returns the entry containing `addr`, if any.
    #[must_use]
    pub fn find(&self, addr: u64) -> Option<&RangeEntry> {
        self.entries.iter().find(|e| e.contains(addr))
    }

    /// Returns `true` if every byte of `[addr, addr + size)` is covered by exactly one run of
    /// contiguous entries.
    #[must_use]
    pub fn is_fully_mapped(&self, addr: u64, size: u64) -> bool {
        let end = addr + size;
        let mut cursor = addr;
        for entry in &self.entries {
            if cursor >= end {
                break;
            }
            if entry.start > cursor {
                return false;
            }
            if entry.end > cursor {
                cursor = entry.end;
            }
        }
        cursor >= end
    }

    /// Returns `true` if any byte of `[addr, addr + size)` is covered by an entry.
    #[must_use]
    pub fn overlaps_any(&self, addr: u64, size: u64) -> bool {
        let end = addr + size;
        self.entries.iter().any(|e| e.start < end && addr < e.end)
    }

    /// Returns the first mapped entry whose label's basename equals `filename`, scanning in
    /// insertion/address order, matching `get_lib_base`'s `os.path.split(info)[1]` comparison.
    #[must_use]
    pub fn find_by_basename(&self, filename: &str) -> Option<&RangeEntry> {
        self.entries
            .iter()
            .find(|e| e.label.basename() == Some(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(start: u64, end: u64) -> RangeEntry {
        RangeEntry {
            start,
            end,
            perms: Perms::RW,
            label: Label::mapped(),
        }
    }

    #[test]
    fn insert_into_empty_index() {
        let mut index = MapIndex::new();
        index.insert(0x1000, 0x2000, Perms::RW, Label::mapped());
        assert_eq!(index.entries(), &[entry(0x1000, 0x2000)]);
    }

    #[test]
    fn insert_overlapping_clips_existing_entry() {
        let mut index = MapIndex::new();
        index.insert(0x1000, 0x3000, Perms::RW, Label::mapped());
        index.insert(0x2000, 0x2500, Perms::RX, Label::mapped());

        assert_eq!(index.entries().len(), 3);
        assert_eq!(index.entries()[0], entry(0x1000, 0x2000));
        assert_eq!(index.entries()[1].perms, Perms::RX);
        assert_eq!(index.entries()[1].start, 0x2000);
        assert_eq!(index.entries()[1].end, 0x2500);
        assert_eq!(index.entries()[2], entry(0x2500, 0x3000));
    }

    #[test]
    fn remove_splits_containing_entry() {
        let mut index = MapIndex::new();
        index.insert(0x0, 0x4000, Perms::RW, Label::mapped());
        index.remove(0x1000, 0x2000);

        assert_eq!(index.entries().len(), 2);
        assert_eq!(index.entries()[0], entry(0x0, 0x1000));
        assert_eq!(index.entries()[1], entry(0x2000, 0x4000));
    }

    #[test]
    fn is_fully_mapped_detects_gap() {
        let mut index = MapIndex::new();
        index.insert(0x0, 0x1000, Perms::RW, Label::mapped());
        index.insert(0x2000, 0x3000, Perms::RW, Label::mapped());

        assert!(!index.is_fully_mapped(0x0, 0x3000));
        assert!(index.is_fully_mapped(0x0, 0x1000));
    }

    #[test]
    fn find_by_basename_matches_final_path_component() {
        let mut index = MapIndex::new();
        index.insert(0x0, 0x1000, Perms::RX, Label::from("/usr/lib/libc.so.6"));
        assert!(index.find_by_basename("libc.so.6").is_some());
        assert!(index.find_by_basename("libc.so").is_none());
    }
}
