//! # Boot Memory Map
//!
//! Firmware reports physical memory as a list of E820-style records:
//!
//! ```text
//! offset  size  field
//! 0       8     base address
//! 8       8     length in bytes
//! 16      4     region type
//! 20      4     extended attributes (ACPI 3.0)
//! ```
//!
//! [`MemoryMap`] copies those records verbatim into a fixed table of
//! [`MEMORY_MAP_CAPACITY`] entries. Records past the capacity are dropped;
//! the reported count is kept so the boot path can warn about it. Region
//! types are not interpreted here, [`E820Entry::kind`] is only a view.

use core::fmt;

use crate::config::MEMORY_MAP_CAPACITY;
use crate::memory::raw;

pub const E820_ENTRY_SIZE: usize = 24;

/// Set in the extended attributes when the entry should not be ignored.
pub const EXT_ENABLED: u32 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct E820Entry {
    pub base: u64,
    pub length: u64,
    pub region_type: u32,
    pub extended: u32,
}

const _: () = assert!(core::mem::size_of::<E820Entry>() == E820_ENTRY_SIZE);

impl E820Entry {
    pub const fn new(base: u64, length: u64, region_type: u32, extended: u32) -> Self {
        Self {
            base,
            length,
            region_type,
            extended,
        }
    }

    /// One past the last byte, or `None` if the range wraps the address space.
    pub fn end(&self) -> Option<u64> {
        self.base.checked_add(self.length)
    }

    pub fn kind(&self) -> RegionKind {
        RegionKind::from(self.region_type)
    }

    pub fn is_usable(&self) -> bool {
        self.kind() == RegionKind::Usable && self.length > 0 && self.end().is_some()
    }
}

impl fmt::Display for E820Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#018x} - {:#018x} ({:>8} KB) [{}]",
            self.base,
            self.base.saturating_add(self.length),
            self.length / 1024,
            self.kind()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Usable,
    Reserved,
    AcpiReclaimable,
    AcpiNvs,
    BadMemory,
    Unknown(u32),
}

impl RegionKind {
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Usable => 1,
            Self::Reserved => 2,
            Self::AcpiReclaimable => 3,
            Self::AcpiNvs => 4,
            Self::BadMemory => 5,
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<u32> for RegionKind {
    fn from(raw: u32) -> Self {
        match raw {
            1 => Self::Usable,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::BadMemory,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usable => write!(f, "Usable"),
            Self::Reserved => write!(f, "Reserved"),
            Self::AcpiReclaimable => write!(f, "ACPI reclaimable"),
            Self::AcpiNvs => write!(f, "ACPI NVS"),
            Self::BadMemory => write!(f, "Bad"),
            Self::Unknown(raw) => write!(f, "Unknown({})", raw),
        }
    }
}

#[derive(Clone)]
pub struct MemoryMap {
    entries: [E820Entry; MEMORY_MAP_CAPACITY],
    count: usize,
    reported: usize,
}

impl MemoryMap {
    pub const fn empty() -> Self {
        Self {
            entries: [E820Entry::new(0, 0, 0, 0); MEMORY_MAP_CAPACITY],
            count: 0,
            reported: 0,
        }
    }

    /// Copies the first `min(count, capacity)` firmware records.
    ///
    /// # Safety
    ///
    /// `records` must point to at least `min(count, MEMORY_MAP_CAPACITY)`
    /// readable, aligned records that do not overlap the returned map.
    pub unsafe fn parse(records: *const E820Entry, count: usize) -> Self {
        let mut map = Self::empty();
        let kept = count.min(MEMORY_MAP_CAPACITY);
        raw::copy(map.entries.as_mut_ptr(), records, kept);
        map.count = kept;
        map.reported = count;
        map
    }

    pub fn from_entries(records: &[E820Entry]) -> Self {
        // SAFETY: a slice is valid for all of its elements, and `parse`
        // never reads more than `records.len()` of them.
        unsafe { Self::parse(records.as_ptr(), records.len()) }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub const fn capacity(&self) -> usize {
        MEMORY_MAP_CAPACITY
    }

    /// How many records the firmware handed over, including dropped ones.
    pub fn reported_count(&self) -> usize {
        self.reported
    }

    pub fn is_truncated(&self) -> bool {
        self.reported > self.count
    }

    pub fn entries(&self) -> &[E820Entry] {
        &self.entries[..self.count]
    }

    pub fn iter(&self) -> impl Iterator<Item = &E820Entry> {
        self.entries().iter()
    }

    pub fn get(&self, index: usize) -> Option<&E820Entry> {
        self.entries().get(index)
    }

    pub fn usable(&self) -> impl Iterator<Item = &E820Entry> {
        self.iter().filter(|entry| entry.is_usable())
    }

    /// The biggest usable region; the first one wins on ties.
    pub fn largest_usable(&self) -> Option<&E820Entry> {
        self.usable()
            .fold(None, |best: Option<&E820Entry>, entry| match best {
                Some(current) if current.length >= entry.length => Some(current),
                _ => Some(entry),
            })
    }

    pub fn total_usable(&self) -> u64 {
        self.usable()
            .fold(0u64, |total, entry| total.saturating_add(entry.length))
    }
}

impl fmt::Debug for MemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMap")
            .field("entries", &self.entries())
            .field("reported", &self.reported)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u64) -> E820Entry {
        E820Entry::new(index * 0x1000, 0x1000, (index % 5) as u32 + 1, EXT_ENABLED)
    }

    #[test]
    fn parses_legacy_low_memory_layout() {
        let records = [
            E820Entry::new(0x0, 0x9fc00, 1, 0),
            E820Entry::new(0x9fc00, 0x400, 2, 0),
            E820Entry::new(0xf0000, 0xf0000, 2, 0),
        ];
        let map = unsafe { MemoryMap::parse(records.as_ptr(), records.len()) };

        assert_eq!(map.len(), 3);
        assert_eq!(map.entries(), &records);
        assert!(!map.is_truncated());
        assert_eq!(map.get(0).map(E820Entry::kind), Some(RegionKind::Usable));
        assert_eq!(map.get(1).map(E820Entry::kind), Some(RegionKind::Reserved));
    }

    #[test]
    fn keeps_every_record_up_to_capacity() {
        let records: Vec<E820Entry> = (0..MEMORY_MAP_CAPACITY as u64).map(record).collect();
        let map = MemoryMap::from_entries(&records);

        assert_eq!(map.len(), MEMORY_MAP_CAPACITY);
        assert_eq!(map.entries(), records.as_slice());
        assert!(!map.is_truncated());
    }

    #[test]
    fn drops_records_past_capacity() {
        let records: Vec<E820Entry> = (0..200).map(record).collect();
        let map = MemoryMap::from_entries(&records);

        assert_eq!(map.len(), MEMORY_MAP_CAPACITY);
        assert_eq!(map.entries(), &records[..MEMORY_MAP_CAPACITY]);
        assert_eq!(map.reported_count(), 200);
        assert!(map.is_truncated());
    }

    #[test]
    fn parse_reads_only_the_kept_records() {
        // Only `capacity` records exist behind the pointer even though the
        // firmware claims more.
        let records: Vec<E820Entry> = (0..MEMORY_MAP_CAPACITY as u64).map(record).collect();
        let map = unsafe { MemoryMap::parse(records.as_ptr(), 1000) };
        assert_eq!(map.len(), MEMORY_MAP_CAPACITY);
        assert_eq!(map.reported_count(), 1000);
    }

    #[test]
    fn picks_largest_usable_region() {
        let map = MemoryMap::from_entries(&[
            E820Entry::new(0x0, 0x9fc00, 1, 0),
            E820Entry::new(0x10_0000, 0x4000_0000, 2, 0),
            E820Entry::new(0x10_0000, 0x7ee_0000, 1, 0),
            E820Entry::new(u64::MAX - 10, 0x1_0000_0000, 1, 0),
        ]);

        let largest = map.largest_usable().copied();
        assert_eq!(largest, Some(E820Entry::new(0x10_0000, 0x7ee_0000, 1, 0)));
        assert_eq!(map.total_usable(), 0x9fc00 + 0x7ee_0000);
    }

    #[test]
    fn unknown_types_survive_verbatim() {
        let kind = RegionKind::from(0xF00D);
        assert_eq!(kind, RegionKind::Unknown(0xF00D));
        assert_eq!(kind.as_u32(), 0xF00D);
    }
}
