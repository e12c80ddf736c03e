pub mod e820;
pub mod heap;
pub mod raw;

use bootloader_api::info::{MemoryRegion, MemoryRegionKind};
use x86_64::VirtAddr;

use crate::config::{HEAP_FLOOR, KERNEL_HEAP_SIZE};
use e820::{E820Entry, MemoryMap, RegionKind};
use heap::{Heap, LockedHeap};

#[cfg_attr(not(test), global_allocator)]
pub static HEAP: LockedHeap = LockedHeap::new();

/// Re-expresses a bootloader region as an E820 record.
///
/// BIOS types pass through untouched; regions the bootloader itself claimed
/// and UEFI types are reported as reserved.
pub fn firmware_entry(region: &MemoryRegion) -> E820Entry {
    let region_type = match region.kind {
        MemoryRegionKind::Usable => RegionKind::Usable.as_u32(),
        MemoryRegionKind::UnknownBios(raw) => raw,
        _ => RegionKind::Reserved.as_u32(),
    };
    E820Entry::new(
        region.start,
        region.end.saturating_sub(region.start),
        region_type,
        e820::EXT_ENABLED,
    )
}

/// Builds the bump heap from the largest usable region above [`HEAP_FLOOR`]
/// and installs it as the global allocator.
///
/// # Safety
///
/// `physical_offset` must be the base of a mapping that covers all of
/// physical memory, and the usable regions in `map` must really be free.
pub unsafe fn init_heap(map: &MemoryMap, physical_offset: VirtAddr) -> Result<Heap, &'static str> {
    let region = map
        .usable()
        .filter(|entry| entry.end().map_or(false, |end| end > HEAP_FLOOR))
        .fold(None, |best: Option<&E820Entry>, entry| match best {
            Some(current) if current.length >= entry.length => Some(current),
            _ => Some(entry),
        })
        .ok_or("No usable memory above the heap floor")?;

    let heap = Heap::from_region(region, HEAP_FLOOR, KERNEL_HEAP_SIZE)
        .map_err(|_| "Failed to carve the kernel heap")?;
    HEAP.init(heap, physical_offset);
    Ok(heap)
}
