//! # Bootstrap Heap
//!
//! [`Heap`] is a bump allocator over one physical region: every allocation
//! advances `used`, nothing is ever handed back, and no alignment padding is
//! added. Exhaustion is a plain error value; at the syscall boundary it
//! becomes the sentinel address [`NO_MEMORY`].
//!
//! [`LockedHeap`] is the kernel's global allocator. It serializes callers by
//! disabling interrupts around a spin lock and over-allocates by `align - 1`
//! bytes to honour `Layout` alignment. The physical region is reached
//! through the bootloader's physical-memory mapping. Every failed request
//! is logged as a warning.

use core::alloc::{GlobalAlloc, Layout};
use core::fmt;
use core::ptr;

use spin::Mutex;
use x86_64::instructions::interrupts::without_interrupts;
use x86_64::{PhysAddr, VirtAddr};

use crate::memory::e820::E820Entry;
use crate::memory::raw;

/// Address returned in place of an allocation when the heap is exhausted.
/// Physical address zero is never part of the heap.
pub const NO_MEMORY: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    OutOfMemory,
    InvalidAddress,
    InvalidSize,
    Overflow,
    Uninitialized,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidAddress => write!(f, "invalid heap address"),
            Self::InvalidSize => write!(f, "invalid heap size"),
            Self::Overflow => write!(f, "heap range overflows the address space"),
            Self::Uninitialized => write!(f, "heap not initialized"),
        }
    }
}

/// One past the highest address a `PhysAddr` can hold (52 bits).
pub const PHYS_ADDR_LIMIT: u64 = 1 << 52;

#[inline]
pub(crate) const fn align_up(addr: u64, align: u64) -> u64 {
    (addr + align - 1) & !(align - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heap {
    start: PhysAddr,
    size: u64,
    used: u64,
}

impl Heap {
    /// # Safety
    ///
    /// `start..start + size` must be usable RAM that nothing else owns for
    /// as long as allocations from this heap are alive.
    pub const unsafe fn new(start: PhysAddr, size: u64) -> Self {
        Self {
            start,
            size,
            used: 0,
        }
    }

    /// Carves a heap out of `region`, skipping everything below `floor` and
    /// keeping at most `max_size` bytes. Memory past the 52-bit physical
    /// address limit is cut off.
    ///
    /// # Safety
    ///
    /// `region` must be usable RAM not owned by anything else.
    pub unsafe fn from_region(region: &E820Entry, floor: u64, max_size: u64) -> Result<Self, AllocError> {
        let end = region.end().ok_or(AllocError::Overflow)?.min(PHYS_ADDR_LIMIT);
        let start = region.base.max(floor);
        if start == 0 {
            return Err(AllocError::InvalidAddress);
        }
        if start >= end {
            return Err(AllocError::InvalidSize);
        }
        let start = PhysAddr::try_new(start).map_err(|_| AllocError::InvalidAddress)?;
        let size = (end - start.as_u64()).min(max_size);
        Ok(Self::new(start, size))
    }

    /// Reserves `size` bytes and returns their start address.
    ///
    /// On failure `used` is left untouched.
    pub fn alloc(&mut self, size: usize) -> Result<PhysAddr, AllocError> {
        let next = self
            .used
            .checked_add(size as u64)
            .ok_or(AllocError::OutOfMemory)?;
        if next > self.size {
            return Err(AllocError::OutOfMemory);
        }

        let addr = self
            .start
            .as_u64()
            .checked_add(self.used)
            .and_then(|addr| PhysAddr::try_new(addr).ok())
            .ok_or(AllocError::OutOfMemory)?;
        self.used = next;
        Ok(addr)
    }

    /// [`Heap::alloc`] with failure folded into the [`NO_MEMORY`] sentinel.
    pub fn alloc_or_null(&mut self, size: usize) -> u64 {
        self.alloc(size).map_or(NO_MEMORY, PhysAddr::as_u64)
    }

    pub fn start(&self) -> PhysAddr {
        self.start
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        self.size - self.used
    }
}

struct MappedHeap {
    heap: Heap,
    physical_offset: u64,
}

impl MappedHeap {
    /// Reserves `size + align - 1` bytes and returns the first suitably
    /// aligned virtual address inside them.
    fn alloc(&mut self, layout: Layout) -> Result<VirtAddr, AllocError> {
        let padded = layout
            .size()
            .checked_add(layout.align() - 1)
            .ok_or(AllocError::Overflow)?;
        let phys = self.heap.alloc(padded)?;
        let virt = phys
            .as_u64()
            .checked_add(self.physical_offset)
            .ok_or(AllocError::Overflow)?;
        VirtAddr::try_new(align_up(virt, layout.align() as u64)).map_err(|_| AllocError::InvalidAddress)
    }
}

pub struct LockedHeap {
    inner: Mutex<Option<MappedHeap>>,
}

impl LockedHeap {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Installs `heap`, reachable at `physical_offset + phys` in virtual memory.
    pub fn init(&self, heap: Heap, physical_offset: VirtAddr) {
        without_interrupts(|| {
            *self.inner.lock() = Some(MappedHeap {
                heap,
                physical_offset: physical_offset.as_u64(),
            });
        });
    }

    /// Bump-allocates `size` bytes and returns their physical address.
    pub fn alloc_phys(&self, size: usize) -> Result<PhysAddr, AllocError> {
        let result = without_interrupts(|| {
            let mut guard = self.inner.lock();
            let mapped = guard.as_mut().ok_or(AllocError::Uninitialized)?;
            mapped.heap.alloc(size)
        });
        if let Err(e) = result {
            log::warn!("heap: {} ({} bytes requested)", e, size);
        }
        result
    }

    /// Snapshot of the underlying heap.
    pub fn stats(&self) -> Option<Heap> {
        without_interrupts(|| self.inner.lock().as_ref().map(|mapped| mapped.heap))
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let result = without_interrupts(|| {
            let mut guard = self.inner.lock();
            guard.as_mut().ok_or(AllocError::Uninitialized)?.alloc(layout)
        });
        match result {
            Ok(addr) => addr.as_mut_ptr(),
            Err(e) => {
                log::warn!("heap: {} ({} bytes, align {})", e, layout.size(), layout.align());
                ptr::null_mut()
            }
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.alloc(layout);
        if !ptr.is_null() {
            raw::fill(ptr, 0, layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
        // Bump allocator: memory is never reclaimed.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap(start: u64, size: u64) -> Heap {
        unsafe { Heap::new(PhysAddr::new(start), size) }
    }

    #[test]
    fn bump_sequence_from_one_megabyte() {
        let mut heap = heap(0x10_0000, 4096);

        assert_eq!(heap.alloc(100), Ok(PhysAddr::new(0x10_0000)));
        assert_eq!(heap.used(), 100);

        assert_eq!(heap.alloc(4000), Err(AllocError::OutOfMemory));
        assert_eq!(heap.used(), 100);

        assert_eq!(heap.alloc(3996), Ok(PhysAddr::new(0x10_0064)));
        assert_eq!(heap.used(), 4096);

        assert_eq!(heap.alloc(1), Err(AllocError::OutOfMemory));
        assert_eq!(heap.used(), 4096);
    }

    #[test]
    fn allocations_are_increasing_and_disjoint() {
        let sizes = [16usize, 1, 255, 64, 3, 700, 1];
        let total: usize = sizes.iter().sum();
        let mut heap = heap(0x20_0000, total as u64);

        let mut previous_end = heap.start().as_u64();
        for size in sizes {
            let addr = heap.alloc(size).expect("fits").as_u64();
            assert_eq!(addr, previous_end);
            previous_end = addr + size as u64;
        }
        assert_eq!(heap.remaining(), 0);
        assert_eq!(heap.alloc(1), Err(AllocError::OutOfMemory));
    }

    #[test]
    fn oversized_request_does_not_wrap() {
        let mut heap = heap(0x10_0000, 4096);
        heap.alloc(10).expect("fits");
        assert_eq!(heap.alloc(usize::MAX), Err(AllocError::OutOfMemory));
        assert_eq!(heap.used(), 10);
    }

    #[test]
    fn failure_maps_to_null_sentinel() {
        let mut heap = heap(0x10_0000, 8);
        assert_eq!(heap.alloc_or_null(8), 0x10_0000);
        assert_eq!(heap.alloc_or_null(1), NO_MEMORY);
    }

    #[test]
    fn region_is_clamped_to_floor_and_cap() {
        let low = E820Entry::new(0, 0x9fc00, 1, 0);
        assert_eq!(
            unsafe { Heap::from_region(&low, 0x10_0000, 1 << 20) },
            Err(AllocError::InvalidSize)
        );

        let high = E820Entry::new(0x10_0000, 0x7ee_0000, 1, 0);
        let heap = unsafe { Heap::from_region(&high, 0x10_0000, 0x40_0000) }.expect("valid region");
        assert_eq!(heap.start(), PhysAddr::new(0x10_0000));
        assert_eq!(heap.size(), 0x40_0000);

        let straddling = E820Entry::new(0x8_0000, 0x10_0000, 1, 0);
        let heap = unsafe { Heap::from_region(&straddling, 0x10_0000, u64::MAX) }.expect("valid region");
        assert_eq!(heap.start(), PhysAddr::new(0x10_0000));
        assert_eq!(heap.size(), 0x8_0000);
    }

    #[test]
    fn region_without_floor_cannot_start_at_zero() {
        let region = E820Entry::new(0, 0x1000, 1, 0);
        assert_eq!(
            unsafe { Heap::from_region(&region, 0, 0x1000) },
            Err(AllocError::InvalidAddress)
        );
    }

    #[test]
    fn wrapping_region_is_rejected() {
        let region = E820Entry::new(u64::MAX - 1, 16, 1, 0);
        assert_eq!(
            unsafe { Heap::from_region(&region, 0, 16) },
            Err(AllocError::Overflow)
        );
    }

    #[test]
    fn region_at_the_top_of_physical_memory() {
        let top = E820Entry::new(0x000f_ffff_ffff_f000, 0x2000, 1, 0);
        let mut heap = unsafe { Heap::from_region(&top, 0x10_0000, u64::MAX) }.expect("valid region");
        assert_eq!(heap.size(), 0x1000);

        assert_eq!(heap.alloc(0x1000), Ok(PhysAddr::new(0x000f_ffff_ffff_f000)));
        assert_eq!(heap.alloc(0x1000), Err(AllocError::OutOfMemory));
        assert_eq!(heap.alloc(0), Err(AllocError::OutOfMemory));
        assert_eq!(heap.used(), 0x1000);
    }

    #[test]
    fn region_past_physical_limit_is_rejected() {
        let beyond = E820Entry::new(PHYS_ADDR_LIMIT, 0x1000, 1, 0);
        assert_eq!(
            unsafe { Heap::from_region(&beyond, 0x10_0000, u64::MAX) },
            Err(AllocError::InvalidSize)
        );
    }

    const OFFSET: u64 = 0xffff_8000_0000_0000;

    fn mapped(size: u64) -> MappedHeap {
        MappedHeap {
            heap: heap(0x10_0000, size),
            physical_offset: OFFSET,
        }
    }

    fn layout(size: usize, align: usize) -> Layout {
        Layout::from_size_align(size, align).expect("valid layout")
    }

    #[test]
    fn mapped_allocations_honour_alignment() {
        let mut mapped = mapped(64);

        assert_eq!(mapped.alloc(layout(8, 8)), Ok(VirtAddr::new(OFFSET + 0x10_0000)));
        assert_eq!(mapped.heap.used(), 15);

        assert_eq!(mapped.alloc(layout(1, 1)), Ok(VirtAddr::new(OFFSET + 0x10_000f)));
        assert_eq!(mapped.heap.used(), 16);

        assert_eq!(mapped.alloc(layout(4, 16)), Ok(VirtAddr::new(OFFSET + 0x10_0010)));
        assert_eq!(mapped.heap.used(), 35);

        // Starts at 0x10_0023, rounded up to the next multiple of four.
        let addr = mapped.alloc(layout(1, 4)).expect("fits");
        assert_eq!(addr, VirtAddr::new(OFFSET + 0x10_0024));
        assert_eq!(mapped.heap.used(), 39);
    }

    #[test]
    fn aligned_block_stays_inside_its_reservation() {
        let mut mapped = mapped(4096);
        mapped.alloc(layout(3, 1)).expect("fits");

        for align in [2usize, 8, 64, 512] {
            let before = mapped.heap.used();
            let addr = mapped.alloc(layout(24, align)).expect("fits").as_u64();
            let reserved_start = OFFSET + 0x10_0000 + before;
            let reserved_end = OFFSET + 0x10_0000 + mapped.heap.used();

            assert_eq!(addr % align as u64, 0, "align {}", align);
            assert!(addr >= reserved_start);
            assert!(addr + 24 <= reserved_end, "align {}", align);
        }
    }

    #[test]
    fn mapped_exhaustion_keeps_state() {
        let mut mapped = mapped(64);
        mapped.alloc(layout(30, 1)).expect("fits");

        // 32 bytes at align 8 need 39 bytes of room.
        assert_eq!(mapped.alloc(layout(32, 8)), Err(AllocError::OutOfMemory));
        assert_eq!(mapped.heap.used(), 30);
        assert!(mapped.alloc(layout(34, 1)).is_ok());
        assert_eq!(mapped.heap.remaining(), 0);
    }

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0x1001, 0x1000), 0x2000);
        assert_eq!(align_up(0x1000, 0x1000), 0x1000);
        assert_eq!(align_up(5, 1), 5);
    }
}
