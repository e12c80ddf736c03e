use core::mem::size_of;
use core::ptr::addr_of;

use spin::Lazy;
use x86_64::instructions::tables::{lgdt, load_tss};
use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::tss::TaskStateSegment;
use x86_64::structures::DescriptorTablePointer;
use x86_64::{PrivilegeLevel, VirtAddr};

use super::descriptors::{tss_descriptor, GdtEntry};
use crate::config::{DOUBLE_FAULT_STACK_SIZE, PRIVILEGE_STACK_SIZE};

/// Slot in the TSS interrupt stack table used by the double-fault gate.
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

pub const GDT_ENTRIES: usize = 7;

pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
pub const KERNEL_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
pub const USER_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring3);
pub const USER_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring3);
pub const TSS_SELECTOR: SegmentSelector = SegmentSelector::new(5, PrivilegeLevel::Ring0);

#[repr(C, align(16))]
struct Stack<const N: usize>([u8; N]);

impl<const N: usize> Stack<N> {
    const fn new() -> Self {
        Self([0; N])
    }
}

static mut DOUBLE_FAULT_STACK: Stack<DOUBLE_FAULT_STACK_SIZE> = Stack::new();

/// Kernel stack the CPU switches to when ring 3 enters through a gate,
/// which is how `int 0x80` arrives from user mode.
static mut PRIVILEGE_STACK: Stack<PRIVILEGE_STACK_SIZE> = Stack::new();

static TSS: Lazy<TaskStateSegment> = Lazy::new(|| {
    let mut tss = TaskStateSegment::new();

    tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = {
        let stack_start = VirtAddr::from_ptr(unsafe { addr_of!(DOUBLE_FAULT_STACK) });
        stack_start + DOUBLE_FAULT_STACK_SIZE as u64
    };
    tss.privilege_stack_table[0] = {
        let stack_start = VirtAddr::from_ptr(unsafe { addr_of!(PRIVILEGE_STACK) });
        stack_start + PRIVILEGE_STACK_SIZE as u64
    };

    tss
});

/// Null, kernel code, kernel data, user data, user code, then the two
/// halves of the TSS descriptor. User data precedes user code so the
/// layout also suits `sysret`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct Gdt {
    table: [u64; GDT_ENTRIES],
}

impl Gdt {
    pub fn build(tss_base: u64) -> Self {
        let [tss_low, tss_high] = tss_descriptor(tss_base, (size_of::<TaskStateSegment>() - 1) as u32);
        Self {
            table: [
                GdtEntry::NULL.encode(),
                GdtEntry::kernel_code().encode(),
                GdtEntry::kernel_data().encode(),
                GdtEntry::user_data().encode(),
                GdtEntry::user_code().encode(),
                tss_low,
                tss_high,
            ],
        }
    }

    pub fn entries(&self) -> &[u64; GDT_ENTRIES] {
        &self.table
    }

    fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (size_of::<[u64; GDT_ENTRIES]>() - 1) as u16,
            base: VirtAddr::from_ptr(self.table.as_ptr()),
        }
    }
}

static GDT: Lazy<Gdt> = Lazy::new(|| {
    let tss: &TaskStateSegment = &TSS;
    Gdt::build(tss as *const TaskStateSegment as u64)
});

pub fn init() {
    use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};

    unsafe {
        lgdt(&GDT.pointer());

        CS::set_reg(KERNEL_CODE_SELECTOR);
        DS::set_reg(KERNEL_DATA_SELECTOR);
        ES::set_reg(KERNEL_DATA_SELECTOR);
        SS::set_reg(KERNEL_DATA_SELECTOR);

        load_tss(TSS_SELECTOR);
    }
}
