use core::mem::size_of;

use spin::Mutex;
use x86_64::instructions::interrupts::without_interrupts;
use x86_64::instructions::tables::lidt;
use x86_64::structures::DescriptorTablePointer;
use x86_64::VirtAddr;

use super::descriptors::{GateType, IdtEntry};
use super::gdt::{DOUBLE_FAULT_IST_INDEX, KERNEL_CODE_SELECTOR};
use super::handlers::{self, DOUBLE_FAULT, EXCEPTION_COUNT};
use super::pic::InterruptIndex;
use crate::config::SYSCALL_VECTOR;

pub const IDT_ENTRIES: usize = 256;

/// 256 encoded 16-byte gates, laid out exactly as `lidt` expects.
#[derive(Clone, PartialEq, Eq)]
#[repr(C, align(16))]
pub struct InterruptTable {
    gates: [[u64; 2]; IDT_ENTRIES],
}

const _: () = assert!(size_of::<InterruptTable>() == 4096);

/// Handler addresses the kernel table is built from.
#[derive(Debug, Clone, Copy)]
pub struct HandlerSet {
    pub default: u64,
    pub exceptions: [u64; EXCEPTION_COUNT],
    pub timer: u64,
    pub keyboard: u64,
    pub syscall: u64,
}

impl HandlerSet {
    pub fn kernel() -> Self {
        Self {
            default: handlers::unhandled_interrupt as usize as u64,
            exceptions: handlers::exception_stub_addresses(),
            timer: handlers::timer_interrupt_handler as usize as u64,
            keyboard: handlers::keyboard_interrupt_handler as usize as u64,
            syscall: crate::syscalls::entry::gate_address(),
        }
    }
}

impl InterruptTable {
    pub const fn new() -> Self {
        Self {
            gates: [[0; 2]; IDT_ENTRIES],
        }
    }

    pub fn set(&mut self, vector: u8, entry: IdtEntry) {
        self.gates[vector as usize] = entry.encode();
    }

    pub fn get(&self, vector: u8) -> IdtEntry {
        IdtEntry::decode(self.gates[vector as usize])
    }

    /// Points every vector at `entry`.
    pub fn fill(&mut self, entry: IdtEntry) {
        self.gates = [entry.encode(); IDT_ENTRIES];
    }

    /// Default handler everywhere, per-vector stubs for the exceptions
    /// (double fault on its own stack), the timer and keyboard IRQs, and a
    /// ring-3 callable syscall gate.
    pub fn install(&mut self, handlers: &HandlerSet, selector: u16) {
        self.fill(IdtEntry::new(handlers.default, selector, GateType::Interrupt, 0, 0));

        for (vector, &handler) in handlers.exceptions.iter().enumerate() {
            let vector = vector as u8;
            let ist = if vector == DOUBLE_FAULT {
                DOUBLE_FAULT_IST_INDEX as u8 + 1
            } else {
                0
            };
            self.set(vector, IdtEntry::new(handler, selector, GateType::Interrupt, 0, ist));
        }

        self.set(
            InterruptIndex::Timer.as_u8(),
            IdtEntry::new(handlers.timer, selector, GateType::Interrupt, 0, 0),
        );
        self.set(
            InterruptIndex::Keyboard.as_u8(),
            IdtEntry::new(handlers.keyboard, selector, GateType::Interrupt, 0, 0),
        );
        self.set(
            SYSCALL_VECTOR,
            IdtEntry::new(handlers.syscall, selector, GateType::Interrupt, 3, 0),
        );
    }

    /// Points `vector` at `handler` through a kernel-code interrupt gate,
    /// callable from privilege level `dpl`.
    pub fn register(&mut self, vector: u8, handler: u64, dpl: u8) {
        self.set(
            vector,
            IdtEntry::new(handler, KERNEL_CODE_SELECTOR.0, GateType::Interrupt, dpl, 0),
        );
    }

    /// Returns `vector` to `default`, callable from ring 0 only.
    pub fn unregister(&mut self, vector: u8, default: u64) {
        self.register(vector, default, 0);
    }

    fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: VirtAddr::from_ptr(self.gates.as_ptr()),
        }
    }
}

/// The live table. Interrupt handlers never lock it.
static IDT: Mutex<InterruptTable> = Mutex::new(InterruptTable::new());

pub fn init() {
    let handlers = HandlerSet::kernel();
    without_interrupts(|| {
        let mut idt = IDT.lock();
        idt.install(&handlers, KERNEL_CODE_SELECTOR.0);
        // SAFETY: the table lives in a static and every gate is populated.
        unsafe { lidt(&idt.pointer()) };
    });
}

/// Patches one gate of the live table.
///
/// # Safety
///
/// `handler` must be an `extern "x86-interrupt"` function matching the
/// vector's stack layout.
pub unsafe fn register(vector: u8, handler: u64, dpl: u8) {
    without_interrupts(|| IDT.lock().register(vector, handler, dpl));
}

/// Returns `vector` of the live table to the default handler.
pub fn unregister(vector: u8) {
    let default = handlers::unhandled_interrupt as usize as u64;
    without_interrupts(|| IDT.lock().unregister(vector, default));
}
