//! CPU tables and interrupt plumbing.

pub mod descriptors;
pub mod gdt;
pub mod handlers;
pub mod idt;
pub mod pic;
pub mod pit;

pub use handlers::{fault_handler, FaultAction};
pub use pic::{pic_remap, InterruptIndex, PICS};
pub use pit::pit_init;

/// GDT with TSS, then the IDT. Interrupts stay disabled.
pub fn init() {
    gdt::init();
    idt::init();
}
