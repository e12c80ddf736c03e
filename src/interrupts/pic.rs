//! # Programmable Interrupt Controller (8259 PIC)
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │◀────│   PIC 2     │
//! │  (Master)   │IRQ2 │  (Slave)    │
//! │ IRQ 0-7     │     │ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │
//!       ▼
//!     CPU
//! ```
//!
//! At reset IRQ 0-7 land on vectors 8-15, on top of the CPU exceptions, so
//! both chips are re-initialized with new vector bases:
//!
//! | IRQ | Vector | Device    |
//! |-----|--------|-----------|
//! | 0   | 32     | Timer     |
//! | 1   | 33     | Keyboard  |
//! | 8-15| 40-47  | Slave     |
//!
//! `ChainedPics::initialize` saves and restores the interrupt masks around
//! the init sequence, so remapping twice with the same offsets leaves the
//! controllers as remapping once.

use pic8259::ChainedPics;
use spin::Mutex;

use crate::config::{PIC_1_OFFSET, PIC_2_OFFSET};

/// IRQ line of the master that the slave is wired to.
pub const CASCADE_IRQ: u8 = 2;

/// Every line masked.
pub const ALL_MASKED: [u8; 2] = [0xff, 0xff];

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
    Keyboard = PIC_1_OFFSET + 1,
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.as_u8())
    }

    pub fn irq(self) -> u8 {
        self.as_u8() - PIC_1_OFFSET
    }
}

/// Clears the mask bit of `irq` in a `[master, slave]` pair. A slave line
/// also opens the cascade on the master.
pub const fn unmask(masks: [u8; 2], irq: u8) -> [u8; 2] {
    let [master, slave] = masks;
    if irq < 8 {
        [master & !(1 << irq), slave]
    } else {
        [master & !(1 << CASCADE_IRQ), slave & !(1 << (irq & 7))]
    }
}

/// Masks with exactly `irqs` (and the cascade, if needed) enabled.
pub fn masks_enabling(irqs: &[u8]) -> [u8; 2] {
    irqs.iter().fold(ALL_MASKED, |masks, &irq| unmask(masks, irq))
}

/// Moves the 8259 pair to the given vector bases. The masks in force
/// before the call survive.
///
/// # Safety
///
/// Interrupts should be disabled; the IDT must be ready for the new
/// vectors before any IRQ is unmasked.
pub unsafe fn pic_remap(master_offset: u8, slave_offset: u8) {
    let mut pics = PICS.lock();
    *pics = ChainedPics::new(master_offset, slave_offset);
    pics.initialize();
}

/// Masks every IRQ except `irqs`.
///
/// # Safety
///
/// A handler must be installed for each enabled IRQ's vector.
pub unsafe fn enable_only(irqs: &[u8]) {
    let [master, slave] = masks_enabling(irqs);
    PICS.lock().write_masks(master, slave);
}
