//! # Anvil kernel core
//!
//! Freestanding foundation for a single-CPU x86_64 machine: boot memory map,
//! bump heap, GDT/IDT, PIC/PIT, fault and syscall dispatch, the task record
//! and the elementary drivers the boot path needs before anything else exists.
//!
//! ## Boot order
//!
//! 1. Memory map parsed from the bootloader's region list
//! 2. Heap carved out of the largest usable region
//! 3. GDT (with TSS) and IDT installed
//! 4. PIC remapped to vectors 32-47, PIT programmed
//! 5. Drivers and the boot task record brought up
//! 6. Interrupts enabled, idle loop entered
//!
//! The library is `no_std`; under `cfg(test)` it links `std` so the
//! hardware-independent parts run as ordinary host unit tests.

#![cfg_attr(not(test), no_std)]
#![feature(abi_x86_interrupt)]

extern crate alloc;

#[macro_use]
pub mod logging;

mod bytes;
pub mod config;
pub mod drivers;
pub mod image;
pub mod interrupts;
pub mod kernel;
pub mod memory;
pub mod syscalls;
pub mod task;
