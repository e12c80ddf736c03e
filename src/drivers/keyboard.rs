//! # PS/2 Keyboard
//!
//! ```text
//! ┌─────────────┐    IRQ1     ┌────────────────┐   Read syscall
//! │  Keyboard   │────────────▶│ ScancodeQueue  │──────────────▶
//! │  (Port 60)  │             │  (256 slots)   │   idle loop
//! └─────────────┘             └────────────────┘
//! ```
//!
//! Only raw set-1 scan codes are handled; nothing is decoded to characters.
//! The queue has a single producer (the IRQ1 handler) and a single consumer,
//! and drops new codes when full.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::port::{CpuPorts, PortBus};

pub const DATA_PORT: u16 = 0x60;
pub const QUEUE_SIZE: usize = 256;

pub struct Keyboard<B: PortBus = CpuPorts> {
    bus: B,
}

impl Keyboard<CpuPorts> {
    pub const fn new() -> Self {
        Self { bus: CpuPorts }
    }
}

impl<B: PortBus> Keyboard<B> {
    pub fn with_bus(bus: B) -> Self {
        Self { bus }
    }

    /// Reads one raw scan code from the controller's data port.
    pub fn read(&mut self) -> u8 {
        // SAFETY: reading 0x60 only pops the controller's output byte.
        unsafe { self.bus.read_u8(DATA_PORT) }
    }
}

/// One scan code straight from the hardware.
pub fn kbd_read() -> u8 {
    Keyboard::new().read()
}

pub struct ScancodeQueue {
    slots: UnsafeCell<[u8; QUEUE_SIZE]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// Single producer, single consumer: each slot is written only by the
// producer before `head` is published and read only by the consumer after.
unsafe impl Sync for ScancodeQueue {}

impl ScancodeQueue {
    pub const fn new() -> Self {
        Self {
            slots: UnsafeCell::new([0; QUEUE_SIZE]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Returns `false` and drops `scancode` when the queue is full.
    pub fn push(&self, scancode: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % QUEUE_SIZE;
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            (*self.slots.get())[head] = scancode;
        }
        self.head.store(next, Ordering::Release);
        true
    }

    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let scancode = unsafe { (*self.slots.get())[tail] };
        self.tail.store((tail + 1) % QUEUE_SIZE, Ordering::Release);
        Some(scancode)
    }

    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + QUEUE_SIZE - tail) % QUEUE_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub static SCANCODES: ScancodeQueue = ScancodeQueue::new();
