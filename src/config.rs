//! Compile-time kernel configuration.

use bootloader_api::config::{BootloaderConfig, Mapping};

/// First legacy serial port; the logging console lives here.
pub const COM1: u16 = 0x3F8;

/// Vector of IRQ0 once the primary PIC is remapped.
pub const PIC_1_OFFSET: u8 = 32;
/// Vector of IRQ8 once the secondary PIC is remapped.
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub const SYSCALL_VECTOR: u8 = 0x80;

/// PIT tick rate in Hz.
pub const TIMER_FREQUENCY: u32 = 100;

/// Records kept from the firmware memory map; the rest is dropped.
pub const MEMORY_MAP_CAPACITY: usize = 128;

/// Lowest physical address the heap may start at. Keeps the real-mode
/// area and address zero (the allocation sentinel) out of the heap.
pub const HEAP_FLOOR: u64 = 0x10_0000;
/// Upper bound on the heap carved from the chosen region.
pub const KERNEL_HEAP_SIZE: u64 = 16 * 1024 * 1024;

pub const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 5;
/// Ring-0 stack loaded from the TSS when user code raises an interrupt.
pub const PRIVILEGE_STACK_SIZE: usize = 4096 * 5;

/// Longest buffer a single `Write` syscall accepts.
pub const MAX_WRITE_LEN: usize = 4096;

pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config.kernel_stack_size = 128 * 1024;
    config
};
