//! Boot sequence.
//!
//! Phases run strictly in order; the first failure stops the boot. Each one
//! is tracked in the status table and logged as `[i/n]`.

use bootloader_api::BootInfo;
use spin::Once;
use x86_64::registers::control::Cr3;
use x86_64::VirtAddr;

use crate::config::{MEMORY_MAP_CAPACITY, PIC_1_OFFSET, PIC_2_OFFSET, TIMER_FREQUENCY};
use crate::drivers::vga::{Color, ColorCode, Vga, BUFFER_WIDTH, VGA, VGA_BUFFER};
use crate::interrupts::pic::{enable_only, pic_remap, InterruptIndex};
use crate::interrupts::pit::{divisor_for, pit_init};
use crate::kernel::status::{register_component, report, update_component_status, InitStatus};
use crate::memory::e820::{E820Entry, MemoryMap};
use crate::memory::{firmware_entry, init_heap, HEAP};
use crate::task::TASKS;

const PHASES: [&str; 8] = [
    "Memory Map",
    "Heap",
    "Descriptor Tables",
    "Interrupt Controller",
    "Timer",
    "Drivers",
    "Tasks",
    "Initramfs",
];

static MEMORY_MAP: Once<MemoryMap> = Once::new();

/// The map parsed at boot, once the first phase has run.
pub fn memory_map() -> Option<&'static MemoryMap> {
    MEMORY_MAP.get()
}

/// Initialize kernel in proper order with error handling. Interrupts are
/// enabled on success.
pub fn init_kernel(boot_info: &'static BootInfo) -> Result<(), &'static str> {
    for name in PHASES {
        register_component(name);
    }
    banner();

    let physical_offset = boot_info
        .physical_memory_offset
        .into_option()
        .map(VirtAddr::new)
        .ok_or("Bootloader did not map physical memory")?;

    init_phase(0, || init_memory_map(boot_info))?;
    init_phase(1, || init_kernel_heap(physical_offset))?;
    init_phase(2, || {
        crate::interrupts::init();
        Ok(())
    })?;
    init_phase(3, init_interrupt_controller)?;
    init_phase(4, || {
        pit_init(divisor_for(TIMER_FREQUENCY));
        log::info!("PIT at {} Hz", TIMER_FREQUENCY);
        Ok(())
    })?;
    init_phase(5, || init_drivers(physical_offset))?;
    init_phase(6, init_boot_task)?;
    init_phase(7, || init_ramdisk(boot_info))?;

    report();
    if let Some(heap) = HEAP.stats() {
        log::info!("heap: {} of {} KiB in use", heap.used() / 1024, heap.size() / 1024);
    }
    x86_64::instructions::interrupts::enable();
    log::info!("Kernel initialization complete");
    Ok(())
}

fn banner() {
    println!("--- Anvil kernel v{} ---", env!("CARGO_PKG_VERSION"));
    println!("x86_64, console on COM1");
}

fn init_phase<F>(index: usize, init_fn: F) -> Result<(), &'static str>
where
    F: FnOnce() -> Result<(), &'static str>,
{
    let name = PHASES[index];
    update_component_status(name, InitStatus::InProgress);
    log::info!("[{}/{}] Initializing {}...", index + 1, PHASES.len(), name);

    match init_fn() {
        Ok(()) => {
            update_component_status(name, InitStatus::Completed);
            Ok(())
        }
        Err(e) => {
            update_component_status(name, InitStatus::Failed(e));
            log::error!("{} failed: {}", name, e);
            Err(e)
        }
    }
}

fn init_memory_map(boot_info: &BootInfo) -> Result<(), &'static str> {
    let regions = &boot_info.memory_regions;
    let mut records = [E820Entry::default(); MEMORY_MAP_CAPACITY];
    for (record, region) in records.iter_mut().zip(regions.iter()) {
        *record = firmware_entry(region);
    }

    // SAFETY: `records` holds min(regions.len(), capacity) converted
    // entries, which is all `parse` reads.
    let map = unsafe { MemoryMap::parse(records.as_ptr(), regions.len()) };
    if map.is_truncated() {
        log::warn!(
            "memory map has {} regions, keeping the first {}",
            map.reported_count(),
            map.capacity()
        );
    }
    for entry in map.iter() {
        log::debug!("  {}", entry);
    }

    let map = MEMORY_MAP.call_once(|| map);
    if map.usable().next().is_none() {
        return Err("No usable memory found");
    }
    log::info!("{} regions, {} KiB usable", map.len(), map.total_usable() / 1024);
    Ok(())
}

fn init_kernel_heap(physical_offset: VirtAddr) -> Result<(), &'static str> {
    let map = memory_map().ok_or("Memory map not parsed")?;
    // SAFETY: the bootloader maps all physical memory at `physical_offset`
    // and reports its own allocations as non-usable.
    let heap = unsafe { init_heap(map, physical_offset)? };
    log::info!("heap at {:#x}, {} KiB", heap.start().as_u64(), heap.size() / 1024);
    Ok(())
}

fn init_interrupt_controller() -> Result<(), &'static str> {
    // SAFETY: interrupts are still disabled and the IDT has gates for both
    // enabled lines.
    unsafe {
        pic_remap(PIC_1_OFFSET, PIC_2_OFFSET);
        enable_only(&[InterruptIndex::Timer.irq(), InterruptIndex::Keyboard.irq()]);
    }
    Ok(())
}

fn init_drivers(physical_offset: VirtAddr) -> Result<(), &'static str> {
    // SAFETY: the text buffer is reached through the physical memory map.
    let mut vga = unsafe { Vga::at(physical_offset + VGA_BUFFER) };
    vga.clear();
    vga.set_color(ColorCode::new(Color::LightGreen, Color::Black));
    vga.write_str(0, "Anvil");
    vga.set_color(ColorCode::default());
    vga.write_str(BUFFER_WIDTH, "serial console on COM1");
    *VGA.lock() = Some(vga);
    Ok(())
}

fn init_boot_task() -> Result<(), &'static str> {
    let marker = 0u8;
    let stack_pointer = VirtAddr::from_ptr(&marker);
    let (level_4_frame, _) = Cr3::read();

    let mut tasks = TASKS.lock();
    let pid = tasks
        .spawn(stack_pointer, level_4_frame.start_address())
        .map_err(|_| "Failed to record the boot task")?;
    tasks.admit(pid).map_err(|_| "Failed to admit the boot task")?;
    tasks.set_running(pid).map_err(|_| "Failed to run the boot task")?;
    log::info!("boot task is pid {}", pid);
    Ok(())
}

fn init_ramdisk(boot_info: &BootInfo) -> Result<(), &'static str> {
    let Some(addr) = boot_info.ramdisk_addr.into_option() else {
        log::info!("no ramdisk");
        return Ok(());
    };
    if boot_info.ramdisk_len == 0 {
        log::info!("empty ramdisk");
        return Ok(());
    }

    // SAFETY: the bootloader maps the ramdisk at `addr` for `ramdisk_len`
    // bytes and never reclaims it.
    let bytes = unsafe { core::slice::from_raw_parts(addr as *const u8, boot_info.ramdisk_len as usize) };
    match crate::image::inspect(bytes) {
        Ok(_) => Ok(()),
        Err(e) => {
            log::error!("ramdisk: {}", e);
            Err("Malformed ramdisk")
        }
    }
}
