#![no_std]
#![no_main]

extern crate rlibc;

use anvil::config::BOOTLOADER_CONFIG;
use anvil::{kernel, logging, println};
use bootloader_api::{entry_point, BootInfo};
use core::panic::PanicInfo;

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    if let Err(e) = logging::init() {
        println!("logger unavailable: {}", e);
    }

    if let Err(e) = kernel::init_kernel(boot_info) {
        log::error!("Kernel initialization failed: {}", e);
        kernel::halt();
    }

    kernel::idle()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kernel::report_panic(info)
}
