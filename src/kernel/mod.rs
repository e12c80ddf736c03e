/// Kernel initialization and bootstrap module
pub mod init;
pub mod status;

use core::fmt::Write;
use core::panic::PanicInfo;

use x86_64::instructions::{hlt, interrupts};

use crate::config::COM1;
use crate::drivers::keyboard::SCANCODES;
use crate::drivers::serial::Serial;

pub use init::init_kernel;
pub use status::{register_component, update_component_status, InitStatus};

/// Stops the CPU for good.
pub fn halt() -> ! {
    loop {
        interrupts::disable();
        hlt();
    }
}

/// Sleeps until the next interrupt, forever, logging any keyboard input.
pub fn idle() -> ! {
    loop {
        interrupts::disable();
        while let Some(scancode) = SCANCODES.pop() {
            log::debug!("scancode {:#04x}", scancode);
        }
        // Enable and halt as one step so an IRQ cannot slip in between.
        interrupts::enable_and_hlt();
    }
}

/// Writes the panic on the raw serial line and halts.
pub fn report_panic(info: &PanicInfo) -> ! {
    interrupts::disable();
    let mut serial = unsafe { Serial::new(COM1) };
    let _ = writeln!(serial, "\nKERNEL PANIC: {}", info.message());
    if let Some(location) = info.location() {
        let _ = writeln!(serial, "  at {}:{}:{}", location.file(), location.line(), location.column());
    }
    halt()
}
