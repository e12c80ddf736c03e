pub mod keyboard;
pub mod port;
pub mod serial;
pub mod vga;

pub use keyboard::{kbd_read, Keyboard, ScancodeQueue, SCANCODES};
pub use port::{CpuPorts, PortBus};
pub use serial::Serial;
pub use vga::Vga;
