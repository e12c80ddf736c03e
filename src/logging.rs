//! # Kernel Logging
//!
//! COM1 behind a spin lock is the console. It carries the `log` facade and
//! the unprefixed `print!`/`println!` macros.
//!
//! | Level   | Prefix      |
//! |---------|-------------|
//! | `error` | `[ Error ]` |
//! | `warn`  | `[ Warn  ]` |
//! | `info`  | `[ Info  ]` |
//! | `debug` | `[ Debug ]` (debug builds only) |
//! | `trace` | `[ Trace ]` (never enabled) |
//!
//! The lock is only ever taken with interrupts disabled, so a handler that
//! logs can never spin on a lock held by the code it interrupted. The panic
//! path does not use this console at all; see [`crate::kernel::report_panic`].

use core::fmt;

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use spin::Mutex;
use uart_16550::SerialPort;

use crate::config::COM1;

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1) });

const MAX_LEVEL: LevelFilter = if cfg!(debug_assertions) {
    LevelFilter::Debug
} else {
    LevelFilter::Info
};

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            _print(format_args!("{} {}\n", prefix(record.level()), record.args()));
        }
    }

    fn flush(&self) {}
}

const fn prefix(level: Level) -> &'static str {
    match level {
        Level::Error => "[ Error ]",
        Level::Warn => "[ Warn  ]",
        Level::Info => "[ Info  ]",
        Level::Debug => "[ Debug ]",
        Level::Trace => "[ Trace ]",
    }
}

/// Programs the UART (baud rate, FIFO, line control) and installs the
/// console as the `log` backend.
pub fn init() -> Result<(), SetLoggerError> {
    x86_64::instructions::interrupts::without_interrupts(|| SERIAL.lock().init());
    log::set_logger(&LOGGER)?;
    log::set_max_level(MAX_LEVEL);
    Ok(())
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    #[cfg(not(test))]
    {
        use core::fmt::Write;
        x86_64::instructions::interrupts::without_interrupts(|| {
            let _ = SERIAL.lock().write_fmt(args);
        });
    }
    #[cfg(test)]
    let _ = args;
}

/// Sends raw bytes to the console, returning how many were sent.
pub fn write_bytes(bytes: &[u8]) -> usize {
    #[cfg(not(test))]
    x86_64::instructions::interrupts::without_interrupts(|| {
        let mut serial = SERIAL.lock();
        for &byte in bytes {
            serial.send(byte);
        }
    });
    bytes.len()
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::logging::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_line_up() {
        let prefixes = [Level::Error, Level::Warn, Level::Info, Level::Debug, Level::Trace].map(prefix);
        assert!(prefixes.iter().all(|p| p.len() == 9));
        assert_eq!(prefix(Level::Warn), "[ Warn  ]");
    }

    #[test]
    fn debug_records_only_in_debug_builds() {
        assert!(MAX_LEVEL >= LevelFilter::Info);
        assert_eq!(MAX_LEVEL >= LevelFilter::Debug, cfg!(debug_assertions));
        assert!(MAX_LEVEL < LevelFilter::Trace);
    }
}
