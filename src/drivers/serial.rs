//! Unlocked 16550 transmitter for the panic and fatal-fault paths.
//!
//! The logging console ([`crate::logging::SERIAL`]) sits behind a mutex.
//! This handle does not, so it still works when the crashing code holds
//! that mutex. It polls the line status register a bounded number of times
//! before handing each byte to `SerialPort::send_raw`. A UART that never
//! drains loses the byte instead of hanging the machine.

use core::fmt;

use uart_16550::SerialPort;

use super::port::{CpuPorts, PortBus};

const LINE_STATUS: u16 = 5;
const THR_EMPTY: u8 = 1 << 5;

/// Polls before giving up on a stuck or absent UART.
pub const SPIN_LIMIT: u32 = 100_000;

/// Polls `base + 5` until the transmit holding register is empty, at most
/// `limit` times.
pub fn wait_transmit_ready<B: PortBus>(bus: &mut B, base: u16, limit: u32) -> bool {
    for _ in 0..limit {
        // SAFETY: reading the line status register has no side effects.
        if unsafe { bus.read_u8(base + LINE_STATUS) } & THR_EMPTY != 0 {
            return true;
        }
        core::hint::spin_loop();
    }
    false
}

/// Expands `\n` to `\r\n` and hands each byte to `send`.
fn for_each_crlf(s: &str, mut send: impl FnMut(u8)) {
    for byte in s.bytes() {
        if byte == b'\n' {
            send(b'\r');
        }
        send(byte);
    }
}

pub struct Serial {
    base: u16,
    port: SerialPort,
}

impl Serial {
    /// # Safety
    ///
    /// `base` must be the base port of a 16550-compatible UART.
    pub const unsafe fn new(base: u16) -> Self {
        Self {
            base,
            port: SerialPort::new(base),
        }
    }

    /// Sends `byte` once the UART is ready. Returns `false` if it never
    /// became ready and the byte was dropped.
    pub fn write(&mut self, byte: u8) -> bool {
        if !wait_transmit_ready(&mut CpuPorts, self.base, SPIN_LIMIT) {
            return false;
        }
        self.port.send_raw(byte);
        true
    }
}

impl fmt::Write for Serial {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for_each_crlf(s, |byte| {
            self.write(byte);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::COM1;
    use crate::drivers::port::FakePorts;

    #[test]
    fn ready_line_is_seen_on_first_poll() {
        let mut bus = FakePorts::new().preset(COM1 + 5, THR_EMPTY);

        assert!(wait_transmit_ready(&mut bus, COM1, SPIN_LIMIT));
        assert_eq!(bus.reads, vec![COM1 + 5]);
        assert!(bus.writes.is_empty());
    }

    #[test]
    fn busy_line_gives_up_after_spin_limit() {
        let mut bus = FakePorts::new().preset(COM1 + 5, !THR_EMPTY);

        assert!(!wait_transmit_ready(&mut bus, COM1, SPIN_LIMIT));
        assert_eq!(bus.reads.len(), SPIN_LIMIT as usize);
    }

    #[test]
    fn newlines_become_crlf() {
        let mut sent = Vec::new();
        for_each_crlf("a\nb\n", |byte| sent.push(byte));
        assert_eq!(sent, b"a\r\nb\r\n".to_vec());
    }
}
