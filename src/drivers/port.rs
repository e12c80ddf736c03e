//! Port-mapped I/O, abstracted so device programming can be replayed
//! against an in-memory bus in tests.

use x86_64::instructions::port::Port;

/// Unused diagnostic port; a write to it takes roughly one microsecond.
pub const POST_PORT: u16 = 0x80;

pub trait PortBus {
    /// # Safety
    ///
    /// Reading some ports has side effects on the device behind them.
    unsafe fn read_u8(&mut self, port: u16) -> u8;

    /// # Safety
    ///
    /// The caller must know what the device behind `port` does with `value`.
    unsafe fn write_u8(&mut self, port: u16, value: u8);

    /// Gives slow devices (the 8259 in particular) time to settle.
    ///
    /// # Safety
    ///
    /// Same as [`PortBus::write_u8`].
    unsafe fn io_wait(&mut self) {
        self.write_u8(POST_PORT, 0);
    }
}

/// The real I/O address space.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuPorts;

impl PortBus for CpuPorts {
    unsafe fn read_u8(&mut self, port: u16) -> u8 {
        Port::<u8>::new(port).read()
    }

    unsafe fn write_u8(&mut self, port: u16, value: u8) {
        Port::<u8>::new(port).write(value)
    }
}

#[cfg(test)]
pub(crate) use fake::FakePorts;

#[cfg(test)]
mod fake {
    use std::collections::BTreeMap;

    use super::{PortBus, POST_PORT};

    /// Every port is a latch: reads return the last value written (or a
    /// preset), and writes are logged in order. POST delays are not logged.
    #[derive(Debug, Default)]
    pub(crate) struct FakePorts {
        pub values: BTreeMap<u16, u8>,
        pub writes: Vec<(u16, u8)>,
        pub reads: Vec<u16>,
    }

    impl FakePorts {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn preset(mut self, port: u16, value: u8) -> Self {
            self.values.insert(port, value);
            self
        }

        pub fn writes_to(&self, port: u16) -> Vec<u8> {
            self.writes
                .iter()
                .filter(|(p, _)| *p == port)
                .map(|(_, v)| *v)
                .collect()
        }
    }

    impl PortBus for FakePorts {
        unsafe fn read_u8(&mut self, port: u16) -> u8 {
            self.reads.push(port);
            self.values.get(&port).copied().unwrap_or(0)
        }

        unsafe fn write_u8(&mut self, port: u16, value: u8) {
            self.values.insert(port, value);
            if port != POST_PORT {
                self.writes.push((port, value));
            }
        }
    }
}
