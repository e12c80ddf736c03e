//! 8253/8254 programmable interval timer, channel 0 only.

use core::sync::atomic::{AtomicU64, Ordering};

use x86_64::instructions::interrupts::without_interrupts;

use crate::drivers::port::{CpuPorts, PortBus};

pub const PIT_FREQUENCY: u32 = 1_193_182;

pub const CHANNEL0_DATA: u16 = 0x40;
pub const COMMAND: u16 = 0x43;

/// Channel 0, lobyte/hibyte access, mode 3 (square wave), binary.
pub const SQUARE_WAVE_COMMAND: u8 = 0b00_11_011_0;

static TICKS: AtomicU64 = AtomicU64::new(0);

pub struct Pit<B: PortBus = CpuPorts> {
    bus: B,
}

impl Pit<CpuPorts> {
    pub const fn new() -> Self {
        Self { bus: CpuPorts }
    }
}

impl<B: PortBus> Pit<B> {
    pub fn with_bus(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Loads the reload value. A divisor of 0 is written as is; the chip
    /// treats it as 65536.
    ///
    /// # Safety
    ///
    /// Reprograms the system timer.
    pub unsafe fn program(&mut self, divisor: u16) {
        self.bus.write_u8(COMMAND, SQUARE_WAVE_COMMAND);
        self.bus.write_u8(CHANNEL0_DATA, (divisor & 0xff) as u8);
        self.bus.write_u8(CHANNEL0_DATA, (divisor >> 8) as u8);
    }
}

/// Reload value closest to `hz` ticks per second.
///
/// Too slow to reach (including 0 Hz) gives 0, the 65536 reload.
pub const fn divisor_for(hz: u32) -> u16 {
    if hz == 0 {
        return 0;
    }
    let divisor = (PIT_FREQUENCY + hz / 2) / hz;
    if divisor > u16::MAX as u32 {
        0
    } else if divisor == 0 {
        1
    } else {
        divisor as u16
    }
}

/// Programs channel 0 with `divisor`.
pub fn pit_init(divisor: u16) {
    without_interrupts(|| unsafe { Pit::new().program(divisor) });
}

/// Called from the IRQ0 handler.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::port::FakePorts;

    #[test]
    fn programming_order() {
        let mut pit = Pit::with_bus(FakePorts::new());
        unsafe { pit.program(11932) };

        assert_eq!(
            pit.bus().writes,
            vec![(COMMAND, 0x36), (CHANNEL0_DATA, 0x9c), (CHANNEL0_DATA, 0x2e)]
        );
    }

    #[test]
    fn zero_divisor_is_passed_through() {
        let mut pit = Pit::with_bus(FakePorts::new());
        unsafe { pit.program(0) };
        assert_eq!(pit.bus().writes_to(CHANNEL0_DATA), vec![0, 0]);
    }

    #[test]
    fn divisors_for_common_rates() {
        assert_eq!(SQUARE_WAVE_COMMAND, 0x36);
        assert_eq!(divisor_for(100), 11932);
        assert_eq!(divisor_for(1000), 1193);
        assert_eq!(divisor_for(PIT_FREQUENCY), 1);
        assert_eq!(divisor_for(u32::MAX), 1);
    }

    #[test]
    fn slow_rates_fall_back_to_the_longest_period() {
        assert_eq!(divisor_for(0), 0);
        assert_eq!(divisor_for(18), 0);
        assert_eq!(divisor_for(19), 62799);
    }

    #[test]
    fn ticks_accumulate() {
        let before = ticks();
        tick();
        tick();
        assert!(ticks() >= before + 2);
    }
}
