//! Interrupt handlers.
//!
//! Every CPU exception vector (0-31) has its own stub that forwards the
//! vector number and error code to [`fault_handler`]. Vectors that push no
//! error code report 0.

use core::fmt::Write;

use x86_64::registers::control::Cr2;
use x86_64::structures::idt::InterruptStackFrame;

use super::pic::{InterruptIndex, PICS};
use super::pit;
use crate::config::COM1;
use crate::drivers::keyboard::{Keyboard, SCANCODES};
use crate::drivers::serial::Serial;

pub const EXCEPTION_COUNT: usize = 32;

pub const BREAKPOINT: u8 = 3;
pub const OVERFLOW: u8 = 4;
pub const DOUBLE_FAULT: u8 = 8;
pub const PAGE_FAULT: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Return to the faulting instruction stream.
    Resume,
    /// Report and stop the machine.
    Halt,
}

/// Breakpoint and overflow are traps reported after the instruction
/// completed; nothing else is recoverable without more machinery.
pub const fn fault_policy(vector: u8) -> FaultAction {
    match vector {
        BREAKPOINT | OVERFLOW => FaultAction::Resume,
        _ => FaultAction::Halt,
    }
}

pub const fn exception_name(vector: u8) -> &'static str {
    match vector {
        0 => "Divide Error",
        1 => "Debug",
        2 => "Non-Maskable Interrupt",
        3 => "Breakpoint",
        4 => "Overflow",
        5 => "Bound Range Exceeded",
        6 => "Invalid Opcode",
        7 => "Device Not Available",
        8 => "Double Fault",
        9 => "Coprocessor Segment Overrun",
        10 => "Invalid TSS",
        11 => "Segment Not Present",
        12 => "Stack-Segment Fault",
        13 => "General Protection Fault",
        14 => "Page Fault",
        16 => "x87 Floating-Point Exception",
        17 => "Alignment Check",
        18 => "Machine Check",
        19 => "SIMD Floating-Point Exception",
        20 => "Virtualization Exception",
        21 => "Control Protection Exception",
        28 => "Hypervisor Injection Exception",
        29 => "VMM Communication Exception",
        30 => "Security Exception",
        0..=31 => "Reserved",
        _ => "Not an exception",
    }
}

/// Single dispatch point for CPU exceptions.
///
/// Resumable faults are logged and return. Anything else is reported on
/// the raw serial line and the machine halts.
pub fn fault_handler(vector: u8, error_code: u64) {
    handle_fault(vector, error_code, None);
}

fn handle_fault(vector: u8, error_code: u64, frame: Option<&InterruptStackFrame>) {
    match fault_policy(vector) {
        FaultAction::Resume => {
            let rip = frame.map_or(0, |frame| frame.instruction_pointer.as_u64());
            log::warn!("{} (vector {}) at {:#x}", exception_name(vector), vector, rip);
        }
        FaultAction::Halt => {
            report_fatal(vector, error_code, frame);
            crate::kernel::halt();
        }
    }
}

fn report_fatal(vector: u8, error_code: u64, frame: Option<&InterruptStackFrame>) {
    let mut serial = unsafe { Serial::new(COM1) };
    let _ = writeln!(
        serial,
        "\nEXCEPTION: {} (vector {}, error code {:#x})",
        exception_name(vector),
        vector,
        error_code
    );
    if vector == PAGE_FAULT {
        let _ = writeln!(serial, "Accessed Address: {:#x}", Cr2::read_raw());
    }
    if let Some(frame) = frame {
        let _ = writeln!(serial, "{:#?}", frame);
    }
}

macro_rules! exception_stubs {
    (@stub $vector:literal, $name:ident) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame) {
            handle_fault($vector, 0, Some(&frame));
        }
    };
    (@stub $vector:literal, $name:ident, error_code) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame, error_code: u64) {
            handle_fault($vector, error_code, Some(&frame));
        }
    };
    ($($vector:literal => $name:ident $(, $code:ident)?;)*) => {
        $(exception_stubs!(@stub $vector, $name $(, $code)?);)*

        /// Handler addresses for vectors 0-31, in vector order.
        pub fn exception_stub_addresses() -> [u64; EXCEPTION_COUNT] {
            [$($name as usize as u64),*]
        }
    };
}

exception_stubs! {
    0 => divide_error;
    1 => debug;
    2 => non_maskable_interrupt;
    3 => breakpoint;
    4 => overflow;
    5 => bound_range_exceeded;
    6 => invalid_opcode;
    7 => device_not_available;
    8 => double_fault, error_code;
    9 => coprocessor_segment_overrun;
    10 => invalid_tss, error_code;
    11 => segment_not_present, error_code;
    12 => stack_segment_fault, error_code;
    13 => general_protection_fault, error_code;
    14 => page_fault, error_code;
    15 => reserved_15;
    16 => x87_floating_point;
    17 => alignment_check, error_code;
    18 => machine_check;
    19 => simd_floating_point;
    20 => virtualization;
    21 => control_protection, error_code;
    22 => reserved_22;
    23 => reserved_23;
    24 => reserved_24;
    25 => reserved_25;
    26 => reserved_26;
    27 => reserved_27;
    28 => hypervisor_injection;
    29 => vmm_communication, error_code;
    30 => security_exception, error_code;
    31 => reserved_31;
}

/// Spurious or unclaimed vectors are ignored.
pub extern "x86-interrupt" fn unhandled_interrupt(_stack_frame: InterruptStackFrame) {}

pub extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    pit::tick();
    unsafe {
        PICS.lock().notify_end_of_interrupt(InterruptIndex::Timer.as_u8());
    }
}

pub extern "x86-interrupt" fn keyboard_interrupt_handler(_stack_frame: InterruptStackFrame) {
    let scancode = Keyboard::new().read();
    // A full queue drops the code; the controller is acknowledged either way.
    let _ = SCANCODES.push(scancode);

    unsafe {
        PICS.lock().notify_end_of_interrupt(InterruptIndex::Keyboard.as_u8());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_traps_resume() {
        assert_eq!(fault_policy(BREAKPOINT), FaultAction::Resume);
        assert_eq!(fault_policy(OVERFLOW), FaultAction::Resume);
        for vector in [0, DOUBLE_FAULT, 13, PAGE_FAULT, 6, 18] {
            assert_eq!(fault_policy(vector), FaultAction::Halt, "vector {}", vector);
        }
    }

    #[test]
    fn resumable_fault_returns() {
        fault_handler(BREAKPOINT, 0);
        fault_handler(OVERFLOW, 0);
    }

    #[test]
    fn names_cover_every_exception() {
        assert_eq!(exception_name(14), "Page Fault");
        assert_eq!(exception_name(15), "Reserved");
        assert_eq!(exception_name(31), "Reserved");
        assert_eq!(exception_name(32), "Not an exception");
    }

    #[test]
    fn one_stub_per_vector() {
        let stubs = exception_stub_addresses();
        assert!(stubs.iter().all(|&addr| addr != 0));
        for (i, a) in stubs.iter().enumerate() {
            assert!(stubs[i + 1..].iter().all(|b| b != a), "vector {} shares a stub", i);
        }
    }
}
