//! System calls over `int 0x80`.
//!
//! | # | Call     | Arguments  | Result                                  |
//! |---|----------|------------|-----------------------------------------|
//! | 0 | Read     |            | next queued scan code, else `EAGAIN`    |
//! | 1 | Write    | ptr, len   | bytes written to the console            |
//! | 24| GetPid   |            | pid of the running task, else `ESRCH`   |
//! | 42| Alloc    | size       | heap address, `0` once exhausted        |
//! | 61| GetTicks |            | timer ticks since boot                  |
//!
//! Anything else returns `ENOSYS`. Errors come back as negative errno
//! values in two's complement.

pub mod dispatcher;
pub mod entry;
pub mod numbers;

use x86_64::PhysAddr;

use crate::drivers::keyboard::SCANCODES;
use crate::interrupts::pit;
use crate::memory::heap::AllocError;
use crate::task::{Pid, TASKS};
use dispatcher::{dispatch, encode, SyscallBackend};

/// The live kernel as seen from a system call.
struct KernelServices;

impl SyscallBackend for KernelServices {
    fn read_scancode(&mut self) -> Option<u8> {
        SCANCODES.pop()
    }

    fn write_console(&mut self, bytes: &[u8]) -> usize {
        crate::logging::write_bytes(bytes)
    }

    fn current_pid(&mut self) -> Option<Pid> {
        // Never spin here: the interrupted code may hold the table.
        TASKS.try_lock()?.current().map(|task| task.pid)
    }

    fn alloc(&mut self, size: usize) -> Result<PhysAddr, AllocError> {
        crate::memory::HEAP.alloc_phys(size)
    }

    fn ticks(&mut self) -> u64 {
        pit::ticks()
    }
}

/// Executes system call `number` and returns the value for `rax`.
pub fn syscall_handler(number: u64, arg1: u64, arg2: u64) -> u64 {
    // SAFETY: `dispatch` rejects null, oversized and non-canonical buffers.
    // A canonical but unmapped buffer faults, and faults are fatal.
    encode(unsafe { dispatch(&mut KernelServices, number, arg1, arg2) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_call_returns_enosys() {
        assert_eq!(syscall_handler(9999, 0, 0) as i64, -38);
    }

    #[test]
    fn null_write_is_rejected() {
        assert_eq!(syscall_handler(1, 0, 16) as i64, -22);
    }
}
