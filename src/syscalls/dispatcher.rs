use core::fmt;

use x86_64::{PhysAddr, VirtAddr};

use super::numbers::SyscallNumber;
use crate::config::MAX_WRITE_LEN;
use crate::memory::heap::{AllocError, NO_MEMORY};
use crate::task::Pid;

/// System call result type
pub type SyscallResult = Result<u64, SyscallError>;

/// System call errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidArgument,
    NotImplemented,
    NoSuchProcess,
    WouldBlock,
}

impl SyscallError {
    pub fn as_errno(self) -> i64 {
        match self {
            Self::InvalidArgument => -22, // EINVAL
            Self::NotImplemented => -38,  // ENOSYS
            Self::NoSuchProcess => -3,    // ESRCH
            Self::WouldBlock => -11,      // EAGAIN
        }
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotImplemented => write!(f, "not implemented"),
            Self::NoSuchProcess => write!(f, "no such process"),
            Self::WouldBlock => write!(f, "resource temporarily unavailable"),
        }
    }
}

/// Everything a system call can touch.
pub trait SyscallBackend {
    fn read_scancode(&mut self) -> Option<u8>;
    /// Returns the number of bytes written.
    fn write_console(&mut self, bytes: &[u8]) -> usize;
    fn current_pid(&mut self) -> Option<Pid>;
    fn alloc(&mut self, size: usize) -> Result<PhysAddr, AllocError>;
    fn ticks(&mut self) -> u64;
}

/// Routes one call to its handler.
///
/// # Safety
///
/// For `Write`, `arg1..arg1 + arg2` must be readable memory once the null,
/// length and canonical-address checks pass.
pub unsafe fn dispatch<B: SyscallBackend>(backend: &mut B, number: u64, arg1: u64, arg2: u64) -> SyscallResult {
    let syscall = SyscallNumber::from(number);

    log::debug!("syscall {:?}({:#x}, {:#x})", syscall, arg1, arg2);

    match syscall {
        SyscallNumber::Read => backend
            .read_scancode()
            .map(u64::from)
            .ok_or(SyscallError::WouldBlock),
        SyscallNumber::Write => sys_write(backend, arg1, arg2),
        SyscallNumber::GetPid => backend
            .current_pid()
            .map(|pid| u64::from(pid.as_u32()))
            .ok_or(SyscallError::NoSuchProcess),
        SyscallNumber::Alloc => sys_alloc(backend, arg1),
        SyscallNumber::GetTicks => Ok(backend.ticks()),
        SyscallNumber::Unknown => Err(SyscallError::NotImplemented),
    }
}

unsafe fn sys_write<B: SyscallBackend>(backend: &mut B, ptr: u64, len: u64) -> SyscallResult {
    if ptr == 0 || len > MAX_WRITE_LEN as u64 {
        return Err(SyscallError::InvalidArgument);
    }
    if len == 0 {
        return Ok(0);
    }
    let start = VirtAddr::try_new(ptr).map_err(|_| SyscallError::InvalidArgument)?;
    let last = ptr
        .checked_add(len - 1)
        .ok_or(SyscallError::InvalidArgument)?;
    VirtAddr::try_new(last).map_err(|_| SyscallError::InvalidArgument)?;

    let bytes = core::slice::from_raw_parts(start.as_ptr::<u8>(), len as usize);
    Ok(backend.write_console(bytes) as u64)
}

fn sys_alloc<B: SyscallBackend>(backend: &mut B, size: u64) -> SyscallResult {
    if size == 0 {
        return Err(SyscallError::InvalidArgument);
    }
    let size = usize::try_from(size).map_err(|_| SyscallError::InvalidArgument)?;
    Ok(backend.alloc(size).map_or(NO_MEMORY, PhysAddr::as_u64))
}

/// Folds a result into the single register returned to the caller.
pub fn encode(result: SyscallResult) -> u64 {
    match result {
        Ok(value) => value,
        Err(error) => error.as_errno() as u64,
    }
}
