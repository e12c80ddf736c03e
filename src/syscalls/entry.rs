//! `int 0x80` gate.
//!
//! Register convention: `rax` holds the call number, `rdi` and `rsi` the two
//! arguments, and the result comes back in `rax`. Every other register the
//! caller can observe is preserved.

use core::arch::global_asm;

global_asm!(
    ".global anvil_syscall_gate",
    "anvil_syscall_gate:",
    "push rcx",
    "push rdx",
    "push rsi",
    "push rdi",
    "push r8",
    "push r9",
    "push r10",
    "push r11",
    // 5 words of interrupt frame + 8 saved registers: realign to 16.
    "sub rsp, 8",
    "cld",
    "mov rdx, rsi",
    "mov rsi, rdi",
    "mov rdi, rax",
    "call {entry}",
    "add rsp, 8",
    "pop r11",
    "pop r10",
    "pop r9",
    "pop r8",
    "pop rdi",
    "pop rsi",
    "pop rdx",
    "pop rcx",
    "iretq",
    entry = sym syscall_entry,
);

extern "C" {
    fn anvil_syscall_gate();
}

extern "C" fn syscall_entry(number: u64, arg1: u64, arg2: u64) -> u64 {
    super::syscall_handler(number, arg1, arg2)
}

/// Address to install in the IDT for the syscall vector.
pub fn gate_address() -> u64 {
    anvil_syscall_gate as usize as u64
}
