//! System call numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    // I/O Operations (0-19)
    Read = 0,
    Write = 1,

    // Process Management (20-39)
    GetPid = 24,

    // Memory Management (40-59)
    Alloc = 42,

    // Time (60-79)
    GetTicks = 61,

    // Unknown
    Unknown = u64::MAX,
}

impl From<u64> for SyscallNumber {
    fn from(num: u64) -> Self {
        match num {
            0 => Self::Read,
            1 => Self::Write,
            24 => Self::GetPid,
            42 => Self::Alloc,
            61 => Self::GetTicks,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_numbers() {
        for number in [SyscallNumber::Read, SyscallNumber::Write, SyscallNumber::GetPid, SyscallNumber::Alloc, SyscallNumber::GetTicks] {
            assert_eq!(SyscallNumber::from(number as u64), number);
        }
    }

    #[test]
    fn gaps_are_unknown() {
        assert_eq!(SyscallNumber::from(2), SyscallNumber::Unknown);
        assert_eq!(SyscallNumber::from(9999), SyscallNumber::Unknown);
        assert_eq!(SyscallNumber::from(u64::MAX), SyscallNumber::Unknown);
    }
}
