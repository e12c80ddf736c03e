//! "New ASCII" (newc) cpio archives, the initramfs format.
//!
//! ```text
//! ┌──────────────────────┬───────────┬─────┬──────────┬─────┐
//! │ header (110 bytes)   │ name\0    │ pad │ data     │ pad │ ...
//! └──────────────────────┴───────────┴─────┴──────────┴─────┘
//!   magic + 13 x 8 hex     namesize    →4    filesize   →4
//! ```
//!
//! The archive ends with an entry named `TRAILER!!!`.

use core::fmt;

pub const HEADER_SIZE: usize = 110;
pub const MAGIC_NEWC: &[u8; 6] = b"070701";
/// Same layout, `check` holds a checksum of the data.
pub const MAGIC_NEWC_CRC: &[u8; 6] = b"070702";
pub const TRAILER: &str = "TRAILER!!!";

const FIELD_WIDTH: usize = 8;
const ALIGN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpioError {
    BadMagic { offset: usize },
    BadField { offset: usize },
    Truncated { offset: usize },
    BadName { offset: usize },
}

impl fmt::Display for CpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic { offset } => write!(f, "bad cpio magic at {:#x}", offset),
            Self::BadField { offset } => write!(f, "malformed header field at {:#x}", offset),
            Self::Truncated { offset } => write!(f, "entry at {:#x} runs past the archive", offset),
            Self::BadName { offset } => write!(f, "invalid entry name at {:#x}", offset),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpioHeader {
    pub checksummed: bool,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: u32,
    pub filesize: u32,
    pub devmajor: u32,
    pub devminor: u32,
    pub rdevmajor: u32,
    pub rdevminor: u32,
    pub namesize: u32,
    pub check: u32,
}

impl CpioHeader {
    /// Decodes the fixed header at the start of `bytes`; `offset` is only
    /// used for error reporting.
    pub fn parse(bytes: &[u8], offset: usize) -> Result<Self, CpioError> {
        let raw = bytes
            .get(..HEADER_SIZE)
            .ok_or(CpioError::Truncated { offset })?;
        let checksummed = match &raw[..6] {
            magic if magic == MAGIC_NEWC => false,
            magic if magic == MAGIC_NEWC_CRC => true,
            _ => return Err(CpioError::BadMagic { offset }),
        };

        let mut fields = [0u32; 13];
        for (i, field) in fields.iter_mut().enumerate() {
            let start = 6 + i * FIELD_WIDTH;
            *field = parse_hex(&raw[start..start + FIELD_WIDTH])
                .ok_or(CpioError::BadField { offset: offset + start })?;
        }
        let [ino, mode, uid, gid, nlink, mtime, filesize, devmajor, devminor, rdevmajor, rdevminor, namesize, check] =
            fields;

        Ok(Self {
            checksummed,
            ino,
            mode,
            uid,
            gid,
            nlink,
            mtime,
            filesize,
            devmajor,
            devminor,
            rdevmajor,
            rdevminor,
            namesize,
            check,
        })
    }

    pub fn is_dir(&self) -> bool {
        self.mode & 0o170000 == 0o040000
    }

    pub fn is_file(&self) -> bool {
        self.mode & 0o170000 == 0o100000
    }
}

fn parse_hex(digits: &[u8]) -> Option<u32> {
    digits.iter().try_fold(0u32, |value, &digit| {
        let nibble = char::from(digit).to_digit(16)?;
        Some(value << 4 | nibble)
    })
}

const fn align_up(offset: usize) -> usize {
    (offset + ALIGN - 1) & !(ALIGN - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpioEntry<'a> {
    pub header: CpioHeader,
    pub name: &'a str,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct CpioArchive<'a> {
    bytes: &'a [u8],
}

impl<'a> CpioArchive<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn entries(&self) -> Entries<'a> {
        Entries {
            bytes: self.bytes,
            offset: 0,
            done: false,
        }
    }

    /// Data of the first well-formed entry called `name`.
    pub fn find(&self, name: &str) -> Option<&'a [u8]> {
        self.entries()
            .map_while(Result::ok)
            .find(|entry| entry.name == name)
            .map(|entry| entry.data)
    }
}

/// Yields entries in archive order. Stops at the trailer or the end of the
/// buffer; a malformed entry is yielded as an error and ends the walk.
pub struct Entries<'a> {
    bytes: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> Entries<'a> {
    fn read_entry(&mut self) -> Result<Option<CpioEntry<'a>>, CpioError> {
        let offset = self.offset;
        let rest = &self.bytes[offset..];
        let header = CpioHeader::parse(rest, offset)?;

        let truncated = CpioError::Truncated { offset };
        let namesize = header.namesize as usize;
        let name_end = HEADER_SIZE.checked_add(namesize).ok_or(truncated)?;
        let name_bytes = rest.get(HEADER_SIZE..name_end).ok_or(truncated)?;
        let name = match name_bytes.split_last() {
            Some((0, name)) => core::str::from_utf8(name).map_err(|_| CpioError::BadName { offset })?,
            _ => return Err(CpioError::BadName { offset }),
        };
        if name == TRAILER {
            return Ok(None);
        }

        let data_start = align_up(name_end);
        let data_end = data_start
            .checked_add(header.filesize as usize)
            .ok_or(truncated)?;
        let data = rest.get(data_start..data_end).ok_or(truncated)?;

        self.offset = offset + align_up(data_end).min(rest.len());
        Ok(Some(CpioEntry { header, name, data }))
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<CpioEntry<'a>, CpioError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.bytes.len() {
            return None;
        }
        match self.read_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}
