//! ELF64 file and program headers.
//!
//! Only the little-endian 64-bit flavour is accepted. Nothing is loaded;
//! these are read-only views over an image in memory.

use core::fmt;

use crate::bytes::{le_u16, le_u32, le_u64};

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const ELF_HEADER_SIZE: usize = 64;
pub const PROGRAM_HEADER_SIZE: usize = 56;

const CLASS_64: u8 = 2;
const DATA_LITTLE_ENDIAN: u8 = 1;
const VERSION_CURRENT: u8 = 1;

pub const MACHINE_X86_64: u16 = 0x3e;

pub const PT_LOAD: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    TooShort,
    BadMagic,
    UnsupportedClass(u8),
    UnsupportedEncoding(u8),
    UnsupportedVersion(u8),
    ProgramHeadersOutOfBounds,
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "image shorter than an ELF header"),
            Self::BadMagic => write!(f, "missing ELF signature"),
            Self::UnsupportedClass(class) => write!(f, "unsupported ELF class {}", class),
            Self::UnsupportedEncoding(data) => write!(f, "unsupported data encoding {}", data),
            Self::UnsupportedVersion(version) => write!(f, "unsupported ELF version {}", version),
            Self::ProgramHeadersOutOfBounds => write!(f, "program header table outside the image"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ElfType {
    None = 0,
    Relocatable = 1,
    Executable = 2,
    Shared = 3,
    Core = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfHeader {
    pub class: u8,
    pub data: u8,
    pub version: u8,
    pub os_abi: u8,
    pub elf_type: u16,
    pub machine: u16,
    pub object_version: u32,
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub flags: u32,
    pub ehsize: u16,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

impl ElfHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, ElfError> {
        if bytes.len() < ELF_HEADER_SIZE {
            return Err(ElfError::TooShort);
        }
        if bytes[0..4] != ELF_MAGIC {
            return Err(ElfError::BadMagic);
        }
        let (class, data, version) = (bytes[4], bytes[5], bytes[6]);
        if class != CLASS_64 {
            return Err(ElfError::UnsupportedClass(class));
        }
        if data != DATA_LITTLE_ENDIAN {
            return Err(ElfError::UnsupportedEncoding(data));
        }
        if version != VERSION_CURRENT {
            return Err(ElfError::UnsupportedVersion(version));
        }

        let u16_at = |offset| le_u16(bytes, offset).ok_or(ElfError::TooShort);
        let u32_at = |offset| le_u32(bytes, offset).ok_or(ElfError::TooShort);
        let u64_at = |offset| le_u64(bytes, offset).ok_or(ElfError::TooShort);

        Ok(Self {
            class,
            data,
            version,
            os_abi: bytes[7],
            elf_type: u16_at(16)?,
            machine: u16_at(18)?,
            object_version: u32_at(20)?,
            entry: u64_at(24)?,
            phoff: u64_at(32)?,
            shoff: u64_at(40)?,
            flags: u32_at(48)?,
            ehsize: u16_at(52)?,
            phentsize: u16_at(54)?,
            phnum: u16_at(56)?,
            shentsize: u16_at(58)?,
            shnum: u16_at(60)?,
            shstrndx: u16_at(62)?,
        })
    }

    pub fn is_x86_64(&self) -> bool {
        self.machine == MACHINE_X86_64
    }

    pub fn kind(&self) -> Option<ElfType> {
        match self.elf_type {
            0 => Some(ElfType::None),
            1 => Some(ElfType::Relocatable),
            2 => Some(ElfType::Executable),
            3 => Some(ElfType::Shared),
            4 => Some(ElfType::Core),
            _ => None,
        }
    }

    /// Program headers of `image`, which must be the buffer this header was
    /// parsed from. The whole table is bounds-checked up front.
    pub fn program_headers<'a>(&self, image: &'a [u8]) -> Result<ProgramHeaders<'a>, ElfError> {
        if self.phnum > 0 && usize::from(self.phentsize) < PROGRAM_HEADER_SIZE {
            return Err(ElfError::ProgramHeadersOutOfBounds);
        }
        let start = usize::try_from(self.phoff).map_err(|_| ElfError::ProgramHeadersOutOfBounds)?;
        let table_len = usize::from(self.phentsize) * usize::from(self.phnum);
        let end = start
            .checked_add(table_len)
            .ok_or(ElfError::ProgramHeadersOutOfBounds)?;
        let table = image
            .get(start..end)
            .ok_or(ElfError::ProgramHeadersOutOfBounds)?;

        Ok(ProgramHeaders {
            table,
            stride: usize::from(self.phentsize),
            index: 0,
            count: usize::from(self.phnum),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl ProgramHeader {
    fn parse(raw: &[u8]) -> Option<Self> {
        Some(Self {
            p_type: le_u32(raw, 0)?,
            flags: le_u32(raw, 4)?,
            offset: le_u64(raw, 8)?,
            vaddr: le_u64(raw, 16)?,
            paddr: le_u64(raw, 24)?,
            filesz: le_u64(raw, 32)?,
            memsz: le_u64(raw, 40)?,
            align: le_u64(raw, 48)?,
        })
    }

    pub fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }
}

pub struct ProgramHeaders<'a> {
    table: &'a [u8],
    stride: usize,
    index: usize,
    count: usize,
}

impl<'a> Iterator for ProgramHeaders<'a> {
    type Item = ProgramHeader;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let start = self.index * self.stride;
        self.index += 1;
        ProgramHeader::parse(self.table.get(start..start + PROGRAM_HEADER_SIZE)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A minimal x86-64 executable: header plus `phnum` PT_LOAD entries.
    pub(crate) fn sample_image(phnum: u16) -> Vec<u8> {
        let mut image = vec![0u8; ELF_HEADER_SIZE + PROGRAM_HEADER_SIZE * phnum as usize];
        image[0..4].copy_from_slice(&ELF_MAGIC);
        image[4] = CLASS_64;
        image[5] = DATA_LITTLE_ENDIAN;
        image[6] = VERSION_CURRENT;
        image[16..18].copy_from_slice(&2u16.to_le_bytes());
        image[18..20].copy_from_slice(&MACHINE_X86_64.to_le_bytes());
        image[20..24].copy_from_slice(&1u32.to_le_bytes());
        image[24..32].copy_from_slice(&0x40_1000u64.to_le_bytes());
        image[32..40].copy_from_slice(&(ELF_HEADER_SIZE as u64).to_le_bytes());
        image[52..54].copy_from_slice(&(ELF_HEADER_SIZE as u16).to_le_bytes());
        image[54..56].copy_from_slice(&(PROGRAM_HEADER_SIZE as u16).to_le_bytes());
        image[56..58].copy_from_slice(&phnum.to_le_bytes());

        for i in 0..phnum as usize {
            let ph = &mut image[ELF_HEADER_SIZE + i * PROGRAM_HEADER_SIZE..][..PROGRAM_HEADER_SIZE];
            ph[0..4].copy_from_slice(&PT_LOAD.to_le_bytes());
            ph[4..8].copy_from_slice(&5u32.to_le_bytes());
            ph[16..24].copy_from_slice(&(0x40_0000u64 + 0x1000 * i as u64).to_le_bytes());
            ph[32..40].copy_from_slice(&0x200u64.to_le_bytes());
            ph[40..48].copy_from_slice(&0x1000u64.to_le_bytes());
        }
        image
    }

    #[test]
    fn parses_executable_header() {
        let image = sample_image(2);
        let header = ElfHeader::parse(&image).unwrap();

        assert!(header.is_x86_64());
        assert_eq!(header.kind(), Some(ElfType::Executable));
        assert_eq!(header.entry, 0x40_1000);
        assert_eq!(header.phoff, 64);
        assert_eq!(header.phnum, 2);
        assert_eq!(header.ehsize, 64);
        assert_eq!(header.object_version, 1);
    }

    #[test]
    fn walks_program_headers() {
        let image = sample_image(3);
        let header = ElfHeader::parse(&image).unwrap();
        let headers: Vec<_> = header.program_headers(&image).unwrap().collect();

        assert_eq!(headers.len(), 3);
        assert!(headers.iter().all(ProgramHeader::is_load));
        assert_eq!(headers[2].vaddr, 0x40_2000);
        assert_eq!(headers[0].memsz, 0x1000);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut image = sample_image(0);
        image[1] = b'X';
        assert_eq!(ElfHeader::parse(&image), Err(ElfError::BadMagic));
    }

    #[test]
    fn rejects_32_bit_class() {
        let mut image = sample_image(0);
        image[4] = 1;
        assert_eq!(ElfHeader::parse(&image), Err(ElfError::UnsupportedClass(1)));
    }

    #[test]
    fn rejects_big_endian_and_short_input() {
        let mut image = sample_image(0);
        image[5] = 2;
        assert_eq!(ElfHeader::parse(&image), Err(ElfError::UnsupportedEncoding(2)));
        assert_eq!(ElfHeader::parse(&image[..63]), Err(ElfError::TooShort));
    }

    #[test]
    fn truncated_program_table_is_an_error() {
        let image = sample_image(2);
        let header = ElfHeader::parse(&image).unwrap();
        assert!(matches!(
            header.program_headers(&image[..ELF_HEADER_SIZE + PROGRAM_HEADER_SIZE]),
            Err(ElfError::ProgramHeadersOutOfBounds)
        ));
    }
}
