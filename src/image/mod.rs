//! Boot-time images handed over by the loader: an initramfs (newc cpio)
//! or a bare ELF executable.

pub mod cpio;
pub mod elf;

use cpio::{CpioArchive, CpioError, MAGIC_NEWC, MAGIC_NEWC_CRC};
use elf::{ElfError, ElfHeader, ELF_MAGIC};

/// Entry in the initramfs that holds the first program.
pub const INIT_PATH: &str = "init";

#[derive(Debug, Clone, Copy)]
pub enum BootImage<'a> {
    Elf(ElfHeader),
    Initramfs(CpioArchive<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    Unrecognized,
    Elf(ElfError),
    Cpio(CpioError),
}

impl From<ElfError> for ImageError {
    fn from(error: ElfError) -> Self {
        Self::Elf(error)
    }
}

impl From<CpioError> for ImageError {
    fn from(error: CpioError) -> Self {
        Self::Cpio(error)
    }
}

impl core::fmt::Display for ImageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unrecognized => write!(f, "unrecognized image format"),
            Self::Elf(error) => write!(f, "ELF: {}", error),
            Self::Cpio(error) => write!(f, "cpio: {}", error),
        }
    }
}

/// Tells the two formats apart by their leading magic.
pub fn identify(bytes: &[u8]) -> Result<BootImage<'_>, ImageError> {
    if bytes.starts_with(&ELF_MAGIC) {
        return Ok(BootImage::Elf(ElfHeader::parse(bytes)?));
    }
    if bytes.starts_with(MAGIC_NEWC) || bytes.starts_with(MAGIC_NEWC_CRC) {
        return Ok(BootImage::Initramfs(CpioArchive::new(bytes)));
    }
    Err(ImageError::Unrecognized)
}

/// Validates the ramdisk and logs what it contains. Returns the number of
/// archive entries, or 1 for a bare executable.
pub fn inspect(bytes: &[u8]) -> Result<usize, ImageError> {
    match identify(bytes)? {
        BootImage::Elf(header) => {
            log_elf("ramdisk", &header, bytes)?;
            Ok(1)
        }
        BootImage::Initramfs(archive) => {
            let mut count = 0;
            for entry in archive.entries() {
                let entry = entry?;
                log::debug!("  {:<32} {:>8} bytes mode {:o}", entry.name, entry.data.len(), entry.header.mode);
                count += 1;
            }
            log::info!("initramfs: {} entries", count);

            if let Some(init) = archive.find(INIT_PATH) {
                let header = ElfHeader::parse(init)?;
                log_elf(INIT_PATH, &header, init)?;
            }
            Ok(count)
        }
    }
}

fn log_elf(name: &str, header: &ElfHeader, image: &[u8]) -> Result<(), ImageError> {
    if !header.is_x86_64() {
        log::warn!("{}: machine {:#x} is not x86-64", name, header.machine);
    }
    log::info!("{}: ELF {:?}, entry {:#x}", name, header.kind(), header.entry);
    for segment in header.program_headers(image)?.filter(|ph| ph.is_load()) {
        log::debug!(
            "  LOAD vaddr {:#x} filesz {:#x} memsz {:#x}",
            segment.vaddr, segment.filesz, segment.memsz
        );
    }
    Ok(())
}
