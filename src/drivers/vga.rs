//! VGA text mode: 80x25 cells of (character, attribute) at physical 0xB8000.
//!
//! Cells are addressed by a linear index, `row * 80 + col`. Stores are
//! volatile since the buffer is device memory.

use core::ptr;

use spin::Mutex;
use x86_64::VirtAddr;

pub const BUFFER_WIDTH: usize = 80;
pub const BUFFER_HEIGHT: usize = 25;
pub const CELL_COUNT: usize = BUFFER_WIDTH * BUFFER_HEIGHT;

/// Physical address of the text buffer. Also its virtual address while
/// low memory is identity mapped.
pub const VGA_BUFFER: u64 = 0xb8000;

/// The standard color palette in VGA text mode.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    pub const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode((background as u8) << 4 | (foreground as u8))
    }

    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl Default for ColorCode {
    fn default() -> Self {
        Self::new(Color::LightGray, Color::Black)
    }
}

pub struct Vga {
    base: VirtAddr,
    color: ColorCode,
}

impl Vga {
    /// # Safety
    ///
    /// VGA text mode must be active and 0xB8000 mapped at the same virtual
    /// address.
    pub unsafe fn new() -> Self {
        Self::at(VirtAddr::new(VGA_BUFFER))
    }

    /// # Safety
    ///
    /// `base` must point to at least [`CELL_COUNT`] writable two-byte cells.
    pub const unsafe fn at(base: VirtAddr) -> Self {
        Self {
            base,
            color: ColorCode::new(Color::LightGray, Color::Black),
        }
    }

    pub fn set_color(&mut self, color: ColorCode) {
        self.color = color;
    }

    pub fn color(&self) -> ColorCode {
        self.color
    }

    pub fn base(&self) -> VirtAddr {
        self.base
    }

    fn cell(&self, index: usize) -> *mut u8 {
        (self.base + (index * 2) as u64).as_mut_ptr()
    }

    /// Stores `byte` and the current attribute into cell `index`.
    ///
    /// # Safety
    ///
    /// `index` must be below [`CELL_COUNT`]; it is not checked.
    pub unsafe fn write(&mut self, index: usize, byte: u8) {
        let cell = self.cell(index);
        ptr::write_volatile(cell, byte);
        ptr::write_volatile(cell.add(1), self.color.as_u8());
    }

    /// Returns the (character, attribute) pair stored in cell `index`.
    ///
    /// # Safety
    ///
    /// `index` must be below [`CELL_COUNT`].
    pub unsafe fn read(&self, index: usize) -> (u8, u8) {
        let cell = self.cell(index);
        (ptr::read_volatile(cell), ptr::read_volatile(cell.add(1)))
    }

    /// Writes `s` starting at cell `index`, stopping at the end of the
    /// screen. Anything outside printable ASCII shows as a block.
    pub fn write_str(&mut self, index: usize, s: &str) -> usize {
        let mut written = 0;
        for (cell, byte) in (index..CELL_COUNT).zip(s.bytes()) {
            let byte = match byte {
                0x20..=0x7e => byte,
                _ => 0xfe,
            };
            // SAFETY: `cell` is below CELL_COUNT.
            unsafe { self.write(cell, byte) };
            written += 1;
        }
        written
    }

    pub fn clear(&mut self) {
        for cell in 0..CELL_COUNT {
            // SAFETY: `cell` is below CELL_COUNT.
            unsafe { self.write(cell, b' ') };
        }
    }
}

pub static VGA: Mutex<Option<Vga>> = Mutex::new(None);

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> Vec<u8> {
        vec![0u8; CELL_COUNT * 2]
    }

    fn vga(buffer: &mut [u8]) -> Vga {
        unsafe { Vga::at(VirtAddr::new(buffer.as_mut_ptr() as u64)) }
    }

    #[test]
    fn write_then_read_back_one_cell() {
        let mut buffer = screen();
        let mut vga = vga(&mut buffer);

        unsafe {
            vga.write(0, b'A');
            assert_eq!(vga.read(0), (b'A', 0x07));
        }
    }

    #[test]
    fn writes_do_not_bleed_into_neighbours() {
        let mut buffer = screen();
        let mut vga = vga(&mut buffer);

        unsafe {
            vga.write(41, b'x');
            assert_eq!(vga.read(40), (0, 0));
            assert_eq!(vga.read(42), (0, 0));
        }
        assert_eq!(&buffer[82..84], &[b'x', 0x07]);
        assert_eq!(buffer.iter().filter(|&&b| b != 0).count(), 2);
    }

    #[test]
    fn last_cell_is_addressable() {
        let mut buffer = screen();
        let mut vga = vga(&mut buffer);
        vga.set_color(ColorCode::new(Color::Yellow, Color::Blue));

        unsafe { vga.write(CELL_COUNT - 1, b'z') };
        assert_eq!(&buffer[CELL_COUNT * 2 - 2..], &[b'z', 0x1e]);
    }

    #[test]
    fn write_str_replaces_unprintable_bytes() {
        let mut buffer = screen();
        let mut vga = vga(&mut buffer);

        assert_eq!(vga.write_str(0, "ok\n"), 3);
        unsafe {
            assert_eq!(vga.read(0).0, b'o');
            assert_eq!(vga.read(1).0, b'k');
            assert_eq!(vga.read(2).0, 0xfe);
        }
    }

    #[test]
    fn write_str_stops_at_end_of_screen() {
        let mut buffer = screen();
        let mut vga = vga(&mut buffer);
        assert_eq!(vga.write_str(CELL_COUNT - 2, "abcdef"), 2);
    }

    #[test]
    fn handle_keeps_a_typed_base() {
        let mut buffer = screen();
        let base = VirtAddr::from_ptr(buffer.as_mut_ptr());
        let vga = unsafe { Vga::at(base) };
        assert_eq!(vga.base(), base);
        assert_eq!(unsafe { Vga::new() }.base(), VirtAddr::new(VGA_BUFFER));
    }

    #[test]
    fn clear_blanks_every_cell() {
        let mut buffer = screen();
        let mut vga = vga(&mut buffer);
        vga.clear();
        assert!(buffer.chunks(2).all(|cell| cell == [b' ', 0x07]));
    }
}
