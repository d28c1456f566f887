//! Memory and storage arrays
use static_assertions::{const_assert, const_assert_eq};
use std::mem::{offset_of, size_of};
use zerocopy::{
    BigEndian, FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, U16,
};

/// Size of working memory, in bytes
pub const MEMORY_SIZE: usize = 3200;

/// Size of program storage, in bytes
pub const STORAGE_SIZE: usize = 65536;

/// Display width, in pixels
pub const DISPLAY_WIDTH: usize = 32;

/// Display height, in pixels
pub const DISPLAY_HEIGHT: usize = 16;

/// Named span of working memory
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Region {
    /// First byte of the region
    pub addr: usize,
    /// Length of the region, in bytes
    pub len: usize,
}

impl Region {
    const fn new(addr: usize, len: usize) -> Self {
        Self { addr, len }
    }

    /// One past the last byte of the region
    pub const fn end(&self) -> usize {
        self.addr + self.len
    }
}

/// The data stack
pub const STACK: Region = Region::new(0, 256);
/// Button states (0 up, 1 just pressed, 2 held)
pub const BUTTONS: Region = Region::new(512, 3);
/// Audio frequency, big-endian
pub const AUDIO: Region = Region::new(520, 2);
/// Icon bitmask
pub const ICONS: Region = Region::new(524, 1);
/// Timer tick
pub const TIMER: Region = Region::new(526, 1);
/// Serial handshake state
pub const SERIAL_STATE: Region = Region::new(528, 2);
/// Serial pins
pub const SERIAL_PINS: Region = Region::new(544, 16);
/// Framebuffer, one byte per pixel, row-major
pub const VIDEO: Region = Region::new(640, DISPLAY_WIDTH * DISPLAY_HEIGHT);
/// Save-data window
pub const SAVE_DATA: Region = Region::new(1152, 256);
/// Image-data scratch space
pub const IMAGE_DATA: Region = Region::new(1408, 512);

/// Typed view of working memory
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MemoryMap {
    /// Data stack
    pub stack: [u8; 256],
    _reserved_0: [u8; 256],
    /// Button states
    pub buttons: [u8; 3],
    _reserved_1: [u8; 5],
    /// Audio frequency (0 is silent)
    pub audio: U16<BigEndian>,
    _reserved_2: [u8; 2],
    /// Icon bitmask
    pub icons: u8,
    _reserved_3: u8,
    /// Timer tick
    pub timer: u8,
    _reserved_4: u8,
    /// Serial handshake state
    pub serial_state: [u8; 2],
    _reserved_5: [u8; 14],
    /// Serial pins
    pub serial_pins: [u8; 16],
    _reserved_6: [u8; 80],
    /// Framebuffer
    pub video: [u8; 512],
    /// Save-data window
    pub save_data: [u8; 256],
    /// Image-data scratch space
    pub image_data: [u8; 512],
    _reserved_7: [u8; 1280],
}

const_assert_eq!(size_of::<MemoryMap>(), MEMORY_SIZE);
const_assert_eq!(offset_of!(MemoryMap, stack), STACK.addr);
const_assert_eq!(offset_of!(MemoryMap, buttons), BUTTONS.addr);
const_assert_eq!(offset_of!(MemoryMap, audio), AUDIO.addr);
const_assert_eq!(offset_of!(MemoryMap, icons), ICONS.addr);
const_assert_eq!(offset_of!(MemoryMap, timer), TIMER.addr);
const_assert_eq!(offset_of!(MemoryMap, serial_state), SERIAL_STATE.addr);
const_assert_eq!(offset_of!(MemoryMap, serial_pins), SERIAL_PINS.addr);
const_assert_eq!(offset_of!(MemoryMap, video), VIDEO.addr);
const_assert_eq!(offset_of!(MemoryMap, save_data), SAVE_DATA.addr);
const_assert_eq!(offset_of!(MemoryMap, image_data), IMAGE_DATA.addr);
const_assert!(IMAGE_DATA.end() <= MEMORY_SIZE);

/// Working memory
///
/// Reads past the end return 0 and writes past the end are dropped.
pub struct Memory(Box<MemoryMap>);

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    /// Builds a zero-initialized memory
    pub fn new() -> Self {
        Memory(Box::new(MemoryMap::new_zeroed()))
    }

    /// Sets every byte to zero
    pub fn clear(&mut self) {
        self.0.zero();
    }

    /// Borrows the typed memory map
    #[inline]
    pub fn map(&self) -> &MemoryMap {
        &self.0
    }

    /// Mutably borrows the typed memory map
    #[inline]
    pub fn map_mut(&mut self) -> &mut MemoryMap {
        &mut self.0
    }

    /// Borrows memory as a flat byte array
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.0.as_mut_bytes()
    }

    /// Reads a single byte
    #[inline]
    pub fn read_byte(&self, addr: usize) -> u8 {
        self.bytes().get(addr).copied().unwrap_or(0)
    }

    /// Reads up to `len` bytes, stopping at the end of memory
    pub fn read(&self, addr: usize, len: usize) -> &[u8] {
        clipped(self.bytes(), addr, len)
    }

    /// Writes bytes starting at `addr`, dropping any that don't fit
    pub fn write(&mut self, addr: usize, data: &[u8]) {
        write_clipped(self.bytes_mut(), addr, data);
    }

    /// Borrows the bytes of a region
    pub fn region(&self, r: Region) -> &[u8] {
        self.read(r.addr, r.len)
    }

    /// Writes bytes at `offset` within a region, dropping any that fall
    /// outside of it
    pub fn write_region(&mut self, r: Region, offset: usize, data: &[u8]) {
        if let Some(dst) = self.bytes_mut().get_mut(r.addr..r.end()) {
            write_clipped(dst, offset, data);
        }
    }

    /// Reads the byte at `offset` within a region, or 0 if it falls outside
    pub fn read_region(&self, r: Region, offset: usize) -> u8 {
        if offset < r.len {
            self.read_byte(r.addr + offset)
        } else {
            0
        }
    }
}

/// Program storage, holding the token stream and any data bytes
pub struct Storage(Box<[u8; STORAGE_SIZE]>);

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    /// Builds a zero-initialized storage array
    pub fn new() -> Self {
        Storage(Box::new([0u8; STORAGE_SIZE]))
    }

    /// Sets every byte to zero
    pub fn clear(&mut self) {
        self.0.fill(0);
    }

    /// Reads a single byte, returning 0 past the end
    #[inline]
    pub fn read_byte(&self, addr: usize) -> u8 {
        self.0.get(addr).copied().unwrap_or(0)
    }

    /// Reads up to `len` bytes, stopping at the end of storage
    pub fn read(&self, addr: usize, len: usize) -> &[u8] {
        clipped(&self.0[..], addr, len)
    }

    /// Writes bytes starting at `addr`, dropping any that don't fit
    pub fn write(&mut self, addr: usize, data: &[u8]) {
        write_clipped(&mut self.0[..], addr, data);
    }
}

impl std::ops::Deref for Storage {
    type Target = [u8; STORAGE_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

fn clipped(data: &[u8], addr: usize, len: usize) -> &[u8] {
    let start = addr.min(data.len());
    let end = addr.saturating_add(len).min(data.len());
    &data[start..end]
}

fn write_clipped(dst: &mut [u8], addr: usize, data: &[u8]) {
    if addr >= dst.len() {
        return;
    }
    let n = data.len().min(dst.len() - addr);
    dst[addr..][..n].copy_from_slice(&data[..n]);
}
