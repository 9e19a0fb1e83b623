//! # INIT.BND bundle ABI
//!
//! Wire format shared by the host-side `bundler` tool and the loader that maps
//! the bundle at boot. A bundle is a single blob laid out as:
//!
//! ```text
//! 0x0000 ┌──────────────────────────────┐
//!        │ Header (24 bytes)            │
//!        ├──────────────────────────────┤ table_offset (= 24)
//!        │ Entry[0..entry_count]        │ 48 bytes each
//!        ├──────────────────────────────┤
//!        │ zero padding                 │
//! 0x1000 ├──────────────────────────────┤ payload_start (page aligned)
//!        │ payload 0 │ zero padding     │
//!        ├──────────────────────────────┤ page aligned
//!        │ payload 1 │ zero padding     │
//!        └──────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Offsets in the table are absolute and
//! always multiples of [`BUNDLE_ALIGN`]; the loader maps payloads page by page
//! and trusts them without further checks.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod name;
pub mod schema;

#[cfg(feature = "unbundle")]
pub mod unbundle;

use bitfield_struct::bitfield;
use core::fmt;
use core::str::FromStr;

pub use name::{EntryName, MAX_NAME_LEN, NAME_FIELD_LEN, NameError};

/// Magic signature identifying a valid bundle file: `"INITBND"` plus a NUL.
pub const BUNDLE_MAGIC: [u8; 8] = *b"INITBND\0";

/// Current format version.
pub const BUNDLE_VERSION: u16 = 1;

/// Alignment of the payload area and of every payload region.
pub const BUNDLE_ALIGN: usize = 4096;

/// Serialized size of [`Header`].
pub const HEADER_SIZE: usize = schema::header::RECORD_SIZE;

/// Serialized size of one [`Entry`].
pub const ENTRY_SIZE: usize = schema::entry::RECORD_SIZE;

/// Value of [`Header::table_offset`]: the table directly follows the header.
#[allow(clippy::cast_possible_truncation)]
pub const TABLE_OFFSET: u32 = HEADER_SIZE as u32;

const _: () = assert!(BUNDLE_ALIGN.is_power_of_two());

/// Round `value` up to the next multiple of `alignment` (a power of two).
#[inline]
#[must_use]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Like [`align_up`], but returns `None` instead of overflowing.
#[inline]
#[must_use]
pub const fn checked_align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    match value.checked_add(alignment - 1) {
        Some(v) => Some(v & !(alignment - 1)),
        None => None,
    }
}

/// Whether `value` is a multiple of [`BUNDLE_ALIGN`].
#[inline]
#[must_use]
pub const fn is_bundle_aligned(value: usize) -> bool {
    value & (BUNDLE_ALIGN - 1) == 0
}

/// Kind of module stored in an entry.
///
/// The loader starts the first [`EntryType::Init`] entry as the coordinator
/// and leaves the rest to it. Unrecognized values decode as
/// [`EntryType::Unknown`].
#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EntryType {
    #[default]
    Unknown = 0,
    Init = 1,
    Driver = 2,
    Service = 3,
}

impl EntryType {
    /// Parse a manifest type string, case-insensitively.
    ///
    /// Anything unrecognized maps to [`EntryType::Unknown`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        [Self::Init, Self::Driver, Self::Service]
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(name))
            .unwrap_or_default()
    }

    /// Decode the on-disk type byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Init,
            2 => Self::Driver,
            3 => Self::Service,
            _ => Self::Unknown,
        }
    }

    /// The on-disk type byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Init => "init",
            Self::Driver => "driver",
            Self::Service => "service",
        }
    }
}

impl From<EntryType> for u8 {
    fn from(value: EntryType) -> Self {
        value.as_u8()
    }
}

impl FromStr for EntryType {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Entry flags byte.
///
/// Layout (LSB→MSB):
/// - bit 0: required
/// - bits 1..7: reserved (zero)
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct EntryFlags {
    /// The loader must treat a failure to start this entry as fatal.
    pub required: bool,
    #[bits(7)]
    __: u8,
}

/// Fixed-size header at offset 0 of a bundle.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Header {
    /// Constant [`BUNDLE_MAGIC`].
    pub magic: [u8; 8],

    /// Format version, [`BUNDLE_VERSION`].
    pub version: u16,

    /// Number of [`Entry`] records in the table.
    pub entry_count: u16,

    /// Absolute offset of the first [`Entry`]; always [`TABLE_OFFSET`].
    pub table_offset: u32,

    /// Reserved; must be zero.
    pub reserved: [u8; 8],
}

impl Header {
    /// A current-version header describing `entry_count` entries.
    #[must_use]
    pub const fn new(entry_count: u16) -> Self {
        Self {
            magic: BUNDLE_MAGIC,
            version: BUNDLE_VERSION,
            entry_count,
            table_offset: TABLE_OFFSET,
            reserved: [0; 8],
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        use schema::header::{ENTRY_COUNT, MAGIC, RESERVED, TABLE_OFFSET, VERSION};

        let mut buf = [0u8; HEADER_SIZE];
        buf[MAGIC.range()].copy_from_slice(&self.magic);
        buf[VERSION.range()].copy_from_slice(&self.version.to_le_bytes());
        buf[ENTRY_COUNT.range()].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[TABLE_OFFSET.range()].copy_from_slice(&self.table_offset.to_le_bytes());
        buf[RESERVED.range()].copy_from_slice(&self.reserved);
        buf
    }

    #[must_use]
    pub const fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        use schema::header::{ENTRY_COUNT, MAGIC, RESERVED, TABLE_OFFSET, VERSION};

        Self {
            magic: read_array(buf, MAGIC.offset),
            version: u16::from_le_bytes(read_array(buf, VERSION.offset)),
            entry_count: u16::from_le_bytes(read_array(buf, ENTRY_COUNT.offset)),
            table_offset: u32::from_le_bytes(read_array(buf, TABLE_OFFSET.offset)),
            reserved: read_array(buf, RESERVED.offset),
        }
    }
}

/// One record of the entry table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Entry {
    /// Zero-padded ASCII name.
    pub name: EntryName,

    /// Module kind.
    pub entry_type: EntryType,

    /// See [`EntryFlags`].
    pub flags: EntryFlags,

    /// Absolute offset of the payload; a multiple of [`BUNDLE_ALIGN`].
    pub offset: u32,

    /// Exact payload length in bytes.
    pub size: u32,

    /// Reserved for a payload checksum; currently always zero.
    pub checksum: u32,
}

impl Entry {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        use schema::entry::{CHECKSUM, FLAGS, NAME, OFFSET, SIZE, TYPE};

        let mut buf = [0u8; ENTRY_SIZE];
        buf[NAME.range()].copy_from_slice(self.name.as_field());
        buf[TYPE.offset] = self.entry_type.as_u8();
        buf[FLAGS.offset] = self.flags.into_bits();
        buf[OFFSET.range()].copy_from_slice(&self.offset.to_le_bytes());
        buf[SIZE.range()].copy_from_slice(&self.size.to_le_bytes());
        buf[CHECKSUM.range()].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Decode a table record. The name field is taken as-is.
    #[must_use]
    pub const fn from_bytes(buf: &[u8; ENTRY_SIZE]) -> Self {
        use schema::entry::{CHECKSUM, FLAGS, NAME, OFFSET, SIZE, TYPE};

        Self {
            name: EntryName::from_field(read_array(buf, NAME.offset)),
            entry_type: EntryType::from_u8(buf[TYPE.offset]),
            flags: EntryFlags::from_bits(buf[FLAGS.offset]),
            offset: u32::from_le_bytes(read_array(buf, OFFSET.offset)),
            size: u32::from_le_bytes(read_array(buf, SIZE.offset)),
            checksum: u32::from_le_bytes(read_array(buf, CHECKSUM.offset)),
        }
    }
}

/// Copy `N` bytes starting at `at` out of a fixed-size record.
const fn read_array<const N: usize, const M: usize>(buf: &[u8; M], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    let mut i = 0;
    while i < N {
        out[i] = buf[at + i];
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_page() {
        assert_eq!(align_up(0, BUNDLE_ALIGN), 0);
        assert_eq!(align_up(1, BUNDLE_ALIGN), 4096);
        assert_eq!(align_up(168, BUNDLE_ALIGN), 4096);
        assert_eq!(align_up(4096, BUNDLE_ALIGN), 4096);
        assert_eq!(align_up(4097, BUNDLE_ALIGN), 8192);
        assert_eq!(align_up(8192 + 5000, BUNDLE_ALIGN), 16384);
    }

    #[test]
    fn checked_align_up_detects_overflow() {
        assert_eq!(checked_align_up(4095, BUNDLE_ALIGN), Some(4096));
        assert_eq!(checked_align_up(usize::MAX, BUNDLE_ALIGN), None);
        assert_eq!(checked_align_up(usize::MAX - 4094, BUNDLE_ALIGN), None);
    }

    #[test]
    fn entry_type_parsing_is_case_insensitive() {
        assert_eq!(EntryType::from_name("init"), EntryType::Init);
        assert_eq!(EntryType::from_name("Driver"), EntryType::Driver);
        assert_eq!(EntryType::from_name("SERVICE"), EntryType::Service);
        assert_eq!("driver".parse::<EntryType>(), Ok(EntryType::Driver));
    }

    #[test]
    fn unknown_entry_types_fall_back() {
        assert_eq!(EntryType::from_name(""), EntryType::Unknown);
        assert_eq!(EntryType::from_name("firmware"), EntryType::Unknown);
        assert_eq!(EntryType::from_name("unknown"), EntryType::Unknown);
        assert_eq!(EntryType::from_u8(9), EntryType::Unknown);
        assert_eq!(u8::from(EntryType::Service), 3);
    }

    #[test]
    fn required_is_bit_zero() {
        assert_eq!(EntryFlags::new().with_required(true).into_bits(), 0x01);
        assert_eq!(EntryFlags::new().into_bits(), 0x00);
        assert!(EntryFlags::from_bits(0x81).required());
    }

    #[test]
    fn header_bytes() {
        let bytes = Header::new(3).to_bytes();
        assert_eq!(&bytes[0..8], b"INITBND\0");
        assert_eq!(&bytes[8..10], &[1, 0]);
        assert_eq!(&bytes[10..12], &[3, 0]);
        assert_eq!(&bytes[12..16], &[24, 0, 0, 0]);
        assert_eq!(&bytes[16..24], &[0; 8]);
        assert_eq!(Header::from_bytes(&bytes), Header::new(3));
    }

    #[test]
    fn entry_bytes() {
        let entry = Entry {
            name: EntryName::new("drv0").unwrap(),
            entry_type: EntryType::Driver,
            flags: EntryFlags::new().with_required(true),
            offset: 0x2000,
            size: 5000,
            checksum: 0,
        };

        let bytes = entry.to_bytes();
        assert_eq!(&bytes[..4], b"drv0");
        assert!(bytes[4..32].iter().all(|&b| b == 0));
        assert_eq!(bytes[32], 2);
        assert_eq!(bytes[33], 1);
        assert_eq!(&bytes[34..36], &[0, 0]);
        assert_eq!(&bytes[36..40], &0x2000u32.to_le_bytes());
        assert_eq!(&bytes[40..44], &5000u32.to_le_bytes());
        assert_eq!(&bytes[44..48], &[0; 4]);
        assert_eq!(Entry::from_bytes(&bytes), entry);
    }
}
