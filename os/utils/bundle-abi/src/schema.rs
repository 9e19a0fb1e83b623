//! # On-disk field schema
//!
//! Every record in an `INIT.BND` file is a fixed run of little-endian fields.
//! The tables below are the single source of truth for their offsets and
//! widths; [`Header`](crate::Header) and [`Entry`](crate::Entry) serialize
//! through them, and the compile-time checks at the bottom pin the widths to
//! the wire contract.
//!
//! ```text
//! Header (24 bytes)
//! 0      8        10           12            16         24
//! ┌──────┬────────┬────────────┬─────────────┬──────────┐
//! │magic │version │entry_count │table_offset │reserved  │
//! └──────┴────────┴────────────┴─────────────┴──────────┘
//!
//! Entry (48 bytes)
//! 0      32    33     34        36      40    44         48
//! ┌──────┬─────┬──────┬─────────┬───────┬─────┬──────────┐
//! │name  │type │flags │reserved │offset │size │checksum  │
//! └──────┴─────┴──────┴─────────┴───────┴─────┴──────────┘
//! ```

use core::ops::Range;

/// A single fixed-width field within a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name as used in documentation and diagnostics.
    pub name: &'static str,
    /// Byte offset from the start of the record.
    pub offset: usize,
    /// Width in bytes.
    pub width: usize,
}

impl Field {
    const fn first(name: &'static str, width: usize) -> Self {
        Self {
            name,
            offset: 0,
            width,
        }
    }

    const fn then(self, name: &'static str, width: usize) -> Self {
        Self {
            name,
            offset: self.end(),
            width,
        }
    }

    /// One past the last byte of this field.
    #[must_use]
    pub const fn end(self) -> usize {
        self.offset + self.width
    }

    /// Byte range of this field within its record.
    #[must_use]
    pub const fn range(self) -> Range<usize> {
        self.offset..self.end()
    }
}

/// Bundle header fields.
pub mod header {
    use super::Field;

    pub const MAGIC: Field = Field::first("magic", 8);
    pub const VERSION: Field = MAGIC.then("version", 2);
    pub const ENTRY_COUNT: Field = VERSION.then("entry_count", 2);
    pub const TABLE_OFFSET: Field = ENTRY_COUNT.then("table_offset", 4);
    pub const RESERVED: Field = TABLE_OFFSET.then("reserved", 8);

    /// All header fields in wire order.
    pub const FIELDS: [Field; 5] = [MAGIC, VERSION, ENTRY_COUNT, TABLE_OFFSET, RESERVED];

    /// Serialized size of the header in bytes.
    pub const RECORD_SIZE: usize = RESERVED.end();
}

/// Entry table record fields.
pub mod entry {
    use super::Field;

    pub const NAME: Field = Field::first("name", 32);
    pub const TYPE: Field = NAME.then("type", 1);
    pub const FLAGS: Field = TYPE.then("flags", 1);
    pub const RESERVED: Field = FLAGS.then("reserved", 2);
    pub const OFFSET: Field = RESERVED.then("offset", 4);
    pub const SIZE: Field = OFFSET.then("size", 4);
    pub const CHECKSUM: Field = SIZE.then("checksum", 4);

    /// All entry fields in wire order.
    pub const FIELDS: [Field; 7] = [NAME, TYPE, FLAGS, RESERVED, OFFSET, SIZE, CHECKSUM];

    /// Serialized size of one table record in bytes.
    pub const RECORD_SIZE: usize = CHECKSUM.end();
}

const _: () = {
    assert!(header::RECORD_SIZE == 24);
    assert!(header::MAGIC.width == size_of::<u64>());
    assert!(header::VERSION.width == size_of::<u16>());
    assert!(header::ENTRY_COUNT.width == size_of::<u16>());
    assert!(header::TABLE_OFFSET.width == size_of::<u32>());

    assert!(entry::RECORD_SIZE == 48);
    assert!(entry::TYPE.width == size_of::<u8>());
    assert!(entry::FLAGS.width == size_of::<u8>());
    assert!(entry::OFFSET.width == size_of::<u32>());
    assert!(entry::SIZE.width == size_of::<u32>());
    assert!(entry::CHECKSUM.width == size_of::<u32>());
};
