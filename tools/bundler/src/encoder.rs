//! # Bundle encoder
//!
//! Turns an ordered list of [`BundleEntry`] records into an `INIT.BND` image.
//! Encoding happens in two steps:
//!
//! 1. [`BundleEncoder::new`] validates every entry and assigns offsets. All
//!    failures surface here, before a single byte is produced.
//! 2. [`BundleEncoder::to_bytes`], [`BundleEncoder::write_to`] or
//!    [`BundleEncoder::write_file`] serialize the header, the table, the
//!    table padding, and each payload followed by its padding, in that order.
//!
//! Table order is input order, so identical input always yields identical
//! output.

use bundle_abi::{
    BUNDLE_ALIGN, ENTRY_SIZE, Entry, EntryFlags, EntryName, EntryType, HEADER_SIZE, Header,
    NameError, align_up, checked_align_up,
};
use log::{debug, trace};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// One named payload to be packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub required: bool,
    pub payload: Vec<u8>,
}

impl BundleEntry {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        entry_type: EntryType,
        required: bool,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            entry_type,
            required,
            payload: payload.into(),
        }
    }
}

/// Placement of one payload as recorded in the entry table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LayoutEntry {
    /// Absolute file offset; a multiple of [`BUNDLE_ALIGN`].
    pub offset: u32,
    /// Exact payload length.
    pub size: u32,
    /// Reserved; always zero.
    pub checksum: u32,
}

impl From<&Entry> for LayoutEntry {
    fn from(e: &Entry) -> Self {
        Self {
            offset: e.offset,
            size: e.size,
            checksum: e.checksum,
        }
    }
}

/// Complete placement of a bundle: header, table records and file extent.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BundleLayout {
    header: Header,
    records: Vec<Entry>,
    payload_start: usize,
    total_size: usize,
}

impl BundleLayout {
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Table records in input order.
    #[must_use]
    pub fn records(&self) -> &[Entry] {
        &self.records
    }

    /// Offset, size and checksum of every entry, in input order.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = LayoutEntry> + '_ {
        self.records.iter().map(LayoutEntry::from)
    }

    /// Offset of the first payload: header plus table, rounded up to a page.
    #[must_use]
    pub const fn payload_start(&self) -> usize {
        self.payload_start
    }

    /// Length of the encoded file in bytes.
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.total_size
    }
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("entry #{index} ({name:?}): {source}")]
    Validation {
        index: usize,
        name: String,
        source: NameError,
    },
    #[error("bundle has no entries")]
    EmptyBundle,
    #[error("bundle has {0} entries, at most 65535 fit the header")]
    TooManyEntries(usize),
    #[error("entry #{index} ({name:?}) ends beyond the 32-bit offset range")]
    BundleTooLarge { index: usize, name: String },
}

/// Error returned by [`encode_to`].
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("failed to write bundle")]
    Io(#[from] io::Error),
}

/// Validated entries together with their computed layout.
#[derive(Debug)]
pub struct BundleEncoder<'a> {
    entries: &'a [BundleEntry],
    layout: BundleLayout,
}

impl<'a> BundleEncoder<'a> {
    /// Validate `entries` and assign each payload its offset.
    ///
    /// # Errors
    /// - [`EncodeError::EmptyBundle`] if `entries` is empty.
    /// - [`EncodeError::TooManyEntries`] if the count does not fit the header.
    /// - [`EncodeError::Validation`] for the first entry with a bad name.
    /// - [`EncodeError::BundleTooLarge`] if a payload would end past `u32::MAX`.
    pub fn new(entries: &'a [BundleEntry]) -> Result<Self, EncodeError> {
        let layout = plan(entries)?;
        Ok(Self { entries, layout })
    }

    #[must_use]
    pub const fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    /// Materialize the whole bundle in memory.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        // Zero-filled up front; padding needs no explicit writes.
        let mut out = vec![0u8; self.layout.total_size];
        out[..HEADER_SIZE].copy_from_slice(&self.layout.header.to_bytes());

        for (i, rec) in self.layout.records.iter().enumerate() {
            let p = HEADER_SIZE + i * ENTRY_SIZE;
            out[p..p + ENTRY_SIZE].copy_from_slice(&rec.to_bytes());
        }

        for (rec, entry) in self.layout.records.iter().zip(self.entries) {
            let off = rec.offset as usize;
            out[off..off + entry.payload.len()].copy_from_slice(&entry.payload);
        }

        out
    }

    /// Stream the bundle into `out`, returning the number of bytes written.
    ///
    /// Produces exactly the bytes of [`to_bytes`](Self::to_bytes) without
    /// buffering payloads a second time.
    ///
    /// # Errors
    /// Propagates any I/O error from `out`.
    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<usize> {
        out.write_all(&self.layout.header.to_bytes())?;
        let mut written = HEADER_SIZE;

        for rec in &self.layout.records {
            out.write_all(&rec.to_bytes())?;
            written += ENTRY_SIZE;
        }

        write_zeros(&mut out, self.layout.payload_start - written)?;
        written = self.layout.payload_start;

        for (rec, entry) in self.layout.records.iter().zip(self.entries) {
            debug_assert_eq!(written, rec.offset as usize);
            out.write_all(&entry.payload)?;
            written += entry.payload.len();

            let next = align_up(written, BUNDLE_ALIGN);
            write_zeros(&mut out, next - written)?;
            written = next;
        }

        debug_assert_eq!(written, self.layout.total_size);
        Ok(written)
    }

    /// Write the bundle to `path` through a temporary file in the same
    /// directory, returning the number of bytes written.
    ///
    /// `path` is replaced only after the whole image has been flushed, so a
    /// failed write leaves any previous bundle untouched.
    ///
    /// # Errors
    /// [`WriteError::Io`] if the temporary file cannot be created, written or
    /// moved into place.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<usize, WriteError> {
        Ok(replace_file(path.as_ref(), |out| self.write_to(out))?)
    }
}

/// Encode `entries` into a complete in-memory bundle.
///
/// # Errors
/// See [`BundleEncoder::new`].
pub fn encode(entries: &[BundleEntry]) -> Result<Vec<u8>, EncodeError> {
    Ok(BundleEncoder::new(entries)?.to_bytes())
}

/// Encode `entries` and stream the result into `out`.
///
/// Validation happens before anything is written, so an invalid entry list
/// leaves `out` untouched.
///
/// # Errors
/// [`WriteError::Encode`] for invalid entries, [`WriteError::Io`] if writing fails.
pub fn encode_to<W: Write>(entries: &[BundleEntry], out: W) -> Result<usize, WriteError> {
    let encoder = BundleEncoder::new(entries)?;
    Ok(encoder.write_to(out)?)
}

fn plan(entries: &[BundleEntry]) -> Result<BundleLayout, EncodeError> {
    if entries.is_empty() {
        return Err(EncodeError::EmptyBundle);
    }

    let count =
        u16::try_from(entries.len()).map_err(|_| EncodeError::TooManyEntries(entries.len()))?;

    // At most 65535 records; this cannot overflow.
    let table_size = ENTRY_SIZE * entries.len();
    let payload_start = align_up(HEADER_SIZE + table_size, BUNDLE_ALIGN);
    debug!(
        "bundle layout: {count} entries, {table_size} table bytes, payloads at {payload_start:#x}"
    );

    let mut records = Vec::with_capacity(entries.len());
    let mut running = payload_start;

    for (index, entry) in entries.iter().enumerate() {
        let name = EntryName::new(&entry.name).map_err(|source| EncodeError::Validation {
            index,
            name: entry.name.clone(),
            source,
        })?;

        let (offset, size, next) =
            place(running, entry.payload.len()).ok_or_else(|| EncodeError::BundleTooLarge {
                index,
                name: entry.name.clone(),
            })?;

        trace!(
            "entry #{index} {:?} ({}): offset={offset:#x} size={size}",
            entry.name, entry.entry_type
        );

        records.push(Entry {
            name,
            entry_type: entry.entry_type,
            flags: EntryFlags::new().with_required(entry.required),
            offset,
            size,
            checksum: 0,
        });

        running = next;
    }

    Ok(BundleLayout {
        header: Header::new(count),
        records,
        payload_start,
        total_size: running,
    })
}

/// Fill a fresh sibling of `path` via `write` and rename it over `path`.
fn replace_file<F>(path: &Path, write: F) -> io::Result<usize>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> io::Result<usize>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    // Dropping `tmp` on any early return removes it again.
    let mut tmp = NamedTempFile::new_in(dir)?;
    let written = {
        let mut out = BufWriter::new(tmp.as_file_mut());
        let n = write(&mut out)?;
        out.flush()?;
        n
    };
    tmp.as_file().sync_all()?;

    trace!("moving {} into place at {}", tmp.path().display(), path.display());
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(written)
}

/// Place a payload of `len` bytes at `running`.
///
/// Returns the wire offset and size plus the aligned start of the next
/// payload, or `None` if the payload would end past `u32::MAX`.
fn place(running: usize, len: usize) -> Option<(u32, u32, usize)> {
    let offset = u32::try_from(running).ok()?;
    let size = u32::try_from(len).ok()?;
    // The loader computes `offset + size` in 32 bits.
    let end = offset.checked_add(size)?;
    let next = checked_align_up(usize::try_from(end).ok()?, BUNDLE_ALIGN)?;
    Some((offset, size, next))
}

fn write_zeros<W: Write>(out: &mut W, len: usize) -> io::Result<()> {
    const ZEROS: [u8; BUNDLE_ALIGN] = [0; BUNDLE_ALIGN];

    let mut left = len;
    while left > 0 {
        let n = left.min(ZEROS.len());
        out.write_all(&ZEROS[..n])?;
        left -= n;
    }
    Ok(())
}
