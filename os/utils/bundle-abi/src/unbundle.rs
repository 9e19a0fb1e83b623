use crate::{
    BUNDLE_MAGIC, BUNDLE_VERSION, ENTRY_SIZE, Entry, EntryFlags, EntryType, HEADER_SIZE, Header,
    is_bundle_aligned,
};

/// Parsed bundle view over an in-memory blob.
#[derive(Copy, Clone)]
pub struct Bundle<'a> {
    blob: &'a [u8],
    hdr: Header,
}

/// One decoded table entry together with its payload.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EntryView<'a> {
    /// Position in the entry table.
    pub index: usize,
    pub name: &'a str,
    pub entry_type: EntryType,
    pub flags: EntryFlags,
    /// Absolute payload offset within the blob.
    pub offset: usize,
    pub payload: &'a [u8],
}

impl EntryView<'_> {
    #[must_use]
    pub const fn required(&self) -> bool {
        self.flags.required()
    }
}

/// Iterator over table entries; yields a `Result` per entry.
pub struct Entries<'a> {
    b: Bundle<'a>,
    idx: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BundleError {
    #[error("blob is shorter than the bundle header")]
    TooShort,
    #[error("bad bundle magic")]
    BadMagic,
    #[error("unsupported bundle version {0}")]
    UnsupportedVersion(u16),
    #[error("payload offset is not page aligned")]
    BadAlignment,
    #[error("offset or length out of bounds")]
    OutOfBounds,
    #[error("entry name is not ASCII")]
    BadName,
}

impl<'a> Bundle<'a> {
    /// Parse and validate a bundle blob.
    ///
    /// Only the header and the extent of the entry table are checked here;
    /// individual entries are validated when accessed.
    ///
    /// # Errors
    /// Returns a [`BundleError`] if the header is malformed or the table does
    /// not fit into `blob`.
    pub fn parse(blob: &'a [u8]) -> Result<Self, BundleError> {
        use BundleError::{BadMagic, OutOfBounds, TooShort, UnsupportedVersion};

        let raw: &[u8; HEADER_SIZE] = blob
            .get(..HEADER_SIZE)
            .and_then(|s| <&[u8; HEADER_SIZE]>::try_from(s).ok())
            .ok_or(TooShort)?;
        let hdr = Header::from_bytes(raw);

        if hdr.magic != BUNDLE_MAGIC {
            return Err(BadMagic);
        }

        if hdr.version != BUNDLE_VERSION {
            return Err(UnsupportedVersion(hdr.version));
        }

        // Table must not overlap the header and must fit entirely.
        let table_off = hdr.table_offset as usize;
        if table_off < HEADER_SIZE {
            return Err(OutOfBounds);
        }

        let table_len = usize::from(hdr.entry_count)
            .checked_mul(ENTRY_SIZE)
            .ok_or(OutOfBounds)?;
        let table_end = table_off.checked_add(table_len).ok_or(OutOfBounds)?;
        if table_end > blob.len() {
            return Err(OutOfBounds);
        }

        Ok(Self { blob, hdr })
    }

    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.hdr
    }

    /// Number of entries in the bundle.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.hdr.entry_count)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over entries by index (0..count).
    #[must_use]
    pub const fn entries(&self) -> Entries<'a> {
        Entries { b: *self, idx: 0 }
    }

    /// Decode entry `i` and resolve its payload.
    ///
    /// # Errors
    /// Returns [`BundleError::OutOfBounds`] for a bad index or a payload that
    /// extends past the blob, [`BundleError::BadAlignment`] for a misaligned
    /// payload offset and [`BundleError::BadName`] for a non-ASCII name.
    pub fn get(&self, i: usize) -> Result<EntryView<'a>, BundleError> {
        use BundleError::{BadAlignment, BadName, OutOfBounds};

        if i >= self.len() {
            return Err(OutOfBounds);
        }

        // In bounds: parse() checked the whole table.
        let off = self.hdr.table_offset as usize + i * ENTRY_SIZE;
        let raw: &'a [u8] = self.blob.get(off..off + ENTRY_SIZE).ok_or(OutOfBounds)?;
        let raw: &'a [u8; ENTRY_SIZE] = raw.try_into().map_err(|_| OutOfBounds)?;
        let record = Entry::from_bytes(raw);

        // Borrow the name straight from the blob so it lives as long as it.
        let field = &raw[crate::schema::entry::NAME.range()];
        let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let name_bytes = &field[..len];
        if !name_bytes.is_ascii() {
            return Err(BadName);
        }
        let name = core::str::from_utf8(name_bytes).map_err(|_| BadName)?;

        let file_start = record.offset as usize;
        if !is_bundle_aligned(file_start) {
            return Err(BadAlignment);
        }

        let file_end = file_start
            .checked_add(record.size as usize)
            .ok_or(OutOfBounds)?;
        let payload = self.blob.get(file_start..file_end).ok_or(OutOfBounds)?;

        Ok(EntryView {
            index: i,
            name,
            entry_type: record.entry_type,
            flags: record.flags,
            offset: file_start,
            payload,
        })
    }

    /// Find an entry by exact name.
    #[must_use]
    pub fn find(&self, needle: &str) -> Option<EntryView<'a>> {
        self.entries().flatten().find(|e| e.name == needle)
    }

    /// Find the first entry of the given type, e.g. the `Init` coordinator.
    #[must_use]
    pub fn find_type(&self, ty: EntryType) -> Option<EntryView<'a>> {
        self.entries().flatten().find(|e| e.entry_type == ty)
    }

    /// Return the first entry, if any.
    #[must_use]
    pub fn first(&self) -> Option<EntryView<'a>> {
        self.get(0).ok()
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<EntryView<'a>, BundleError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.b.len() {
            return None;
        }
        let i = self.idx;
        self.idx += 1;
        Some(self.b.get(i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let r = self.b.len().saturating_sub(self.idx);
        (r, Some(r))
    }
}

impl ExactSizeIterator for Entries<'_> {}

impl core::iter::FusedIterator for Entries<'_> {}
