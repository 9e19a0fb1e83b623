use crate::schema;
use core::fmt;

/// Width of the fixed name field in an entry record.
pub const NAME_FIELD_LEN: usize = schema::entry::NAME.width;

/// Longest name that still leaves a terminating zero byte in the field.
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;

/// Reasons a string cannot be stored in an entry's name field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum NameError {
    #[error("name is empty")]
    Empty,
    #[error("name is not ASCII")]
    NonAscii,
    #[error("name contains a NUL byte")]
    InteriorNul,
    #[error("name is {len} bytes long, at most 31 fit the name field")]
    TooLong { len: usize },
}

/// A validated, zero-padded 32-byte entry name.
///
/// Names are ASCII, non-empty, free of NUL bytes and at most [`MAX_NAME_LEN`]
/// bytes long, so the field always carries at least one trailing zero.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct EntryName([u8; NAME_FIELD_LEN]);

impl EntryName {
    /// Validate `name` and pack it into a name field.
    ///
    /// # Errors
    /// Returns a [`NameError`] describing the first violated constraint.
    pub fn new(name: &str) -> Result<Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if !name.is_ascii() {
            return Err(NameError::NonAscii);
        }
        if name.bytes().any(|b| b == 0) {
            return Err(NameError::InteriorNul);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(NameError::TooLong { len: name.len() });
        }

        let mut field = [0u8; NAME_FIELD_LEN];
        field[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self(field))
    }

    /// Wrap a raw name field as read from a bundle, without validation.
    #[must_use]
    pub const fn from_field(field: [u8; NAME_FIELD_LEN]) -> Self {
        Self(field)
    }

    /// The full zero-padded field.
    #[must_use]
    pub const fn as_field(&self) -> &[u8; NAME_FIELD_LEN] {
        &self.0
    }

    /// Name bytes up to (excluding) the first zero byte.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_LEN);
        &self.0[..len]
    }

    /// The name as a string, if the field holds ASCII.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        let bytes = self.as_bytes();
        if bytes.is_ascii() {
            core::str::from_utf8(bytes).ok()
        } else {
            None
        }
    }
}

impl fmt::Debug for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => fmt::Debug::fmt(s, f),
            None => f.debug_tuple("EntryName").field(&self.as_bytes()).finish(),
        }
    }
}
