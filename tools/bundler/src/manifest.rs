//! # Bundle manifest
//!
//! A manifest is a JSON array describing the entries of a bundle, in order:
//!
//! ```json
//! [
//!   { "name": "init", "path": "init.bin", "type": "init", "required": true },
//!   { "name": "drv0", "path": "drivers/drv0.bin", "type": "driver" }
//! ]
//! ```
//!
//! `path` is resolved against a base directory. `type` is matched
//! case-insensitively; anything unrecognized becomes
//! [`EntryType::Unknown`]. `required` defaults to `false` and takes any
//! JSON value: `0`, `""`, `null` and empty containers count as false.

use crate::encoder::BundleEntry;
use bundle_abi::{EntryName, EntryType, NameError};
use log::debug;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// One manifest item as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestItem {
    pub name: Option<String>,
    pub path: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    /// Any JSON value; see [`truthy`].
    #[serde(default, deserialize_with = "truthy")]
    pub required: Option<bool>,
}

/// Parsed manifest; items keep their file order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    items: Vec<ManifestItem>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse manifest")]
    Parse(#[from] serde_json::Error),
    #[error("manifest has no entries")]
    Empty,
    #[error("manifest entry #{index} is missing '{field}'")]
    MissingField { index: usize, field: &'static str },
    #[error("manifest entry #{index} ({name:?}): {source}")]
    InvalidName {
        index: usize,
        name: String,
        source: NameError,
    },
    #[error("manifest entry #{index} reuses the name {name:?} of entry #{first}")]
    DuplicateName {
        index: usize,
        first: usize,
        name: String,
    },
    #[error("entry file not found: {}", .path.display())]
    MissingInput { index: usize, path: PathBuf },
    #[error("failed to read entry file {}", .path.display())]
    ReadPayload {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Manifest {
    /// Read and parse a manifest file.
    ///
    /// # Errors
    /// [`ManifestError::Io`] if the file cannot be read,
    /// [`ManifestError::Parse`] if it is not a valid manifest.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse a manifest from JSON text.
    ///
    /// # Errors
    /// [`ManifestError::Parse`] if `text` is not a JSON array of entries.
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    #[must_use]
    pub fn items(&self) -> &[ManifestItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Validate all items and read their payloads, resolving relative paths
    /// against `base`.
    ///
    /// Metadata is validated item by item in manifest order; the first
    /// failure aborts loading.
    ///
    /// # Errors
    /// Any [`ManifestError`] except `Io` and `Parse`.
    pub fn load_entries(&self, base: impl AsRef<Path>) -> Result<Vec<BundleEntry>, ManifestError> {
        let base = base.as_ref();
        if self.items.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(self.items.len());
        let mut entries = Vec::with_capacity(self.items.len());

        for (index, item) in self.items.iter().enumerate() {
            let name = non_empty(item.name.as_deref()).ok_or(ManifestError::MissingField {
                index,
                field: "name",
            })?;
            let rel = non_empty(item.path.as_deref()).ok_or(ManifestError::MissingField {
                index,
                field: "path",
            })?;

            EntryName::new(name).map_err(|source| ManifestError::InvalidName {
                index,
                name: name.to_owned(),
                source,
            })?;

            if let Some(&first) = seen.get(name) {
                return Err(ManifestError::DuplicateName {
                    index,
                    first,
                    name: name.to_owned(),
                });
            }
            seen.insert(name, index);

            let path = base.join(rel);
            if !path.is_file() {
                return Err(ManifestError::MissingInput { index, path });
            }

            let payload = std::fs::read(&path).map_err(|source| ManifestError::ReadPayload {
                path: path.clone(),
                source,
            })?;

            let entry_type = item
                .entry_type
                .as_deref()
                .map(EntryType::from_name)
                .unwrap_or_default();

            debug!(
                "manifest entry #{index} {name:?}: {entry_type}, {} bytes from {}",
                payload.len(),
                path.display()
            );

            entries.push(BundleEntry::new(
                name,
                entry_type,
                item.required.unwrap_or(false),
                payload,
            ));
        }

        Ok(entries)
    }
}

/// Load the manifest at `manifest` and materialize its entries.
///
/// # Errors
/// See [`Manifest::from_path`] and [`Manifest::load_entries`].
pub fn load_entries(
    manifest: impl AsRef<Path>,
    base: impl AsRef<Path>,
) -> Result<Vec<BundleEntry>, ManifestError> {
    Manifest::from_path(manifest)?.load_entries(base)
}

/// Loose flag: `false`, `null`, zero, `""`, `[]` and `{}` are false, any other
/// value is true.
fn truthy<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let flag = match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    };
    Ok(Some(flag))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}
