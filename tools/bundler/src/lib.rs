//! # INIT.BND bundler
//!
//! Host-side tooling that packs init modules into a single `INIT.BND` image.
//! The wire format lives in [`bundle_abi`]; this crate adds the
//! [`encoder`] that lays payloads out on page boundaries and the
//! [`manifest`] loader that gathers them from disk.

pub mod encoder;
pub mod manifest;

pub use encoder::{
    BundleEncoder, BundleEntry, BundleLayout, EncodeError, LayoutEntry, WriteError, encode,
    encode_to,
};
pub use manifest::{Manifest, ManifestError, ManifestItem, load_entries};
