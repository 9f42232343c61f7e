//! Reversible byte transforms layered over a codec.
//!
//! [`Encoded`] wraps any [`Codec`] with a [`ByteTransform`] applied after encoding and
//! undone before decoding. The wrapped codec keeps the inner codec's logical contract:
//! same documents in, same documents out, and unreadable input is still "no save".
//!
//! * [`Base64`] turns a text save into a single opaque line.
//! * [`Lz4`] (feature `lz4`) shrinks large saves.

use crate::codec::Codec;
use crate::document::Document;
use crate::error::{Result, SatchelError};
use base64::Engine;
use std::fmt;

/// A reversible transform over encoded bytes.
pub trait ByteTransform: Send + Sync + fmt::Debug {
    /// Short tag appended to the inner codec's extension.
    fn id(&self) -> &'static str;

    /// Applies the transform.
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverts the transform.
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Standard alphabet base64, padded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64;

impl ByteTransform for Base64 {
    fn id(&self) -> &'static str {
        "b64"
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(base64::engine::general_purpose::STANDARD.encode(data).into_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let compact: Vec<u8> = data.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(SatchelError::codec)
    }
}

#[cfg(feature = "lz4")]
/// LZ4 block compression with the uncompressed size prepended.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4;

#[cfg(feature = "lz4")]
impl ByteTransform for Lz4 {
    fn id(&self) -> &'static str {
        "lz4"
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data).map_err(SatchelError::codec)
    }
}

/// A codec whose output goes through a [`ByteTransform`].
#[derive(Debug, Clone)]
pub struct Encoded<C, T> {
    inner: C,
    transform: T,
    extension: String,
}

impl<C: Codec, T: ByteTransform> Encoded<C, T> {
    /// Wraps `inner`. The file extension becomes `{inner}.{transform id}`.
    pub fn new(inner: C, transform: T) -> Self {
        let extension = format!("{}.{}", inner.extension(), transform.id());
        Self {
            inner,
            transform,
            extension,
        }
    }

    /// The wrapped codec.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Codec, T: ByteTransform> Codec for Encoded<C, T> {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        let bytes = self.inner.encode(doc)?;
        self.transform.encode(&bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        let bytes = self.transform.decode(bytes)?;
        self.inner.decode(&bytes)
    }
}
