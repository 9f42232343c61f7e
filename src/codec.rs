//! Byte-level codecs.
//!
//! A [`Codec`] turns a [`Document`] into bytes and back. The orchestrator only talks to
//! this trait; the crate ships two implementations:
//!
//! * [`JsonCodec`]: human readable, `fields` and `nested` omitted when empty.
//! * [`BinaryCodec`]: `bincode` payload behind a fixed header.
//!
//! ## Binary layout
//!
//! ```text
//! [Magic "SAT1" (4)] [Format Version u16] [Flags u16] [Payload Length u32] [xxHash64 u64] [Payload]
//! ```
//!
//! All integers are little endian. The checksum covers the payload only.
//!
//! Reading never fails: a missing, unreadable or corrupt file is "no save yet" and is
//! reported as `None`.

use crate::document::{Document, EntityRecord, FieldRecord};
use crate::error::{Result, SatchelError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::hash::Hasher;
use std::io::{self, Write};
use std::path::Path;
use twox_hash::XxHash64;

/// Encodes and decodes whole documents.
pub trait Codec: Send + Sync + fmt::Debug {
    /// File extension, without the dot.
    fn extension(&self) -> &str;

    /// Encodes `doc`.
    fn encode(&self, doc: &Document) -> Result<Vec<u8>>;

    /// Decodes a document.
    fn decode(&self, bytes: &[u8]) -> Result<Document>;

    /// Encodes `doc` and replaces `path` with it atomically.
    fn write(&self, path: &Path, doc: &Document) -> Result<()> {
        let bytes = self.encode(doc)?;
        write_atomic(path, &bytes)?;
        log::info!("saved `{}` ({} bytes) to {}", doc.file_name, bytes.len(), path.display());
        Ok(())
    }

    /// Reads and decodes `path`. Any failure means "no save" and yields `None`.
    fn read(&self, path: &Path) -> Option<Document> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("cannot read {}: {e}", path.display());
                return None;
            }
        };
        match self.decode(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                log::warn!("ignoring unreadable save {}: {e}", path.display());
                None
            }
        }
    }
}

/// Writes `bytes` to a sibling temp file, syncs it, then renames it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    fn replace(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(tmp, path)
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    let result = replace(tmp, path, bytes);
    if result.is_err() {
        let _ = fs::remove_file(tmp);
    }
    result.map_err(SatchelError::from)
}

// --- JSON ---

/// `serde_json` codec.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Indented output.
    #[must_use]
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Single-line output.
    #[must_use]
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::pretty()
    }
}

impl Codec for JsonCodec {
    fn extension(&self) -> &str {
        "json"
    }

    fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(doc)
        } else {
            serde_json::to_vec(doc)
        };
        bytes.map_err(SatchelError::codec)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        serde_json::from_slice(bytes).map_err(SatchelError::codec)
    }
}

// --- BINARY ---

/// Magic bytes of a binary save: "SAT1".
pub const MAGIC_BYTES: [u8; 4] = *b"SAT1";

/// Current binary format version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the binary header.
/// Magic(4) + Version(2) + Flags(2) + Length(4) + Checksum(8) = 20
pub const HEADER_SIZE: usize = 20;

/// Fixed header in front of a binary payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version.
    pub version: u16,
    /// Reserved, always 0.
    pub flags: u16,
    /// Payload length in bytes.
    pub length: u32,
    /// xxHash64 (seed 0) of the payload.
    pub checksum: u64,
}

impl Header {
    fn for_payload(payload: &[u8]) -> Result<Self> {
        let length = u32::try_from(payload.len())
            .map_err(|_| SatchelError::Codec("payload exceeds 4 GiB".into()))?;
        Ok(Self {
            version: FORMAT_VERSION,
            flags: 0,
            length,
            checksum: checksum(payload),
        })
    }

    /// Serializes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC_BYTES);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..12].copy_from_slice(&self.length.to_le_bytes());
        buf[12..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parses and checks the header at the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let head: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| SatchelError::Codec("file too small for header".into()))?;
        if head[0..4] != MAGIC_BYTES {
            return Err(SatchelError::Codec("bad magic bytes".into()));
        }
        let header = Self {
            version: u16::from_le_bytes([head[4], head[5]]),
            flags: u16::from_le_bytes([head[6], head[7]]),
            length: u32::from_le_bytes([head[8], head[9], head[10], head[11]]),
            checksum: u64::from_le_bytes([
                head[12], head[13], head[14], head[15], head[16], head[17], head[18], head[19],
            ]),
        };
        if header.version != FORMAT_VERSION {
            return Err(SatchelError::Codec(format!(
                "unsupported format version {}",
                header.version
            )));
        }
        Ok(header)
    }
}

fn checksum(payload: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(payload);
    hasher.finish()
}

// bincode cannot skip fields, so the binary payload uses a mirror without the
// `skip_serializing_if` attributes of the public model.
#[derive(Serialize)]
struct WireDocumentRef<'a> {
    version: u32,
    file_name: &'a str,
    entities: Vec<WireRecordRef<'a>>,
}

#[derive(Serialize)]
struct WireRecordRef<'a> {
    id: &'a str,
    fields: &'a [FieldRecord],
    nested: Vec<WireRecordRef<'a>>,
}

impl<'a> From<&'a EntityRecord> for WireRecordRef<'a> {
    fn from(record: &'a EntityRecord) -> Self {
        Self {
            id: &record.id,
            fields: &record.fields,
            nested: record.nested.iter().map(Self::from).collect(),
        }
    }
}

#[derive(Deserialize)]
struct WireDocument {
    version: u32,
    file_name: String,
    entities: Vec<WireRecord>,
}

#[derive(Deserialize)]
struct WireRecord {
    id: String,
    fields: Vec<FieldRecord>,
    nested: Vec<WireRecord>,
}

impl From<WireRecord> for EntityRecord {
    fn from(wire: WireRecord) -> Self {
        Self {
            id: wire.id,
            fields: wire.fields,
            nested: wire.nested.into_iter().map(Self::from).collect(),
        }
    }
}

/// `bincode` codec with a checksummed header.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn extension(&self) -> &str {
        "sav"
    }

    fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        let wire = WireDocumentRef {
            version: doc.version,
            file_name: &doc.file_name,
            entities: doc.entities.iter().map(WireRecordRef::from).collect(),
        };
        let payload = bincode::serde::encode_to_vec(&wire, bincode::config::standard())
            .map_err(SatchelError::codec)?;
        let header = Header::for_payload(&payload)?;

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        let header = Header::from_bytes(bytes)?;
        let payload = bytes
            .get(HEADER_SIZE..)
            .filter(|p| p.len() == header.length as usize)
            .ok_or_else(|| SatchelError::Codec("payload length mismatch".into()))?;
        if checksum(payload) != header.checksum {
            return Err(SatchelError::Codec("checksum mismatch".into()));
        }
        let (wire, _): (WireDocument, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(SatchelError::codec)?;
        Ok(Document {
            version: wire.version,
            file_name: wire.file_name,
            entities: wire.entities.into_iter().map(EntityRecord::from).collect(),
        })
    }
}
