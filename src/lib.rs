//! # Satchel
//!
//! Versioned object-graph persistence: save a set of live entities to structured
//! documents, restore them later, and keep old saves loadable while the code evolves.
//!
//! ## Overview
//!
//! Satchel does not serialize your types directly. Each saved type describes its fields
//! with `#[derive(Persist)]`, and the [`transform`] walker turns the live graph into an
//! intermediate [`Document`] made of plain records. Codecs only ever see documents, so
//! the on-disk format never depends on the Rust layout of your structs.
//!
//! ### Key Features
//!
//! *   **Identity Matching:** Top-level entities carry a stable string identity. Loading
//!     matches records to live entities by identity, never by position, so entities can
//!     be added, removed or reordered between sessions.
//! *   **Additive Schemas:** A field present in the code but missing from an old save is
//!     left untouched (and logged), so adding fields never breaks existing saves.
//! *   **Type Substitution:** External value types ([`Vec3`], [`Quat`], narrow integers,
//!     your own types) are stored through surrogate records registered once in a
//!     [`substitute::SubstituteRegistry`].
//! *   **Versioned Migrations:** Every document is stamped with a schema version.
//!     Routines registered for newer versions run, in order, on entities restored from
//!     older documents.
//! *   **Pluggable Codecs:** JSON (default), a checksummed binary format, and byte
//!     transforms (base64, LZ4) layered over either.
//!
//! ## Architecture
//!
//! ```text
//! live entities ──(Persist)──> Transformer ──> Document ──(Codec)──> file
//!                                   │
//!                     MapperRegistry / SubstituteRegistry
//!
//! file ──(Codec)──> Document ──> identity match ──> Transformer ──> MigrationTable
//! ```
//!
//! ### Document Model
//!
//! A [`Document`] holds a version, a logical file name and one [`EntityRecord`] per
//! top-level entity. A record is an id, a list of named scalar [`FieldRecord`]s and a
//! list of nested records. Nested objects, surrogates and lists all become nested
//! records keyed by the field name; list elements are keyed by their index.
//!
//! ### Converters
//!
//! The [`mapper`] layer decides how each field type is stored: as a plain [`Value`]
//! (`String`, `bool`, `i64`, `f64`), through a surrogate, or as a list of either.
//! Anything else must be a nested `Persist` type.
//!
//! ### The Orchestrator
//!
//! [`Satchel`] ties everything together. It is an explicit context object: build one
//! per save directory and pass it where it is needed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use satchel::{EntitySet, Persist, Satchel, Vec3};
//!
//! #[derive(Default, Persist)]
//! #[persist(file = "world")]
//! struct Hero {
//!     #[persist(id)]
//!     id: String,
//!     #[persist]
//!     hp: i64,
//!     #[persist]
//!     pos: Vec3,
//!     #[persist]
//!     inventory: Vec<String>,
//! }
//!
//! # fn main() -> satchel::Result<()> {
//! let satchel = Satchel::builder().save_dir("saves").build()?;
//!
//! let mut world = EntitySet::new();
//! world.insert(Hero { id: "hero".into(), hp: 42, ..Hero::default() });
//! satchel.save_all(&mut world)?;
//!
//! let report = satchel.load_all(&mut world)?;
//! assert_eq!(report.restored, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ### Migrations
//!
//! ```rust,no_run
//! # use satchel::{Loader, Persist, Satchel, Migration, MigrationHandler};
//! # #[derive(Default, Persist)]
//! # #[persist(file = "world")]
//! # struct Hero { #[persist(id)] id: String, #[persist] hp: i64, #[persist] max_hp: i64 }
//! # fn main() -> satchel::Result<()> {
//! let satchel = Satchel::builder()
//!     .migration(MigrationHandler::new(2).define(Migration::new(|old: &Loader<'_>, hero: &mut Hero| {
//!         hero.max_hp = old.load::<i64>("hp")?;
//!         Ok(())
//!     })))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety and Error Handling
//!
//! * **No Unsafe:** the crate is `#![deny(unsafe_code)]`.
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **One Error Type:** every failure is a [`SatchelError`], grouped by
//!   [`SatchelError::category`].
//! * **Atomic Writes:** files are written to a temp file and renamed into place, and a
//!   bulk save serializes every document before writing the first one.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// The derive emits `::satchel::` paths, which must also resolve inside this crate.
extern crate self as satchel;

// --- PUBLIC API MODULES ---
pub mod api;
pub mod codec;
pub mod config;
pub mod document;
pub mod encoding;
pub mod error;
pub mod identity;
pub mod inspector;
pub mod migration;
pub mod source;
pub mod types;
pub mod value;

// --- SCHEMA MACHINERY (used by derived code) ---
pub mod mapper;
pub mod schema;
pub mod substitute;
pub mod transform;

// --- RE-EXPORTS ---

pub use api::{LoadReport, Satchel, SatchelBuilder, SaveReport};
pub use codec::{BinaryCodec, Codec, JsonCodec};
pub use config::Options;
pub use document::{Document, EntityRecord, FieldRecord};
#[cfg(feature = "lz4")]
pub use encoding::Lz4;
pub use encoding::{Base64, Encoded};
pub use error::{ErrorCategory, IdentityProblem, Result, SatchelError};
pub use migration::{Migration, MigrationHandler};
pub use schema::{Field, LoadHook, Persist, SaveHook};
pub use source::{Candidate, EntitySet, EntitySource, Saved};
pub use substitute::Substitute;
pub use transform::{Loader, RecordReader, RecordWriter, Saver};
pub use types::{Quat, Vec3};
pub use value::{Native, Value};

// Re-export the derive macro so it is accessible as `satchel::Persist`
pub use satchel_derive::Persist;
