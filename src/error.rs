//! Centralized error handling for Satchel.
//!
//! Every fallible operation in the crate returns [`Result`], and every failure is a
//! [`SatchelError`]. The library never panics on bad input: schema mistakes, corrupt
//! files and misconfigured migrations all surface as values the caller can match on.
//!
//! ## Error Categories
//!
//! Errors fall into the categories reported by [`SatchelError::category`]:
//!
//! - **Configuration:** a schema or registry was authored incorrectly (missing or
//!   malformed substitute, unmappable type, duplicate field, invalid identity). These
//!   are raised at the point of failure and should never be retried.
//! - **Migration:** a migration definition was applied to the wrong kind of entity.
//! - **Data:** a document does not fit the live schema (duplicate identity inside one
//!   document, missing key in a hook, a number that does not fit its target type, a
//!   stored string where a number is expected).
//! - **Codec:** the bytes could not be encoded or decoded.
//! - **Io:** file system failures.
//!
//! Missing fields in an older document are *not* errors; they are logged with
//! `log::warn!` and the live value is kept. Identity collisions found by
//! [`crate::identity::check_duplicates`] are diagnostics, not errors.
//!
//! ## Usage
//!
//! ```rust
//! use satchel::{ErrorCategory, SatchelError};
//!
//! fn describe(err: &SatchelError) -> &'static str {
//!     match err.category() {
//!         ErrorCategory::Configuration => "fix the schema",
//!         ErrorCategory::Io => "check the save directory",
//!         _ => "inspect the save file",
//!     }
//! }
//!
//! let err = SatchelError::MissingSubstitute { type_name: "Color".into() };
//! assert_eq!(describe(&err), "fix the schema");
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for Satchel operations.
pub type Result<T> = std::result::Result<T, SatchelError>;

/// The master error enum covering all failure domains in Satchel.
///
/// This type is `Clone`; I/O errors are wrapped in an `Arc` so reports holding an
/// error can be copied around cheaply.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SatchelError {
    /// Low-level I/O failure (permissions, disk full, missing directory).
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// The codec could not encode or decode a document.
    ///
    /// Raised by [`crate::codec::Codec::encode`] and [`crate::codec::Codec::decode`];
    /// [`crate::codec::Codec::read`] turns it into "no save".
    #[error("codec error: {0}")]
    Codec(String),

    /// No surrogate is registered for the requested type.
    #[error("no substitute registered for `{type_name}`")]
    MissingSubstitute {
        /// Name of the original (or surrogate) type that was looked up.
        type_name: String,
    },

    /// A surrogate registration is ambiguous, or a value handed to the registry does
    /// not have the runtime type its entry was registered for.
    #[error("malformed substitute `{surrogate}` for `{original}`: {reason}")]
    MalformedSubstitute {
        /// The original type.
        original: String,
        /// The surrogate type.
        surrogate: String,
        /// What is wrong with the pair.
        reason: String,
    },

    /// A saved field has no mapper and its type is neither nestable nor a list.
    #[error("field `{field}` of type `{type_name}` has no mapper and is neither nested nor a list")]
    UnmappableType {
        /// Key of the offending field.
        field: String,
        /// Name of the field's type.
        type_name: String,
    },

    /// Two values were saved under the same key in one record.
    #[error("duplicate key `{key}` in record `{record}` of `{type_name}`")]
    DuplicateField {
        /// The duplicated key.
        key: String,
        /// Identity of the record being built.
        record: String,
        /// Type that produced the record.
        type_name: String,
    },

    /// A top-level entity cannot be identified.
    #[error("invalid identity on `{type_name}`: {problem}")]
    InvalidIdentity {
        /// Type of the entity.
        type_name: String,
        /// What is wrong with the identity.
        problem: IdentityProblem,
    },

    /// Two entities routed to the same document share an identity.
    #[error("duplicate identity `{identity}` in document `{document}`")]
    DuplicateIdentity {
        /// The colliding identity.
        identity: String,
        /// The document name.
        document: String,
    },

    /// A load hook or migration asked for a key that the record does not contain.
    #[error("key `{key}` not found in record `{record}`")]
    MissingKey {
        /// The requested key.
        key: String,
        /// Identity of the record that was searched.
        record: String,
    },

    /// A load hook or migration asked for a type that has no mapper and is not nestable.
    #[error("no mapper for `{type_name}` (key `{key}`)")]
    MissingMapper {
        /// The requested key.
        key: String,
        /// The requested type.
        type_name: String,
    },

    /// A stored value does not fit into the live field's type.
    #[error("value {value} does not fit in `{target}`")]
    Narrowing {
        /// Rendering of the stored value.
        value: String,
        /// The target Rust type.
        target: &'static str,
    },

    /// A stored value has a shape the live field cannot read, such as a string where a
    /// number is expected.
    #[error("stored {found} cannot be read as `{expected}`")]
    ValueMismatch {
        /// The live field's type.
        expected: &'static str,
        /// The stored shape.
        found: &'static str,
    },

    /// A slot or migration target has an unexpected runtime type.
    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        /// The declared type.
        expected: String,
        /// The runtime type.
        found: String,
    },

    /// A migration targeted an object that is not a top-level persistable entity.
    #[error("`{type_name}` is not a persistable entity")]
    NotPersistable {
        /// Type of the target.
        type_name: String,
    },

    /// The context object or one of its registries was configured inconsistently.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Why an identity was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityProblem {
    /// The type does not declare an identity field.
    Missing,
    /// The identity field holds an empty string.
    Empty,
}

impl fmt::Display for IdentityProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("no identity field declared"),
            Self::Empty => f.write_str("identity must not be empty"),
        }
    }
}

/// Coarse classification of a [`SatchelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The schema or a registry is wrong; fatal, never retried.
    Configuration,
    /// A migration is misconfigured; fatal.
    Migration,
    /// The stored data does not fit the live schema.
    Data,
    /// Encoding or decoding failed.
    Codec,
    /// File system failure.
    Io,
}

impl SatchelError {
    /// Classifies the error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) => ErrorCategory::Io,
            Self::Codec(_) => ErrorCategory::Codec,
            Self::MissingSubstitute { .. }
            | Self::MalformedSubstitute { .. }
            | Self::UnmappableType { .. }
            | Self::DuplicateField { .. }
            | Self::InvalidIdentity { .. }
            | Self::MissingMapper { .. }
            | Self::Config(_) => ErrorCategory::Configuration,
            Self::TypeMismatch { .. } | Self::NotPersistable { .. } => ErrorCategory::Migration,
            Self::DuplicateIdentity { .. }
            | Self::MissingKey { .. }
            | Self::Narrowing { .. }
            | Self::ValueMismatch { .. } => ErrorCategory::Data,
        }
    }

    pub(crate) fn codec(err: impl fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<io::Error> for SatchelError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn io_errors_keep_their_source() {
        let err = SatchelError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.category(), ErrorCategory::Io);
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "I/O error: gone");
    }

    #[test]
    fn identity_problems_render() {
        let err = SatchelError::InvalidIdentity {
            type_name: "Hero".into(),
            problem: IdentityProblem::Empty,
        };
        assert_eq!(err.to_string(), "invalid identity on `Hero`: identity must not be empty");
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn stored_value_mismatches_are_data_errors() {
        let err = SatchelError::ValueMismatch {
            expected: "i64",
            found: "string",
        };
        assert_eq!(err.category(), ErrorCategory::Data);
        assert_eq!(err.to_string(), "stored string cannot be read as `i64`");
    }

    #[test]
    fn migration_errors_are_classified() {
        let err = SatchelError::NotPersistable { type_name: "Inner".into() };
        assert_eq!(err.category(), ErrorCategory::Migration);
    }
}
