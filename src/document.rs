//! The intermediate document model.
//!
//! A [`Document`] is the unit a codec reads and writes: one per save file, holding one
//! [`EntityRecord`] per top-level entity. Records are trees: scalar fields live in
//! `fields`, everything that needs structure (nested entities, surrogates, lists) lives
//! in `nested` under the field's key. Lookups are always by name, never by position.

use crate::error::{Result, SatchelError};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A whole save file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Schema version the document was written with.
    pub version: u32,
    /// Logical name of the file, without directory or extension.
    pub file_name: String,
    /// One record per top-level entity.
    pub entities: Vec<EntityRecord>,
}

impl Document {
    /// Creates an empty document.
    pub fn new(file_name: impl Into<String>, version: u32) -> Self {
        Self {
            version,
            file_name: file_name.into(),
            entities: Vec::new(),
        }
    }

    /// Appends a record, rejecting a second record with the same identity.
    pub fn push(&mut self, record: EntityRecord) -> Result<()> {
        if self.find(&record.id).is_some() {
            return Err(SatchelError::DuplicateIdentity {
                identity: record.id,
                document: self.file_name.clone(),
            });
        }
        self.entities.push(record);
        Ok(())
    }

    /// Finds the record of a top-level entity.
    #[must_use]
    pub fn find(&self, identity: &str) -> Option<&EntityRecord> {
        self.entities.iter().find(|r| r.id == identity)
    }
}

/// The persisted form of one entity, surrogate or list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Identity for top-level records, field key for nested ones, index for list items.
    pub id: String,
    /// Scalar fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldRecord>,
    /// Structured children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<EntityRecord>,
}

impl EntityRecord {
    /// Creates an empty record.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Scalar field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Nested record by name.
    #[must_use]
    pub fn nested(&self, name: &str) -> Option<&EntityRecord> {
        self.nested.iter().find(|r| r.id == name)
    }

    /// True when either a field or a nested record carries `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some() || self.nested(name).is_some()
    }
}

/// A named scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Key of the field.
    pub name: String,
    /// Stored value.
    pub value: Value,
}

impl FieldRecord {
    /// Creates a field record.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}
