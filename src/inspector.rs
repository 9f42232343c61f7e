//! Tools for inspecting the structure of a save document.
//! Useful for debugging schema changes and migrations.

use crate::document::{Document, EntityRecord};
use serde::Serialize;
use std::fmt;

/// A structural report of a document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    /// Logical file name.
    pub file_name: String,
    /// Schema version the document was written with.
    pub version: u32,
    /// Number of top-level entities.
    pub entity_count: usize,
    /// Total number of records, nested ones included.
    pub record_count: usize,
    /// One tree per top-level entity.
    pub entities: Vec<RecordInfo>,
}

/// Summary of one record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordInfo {
    /// Identity, field key or list index.
    pub id: String,
    /// Names of the scalar fields.
    pub fields: Vec<String>,
    /// Children.
    pub nested: Vec<RecordInfo>,
}

impl RecordInfo {
    fn from_record(record: &EntityRecord) -> Self {
        Self {
            id: record.id.clone(),
            fields: record.fields.iter().map(|f| f.name.clone()).collect(),
            nested: record.nested.iter().map(Self::from_record).collect(),
        }
    }

    fn count(&self) -> usize {
        1 + self.nested.iter().map(Self::count).sum::<usize>()
    }

    fn fmt_recursive(&self, f: &mut fmt::Formatter<'_>, prefix: &str, is_last: bool) -> fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        let fields = if self.fields.is_empty() {
            String::new()
        } else {
            format!(" [{}]", self.fields.join(", "))
        };

        writeln!(
            f,
            "{prefix}{connector}{} | Fields: {} | Nested: {}{fields}",
            self.id,
            self.fields.len(),
            self.nested.len(),
        )?;

        for (i, child) in self.nested.iter().enumerate() {
            let is_last_child = i == self.nested.len() - 1;
            child.fmt_recursive(f, &format!("{prefix}{child_prefix}"), is_last_child)?;
        }
        Ok(())
    }
}

/// Builds the structural report of `doc`.
#[must_use]
pub fn inspect(doc: &Document) -> DocumentReport {
    let entities: Vec<RecordInfo> = doc.entities.iter().map(RecordInfo::from_record).collect();
    DocumentReport {
        file_name: doc.file_name.clone(),
        version: doc.version,
        entity_count: entities.len(),
        record_count: entities.iter().map(RecordInfo::count).sum(),
        entities,
    }
}

impl fmt::Display for DocumentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== SATCHEL DOCUMENT REPORT ===")?;
        writeln!(f, "File:      {}", self.file_name)?;
        writeln!(f, "Version:   {}", self.version)?;
        writeln!(f, "Entities:  {}", self.entity_count)?;
        writeln!(f, "Records:   {}", self.record_count)?;
        writeln!(f, "\n[ENTITIES]")?;
        for (i, entity) in self.entities.iter().enumerate() {
            entity.fmt_recursive(f, "", i == self.entities.len() - 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldRecord;

    #[test]
    fn report_counts_and_draws_the_tree() {
        let mut hero = EntityRecord::new("e-1");
        hero.fields.push(FieldRecord::new("hp", 42_i64));
        let mut pos = EntityRecord::new("pos");
        pos.fields.push(FieldRecord::new("X", 0.0));
        hero.nested.push(pos);

        let mut doc = Document::new("world", 3);
        doc.push(hero).unwrap();
        doc.push(EntityRecord::new("e-2")).unwrap();

        let report = inspect(&doc);
        assert_eq!(report.entity_count, 2);
        assert_eq!(report.record_count, 3);

        let text = report.to_string();
        assert!(text.contains("├── e-1 | Fields: 1 | Nested: 1 [hp]"));
        assert!(text.contains("│   └── pos | Fields: 1 | Nested: 0 [X]"));
        assert!(text.contains("└── e-2 | Fields: 0 | Nested: 0"));
    }
}
