//! The object-graph transformer.
//!
//! [`Transformer::serialize`] walks a live [`Persist`] value and produces an
//! [`EntityRecord`]; [`Transformer::deserialize`] walks the same schema in reverse and
//! pushes the record's values back into a live value.
//!
//! ## Save
//!
//! For every declared field, in declaration order:
//!
//! 1. `raw` fields are written as a [`FieldRecord`] directly.
//! 2. Otherwise the field's type is resolved through the [`MapperRegistry`]. An `AsIs`
//!    converter yields a `FieldRecord`; a substituted type yields the nested record of
//!    its surrogate, keyed by the field name; a list yields a nested record holding one
//!    child per element, keyed by the element index.
//! 3. Types without a converter are recursed into when they are nested objects or lists.
//!    Anything else is an [`SatchelError::UnmappableType`].
//!
//! The save hook runs last and may append ad-hoc keys through a [`Saver`]. Every key must
//! be unique across the record's fields and nested records.
//!
//! ## Load
//!
//! Loading mirrors saving. A key present in the live schema but missing from the record
//! is logged with `log::warn!` and the field keeps its current value, so older documents
//! load into newer schemas. Lists are cleared and rebuilt in document order.

use crate::document::{EntityRecord, FieldRecord};
use crate::error::{IdentityProblem, Result, SatchelError};
use crate::mapper::{Converter, MapperRegistry};
use crate::schema::{Field, ListField, Persist, Shape, ShapeMut};
use crate::substitute::SubstituteRegistry;
use crate::types::BOXED_KEY;
use crate::value::{Native, Value};

/// Walks live values using a substitute registry and a mapper registry.
#[derive(Debug, Clone, Copy)]
pub struct Transformer<'r> {
    substitutes: &'r SubstituteRegistry,
    mappers: &'r MapperRegistry,
}

/// Output of encoding one field.
enum Encoded {
    Native(Value),
    Record(EntityRecord),
}

impl<'r> Transformer<'r> {
    /// Creates a transformer over the given registries.
    #[must_use]
    pub fn new(substitutes: &'r SubstituteRegistry, mappers: &'r MapperRegistry) -> Self {
        Self {
            substitutes,
            mappers,
        }
    }

    /// The substitute registry in use.
    #[must_use]
    pub fn substitutes(&self) -> &'r SubstituteRegistry {
        self.substitutes
    }

    /// The mapper registry in use.
    #[must_use]
    pub fn mappers(&self) -> &'r MapperRegistry {
        self.mappers
    }

    // --- SAVE ---

    /// Serializes a top-level entity under its own identity.
    pub fn serialize_entity(&self, entity: &dyn Persist) -> Result<EntityRecord> {
        let identity = resolve_identity(entity)?;
        self.serialize(entity, identity)
    }

    /// Serializes `entity` into a record named `identity`.
    pub fn serialize(&self, entity: &dyn Persist, identity: &str) -> Result<EntityRecord> {
        let mut writer = RecordWriter {
            transformer: *self,
            record: EntityRecord::new(identity),
            type_name: entity.type_name(),
        };
        entity.save_fields(&mut writer)?;
        entity.on_save(&mut Saver(&mut writer))?;
        Ok(writer.record)
    }

    fn encode(&self, key: &str, value: &dyn Field) -> Result<Encoded> {
        let info = value.type_info();
        if let Some(converter) = self.mappers.mapper_for(&info) {
            return self.encode_with(&converter, key, value);
        }
        match value.shape() {
            Shape::Nested(inner) => self.serialize(inner, key).map(Encoded::Record),
            Shape::List(list) => self.encode_list(key, list, None).map(Encoded::Record),
            Shape::Leaf(_) => Err(SatchelError::UnmappableType {
                field: key.to_string(),
                type_name: info.name.to_string(),
            }),
        }
    }

    fn encode_with(&self, converter: &Converter, key: &str, value: &dyn Field) -> Result<Encoded> {
        match converter {
            Converter::AsIs(as_is) => as_is.encode(value.as_any()).map(Encoded::Native),
            Converter::Substituted(ty) => {
                let surrogate = self
                    .substitutes
                    .to_surrogate(ty.original(), value.as_any())
                    .map_err(|e| name_missing(e, ty.original_name()))?;
                self.serialize(surrogate.as_ref(), key).map(Encoded::Record)
            }
            Converter::List(element) => match value.shape() {
                Shape::List(list) => self.encode_list(key, list, Some(element)).map(Encoded::Record),
                _ => Err(SatchelError::TypeMismatch {
                    expected: "a list".to_string(),
                    found: value.type_info().name.to_string(),
                }),
            },
        }
    }

    fn encode_list(
        &self,
        key: &str,
        list: &dyn ListField,
        element: Option<&Converter>,
    ) -> Result<EntityRecord> {
        let mut record = EntityRecord::new(key);
        for index in 0..list.len() {
            let Some(item) = list.element(index) else {
                continue;
            };
            let id = index.to_string();
            let encoded = match element {
                Some(converter) => self.encode_with(converter, &id, item)?,
                None => self.encode(&id, item)?,
            };
            record.nested.push(match encoded {
                Encoded::Record(child) => child,
                Encoded::Native(value) => boxed(id, value),
            });
        }
        Ok(record)
    }

    // --- LOAD ---

    /// Restores `entity` from `record`.
    pub fn deserialize(&self, entity: &mut dyn Persist, record: &EntityRecord) -> Result<()> {
        let reader = RecordReader {
            transformer: *self,
            record,
            type_name: entity.type_name(),
        };
        entity.load_fields(&reader)?;
        entity.on_load(&Loader::new(*self, record))
    }

    /// Restores `slot` from the entry keyed `key` in `parent`.
    ///
    /// Returns `false` without touching the slot when the entry is missing.
    fn decode_field(&self, key: &str, parent: &EntityRecord, slot: &mut dyn Field) -> Result<bool> {
        let converter = self.mappers.mapper_for(&slot.type_info());
        if let Some(Converter::AsIs(as_is)) = &converter {
            return match parent.field(key) {
                Some(value) => as_is.decode(value, slot.as_any_mut()).map(|()| true),
                None => Ok(false),
            };
        }
        match parent.nested(key) {
            Some(child) => self.decode_record(converter.as_ref(), child, slot).map(|()| true),
            None => Ok(false),
        }
    }

    fn decode_record(
        &self,
        converter: Option<&Converter>,
        record: &EntityRecord,
        slot: &mut dyn Field,
    ) -> Result<()> {
        match converter {
            Some(Converter::AsIs(as_is)) => match record.field(BOXED_KEY) {
                Some(value) => as_is.decode(value, slot.as_any_mut()),
                None => {
                    log::warn!("list item `{}` has no `{BOXED_KEY}` entry, keeping default", record.id);
                    Ok(())
                }
            },
            Some(Converter::Substituted(ty)) => {
                let mut surrogate = self
                    .substitutes
                    .fresh_surrogate(ty.original())
                    .map_err(|e| name_missing(e, ty.original_name()))?;
                self.deserialize(surrogate.as_mut(), record)?;
                self.substitutes.restore_into(surrogate, slot.as_any_mut())
            }
            Some(Converter::List(element)) => {
                let found = slot.type_info().name;
                match slot.shape_mut() {
                    ShapeMut::List(list) => self.decode_list(Some(element), record, list),
                    _ => Err(SatchelError::TypeMismatch {
                        expected: "a list".to_string(),
                        found: found.to_string(),
                    }),
                }
            }
            None => {
                let name = slot.type_info().name;
                match slot.shape_mut() {
                    ShapeMut::Nested(inner) => self.deserialize(inner, record),
                    ShapeMut::List(list) => self.decode_list(None, record, list),
                    ShapeMut::Leaf(_) => Err(SatchelError::UnmappableType {
                        field: record.id.clone(),
                        type_name: name.to_string(),
                    }),
                }
            }
        }
    }

    fn decode_list(
        &self,
        element: Option<&Converter>,
        record: &EntityRecord,
        list: &mut dyn ListField,
    ) -> Result<()> {
        list.clear();
        for child in &record.nested {
            let item = list.push_default();
            self.decode_record(element, child, item)?;
        }
        Ok(())
    }
}

/// The identity of a top-level entity, validated.
pub fn resolve_identity(entity: &dyn Persist) -> Result<&str> {
    let problem = match entity.identity() {
        Some(id) if !id.is_empty() => return Ok(id),
        Some(_) => IdentityProblem::Empty,
        None => IdentityProblem::Missing,
    };
    Err(SatchelError::InvalidIdentity {
        type_name: entity.type_name().to_string(),
        problem,
    })
}

fn boxed(id: String, value: Value) -> EntityRecord {
    EntityRecord {
        id,
        fields: vec![FieldRecord::new(BOXED_KEY, value)],
        nested: Vec::new(),
    }
}

fn name_missing(err: SatchelError, type_name: &str) -> SatchelError {
    match err {
        SatchelError::MissingSubstitute { .. } => SatchelError::MissingSubstitute {
            type_name: type_name.to_string(),
        },
        other => other,
    }
}

// --- SCHEMA-FACING HANDLES ---

/// Collects the declared fields of one record. Handed to [`Persist::save_fields`].
pub struct RecordWriter<'a> {
    transformer: Transformer<'a>,
    record: EntityRecord,
    type_name: &'static str,
}

impl RecordWriter<'_> {
    fn ensure_unique(&self, key: &str) -> Result<()> {
        if self.record.contains(key) {
            return Err(SatchelError::DuplicateField {
                key: key.to_string(),
                record: self.record.id.clone(),
                type_name: self.type_name.to_string(),
            });
        }
        Ok(())
    }

    /// Writes `value` under `key`, resolving its type through the mapper layer.
    pub fn field(&mut self, key: &str, value: &dyn Field) -> Result<()> {
        self.ensure_unique(key)?;
        match self.transformer.encode(key, value)? {
            Encoded::Native(v) => self.record.fields.push(FieldRecord::new(key, v)),
            Encoded::Record(child) => self.record.nested.push(child),
        }
        Ok(())
    }

    /// Writes `value` under `key` as a plain value, bypassing substitution.
    pub fn raw<N: Native>(&mut self, key: &str, value: &N) -> Result<()> {
        self.ensure_unique(key)?;
        self.record.fields.push(FieldRecord::new(key, value.to_value()));
        Ok(())
    }

    /// The record built so far.
    #[must_use]
    pub fn record(&self) -> &EntityRecord {
        &self.record
    }
}

/// Reads the declared fields of one record. Handed to [`Persist::load_fields`].
pub struct RecordReader<'a> {
    transformer: Transformer<'a>,
    record: &'a EntityRecord,
    type_name: &'static str,
}

impl RecordReader<'_> {
    fn missing(&self, key: &str) {
        log::warn!(
            "`{}` in record `{}` has no saved entry `{key}`, keeping current value",
            self.type_name,
            self.record.id
        );
    }

    /// Restores `slot` from the entry saved under `key`.
    pub fn field(&self, key: &str, slot: &mut dyn Field) -> Result<()> {
        if !self.transformer.decode_field(key, self.record, slot)? {
            self.missing(key);
        }
        Ok(())
    }

    /// Restores a plain value saved under `key`.
    pub fn raw<N: Native>(&self, key: &str, slot: &mut N) -> Result<()> {
        match self.record.field(key) {
            Some(value) => *slot = N::from_value(value)?,
            None => self.missing(key),
        }
        Ok(())
    }

    /// The record being read.
    #[must_use]
    pub fn record(&self) -> &EntityRecord {
        self.record
    }
}

/// Handle given to save hooks for appending ad-hoc keys.
pub struct Saver<'w, 'a>(&'w mut RecordWriter<'a>);

impl Saver<'_, '_> {
    /// Saves `value` under `key` exactly like a declared field.
    pub fn save(&mut self, key: &str, value: &dyn Field) -> Result<()> {
        self.0.field(key, value)
    }

    /// Saves a plain value under `key`.
    pub fn save_raw<N: Native>(&mut self, key: &str, value: &N) -> Result<()> {
        self.0.raw(key, value)
    }
}

/// Reader bound to one record, given to load hooks and migrations.
#[derive(Clone, Copy)]
pub struct Loader<'a> {
    transformer: Transformer<'a>,
    record: &'a EntityRecord,
}

impl<'a> Loader<'a> {
    /// Binds a reader to `record`.
    #[must_use]
    pub fn new(transformer: Transformer<'a>, record: &'a EntityRecord) -> Self {
        Self {
            transformer,
            record,
        }
    }

    fn missing_key(&self, key: &str) -> SatchelError {
        SatchelError::MissingKey {
            key: key.to_string(),
            record: self.record.id.clone(),
        }
    }

    /// True when the record holds a field or nested record named `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.record.contains(key)
    }

    /// The record this loader reads.
    #[must_use]
    pub fn record(&self) -> &'a EntityRecord {
        self.record
    }

    /// Loads the value saved under `key` as a `T`.
    ///
    /// # Errors
    ///
    /// [`SatchelError::MissingKey`] when the record has no entry named `key`,
    /// [`SatchelError::MissingMapper`] when `T` is a leaf without a converter.
    pub fn load<T: Field + Default>(&self, key: &str) -> Result<T> {
        if !self.record.contains(key) {
            return Err(self.missing_key(key));
        }
        let mut value = T::default();
        let info = value.type_info();
        if self.transformer.mappers.mapper_for(&info).is_none() && matches!(value.shape(), Shape::Leaf(_)) {
            return Err(SatchelError::MissingMapper {
                key: key.to_string(),
                type_name: info.name.to_string(),
            });
        }
        if self.transformer.decode_field(key, self.record, &mut value)? {
            Ok(value)
        } else {
            Err(self.missing_key(key))
        }
    }

    /// Loads a plain value saved under `key`.
    pub fn load_raw<N: Native>(&self, key: &str) -> Result<N> {
        let value = self.record.field(key).ok_or_else(|| self.missing_key(key))?;
        N::from_value(value)
    }

    /// Restores a nested object saved under `key` into `target`.
    pub fn load_into(&self, key: &str, target: &mut dyn Persist) -> Result<()> {
        let child = self.record.nested(key).ok_or_else(|| self.missing_key(key))?;
        self.transformer.deserialize(target, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;
    use crate::Persist;

    #[derive(Debug, Default, PartialEq, Persist)]
    #[persist(nested)]
    struct Stats {
        #[persist]
        level: u8,
        #[persist]
        tags: Vec<String>,
    }

    #[derive(Debug, Default, PartialEq, Persist)]
    #[persist(file = "world")]
    struct Hero {
        #[persist(id)]
        id: String,
        #[persist]
        name: String,
        #[persist]
        hp: i64,
        #[persist]
        pos: Vec3,
        #[persist]
        stats: Stats,
        #[persist]
        party: Vec<Stats>,
        transient: u32,
    }

    fn registries() -> (SubstituteRegistry, MapperRegistry) {
        (SubstituteRegistry::with_builtins().unwrap(), MapperRegistry::builtin())
    }

    fn hero() -> Hero {
        Hero {
            id: "e-1".into(),
            name: "hero".into(),
            hp: 42,
            pos: Vec3::new(0.0, 1.0, 0.0),
            stats: Stats { level: 3, tags: vec!["a".into(), "b".into()] },
            party: vec![Stats { level: 1, tags: Vec::new() }],
            transient: 9,
        }
    }

    #[test]
    fn native_fields_and_substituted_vectors() {
        let (subs, maps) = registries();
        let t = Transformer::new(&subs, &maps);
        let record = t.serialize_entity(&hero()).unwrap();

        assert_eq!(record.id, "e-1");
        assert_eq!(record.field("hp"), Some(&Value::Int(42)));
        assert_eq!(record.field("name"), Some(&Value::Str("hero".into())));
        assert!(record.field("transient").is_none());

        let pos = record.nested("pos").unwrap();
        assert_eq!(pos.field("X"), Some(&Value::Float(0.0)));
        assert_eq!(pos.field("Y"), Some(&Value::Float(1.0)));
        assert_eq!(pos.field("Z"), Some(&Value::Float(0.0)));
    }

    #[test]
    fn lists_keep_order_and_box_plain_elements() {
        let (subs, maps) = registries();
        let t = Transformer::new(&subs, &maps);
        let record = t.serialize_entity(&hero()).unwrap();

        let tags = record.nested("stats").unwrap().nested("tags").unwrap();
        let ids: Vec<_> = tags.nested.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["0", "1"]);
        assert_eq!(tags.nested[1].field(BOXED_KEY), Some(&Value::Str("b".into())));
    }

    #[test]
    fn round_trip_restores_declared_fields_only() {
        let (subs, maps) = registries();
        let t = Transformer::new(&subs, &maps);
        let original = hero();
        let record = t.serialize_entity(&original).unwrap();

        let mut restored = Hero { id: "e-1".into(), ..Hero::default() };
        restored.stats.tags = vec!["stale".into()];
        t.deserialize(&mut restored, &record).unwrap();

        assert_eq!(restored.transient, 0);
        restored.transient = original.transient;
        assert_eq!(restored, original);
    }

    #[test]
    fn missing_entries_keep_current_values() {
        let (subs, maps) = registries();
        let t = Transformer::new(&subs, &maps);
        let mut record = t.serialize_entity(&hero()).unwrap();
        record.fields.retain(|f| f.name != "hp");
        record.nested.retain(|r| r.id != "pos");

        let mut live = Hero { hp: 7, pos: Vec3::new(5.0, 5.0, 5.0), ..Hero::default() };
        t.deserialize(&mut live, &record).unwrap();
        assert_eq!(live.hp, 7);
        assert_eq!(live.pos, Vec3::new(5.0, 5.0, 5.0));
        assert_eq!(live.name, "hero");
    }

    #[test]
    fn identity_must_be_present() {
        let (subs, maps) = registries();
        let t = Transformer::new(&subs, &maps);
        let err = t.serialize_entity(&Hero::default()).unwrap_err();
        assert!(matches!(
            err,
            SatchelError::InvalidIdentity { problem: IdentityProblem::Empty, .. }
        ));
        let err = t.serialize_entity(&Stats::default()).unwrap_err();
        assert!(matches!(
            err,
            SatchelError::InvalidIdentity { problem: IdentityProblem::Missing, .. }
        ));
    }

    #[test]
    fn missing_substitute_is_reported_by_type() {
        let subs = SubstituteRegistry::builder().build().unwrap();
        let maps = MapperRegistry::builtin();
        let t = Transformer::new(&subs, &maps);
        let err = t.serialize_entity(&hero()).unwrap_err();
        assert!(matches!(err, SatchelError::MissingSubstitute { ref type_name } if type_name.contains("Vec3")));
    }

    #[test]
    fn loader_reports_missing_keys_and_mappers() {
        #[derive(Default)]
        struct Opaque;
        crate::leaf!(Opaque);

        let (subs, maps) = registries();
        let t = Transformer::new(&subs, &maps);
        let record = t.serialize_entity(&hero()).unwrap();
        let loader = Loader::new(t, &record);

        assert_eq!(loader.load::<i64>("hp").unwrap(), 42);
        assert_eq!(loader.load::<Vec3>("pos").unwrap(), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(loader.load_raw::<i32>("hp").unwrap(), 42);
        assert!(matches!(loader.load::<i64>("nope"), Err(SatchelError::MissingKey { .. })));
        assert!(matches!(loader.load::<Opaque>("hp"), Err(SatchelError::MissingMapper { .. })));
    }
}
