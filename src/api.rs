//! The save/load orchestrator.
//!
//! A [`Satchel`] owns everything a save needs: the directory layout, the codec, the
//! substitute and mapper registries, the migration table and the before-save callbacks.
//! It is built once with [`Satchel::builder`] and is immutable afterwards, so it can be
//! shared freely between threads.
//!
//! ```rust,no_run
//! use satchel::{EntitySet, Persist, Satchel};
//!
//! #[derive(Default, Persist)]
//! #[persist(file = "world")]
//! struct Hero {
//!     #[persist(id)]
//!     id: String,
//!     #[persist]
//!     hp: i64,
//! }
//!
//! # fn main() -> satchel::Result<()> {
//! let satchel = Satchel::builder().save_dir("saves").build()?;
//! let mut world = EntitySet::new();
//! world.insert(Hero { id: "hero".into(), hp: 42 });
//! satchel.save_all(&mut world)?;
//! satchel.load_all(&mut world)?;
//! # Ok(())
//! # }
//! ```

use crate::codec::{Codec, JsonCodec};
use crate::config::Options;
use crate::document::Document;
use crate::error::{IdentityProblem, Result, SatchelError};
use crate::identity::{self, Collision};
use crate::inspector::{self, DocumentReport};
use crate::mapper::{MapperRegistry, UserMapper};
use crate::migration::{MigrationHandler, MigrationTable};
use crate::schema::Persist;
use crate::source::{Candidate, EntitySource, Saved};
use crate::substitute::{Substitute, SubstituteEntry, SubstituteRegistry};
use crate::transform::{resolve_identity, Loader, Transformer};
use crate::value::Native;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Callback run on every entity right before it is serialized.
pub type BeforeSave = Box<dyn Fn(&mut dyn Persist) + Send + Sync>;

/// Outcome of a save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Files written, in file name order.
    pub files: Vec<PathBuf>,
    /// Entities serialized.
    pub entities: usize,
}

/// Outcome of a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Documents found and read.
    pub documents: usize,
    /// Entities restored from a record.
    pub restored: usize,
    /// Entities without a record in their document. They are left untouched.
    pub unmatched: usize,
    /// Migration routines run.
    pub migrations: usize,
}

impl LoadReport {
    fn absorb(&mut self, other: Self) {
        self.documents += other.documents;
        self.restored += other.restored;
        self.unmatched += other.unmatched;
        self.migrations += other.migrations;
    }
}

/// Configures a [`Satchel`].
#[derive(Default)]
pub struct SatchelBuilder {
    options: Options,
    codec: Option<Box<dyn Codec>>,
    substitutes: Vec<SubstituteEntry>,
    mappers: MapperRegistry,
    handlers: Vec<MigrationHandler>,
    before_save: Vec<BeforeSave>,
}

impl fmt::Debug for SatchelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SatchelBuilder")
            .field("options", &self.options)
            .field("codec", &self.codec)
            .field("substitutes", &self.substitutes)
            .field("mappers", &self.mappers)
            .field("handlers", &self.handlers)
            .field("before_save", &self.before_save.len())
            .finish()
    }
}

impl SatchelBuilder {
    /// Replaces every option at once.
    #[must_use]
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Base directory of the saves.
    #[must_use]
    pub fn save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.save_dir = dir.into();
        self
    }

    /// Codec used for every file. Defaults to [`JsonCodec`].
    #[must_use]
    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Some(Box::new(codec));
        self
    }

    /// Registers surrogate `S` and routes `S::Original` fields through it.
    #[must_use]
    pub fn substitute<S: Substitute>(mut self) -> Self {
        let entry = SubstituteEntry::of::<S>();
        self.mappers.add_substitute(&entry);
        self.substitutes.push(entry);
        self
    }

    /// Stores `T` fields as plain values.
    #[must_use]
    pub fn as_is<T: Native>(mut self) -> Self {
        self.mappers.add_as_is::<T>();
        self
    }

    /// Adds a dynamic converter resolver.
    #[must_use]
    pub fn user_mapper(mut self, mapper: impl UserMapper + 'static) -> Self {
        self.mappers.add_user_mapper(Arc::new(mapper));
        self
    }

    /// Adds a migration handler.
    #[must_use]
    pub fn migration(mut self, handler: MigrationHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Adds a callback run on every entity before it is serialized.
    #[must_use]
    pub fn before_save(mut self, callback: impl Fn(&mut dyn Persist) + Send + Sync + 'static) -> Self {
        self.before_save.push(Box::new(callback));
        self
    }

    /// Validates the configuration and freezes it.
    ///
    /// # Errors
    ///
    /// [`SatchelError::Config`] for bad options or migration tables,
    /// [`SatchelError::MalformedSubstitute`] for ambiguous or broken surrogates and
    /// [`SatchelError::MissingSubstitute`] when a converter names a type nobody substitutes.
    pub fn build(self) -> Result<Satchel> {
        // 1. Options
        self.options.validate()?;

        // 2. Substitutes: built-ins first, then user registrations.
        let substitutes = self
            .substitutes
            .into_iter()
            .fold(SubstituteRegistry::builder().builtins(), |b, e| b.entry(e))
            .build()?;
        substitutes.validate()?;

        // 3. Every substituted converter must have its surrogate.
        if let Some(orphan) = self
            .mappers
            .substituted_types()
            .find(|ty| !substitutes.contains(ty.original()))
        {
            return Err(SatchelError::MissingSubstitute {
                type_name: orphan.original_name().to_string(),
            });
        }

        // 4. Migrations
        let mut migrations = MigrationTable::new();
        for handler in self.handlers {
            migrations.register(handler)?;
        }

        // 5. Codec
        let codec = self.codec.unwrap_or_else(|| {
            Box::new(if self.options.pretty {
                JsonCodec::pretty()
            } else {
                JsonCodec::compact()
            })
        });

        log::debug!(
            "satchel ready: {} surrogates, {} migration handlers, .{} files in {}",
            substitutes.len(),
            migrations.len(),
            codec.extension(),
            self.options.save_dir.display()
        );

        Ok(Satchel {
            options: self.options,
            codec,
            substitutes,
            mappers: self.mappers,
            migrations,
            before_save: self.before_save,
        })
    }
}

/// The persistence context.
pub struct Satchel {
    options: Options,
    codec: Box<dyn Codec>,
    substitutes: SubstituteRegistry,
    mappers: MapperRegistry,
    migrations: MigrationTable,
    before_save: Vec<BeforeSave>,
}

impl fmt::Debug for Satchel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Satchel")
            .field("options", &self.options)
            .field("codec", &self.codec)
            .field("substitutes", &self.substitutes.len())
            .field("mappers", &self.mappers)
            .field("migrations", &self.migrations)
            .finish_non_exhaustive()
    }
}

impl Satchel {
    /// Starts a configuration with default options and the built-in converters.
    #[must_use]
    pub fn builder() -> SatchelBuilder {
        SatchelBuilder::default()
    }

    /// A transformer over this context's registries.
    #[must_use]
    pub fn transformer(&self) -> Transformer<'_> {
        Transformer::new(&self.substitutes, &self.mappers)
    }

    /// The options in use.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The codec in use.
    #[must_use]
    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    /// Version stamped on new documents: the highest migration version, or the default.
    #[must_use]
    pub fn latest_version(&self) -> u32 {
        self.migrations.latest_version().unwrap_or(self.options.default_version)
    }

    /// Where the document named `file` lives.
    #[must_use]
    pub fn save_path(&self, file: &str, explicit: bool) -> PathBuf {
        let dir = if explicit {
            self.options.explicit_path()
        } else {
            self.options.save_dir.clone()
        };
        dir.join(format!("{file}.{}", self.codec.extension()))
    }

    // --- DOCUMENTS ---

    /// Serializes `entities` into a fresh document named `file`.
    ///
    /// Before-save callbacks run on each entity first. Fails on the first invalid
    /// identity, duplicate key or unmappable field, and on two entities sharing an identity.
    pub fn build_document<'a, I>(&self, file: &str, entities: I) -> Result<Document>
    where
        I: IntoIterator<Item = &'a mut dyn Persist>,
    {
        let transformer = self.transformer();
        let mut doc = Document::new(file, self.latest_version());
        for entity in entities {
            for callback in &self.before_save {
                callback(&mut *entity);
            }
            doc.push(transformer.serialize_entity(&*entity)?)?;
        }
        Ok(doc)
    }

    /// Restores `entities` from `doc`, matching records by identity, then migrates each
    /// restored entity from the document's version.
    ///
    /// Entities with no record, including those whose identity is still empty, are left
    /// untouched and counted as unmatched.
    pub fn restore_document<'a, I>(&self, doc: &Document, entities: I) -> Result<LoadReport>
    where
        I: IntoIterator<Item = &'a mut dyn Persist>,
    {
        let transformer = self.transformer();
        let mut report = LoadReport {
            documents: 1,
            ..LoadReport::default()
        };
        for entity in entities {
            let identity = match resolve_identity(&*entity) {
                Ok(identity) => identity,
                Err(SatchelError::InvalidIdentity {
                    problem: IdentityProblem::Empty,
                    ..
                }) => {
                    log::warn!(
                        "`{}` has no identity yet, leaving it untouched by `{}`",
                        entity.type_name(),
                        doc.file_name
                    );
                    report.unmatched += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };
            let Some(record) = doc.find(identity) else {
                log::warn!(
                    "`{}` `{identity}` has no record in `{}`, leaving it untouched",
                    entity.type_name(),
                    doc.file_name
                );
                report.unmatched += 1;
                continue;
            };
            transformer.deserialize(entity, record)?;
            let old = Loader::new(transformer, record);
            report.migrations += self.migrations.apply(&old, doc.version, entity)?;
            report.restored += 1;
        }
        Ok(report)
    }

    // --- BULK ---

    /// Saves every non-explicit candidate, one document per file.
    ///
    /// All documents are built before the first write, so a failing entity leaves every
    /// file on disk as it was.
    pub fn save_all(&self, source: &mut dyn EntitySource) -> Result<SaveReport> {
        // 1. Group the bulk candidates by destination file.
        let groups = group_by_file(source.candidates(), |saved| !saved.explicit)?;

        // 2. Serialize everything.
        let mut documents = Vec::with_capacity(groups.len());
        let mut entities = 0;
        for (file, members) in groups {
            entities += members.len();
            documents.push(self.build_document(&file, members)?);
        }

        // 3. Write.
        let mut files = Vec::with_capacity(documents.len());
        for doc in &documents {
            let path = self.save_path(&doc.file_name, false);
            self.codec.write(&path, doc)?;
            files.push(path);
        }
        Ok(SaveReport { files, entities })
    }

    /// Loads every non-explicit candidate from its file. Missing or unreadable files are
    /// skipped and their entities keep their current state.
    pub fn load_all(&self, source: &mut dyn EntitySource) -> Result<LoadReport> {
        let groups = group_by_file(source.candidates(), |saved| !saved.explicit)?;
        let mut report = LoadReport::default();
        for (file, members) in groups {
            let path = self.save_path(&file, false);
            let Some(doc) = self.codec.read(&path) else {
                log::debug!("no save at {}", path.display());
                continue;
            };
            report.absorb(self.restore_document(&doc, members)?);
        }
        Ok(report)
    }

    // --- EXPLICIT ---

    /// Saves the explicit candidates routed to `name`.
    ///
    /// Nothing is written when no candidate matches.
    pub fn save_explicit(&self, name: &str, source: &mut dyn EntitySource) -> Result<SaveReport> {
        let mut groups = group_by_file(source.candidates(), |saved| saved.explicit && saved.file == name)?;
        let Some(members) = groups.remove(name) else {
            log::warn!("no explicit entity is routed to `{name}`, nothing saved");
            return Ok(SaveReport::default());
        };
        let entities = members.len();
        let doc = self.build_document(name, members)?;
        let path = self.save_path(name, true);
        self.codec.write(&path, &doc)?;
        Ok(SaveReport {
            files: vec![path],
            entities,
        })
    }

    /// Loads the explicit candidates routed to `name`.
    pub fn load_explicit(&self, name: &str, source: &mut dyn EntitySource) -> Result<LoadReport> {
        let mut groups = group_by_file(source.candidates(), |saved| saved.explicit && saved.file == name)?;
        let Some(members) = groups.remove(name) else {
            return Ok(LoadReport::default());
        };
        let path = self.save_path(name, true);
        match self.codec.read(&path) {
            Some(doc) => self.restore_document(&doc, members),
            None => Ok(LoadReport::default()),
        }
    }

    // --- FILES ---

    /// True when the save directory holds at least one bulk save file.
    #[must_use]
    pub fn has_save(&self) -> bool {
        match self.save_files(&self.options.save_dir) {
            Ok(files) => !files.is_empty(),
            Err(e) => {
                log::warn!("cannot list {}: {e}", self.options.save_dir.display());
                false
            }
        }
    }

    /// Deletes every bulk and explicit save file. Returns how many were removed.
    pub fn clean_all_saves(&self) -> Result<usize> {
        let mut files = self.save_files(&self.options.save_dir)?;
        files.extend(self.save_files(&self.options.explicit_path())?);
        if files.is_empty() {
            log::info!("no save files to delete");
            return Ok(0);
        }
        for file in &files {
            fs::remove_file(file)?;
            log::info!("deleted {}", file.display());
        }
        Ok(files.len())
    }

    fn save_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let suffix = format!(".{}", self.codec.extension());
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let is_save = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(&suffix));
            if is_save && entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    // --- DIAGNOSTICS ---

    /// Reports every identity shared by more than one candidate.
    pub fn check_duplicates(
        &self,
        source: &mut dyn EntitySource,
        filter: Option<&dyn Fn(&str) -> bool>,
    ) -> Vec<Collision> {
        let candidates = source.candidates();
        identity::check_duplicates(candidates.iter().map(|c| -> &dyn Persist { &*c.entity }), filter)
    }

    /// Gives every candidate with an empty identity a fresh UUID.
    pub fn generate_missing_identities(&self, source: &mut dyn EntitySource) -> usize {
        identity::generate_missing_identities(source.candidates().into_iter().map(|c| c.entity))
    }

    /// Reads the document named `file` and describes its structure.
    ///
    /// `Ok(None)` when there is no readable save.
    pub fn inspect(&self, file: &str, explicit: bool) -> Result<Option<DocumentReport>> {
        Saved {
            file: file.to_string(),
            explicit,
        }
        .validate()?;
        let path = self.save_path(file, explicit);
        Ok(self.codec.read(&path).as_ref().map(inspector::inspect))
    }
}

/// Groups the candidates accepted by `keep` by file name, validating each route.
fn group_by_file<'a>(
    candidates: Vec<Candidate<'a>>,
    keep: impl Fn(&Saved) -> bool,
) -> Result<BTreeMap<String, Vec<&'a mut dyn Persist>>> {
    let mut groups: BTreeMap<String, Vec<&'a mut dyn Persist>> = BTreeMap::new();
    for Candidate { entity, saved } in candidates {
        if !keep(&saved) {
            continue;
        }
        saved.validate()?;
        groups.entry(saved.file).or_default().push(entity);
    }
    Ok(groups)
}
