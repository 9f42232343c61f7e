//! Versioned migration dispatcher.
//!
//! A [`MigrationHandler`] bundles the upgrade routines of one schema version, at most one
//! per live type. The [`MigrationTable`] keeps handlers ordered by version. After an
//! entity has been restored from a document written at version `v`, every handler with a
//! version greater than `v` that defines a routine for the entity's type runs, in
//! ascending order.
//!
//! Each routine receives a [`Loader`] bound to the entity's record as it was read from
//! disk, and the live entity. Migrations never touch the document.
//!
//! ```rust,ignore
//! let handler = MigrationHandler::new(2).define(Migration::new(|old: &Loader<'_>, hero: &mut Hero| {
//!     // v1 stored health as "health", v2 calls it "hp".
//!     if old.contains("health") {
//!         hero.hp = old.load_raw("health")?;
//!     }
//!     Ok(())
//! }));
//! ```

use crate::error::{Result, SatchelError};
use crate::schema::Persist;
use crate::transform::Loader;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Bound;

/// One upgrade routine bound to one live type.
pub trait MigrationDefinition: Send + Sync {
    /// The live type this routine upgrades.
    fn target(&self) -> TypeId;

    /// Name of the target type, for diagnostics.
    fn target_name(&self) -> &'static str;

    /// Pushes corrected values from the old record into `entity`.
    ///
    /// # Errors
    ///
    /// [`SatchelError::TypeMismatch`] when `entity` is not of the target type,
    /// [`SatchelError::NotPersistable`] when it is not a top-level saved entity.
    fn migrate(&self, old: &Loader<'_>, entity: &mut dyn Persist) -> Result<()>;
}

type Routine<T> = dyn Fn(&Loader<'_>, &mut T) -> Result<()> + Send + Sync;

/// A typed [`MigrationDefinition`] built from a closure.
pub struct Migration<T> {
    routine: Box<Routine<T>>,
    _target: PhantomData<fn() -> T>,
}

impl<T: Persist> Migration<T> {
    /// Wraps `routine` as the upgrade of `T`.
    pub fn new<F>(routine: F) -> Self
    where
        F: Fn(&Loader<'_>, &mut T) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            routine: Box::new(routine),
            _target: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Migration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("target", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

impl<T: Persist> MigrationDefinition for Migration<T> {
    fn target(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn target_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn migrate(&self, old: &Loader<'_>, entity: &mut dyn Persist) -> Result<()> {
        let found = entity.type_name();
        let Some(target) = entity.as_any_mut().downcast_mut::<T>() else {
            return Err(SatchelError::TypeMismatch {
                expected: self.target_name().to_string(),
                found: found.to_string(),
            });
        };
        if target.saved().is_none() {
            return Err(SatchelError::NotPersistable {
                type_name: found.to_string(),
            });
        }
        (self.routine)(old, target)
    }
}

/// The routines of one schema version.
pub struct MigrationHandler {
    version: u32,
    definitions: Vec<Box<dyn MigrationDefinition>>,
}

impl fmt::Debug for MigrationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets: Vec<_> = self.definitions.iter().map(|d| d.target_name()).collect();
        f.debug_struct("MigrationHandler")
            .field("version", &self.version)
            .field("targets", &targets)
            .finish()
    }
}

impl MigrationHandler {
    /// An empty handler for `version`.
    #[must_use]
    pub fn new(version: u32) -> Self {
        Self {
            version,
            definitions: Vec::new(),
        }
    }

    /// Adds a routine. Two routines for one type are rejected on registration.
    #[must_use]
    pub fn define(mut self, definition: impl MigrationDefinition + 'static) -> Self {
        self.definitions.push(Box::new(definition));
        self
    }

    /// Schema version this handler upgrades to.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The routine for `target`, if this handler defines one.
    #[must_use]
    pub fn definition_for(&self, target: TypeId) -> Option<&dyn MigrationDefinition> {
        self.definitions
            .iter()
            .find(|d| d.target() == target)
            .map(|d| &**d)
    }

    fn check_unique(&self) -> Result<()> {
        for (i, def) in self.definitions.iter().enumerate() {
            if self.definitions[..i].iter().any(|d| d.target() == def.target()) {
                return Err(SatchelError::Config(format!(
                    "migration handler {} defines `{}` twice",
                    self.version,
                    def.target_name()
                )));
            }
        }
        Ok(())
    }
}

/// Handlers ordered by version.
#[derive(Debug, Default)]
pub struct MigrationTable {
    handlers: BTreeMap<u32, MigrationHandler>,
}

impl MigrationTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler, rejecting duplicate versions and duplicate routines.
    pub fn register(&mut self, handler: MigrationHandler) -> Result<()> {
        handler.check_unique()?;
        if self.handlers.contains_key(&handler.version) {
            return Err(SatchelError::Config(format!(
                "migration version {} registered twice",
                handler.version
            )));
        }
        self.handlers.insert(handler.version, handler);
        Ok(())
    }

    /// Highest registered version.
    #[must_use]
    pub fn latest_version(&self) -> Option<u32> {
        self.handlers.keys().next_back().copied()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Routines for `target` newer than `doc_version`, in ascending version order.
    pub fn pending(
        &self,
        doc_version: u32,
        target: TypeId,
    ) -> impl Iterator<Item = (u32, &dyn MigrationDefinition)> + '_ {
        self.handlers
            .range((Bound::Excluded(doc_version), Bound::Unbounded))
            .filter_map(move |(version, handler)| {
                handler.definition_for(target).map(|def| (*version, def))
            })
    }

    /// Runs every pending routine for `entity`. Returns how many ran.
    pub fn apply(&self, old: &Loader<'_>, doc_version: u32, entity: &mut dyn Persist) -> Result<usize> {
        let target = entity.as_any().type_id();
        let mut applied = 0;
        for (version, definition) in self.pending(doc_version, target) {
            log::debug!(
                "migrating `{}` in record `{}` from v{doc_version} with v{version}",
                entity.type_name(),
                old.record().id
            );
            definition.migrate(old, entity)?;
            applied += 1;
        }
        Ok(applied)
    }
}
