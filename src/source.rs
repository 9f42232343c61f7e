//! Entity enumeration boundary.
//!
//! The orchestrator never discovers entities on its own. It asks an [`EntitySource`] for
//! the live candidates, each paired with its [`Saved`] routing attribute. [`EntitySet`]
//! is the in-memory source most hosts start with.

use crate::error::{Result, SatchelError};
use crate::schema::Persist;

/// Routing attribute of a top-level entity: destination file, and whether the entity is
/// only saved and loaded on explicit request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Saved {
    /// Logical file name, without directory or extension.
    pub file: String,
    /// True when the entity is skipped by bulk saves and loads.
    pub explicit: bool,
}

impl Saved {
    /// Routes to `file` in the bulk set.
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            explicit: false,
        }
    }

    /// Routes to `file` in the explicit set.
    pub fn explicit(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            explicit: true,
        }
    }

    /// Rejects empty file names and names that would escape the save directory.
    pub fn validate(&self) -> Result<()> {
        let bad = self.file.trim().is_empty()
            || self.file.contains(['/', '\\'])
            || self.file == "."
            || self.file == "..";
        if bad {
            return Err(SatchelError::Config(format!(
                "invalid save file name `{}`",
                self.file
            )));
        }
        Ok(())
    }
}

/// A live entity paired with its routing attribute.
pub struct Candidate<'a> {
    /// The entity.
    pub entity: &'a mut dyn Persist,
    /// Where it goes.
    pub saved: Saved,
}

/// Produces the live candidates of the current process.
pub trait EntitySource {
    /// Every live persistable entity.
    fn candidates(&mut self) -> Vec<Candidate<'_>>;
}

/// An owned collection of entities.
#[derive(Default)]
pub struct EntitySet {
    entities: Vec<Box<dyn Persist>>,
}

impl std::fmt::Debug for EntitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entities.iter().map(|e| (e.type_name(), e.identity())))
            .finish()
    }
}

impl EntitySet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity.
    pub fn insert<T: Persist>(&mut self, entity: T) {
        self.entities.push(Box::new(entity));
    }

    /// Adds an already boxed entity.
    pub fn insert_boxed(&mut self, entity: Box<dyn Persist>) {
        self.entities.push(entity);
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The first `T` whose identity is `identity`.
    #[must_use]
    pub fn get<T: Persist>(&self, identity: &str) -> Option<&T> {
        self.entities
            .iter()
            .filter(|e| e.identity() == Some(identity))
            .find_map(|e| e.as_any().downcast_ref::<T>())
    }

    /// Mutable access to the first `T` whose identity is `identity`.
    pub fn get_mut<T: Persist>(&mut self, identity: &str) -> Option<&mut T> {
        self.entities
            .iter_mut()
            .filter(|e| e.identity() == Some(identity))
            .find_map(|e| e.as_any_mut().downcast_mut::<T>())
    }

    /// Every entity, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Persist> {
        self.entities.iter().map(|e| &**e)
    }

    /// Mutable access to every entity, in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut dyn Persist> {
        self.entities.iter_mut().map(|e| -> &mut dyn Persist { &mut **e })
    }
}

impl EntitySource for EntitySet {
    /// Entities that return a routing attribute. Others are not top-level and are skipped.
    fn candidates(&mut self) -> Vec<Candidate<'_>> {
        self.entities
            .iter_mut()
            .filter_map(|entity| {
                let saved = entity.saved()?;
                Some(Candidate {
                    entity: &mut **entity,
                    saved,
                })
            })
            .collect()
    }
}
