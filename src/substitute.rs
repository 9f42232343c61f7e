//! Type-substitute registry.
//!
//! A surrogate is a [`Persist`] type standing in for an external value type that the
//! mapper layer cannot store as a plain scalar (vectors, rotations, narrow integers).
//! Implementing [`Substitute`] supplies both directions of the conversion, so a
//! registered pair is always total and reversible.
//!
//! The registry is built once, when the [`Satchel`](crate::Satchel) context is built,
//! and is immutable afterwards.

use crate::error::{Result, SatchelError};
use crate::schema::Persist;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// A persistence surrogate for `Self::Original`.
pub trait Substitute: Persist + Sized {
    /// The external type being replaced.
    type Original: Default + 'static;

    /// Builds the surrogate of `original`.
    fn from_original(original: &Self::Original) -> Self;

    /// Converts the surrogate back.
    fn into_original(self) -> Self::Original;
}

type ToSurrogate = fn(&dyn Any) -> Option<Box<dyn Persist>>;
type Fresh = fn() -> Box<dyn Persist>;
type ToOriginal = fn(Box<dyn Any>) -> Option<Box<dyn Any>>;
type Restore = fn(Box<dyn Any>, &mut dyn Any) -> std::result::Result<(), Slot>;

/// Which side of a restore had the wrong runtime type.
enum Slot {
    Surrogate,
    Target,
}

fn to_surrogate_of<S: Substitute>(value: &dyn Any) -> Option<Box<dyn Persist>> {
    value
        .downcast_ref::<S::Original>()
        .map(|original| Box::new(S::from_original(original)) as Box<dyn Persist>)
}

fn fresh_of<S: Substitute>() -> Box<dyn Persist> {
    Box::new(S::from_original(&S::Original::default()))
}

fn to_original_of<S: Substitute>(value: Box<dyn Any>) -> Option<Box<dyn Any>> {
    let surrogate = value.downcast::<S>().ok()?;
    Some(Box::new(surrogate.into_original()))
}

fn restore_of<S: Substitute>(
    value: Box<dyn Any>,
    slot: &mut dyn Any,
) -> std::result::Result<(), Slot> {
    let target = slot.downcast_mut::<S::Original>().ok_or(Slot::Target)?;
    let surrogate = value.downcast::<S>().map_err(|_| Slot::Surrogate)?;
    *target = surrogate.into_original();
    Ok(())
}

/// One registered original/surrogate pair.
#[derive(Clone)]
pub struct SubstituteEntry {
    original: TypeId,
    original_name: &'static str,
    surrogate: TypeId,
    surrogate_name: &'static str,
    to_surrogate: ToSurrogate,
    fresh: Fresh,
    to_original: ToOriginal,
    restore: Restore,
}

impl SubstituteEntry {
    /// Builds the entry of surrogate `S`.
    #[must_use]
    pub fn of<S: Substitute>() -> Self {
        Self {
            original: TypeId::of::<S::Original>(),
            original_name: std::any::type_name::<S::Original>(),
            surrogate: TypeId::of::<S>(),
            surrogate_name: std::any::type_name::<S>(),
            to_surrogate: to_surrogate_of::<S>,
            fresh: fresh_of::<S>,
            to_original: to_original_of::<S>,
            restore: restore_of::<S>,
        }
    }

    /// The substituted type.
    #[must_use]
    pub fn original(&self) -> TypeId {
        self.original
    }

    /// Name of the substituted type.
    #[must_use]
    pub fn original_name(&self) -> &'static str {
        self.original_name
    }

    /// The surrogate type.
    #[must_use]
    pub fn surrogate(&self) -> TypeId {
        self.surrogate
    }

    /// Name of the surrogate type.
    #[must_use]
    pub fn surrogate_name(&self) -> &'static str {
        self.surrogate_name
    }

    fn malformed(&self, reason: impl Into<String>) -> SatchelError {
        SatchelError::MalformedSubstitute {
            original: self.original_name.to_string(),
            surrogate: self.surrogate_name.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Debug for SubstituteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubstituteEntry")
            .field("original", &self.original_name)
            .field("surrogate", &self.surrogate_name)
            .finish_non_exhaustive()
    }
}

/// Original type → surrogate table.
#[derive(Debug, Clone, Default)]
pub struct SubstituteRegistry {
    by_original: HashMap<TypeId, SubstituteEntry>,
    by_surrogate: HashMap<TypeId, TypeId>,
}

/// Collects surrogate registrations for a [`SubstituteRegistry`].
#[derive(Debug, Default)]
pub struct SubstituteRegistryBuilder {
    entries: Vec<SubstituteEntry>,
}

impl SubstituteRegistryBuilder {
    /// Registers surrogate `S`.
    #[must_use]
    pub fn register<S: Substitute>(mut self) -> Self {
        self.entries.push(SubstituteEntry::of::<S>());
        self
    }

    /// Registers an already built entry.
    #[must_use]
    pub fn entry(mut self, entry: SubstituteEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Registers the surrogates shipped with the crate.
    #[must_use]
    pub fn builtins(mut self) -> Self {
        self.entries.extend(crate::types::builtin_substitutes());
        self
    }

    /// Indexes the registrations, rejecting ambiguous pairs.
    pub fn build(self) -> Result<SubstituteRegistry> {
        let mut registry = SubstituteRegistry::default();
        for entry in self.entries {
            registry.insert(entry)?;
        }
        Ok(registry)
    }
}

impl SubstituteRegistry {
    /// Starts an empty registration list.
    #[must_use]
    pub fn builder() -> SubstituteRegistryBuilder {
        SubstituteRegistryBuilder::default()
    }

    /// Registry holding only the built-in surrogates.
    pub fn with_builtins() -> Result<Self> {
        Self::builder().builtins().build()
    }

    fn insert(&mut self, entry: SubstituteEntry) -> Result<()> {
        if let Some(existing) = self.by_original.get(&entry.original) {
            return Err(entry.malformed(format!(
                "`{}` is already substituted by `{}`",
                entry.original_name, existing.surrogate_name
            )));
        }
        if self.by_surrogate.contains_key(&entry.surrogate) {
            return Err(entry.malformed("surrogate is registered for another type"));
        }
        self.by_surrogate.insert(entry.surrogate, entry.original);
        self.by_original.insert(entry.original, entry);
        Ok(())
    }

    /// Number of registered pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_original.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_original.is_empty()
    }

    /// True when `original` has a surrogate.
    #[must_use]
    pub fn contains(&self, original: TypeId) -> bool {
        self.by_original.contains_key(&original)
    }

    /// All registered pairs, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &SubstituteEntry> {
        self.by_original.values()
    }

    /// The entry registered for `original`.
    pub fn substitute_for(&self, original: TypeId) -> Result<&SubstituteEntry> {
        self.by_original
            .get(&original)
            .ok_or_else(|| SatchelError::MissingSubstitute {
                type_name: format!("{original:?}"),
            })
    }

    fn entry_for_surrogate(&self, value: &dyn Persist) -> Result<&SubstituteEntry> {
        self.by_surrogate
            .get(&value.as_any().type_id())
            .and_then(|original| self.by_original.get(original))
            .ok_or_else(|| SatchelError::MissingSubstitute {
                type_name: value.type_name().to_string(),
            })
    }

    /// Converts `value`, an instance of `original`, into its surrogate.
    pub fn to_surrogate(&self, original: TypeId, value: &dyn Any) -> Result<Box<dyn Persist>> {
        let entry = self.substitute_for(original)?;
        (entry.to_surrogate)(value).ok_or_else(|| entry.malformed("value is not of the original type"))
    }

    /// Surrogate of `original`'s default value, used as the target of a load.
    pub fn fresh_surrogate(&self, original: TypeId) -> Result<Box<dyn Persist>> {
        Ok((self.substitute_for(original)?.fresh)())
    }

    /// Converts a surrogate back into a boxed original value.
    pub fn to_original(&self, value: Box<dyn Persist>) -> Result<Box<dyn Any>> {
        let entry = self.entry_for_surrogate(value.as_ref())?;
        (entry.to_original)(value.into_any()).ok_or_else(|| entry.malformed("surrogate downcast failed"))
    }

    /// Converts a surrogate back and assigns it to `slot`.
    pub fn restore_into(&self, value: Box<dyn Persist>, slot: &mut dyn Any) -> Result<()> {
        let entry = self.entry_for_surrogate(value.as_ref())?;
        (entry.restore)(value.into_any(), slot).map_err(|side| match side {
            Slot::Surrogate => entry.malformed("surrogate downcast failed"),
            Slot::Target => entry.malformed("target slot is not of the original type"),
        })
    }

    /// Checks every pair by converting the original's default value there and back.
    pub fn validate(&self) -> Result<()> {
        for entry in self.by_original.values() {
            let surrogate = (entry.fresh)();
            if surrogate.as_any().type_id() != entry.surrogate {
                return Err(entry.malformed("surrogate constructor returned another type"));
            }
            let original = self.to_original(surrogate)?;
            if (*original).type_id() != entry.original {
                return Err(entry.malformed("conversion does not return the original type"));
            }
        }
        Ok(())
    }
}
