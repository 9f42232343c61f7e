//! Identity diagnostics and generation.
//!
//! [`check_duplicates`] reports every group of entities sharing an identity. It never
//! repairs anything and never fails, so one pass reports every collision.
//! [`generate_missing_identities`] is the one-shot pass that fills empty identities
//! before a first save.

use crate::schema::Persist;
use crate::source::Saved;
use std::collections::BTreeMap;
use std::fmt;

/// One member of a [`Collision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Position of the entity in the enumeration that was checked.
    pub index: usize,
    /// Type name of the entity.
    pub type_name: &'static str,
    /// Where the entity is saved, if it is a top-level entity.
    pub saved: Option<Saved>,
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} `{}`", self.index, self.type_name)?;
        match &self.saved {
            Some(saved) if saved.explicit => write!(f, " in explicit `{}`", saved.file),
            Some(saved) => write!(f, " in `{}`", saved.file),
            None => Ok(()),
        }
    }
}

/// Entities sharing one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    /// The shared identity.
    pub identity: String,
    /// The colliding entities, in enumeration order.
    pub entities: Vec<Member>,
}

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "identity `{}` is shared by {} entities:",
            self.identity,
            self.entities.len()
        )?;
        for (i, member) in self.entities.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{member}")?;
        }
        Ok(())
    }
}

/// Groups `entities` by identity and returns every group with more than one member.
///
/// Only identities accepted by `filter` are considered. Entities without an identity are
/// ignored. Each collision is also logged with `log::error!`.
pub fn check_duplicates<'a, I>(entities: I, filter: Option<&dyn Fn(&str) -> bool>) -> Vec<Collision>
where
    I: IntoIterator<Item = &'a dyn Persist>,
{
    let mut groups: BTreeMap<&str, Vec<Member>> = BTreeMap::new();
    for (index, entity) in entities.into_iter().enumerate() {
        let Some(identity) = entity.identity() else {
            continue;
        };
        if filter.is_some_and(|accept| !accept(identity)) {
            continue;
        }
        groups.entry(identity).or_default().push(Member {
            index,
            type_name: entity.type_name(),
            saved: entity.saved(),
        });
    }

    let collisions: Vec<Collision> = groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(identity, entities)| Collision {
            identity: identity.to_string(),
            entities,
        })
        .collect();
    for collision in &collisions {
        log::error!("{collision}");
    }
    collisions
}

/// Gives every entity with an empty identity a fresh UUID v4. Returns how many changed.
pub fn generate_missing_identities<'a, I>(entities: I) -> usize
where
    I: IntoIterator<Item = &'a mut dyn Persist>,
{
    let mut generated = 0;
    for entity in entities {
        if let Some(identity) = entity.identity_mut() {
            if identity.is_empty() {
                *identity = uuid::Uuid::new_v4().to_string();
                generated += 1;
            }
        }
    }
    generated
}
