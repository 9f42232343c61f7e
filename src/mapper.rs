//! Type-mapper layer.
//!
//! Given the static type of a field, [`MapperRegistry::mapper_for`] decides how its value
//! reaches the document:
//!
//! * [`Converter::AsIs`] for types the codec already stores faithfully (`String`, `bool`,
//!   `f64`, `i64`), written as a plain [`FieldRecord`](crate::document::FieldRecord);
//! * [`Converter::Substituted`] for types that go through a surrogate
//!   (see [`crate::substitute`]);
//! * [`Converter::List`] for a `Vec` whose element type has a converter.
//!
//! `None` means "no converter": the transformer then treats the value as a nested object
//! or a list of nested objects.

use crate::error::{Result, SatchelError};
use crate::schema::TypeInfo;
use crate::substitute::{Substitute, SubstituteEntry};
use crate::types::{Boxed, EulerSurrogate, Vec3Surrogate};
use crate::value::{Native, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type EncodeFn = fn(&dyn Any) -> Option<Value>;
type DecodeFn = fn(&Value, &mut dyn Any) -> Option<Result<()>>;

fn encode_as<T: Native>(value: &dyn Any) -> Option<Value> {
    value.downcast_ref::<T>().map(Native::to_value)
}

fn decode_as<T: Native>(value: &Value, slot: &mut dyn Any) -> Option<Result<()>> {
    let slot = slot.downcast_mut::<T>()?;
    Some(T::from_value(value).map(|v| *slot = v))
}

/// Pass-through converter for a [`Native`] type.
#[derive(Clone, Copy)]
pub struct AsIs {
    type_name: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl AsIs {
    /// Converter for `T`.
    #[must_use]
    pub fn of<T: Native>() -> Self {
        Self {
            type_name: T::TYPE_NAME,
            encode: encode_as::<T>,
            decode: decode_as::<T>,
        }
    }

    /// Name of the converted type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn mismatch(&self) -> SatchelError {
        SatchelError::TypeMismatch {
            expected: self.type_name.to_string(),
            found: "a value of another type".to_string(),
        }
    }

    /// Widens `value` into its stored form.
    pub fn encode(&self, value: &dyn Any) -> Result<Value> {
        (self.encode)(value).ok_or_else(|| self.mismatch())
    }

    /// Narrows `value` into `slot`.
    pub fn decode(&self, value: &Value, slot: &mut dyn Any) -> Result<()> {
        (self.decode)(value, slot).unwrap_or_else(|| Err(self.mismatch()))
    }
}

impl fmt::Debug for AsIs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AsIs").field(&self.type_name).finish()
    }
}

/// Converter going through the surrogate registered for `original`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubstitutedType {
    original: TypeId,
    original_name: &'static str,
}

impl SubstitutedType {
    /// Converter for the original type of surrogate `S`.
    #[must_use]
    pub fn of<S: Substitute>() -> Self {
        Self::from_entry(&SubstituteEntry::of::<S>())
    }

    /// Converter for the original type of `entry`.
    #[must_use]
    pub fn from_entry(entry: &SubstituteEntry) -> Self {
        Self {
            original: entry.original(),
            original_name: entry.original_name(),
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
}

/// How a field type is stored.
#[derive(Debug, Clone)]
pub enum Converter {
    /// Stored as a plain value.
    AsIs(AsIs),
    /// Stored as the nested record of a surrogate.
    Substituted(SubstitutedType),
    /// A list whose elements use the inner converter.
    List(Box<Converter>),
}

impl Converter {
    /// The substituted type this converter relies on, if any.
    pub fn substituted(&self) -> Option<SubstitutedType> {
        match self {
            Self::AsIs(_) => None,
            Self::Substituted(s) => Some(*s),
            Self::List(inner) => inner.substituted(),
        }
    }
}

/// A user supplied resolver consulted after the static tables.
pub trait UserMapper: Send + Sync {
    /// Returns a converter for `info`, or `None` to let the next resolver try.
    fn find(&self, info: &TypeInfo) -> Option<Converter>;
}

impl<F> UserMapper for F
where
    F: Fn(&TypeInfo) -> Option<Converter> + Send + Sync,
{
    fn find(&self, info: &TypeInfo) -> Option<Converter> {
        self(info)
    }
}

/// Resolves converters for field types.
#[derive(Clone)]
pub struct MapperRegistry {
    builtin: HashMap<TypeId, Converter>,
    user: HashMap<TypeId, Converter>,
    dynamic: Vec<Arc<dyn UserMapper>>,
}

impl fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("builtin", &self.builtin.len())
            .field("user", &self.user.len())
            .field("dynamic", &self.dynamic.len())
            .finish()
    }
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn substituted<S: Substitute>() -> (TypeId, Converter) {
    let ty = SubstitutedType::of::<S>();
    (ty.original(), Converter::Substituted(ty))
}

fn as_is<T: Native>() -> (TypeId, Converter) {
    (TypeId::of::<T>(), Converter::AsIs(AsIs::of::<T>()))
}

impl MapperRegistry {
    /// Registry holding only the built-in converters.
    #[must_use]
    pub fn builtin() -> Self {
        let builtin = [
            as_is::<String>(),
            as_is::<bool>(),
            as_is::<f64>(),
            as_is::<i64>(),
            substituted::<Boxed<i8>>(),
            substituted::<Boxed<i16>>(),
            substituted::<Boxed<i32>>(),
            substituted::<Boxed<u8>>(),
            substituted::<Boxed<u16>>(),
            substituted::<Boxed<u32>>(),
            substituted::<Boxed<f32>>(),
            substituted::<Boxed<char>>(),
            substituted::<Vec3Surrogate>(),
            substituted::<EulerSurrogate>(),
        ];
        Self {
            builtin: builtin.into_iter().collect(),
            user: HashMap::new(),
            dynamic: Vec::new(),
        }
    }

    /// Adds a pass-through converter for `T`.
    pub fn add_as_is<T: Native>(&mut self) {
        let (id, converter) = as_is::<T>();
        self.user.insert(id, converter);
    }

    /// Routes the original type of `entry` through its surrogate.
    pub fn add_substitute(&mut self, entry: &SubstituteEntry) {
        let ty = SubstitutedType::from_entry(entry);
        self.user.insert(ty.original(), Converter::Substituted(ty));
    }

    /// Adds a dynamic resolver. Resolvers are consulted in insertion order.
    pub fn add_user_mapper(&mut self, mapper: Arc<dyn UserMapper>) {
        self.dynamic.push(mapper);
    }

    /// Converter for a field type: built-ins, then user table, then dynamic resolvers,
    /// then the list lift. First match wins.
    #[must_use]
    pub fn mapper_for(&self, info: &TypeInfo) -> Option<Converter> {
        if let Some(found) = self.builtin.get(&info.id).or_else(|| self.user.get(&info.id)) {
            return Some(found.clone());
        }
        if let Some(found) = self.dynamic.iter().find_map(|m| m.find(info)) {
            return Some(found);
        }
        let element = info.element.as_deref()?;
        self.mapper_for(element).map(|inner| Converter::List(Box::new(inner)))
    }

    /// Every substituted type named in the static tables.
    pub fn substituted_types(&self) -> impl Iterator<Item = SubstitutedType> + '_ {
        self.builtin
            .values()
            .chain(self.user.values())
            .filter_map(Converter::substituted)
    }
}
