//! Schema description traits.
//!
//! Types describe themselves to the transformer instead of being discovered at runtime:
//!
//! * [`Persist`] is implemented by every entity, nested object and surrogate. It lists
//!   the saved fields in [`Persist::save_fields`] / [`Persist::load_fields`] and exposes
//!   the identity, the routing attribute and the save/load hooks.
//! * [`Field`] is implemented by every type that can sit in a saved field. It tells the
//!   transformer the field's static type ([`TypeInfo`]) and whether the value is a leaf
//!   (resolved through the mapper layer), a nested [`Persist`] or a list.
//!
//! Both traits are normally derived with `#[derive(Persist)]`; the derive emits the
//! `Field` impl as well when the container carries `#[persist(nested)]`. Leaf types are
//! declared with [`leaf!`](crate::leaf).

use crate::error::Result;
use crate::source::Saved;
use crate::transform::{Loader, RecordReader, RecordWriter, Saver};
use std::any::{Any, TypeId};

/// An object whose fields can be written to and read from an
/// [`EntityRecord`](crate::document::EntityRecord).
pub trait Persist: Any {
    /// Human readable type name, used in diagnostics.
    fn type_name(&self) -> &'static str;

    /// Writes every saved field in declaration order.
    fn save_fields(&self, out: &mut RecordWriter<'_>) -> Result<()>;

    /// Restores every saved field from the record behind `input`.
    fn load_fields(&mut self, input: &RecordReader<'_>) -> Result<()>;

    /// The identity of a top-level entity. `None` when the type declares no identity.
    fn identity(&self) -> Option<&str> {
        None
    }

    /// Mutable access to the identity field.
    fn identity_mut(&mut self) -> Option<&mut String> {
        None
    }

    /// Routing attribute of a top-level entity. Nested objects and surrogates return `None`.
    fn saved(&self) -> Option<Saved> {
        None
    }

    /// Appends ad-hoc values after the declared fields are written.
    fn on_save(&self, saver: &mut Saver<'_, '_>) -> Result<()> {
        let _ = saver;
        Ok(())
    }

    /// Reads ad-hoc values after the declared fields are restored.
    fn on_load(&mut self, loader: &Loader<'_>) -> Result<()> {
        let _ = loader;
        Ok(())
    }

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Owned upcast.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Save hook of a type deriving `Persist` with `#[persist(save_hook)]`.
pub trait SaveHook {
    /// Appends ad-hoc keyed values to the record being built.
    fn on_save(&self, saver: &mut Saver<'_, '_>) -> Result<()>;
}

/// Load hook of a type deriving `Persist` with `#[persist(load_hook)]`.
pub trait LoadHook {
    /// Pulls ad-hoc keyed values out of the record being restored.
    fn on_load(&mut self, loader: &Loader<'_>) -> Result<()>;
}

/// Static description of a field's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Runtime identifier of the type.
    pub id: TypeId,
    /// Name for diagnostics.
    pub name: &'static str,
    /// Element description when the type is a list.
    pub element: Option<Box<TypeInfo>>,
}

impl TypeInfo {
    /// Describes a non-list type.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            element: None,
        }
    }

    /// Describes a list type `L` holding `element`s.
    #[must_use]
    pub fn list_of<L: Any>(element: TypeInfo) -> Self {
        Self {
            element: Some(Box::new(element)),
            ..Self::of::<L>()
        }
    }

    /// True for list types.
    #[must_use]
    pub fn is_list(&self) -> bool {
        self.element.is_some()
    }
}

/// How a field's value is walked.
pub enum Shape<'a> {
    /// Resolved through the mapper layer.
    Leaf(&'a dyn Any),
    /// Recursed into as a nested record.
    Nested(&'a dyn Persist),
    /// Encoded element by element.
    List(&'a dyn ListField),
}

/// Mutable counterpart of [`Shape`].
pub enum ShapeMut<'a> {
    /// Resolved through the mapper layer.
    Leaf(&'a mut dyn Any),
    /// Recursed into as a nested record.
    Nested(&'a mut dyn Persist),
    /// Rebuilt element by element.
    List(&'a mut dyn ListField),
}

/// A value that can sit in a saved field.
pub trait Field: Any {
    /// Static description of `Self`.
    fn describe() -> TypeInfo
    where
        Self: Sized;

    /// Static description of the value's type.
    fn type_info(&self) -> TypeInfo;

    /// Borrowed view used on save.
    fn shape(&self) -> Shape<'_>;

    /// Mutable view used on load.
    fn shape_mut(&mut self) -> ShapeMut<'_>;

    /// Upcast for the mapper layer.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for the mapper layer.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Type-erased homogeneous list.
pub trait ListField {
    /// Description of the element type.
    fn element_info(&self) -> TypeInfo;

    /// Number of elements.
    fn len(&self) -> usize;

    /// True when the list holds no element.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`.
    fn element(&self, index: usize) -> Option<&dyn Field>;

    /// Removes every element.
    fn clear(&mut self);

    /// Appends a default element and returns it for restoring.
    fn push_default(&mut self) -> &mut dyn Field;
}

impl<T: Field + Default> ListField for Vec<T> {
    fn element_info(&self) -> TypeInfo {
        T::describe()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn element(&self, index: usize) -> Option<&dyn Field> {
        self.get(index).map(|item| item as &dyn Field)
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn push_default(&mut self) -> &mut dyn Field {
        self.push(T::default());
        let last = Vec::len(self) - 1;
        &mut self[last]
    }
}

impl<T: Field + Default> Field for Vec<T> {
    fn describe() -> TypeInfo {
        TypeInfo::list_of::<Self>(T::describe())
    }

    fn type_info(&self) -> TypeInfo {
        Self::describe()
    }

    fn shape(&self) -> Shape<'_> {
        Shape::List(self)
    }

    fn shape_mut(&mut self) -> ShapeMut<'_> {
        ShapeMut::List(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Implements [`Field`] for types resolved through the mapper layer.
///
/// ```rust,ignore
/// #[derive(Default, Clone)]
/// struct Color { r: u8, g: u8, b: u8 }
///
/// satchel::leaf!(Color);
/// ```
///
/// A leaf type without an `as_is` mapper or a registered substitute is rejected on
/// save with `UnmappableType`.
#[macro_export]
macro_rules! leaf {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::schema::Field for $ty {
            fn describe() -> $crate::schema::TypeInfo {
                $crate::schema::TypeInfo::of::<$ty>()
            }

            fn type_info(&self) -> $crate::schema::TypeInfo {
                <Self as $crate::schema::Field>::describe()
            }

            fn shape(&self) -> $crate::schema::Shape<'_> {
                $crate::schema::Shape::Leaf(self)
            }

            fn shape_mut(&mut self) -> $crate::schema::ShapeMut<'_> {
                $crate::schema::ShapeMut::Leaf(self)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    )*};
}

leaf!(bool, i8, i16, i32, i64, u8, u16, u32, f32, f64, char, String);
