//! Built-in external value types and their surrogates.
//!
//! [`Vec3`] and [`Quat`] are the math types entity code keeps in its fields. They are
//! leaves: the mapper layer routes them through [`Vec3Surrogate`] and
//! [`EulerSurrogate`], which store plain `X`, `Y`, `Z` components. Rotations are stored
//! as Euler angles in degrees, which is what people edit by hand in a save file.
//!
//! Narrow scalars (`i32`, `u8`, `f32`, `char`, ...) go through [`Boxed`], a surrogate
//! holding the widened value under a single `value` key.

use crate::error::Result;
use crate::substitute::{Substitute, SubstituteEntry};
use crate::transform::{RecordReader, RecordWriter};
use crate::value::Native;
use crate::Persist;
use std::any::Any;

/// Key of the single field stored by [`Boxed`] and by boxed list elements.
pub const BOXED_KEY: &str = "value";

/// A three component vector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

impl Vec3 {
    /// Creates a vector.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
    /// Scalar component.
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    /// The identity rotation.
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    /// Builds a rotation from roll (x), pitch (y) and yaw (z), in degrees.
    #[must_use]
    pub fn from_euler_degrees(angles: Vec3) -> Self {
        let (sr, cr) = (angles.x.to_radians() * 0.5).sin_cos();
        let (sp, cp) = (angles.y.to_radians() * 0.5).sin_cos();
        let (sy, cy) = (angles.z.to_radians() * 0.5).sin_cos();
        Self {
            w: cr * cp * cy + sr * sp * sy,
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
        }
    }

    /// Roll, pitch and yaw in degrees.
    #[must_use]
    pub fn to_euler_degrees(self) -> Vec3 {
        let Self { x, y, z, w } = self;
        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        let sin_pitch = 2.0 * (w * y - z * x);
        let pitch = if sin_pitch.abs() >= 1.0 {
            std::f32::consts::FRAC_PI_2.copysign(sin_pitch)
        } else {
            sin_pitch.asin()
        };
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        Vec3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
    }
}

crate::leaf!(Vec3, Quat);

/// Stores a [`Vec3`] as `X`, `Y`, `Z`.
#[derive(Debug, Default, Persist)]
pub struct Vec3Surrogate {
    #[persist(raw, rename = "X")]
    x: f32,
    #[persist(raw, rename = "Y")]
    y: f32,
    #[persist(raw, rename = "Z")]
    z: f32,
}

impl Substitute for Vec3Surrogate {
    type Original = Vec3;

    fn from_original(v: &Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }

    fn into_original(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

/// Stores a [`Quat`] as Euler angles in degrees.
#[derive(Debug, Default, Persist)]
pub struct EulerSurrogate {
    #[persist(raw, rename = "X")]
    x: f32,
    #[persist(raw, rename = "Y")]
    y: f32,
    #[persist(raw, rename = "Z")]
    z: f32,
}

impl Substitute for EulerSurrogate {
    type Original = Quat;

    fn from_original(q: &Quat) -> Self {
        let Vec3 { x, y, z } = q.to_euler_degrees();
        Self { x, y, z }
    }

    fn into_original(self) -> Quat {
        Quat::from_euler_degrees(Vec3::new(self.x, self.y, self.z))
    }
}

/// Single-value surrogate for a narrow scalar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Boxed<T>(pub T);

impl<T: Native + Default + Clone> Persist for Boxed<T> {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn save_fields(&self, out: &mut RecordWriter<'_>) -> Result<()> {
        out.raw(BOXED_KEY, &self.0)
    }

    fn load_fields(&mut self, input: &RecordReader<'_>) -> Result<()> {
        input.raw(BOXED_KEY, &mut self.0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl<T: Native + Default + Clone> Substitute for Boxed<T> {
    type Original = T;

    fn from_original(original: &T) -> Self {
        Self(original.clone())
    }

    fn into_original(self) -> T {
        self.0
    }
}

/// The surrogates registered by [`SubstituteRegistry::with_builtins`](crate::substitute::SubstituteRegistry::with_builtins).
pub(crate) fn builtin_substitutes() -> Vec<SubstituteEntry> {
    vec![
        SubstituteEntry::of::<Boxed<i8>>(),
        SubstituteEntry::of::<Boxed<i16>>(),
        SubstituteEntry::of::<Boxed<i32>>(),
        SubstituteEntry::of::<Boxed<u8>>(),
        SubstituteEntry::of::<Boxed<u16>>(),
        SubstituteEntry::of::<Boxed<u32>>(),
        SubstituteEntry::of::<Boxed<f32>>(),
        SubstituteEntry::of::<Boxed<char>>(),
        SubstituteEntry::of::<Vec3Surrogate>(),
        SubstituteEntry::of::<EulerSurrogate>(),
    ]
}
