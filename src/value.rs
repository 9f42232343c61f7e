//! Codec-native scalar values and the conversions between them and Rust scalars.
//!
//! A [`Value`] is what ends up inside a [`FieldRecord`](crate::document::FieldRecord).
//! Only four shapes exist on disk; every other scalar is reached through the
//! [`Native`] trait, which widens on save and narrows on load.
//!
//! ## Narrowing
//!
//! Loading is strict. A stored integer that does not fit the live field's type is a
//! [`SatchelError::Narrowing`], not a truncation. The only cross-shape conversions
//! accepted are:
//!
//! * an integral `Float` into an integer type,
//! * an `Int` into a float type,
//! * a `"NaN"`, `"inf"` or `"-inf"` `Str` into a float type, which is how JSON stores
//!   non-finite floats,
//! * a one-character `Str` into `char`.

use crate::error::{Result, SatchelError};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A scalar as stored in a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Int(i64),
    /// A double precision float.
    Float(f64),
    /// A UTF-8 string.
    Str(String),
}

impl Value {
    /// Short name of the stored shape, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
        }
    }

    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn mismatch(&self, expected: &'static str) -> SatchelError {
        SatchelError::ValueMismatch {
            expected,
            found: self.kind(),
        }
    }

    fn narrowing(&self, target: &'static str) -> SatchelError {
        SatchelError::Narrowing {
            value: self.to_string(),
            target,
        }
    }

    /// Integer view of the value: `Int` as is, integral `Float` converted.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn integral(&self, target: &'static str) -> Result<i64> {
        match self {
            Self::Int(i) => Ok(*i),
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                if *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    Ok(*f as i64)
                } else {
                    Err(self.narrowing(target))
                }
            }
            _ => Err(self.mismatch(target)),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn floating(&self, target: &'static str) -> Result<f64> {
        match self {
            Self::Float(f) => Ok(*f),
            Self::Int(i) => Ok(*i as f64),
            Self::Str(s) => non_finite_from_str(s).ok_or_else(|| self.mismatch(target)),
            Self::Bool(_) => Err(self.mismatch(target)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

// --- SERDE ---
//
// Human-readable formats get the bare scalar. Binary formats cannot
// `deserialize_any`, so they get a tagged variant instead.
//
// JSON has no literal for NaN or infinity, so those floats are written as the strings
// below and read back by the float conversions.

const NAN: &str = "NaN";
const INFINITY: &str = "inf";
const NEG_INFINITY: &str = "-inf";

fn non_finite_str(f: f64) -> Option<&'static str> {
    if f.is_nan() {
        Some(NAN)
    } else if f.is_infinite() {
        Some(if f > 0.0 { INFINITY } else { NEG_INFINITY })
    } else {
        None
    }
}

fn non_finite_from_str(s: &str) -> Option<f64> {
    match s {
        NAN => Some(f64::NAN),
        INFINITY => Some(f64::INFINITY),
        NEG_INFINITY => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

#[derive(Serialize)]
enum ReprRef<'a> {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'a str),
}

#[derive(Deserialize)]
enum Repr {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            return match self {
                Self::Bool(b) => serializer.serialize_bool(*b),
                Self::Int(i) => serializer.serialize_i64(*i),
                Self::Float(f) => match non_finite_str(*f) {
                    Some(token) => serializer.serialize_str(token),
                    None => serializer.serialize_f64(*f),
                },
                Self::Str(s) => serializer.serialize_str(s),
            };
        }
        let repr = match self {
            Self::Bool(b) => ReprRef::Bool(*b),
            Self::Int(i) => ReprRef::Int(*i),
            Self::Float(f) => ReprRef::Float(*f),
            Self::Str(s) => ReprRef::Str(s),
        };
        repr.serialize(serializer)
    }
}

struct ScalarVisitor;

impl Visitor<'_> for ScalarVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean, number or string")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &"an integer within i64"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::Str(v))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            return deserializer.deserialize_any(ScalarVisitor);
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Bool(b) => Self::Bool(b),
            Repr::Int(i) => Self::Int(i),
            Repr::Float(f) => Self::Float(f),
            Repr::Str(s) => Self::Str(s),
        })
    }
}

// --- NATIVE SCALARS ---

/// A Rust scalar that converts to and from a [`Value`].
///
/// `from_value` applies the narrowing rules described in the module docs.
pub trait Native: Sized + 'static {
    /// Name used in narrowing and mismatch errors.
    const TYPE_NAME: &'static str;

    /// Widens `self` into its stored shape.
    fn to_value(&self) -> Value;

    /// Narrows a stored value into `Self`.
    fn from_value(value: &Value) -> Result<Self>;
}

impl Native for bool {
    const TYPE_NAME: &'static str = "bool";

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch(Self::TYPE_NAME)),
        }
    }
}

impl Native for i64 {
    const TYPE_NAME: &'static str = "i64";

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.integral(Self::TYPE_NAME)
    }
}

macro_rules! native_int {
    ($($ty:ty),*) => {$(
        impl Native for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);

            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }

            fn from_value(value: &Value) -> Result<Self> {
                let wide = value.integral(Self::TYPE_NAME)?;
                <$ty>::try_from(wide).map_err(|_| value.narrowing(Self::TYPE_NAME))
            }
        }
    )*};
}

native_int!(i8, i16, i32, u8, u16, u32);

impl Native for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.floating(Self::TYPE_NAME)
    }
}

impl Native for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Result<Self> {
        let wide = value.floating(Self::TYPE_NAME)?;
        if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
            return Err(value.narrowing(Self::TYPE_NAME));
        }
        Ok(wide as f32)
    }
}

impl Native for char {
    const TYPE_NAME: &'static str = "char";

    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }

    fn from_value(value: &Value) -> Result<Self> {
        let Value::Str(s) = value else {
            return Err(value.mismatch(Self::TYPE_NAME));
        };
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(value.narrowing(Self::TYPE_NAME)),
        }
    }
}

impl Native for String {
    const TYPE_NAME: &'static str = "String";

    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(other.mismatch(Self::TYPE_NAME)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_narrow_or_fail() {
        assert_eq!(i32::from_value(&Value::Int(42)).unwrap(), 42);
        assert_eq!(u8::from_value(&Value::Float(7.0)).unwrap(), 7);

        let err = u8::from_value(&Value::Int(300)).unwrap_err();
        assert!(matches!(err, SatchelError::Narrowing { target: "u8", .. }));

        let err = i16::from_value(&Value::Float(1.5)).unwrap_err();
        assert!(matches!(err, SatchelError::ValueMismatch { expected: "i16", found: "float" }));
    }

    #[test]
    fn floats_accept_ints_and_keep_non_finite() {
        assert_eq!(f64::from_value(&Value::Int(3)).unwrap(), 3.0);
        assert!(f32::from_value(&Value::Float(f64::INFINITY)).unwrap().is_infinite());
        assert!(f32::from_value(&Value::Float(1e300)).is_err());
    }

    #[test]
    fn chars_need_exactly_one_character() {
        assert_eq!(char::from_value(&Value::Str("x".into())).unwrap(), 'x');
        assert!(char::from_value(&Value::Str("xy".into())).is_err());
        assert!(char::from_value(&Value::Str(String::new())).is_err());
    }

    #[test]
    fn json_uses_bare_scalars() {
        let values = vec![
            Value::Bool(true),
            Value::Int(-4),
            Value::Float(0.5),
            Value::Str("hi".into()),
        ];
        let text = serde_json::to_string(&values).unwrap();
        assert_eq!(text, r#"[true,-4,0.5,"hi"]"#);
        let back: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn json_spells_out_non_finite_floats() {
        let values = vec![
            Value::Float(f64::INFINITY),
            Value::Float(f64::NEG_INFINITY),
            Value::Float(f64::NAN),
        ];
        let text = serde_json::to_string(&values).unwrap();
        assert_eq!(text, r#"["inf","-inf","NaN"]"#);

        let back: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(f32::from_value(&back[0]).unwrap(), f32::INFINITY);
        assert_eq!(f64::from_value(&back[1]).unwrap(), f64::NEG_INFINITY);
        assert!(f64::from_value(&back[2]).unwrap().is_nan());
        assert!(f64::from_value(&Value::Str("infinity".into())).is_err());
    }

    #[test]
    fn binary_formats_keep_the_variant() {
        let config = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(Value::Float(2.0), config).unwrap();
        let (back, _): (Value, usize) = bincode::serde::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(back, Value::Float(2.0));
    }
}
