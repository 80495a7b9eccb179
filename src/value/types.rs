//! Scalar values and the `ValueType` conversion trait
//!
//! Every value that crosses the engine (call arguments, bound parameters,
//! row cells) is a [`ScalarValue`]. Rows never carry nested structures, so
//! four variants are enough to describe anything a driver hands back.
//!
//! ## Usage
//!
//! ```rust
//! use lifequery::{ScalarValue, ValueType};
//!
//! let value: ScalarValue = ValueType::into_value(42i32);
//! assert_eq!(value, ScalarValue::Integer(42));
//!
//! let value = ValueType::into_value(None::<String>);
//! assert!(value.is_null());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single database scalar: text, number or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// SQL `NULL`
    Null,
    /// Any integral value (booleans are stored as `0` / `1`)
    Integer(i64),
    /// Floating point value
    Real(f64),
    /// Text, including the canonical text form of timestamps, numerics and UUIDs
    Text(String),
}

impl ScalarValue {
    /// Returns `true` for [`ScalarValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Short name of the runtime type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Integer(_) => "integer",
            ScalarValue::Real(_) => "real",
            ScalarValue::Text(_) => "text",
        }
    }

    /// Borrow the text payload, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Return the integer payload, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Integer(v) => write!(f, "{v}"),
            ScalarValue::Real(v) => write!(f, "{v}"),
            ScalarValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Trait for mapping Rust types onto [`ScalarValue`].
///
/// Implemented for the integer and float primitives, `bool`, strings and
/// `Option<T>` of any of them. `into_value` never fails; the reverse
/// direction lives in [`TryGetable`](crate::value::TryGetable) because it can.
pub trait ValueType: Sized {
    /// Convert this value into a [`ScalarValue`].
    fn into_value(self) -> ScalarValue;

    /// Return the value used for `None` when wrapped in `Option`.
    fn null_value() -> ScalarValue {
        ScalarValue::Null
    }
}

macro_rules! impl_integer_value_type {
    ($($type:ty),*) => {
        $(
            impl ValueType for $type {
                fn into_value(self) -> ScalarValue {
                    ScalarValue::Integer(i64::from(self))
                }
            }
        )*
    };
}

impl_integer_value_type!(i8, i16, i32, i64, u8, u16, u32);

impl ValueType for f32 {
    fn into_value(self) -> ScalarValue {
        ScalarValue::Real(f64::from(self))
    }
}

impl ValueType for f64 {
    fn into_value(self) -> ScalarValue {
        ScalarValue::Real(self)
    }
}

impl ValueType for bool {
    fn into_value(self) -> ScalarValue {
        ScalarValue::Integer(i64::from(self))
    }
}

impl ValueType for String {
    fn into_value(self) -> ScalarValue {
        ScalarValue::Text(self)
    }
}

impl ValueType for &str {
    fn into_value(self) -> ScalarValue {
        ScalarValue::Text(self.to_string())
    }
}

impl ValueType for ScalarValue {
    fn into_value(self) -> ScalarValue {
        self
    }
}

impl<T: ValueType> ValueType for Option<T> {
    fn into_value(self) -> ScalarValue {
        match self {
            Some(v) => v.into_value(),
            None => T::null_value(),
        }
    }
}

macro_rules! impl_from_for_scalar {
    ($($type:ty),*) => {
        $(
            impl From<$type> for ScalarValue {
                fn from(value: $type) -> Self {
                    value.into_value()
                }
            }
        )*
    };
}

impl_from_for_scalar!(i8, i16, i32, i64, u8, u16, u32, f32, f64, bool, String, &str);

impl<T: ValueType> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        value.into_value()
    }
}
