//! TryGetable trait for safe value extraction
//!
//! Extracts typed Rust values out of [`ScalarValue`] with proper error
//! reporting. Drivers that stringify fetched values hand back integers
//! as text, so integer extraction accepts
//! numeric text as well.

use crate::value::ScalarValue;

/// Error type for value extraction failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExtractionError {
    /// The value is null
    NullValue,
    /// The value type doesn't match the expected type
    TypeMismatch {
        expected: String,
        actual: String,
    },
    /// Value conversion failed (e.g., overflow, invalid format)
    ConversionError(String),
}

impl std::fmt::Display for ValueExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueExtractionError::NullValue => write!(f, "Value is null"),
            ValueExtractionError::TypeMismatch { expected, actual } => {
                write!(f, "Type mismatch: expected {expected}, got {actual}")
            }
            ValueExtractionError::ConversionError(msg) => {
                write!(f, "Conversion error: {msg}")
            }
        }
    }
}

impl std::error::Error for ValueExtractionError {}

/// Trait for safe value extraction with error handling
///
/// ```rust
/// use lifequery::{ScalarValue, TryGetable, ValueExtractionError};
///
/// let result: Result<i32, ValueExtractionError> = TryGetable::try_get(&ScalarValue::Integer(42));
/// assert_eq!(result, Ok(42));
///
/// let result: Result<i32, ValueExtractionError> = TryGetable::try_get(&ScalarValue::Null);
/// assert!(matches!(result, Err(ValueExtractionError::NullValue)));
/// ```
pub trait TryGetable: Sized {
    /// Try to extract a value, returning an error if extraction fails.
    fn try_get(value: &ScalarValue) -> Result<Self, ValueExtractionError>;

    /// Try to extract a value, allowing null values to return `None`.
    fn try_get_opt(value: &ScalarValue) -> Result<Option<Self>, ValueExtractionError> {
        match Self::try_get(value) {
            Ok(v) => Ok(Some(v)),
            Err(ValueExtractionError::NullValue) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn mismatch(expected: &str, value: &ScalarValue) -> ValueExtractionError {
    ValueExtractionError::TypeMismatch {
        expected: expected.to_string(),
        actual: value.type_name().to_string(),
    }
}

fn extract_i64(value: &ScalarValue) -> Result<i64, ValueExtractionError> {
    match value {
        ScalarValue::Integer(v) => Ok(*v),
        ScalarValue::Null => Err(ValueExtractionError::NullValue),
        ScalarValue::Text(s) => s.trim().parse::<i64>().map_err(|_| mismatch("integer", value)),
        ScalarValue::Real(_) => Err(mismatch("integer", value)),
    }
}

impl TryGetable for i64 {
    fn try_get(value: &ScalarValue) -> Result<Self, ValueExtractionError> {
        extract_i64(value)
    }
}

macro_rules! impl_try_getable_narrow {
    ($($type:ty),*) => {
        $(
            impl TryGetable for $type {
                fn try_get(value: &ScalarValue) -> Result<Self, ValueExtractionError> {
                    let wide = extract_i64(value)?;
                    <$type>::try_from(wide).map_err(|_| {
                        ValueExtractionError::ConversionError(format!(
                            "{wide} does not fit in {}",
                            stringify!($type)
                        ))
                    })
                }
            }
        )*
    };
}

impl_try_getable_narrow!(i8, i16, i32, u8, u16, u32, u64, usize);

impl TryGetable for f64 {
    fn try_get(value: &ScalarValue) -> Result<Self, ValueExtractionError> {
        match value {
            ScalarValue::Real(v) => Ok(*v),
            // rounds above 2^53
            ScalarValue::Integer(v) => Ok(*v as f64),
            ScalarValue::Null => Err(ValueExtractionError::NullValue),
            ScalarValue::Text(s) => s.trim().parse::<f64>().map_err(|_| mismatch("real", value)),
        }
    }
}

impl TryGetable for bool {
    fn try_get(value: &ScalarValue) -> Result<Self, ValueExtractionError> {
        match extract_i64(value)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ValueExtractionError::ConversionError(format!(
                "{other} is not a boolean"
            ))),
        }
    }
}

impl TryGetable for String {
    fn try_get(value: &ScalarValue) -> Result<Self, ValueExtractionError> {
        match value {
            ScalarValue::Text(s) => Ok(s.clone()),
            ScalarValue::Null => Err(ValueExtractionError::NullValue),
            ScalarValue::Integer(v) => Ok(v.to_string()),
            ScalarValue::Real(v) => Ok(v.to_string()),
        }
    }
}

impl TryGetable for ScalarValue {
    fn try_get(value: &ScalarValue) -> Result<Self, ValueExtractionError> {
        Ok(value.clone())
    }
}

impl<T: TryGetable> TryGetable for Option<T> {
    fn try_get(value: &ScalarValue) -> Result<Self, ValueExtractionError> {
        T::try_get_opt(value)
    }
}
