//! PostgreSQL glue for [`ScalarValue`]
//!
//! Binding goes through `postgres-types::ToSql`, picking the wire encoding
//! from the parameter type PostgreSQL inferred for the placeholder. Decoding
//! maps each result column onto the scalar model by column type.

use crate::executor::LifeError;
use crate::value::{RawRow, ScalarValue};
use bytes::BytesMut;
use may_postgres::Row;
use postgres_types::{to_sql_checked, IsNull, ToSql, Type};
use std::error::Error;

type BoxedError = Box<dyn Error + Sync + Send>;

impl ToSql for ScalarValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
        match self {
            ScalarValue::Null => Ok(IsNull::Yes),
            ScalarValue::Integer(v) => integer_to_sql(*v, ty, out),
            ScalarValue::Real(v) => real_to_sql(*v, ty, out),
            ScalarValue::Text(s) => text_to_sql(s, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn unsupported(value: &str, ty: &Type) -> BoxedError {
    format!("cannot bind {value} to parameter of type '{}'", ty.name()).into()
}

fn integer_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
    if *ty == Type::INT2 {
        i16::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT8 {
        v.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        #[allow(clippy::cast_precision_loss)]
        let widened = v as f32;
        widened.to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        #[allow(clippy::cast_precision_loss)]
        let widened = v as f64;
        widened.to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        rust_decimal::Decimal::from(v).to_sql(ty, out)
    } else if *ty == Type::BOOL {
        (v != 0).to_sql(ty, out)
    } else if is_text_type(ty) {
        v.to_string().to_sql(ty, out)
    } else {
        Err(unsupported("an integer", ty))
    }
}

fn real_to_sql(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
    if *ty == Type::FLOAT4 {
        // narrowing is the declared column type's precision
        #[allow(clippy::cast_possible_truncation)]
        let narrowed = v as f32;
        narrowed.to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        v.to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        rust_decimal::Decimal::try_from(v)?.to_sql(ty, out)
    } else if is_text_type(ty) {
        v.to_string().to_sql(ty, out)
    } else {
        Err(unsupported("a real", ty))
    }
}

/// Text arguments are coerced to the inferred parameter type, so contracts can
/// pass `"1"` for an integer key the way stringly-typed callers do.
fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
    if *ty == Type::INT2 {
        s.trim().parse::<i16>()?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        s.trim().parse::<i32>()?.to_sql(ty, out)
    } else if *ty == Type::INT8 {
        s.trim().parse::<i64>()?.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        s.trim().parse::<f32>()?.to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        s.trim().parse::<f64>()?.to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        s.trim().parse::<rust_decimal::Decimal>()?.to_sql(ty, out)
    } else if *ty == Type::BOOL {
        match s.trim() {
            "1" | "t" | "true" => true.to_sql(ty, out),
            "0" | "f" | "false" => false.to_sql(ty, out),
            _ => Err(unsupported(&format!("'{s}'"), ty)),
        }
    } else if *ty == Type::TIMESTAMP {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMPTZ {
        chrono::DateTime::parse_from_rfc3339(s)?.to_sql(ty, out)
    } else if *ty == Type::DATE {
        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out)
    } else if *ty == Type::UUID {
        uuid::Uuid::parse_str(s)?.to_sql(ty, out)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
    } else if is_text_type(ty) {
        s.to_sql(ty, out)
    } else {
        Err(unsupported("text", ty))
    }
}

fn is_text_type(ty: &Type) -> bool {
    <&str as ToSql>::accepts(ty)
}

/// Convert a `may_postgres` row into a [`RawRow`].
pub(crate) fn row_to_raw(row: &Row) -> Result<RawRow, LifeError> {
    let mut raw = RawRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_())?;
        raw.push(column.name(), value);
    }
    Ok(raw)
}

fn decode_column(row: &Row, idx: usize, ty: &Type) -> Result<ScalarValue, LifeError> {
    let value = if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?.map(|v| ScalarValue::Integer(i64::from(v)))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?.map(|v| ScalarValue::Integer(i64::from(v)))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(ScalarValue::Integer)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?.map(|v| ScalarValue::Real(f64::from(v)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.map(ScalarValue::Real)
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(|v| ScalarValue::Integer(i64::from(v)))
    } else if is_text_type(ty) {
        row.try_get::<_, Option<String>>(idx)?.map(ScalarValue::Text)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(|v| ScalarValue::Text(v.format("%Y-%m-%d %H:%M:%S").to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|v| ScalarValue::Text(v.to_rfc3339()))
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map(|v| ScalarValue::Text(v.to_string()))
    } else if *ty == Type::NUMERIC {
        row.try_get::<_, Option<rust_decimal::Decimal>>(idx)?
            .map(|v| ScalarValue::Text(v.to_string()))
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|v| ScalarValue::Text(v.to_string()))
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|v| ScalarValue::Text(v.to_string()))
    } else {
        return Err(LifeError::ParseError(format!(
            "unsupported column type '{}' at index {idx}",
            ty.name()
        )));
    };
    Ok(value.unwrap_or(ScalarValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &ScalarValue, ty: &Type) -> Result<(IsNull, Vec<u8>), BoxedError> {
        let mut buf = BytesMut::new();
        let is_null = value.to_sql(ty, &mut buf)?;
        Ok((is_null, buf.to_vec()))
    }

    #[test]
    fn test_null_encodes_as_sql_null() {
        let (is_null, _) = encode(&ScalarValue::Null, &Type::INT4).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
    }

    #[test]
    fn test_integer_narrows_to_int4() {
        let (_, bytes) = encode(&ScalarValue::Integer(7), &Type::INT4).unwrap();
        assert_eq!(bytes, 7i32.to_be_bytes().to_vec());
    }

    #[test]
    fn test_integer_overflowing_int2_is_rejected() {
        assert!(encode(&ScalarValue::Integer(70_000), &Type::INT2).is_err());
    }

    #[test]
    fn test_numeric_text_binds_to_int8() {
        let (_, bytes) = encode(&ScalarValue::Text("42".into()), &Type::INT8).unwrap();
        assert_eq!(bytes, 42i64.to_be_bytes().to_vec());
    }

    #[test]
    fn test_integer_binds_to_float8_as_float() {
        let (_, bytes) = encode(&ScalarValue::Integer(2), &Type::FLOAT8).unwrap();
        assert_eq!(bytes, 2.0f64.to_be_bytes().to_vec());
    }

    #[test]
    fn test_integer_binds_to_float4_as_float() {
        let (_, bytes) = encode(&ScalarValue::Integer(3), &Type::FLOAT4).unwrap();
        assert_eq!(bytes, 3.0f32.to_be_bytes().to_vec());
    }

    #[test]
    fn test_integer_binds_to_numeric_as_decimal() {
        let (_, bytes) = encode(&ScalarValue::Integer(42), &Type::NUMERIC).unwrap();
        let mut expected = BytesMut::new();
        rust_decimal::Decimal::from(42).to_sql(&Type::NUMERIC, &mut expected).unwrap();
        assert_eq!(bytes, expected.to_vec());
    }

    #[test]
    fn test_real_binds_to_numeric_as_decimal() {
        let (_, bytes) = encode(&ScalarValue::Real(1.5), &Type::NUMERIC).unwrap();
        let mut expected = BytesMut::new();
        rust_decimal::Decimal::try_from(1.5f64).unwrap().to_sql(&Type::NUMERIC, &mut expected).unwrap();
        assert_eq!(bytes, expected.to_vec());
    }

    #[test]
    fn test_real_binds_to_float8() {
        let (_, bytes) = encode(&ScalarValue::Real(0.25), &Type::FLOAT8).unwrap();
        assert_eq!(bytes, 0.25f64.to_be_bytes().to_vec());
    }

    #[test]
    fn test_unhandled_types_are_rejected() {
        assert!(encode(&ScalarValue::Integer(1), &Type::BYTEA).is_err());
        assert!(encode(&ScalarValue::Real(1.0), &Type::INT4).is_err());
        assert!(encode(&ScalarValue::Text("x".into()), &Type::BYTEA).is_err());
    }

    #[test]
    fn test_text_binds_verbatim() {
        let (_, bytes) = encode(&ScalarValue::Text("run".into()), &Type::TEXT).unwrap();
        assert_eq!(bytes, b"run".to_vec());
    }
}
