//! Raw rows: ordered column name to scalar mappings
//!
//! A [`RawRow`] is exactly what the driver produced, columns in select-list
//! order. Hydration reads rows but never mutates them.

use crate::value::{ScalarValue, TryGetable, ValueExtractionError};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One result tuple, column order preserved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRow {
    columns: Vec<(String, ScalarValue)>,
}

impl RawRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs.
    ///
    /// ```rust
    /// use lifequery::RawRow;
    ///
    /// let row = RawRow::from_pairs([("id", "1"), ("title", "run")]);
    /// assert_eq!(row.get("title").and_then(|v| v.as_str()), Some("run"));
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ScalarValue>,
    {
        let mut row = Self::new();
        for (k, v) in pairs {
            row.push(k, v);
        }
        row
    }

    /// Append a column. A repeated column name replaces the earlier value in place,
    /// which matches how drivers resolve duplicate select-list aliases by name.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<ScalarValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Look up a column by name.
    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Extract a typed value from a column.
    ///
    /// A missing column is reported as a conversion error naming the column.
    pub fn try_get<T: TryGetable>(&self, column: &str) -> Result<T, ValueExtractionError> {
        let value = self.get(column).ok_or_else(|| {
            ValueExtractionError::ConversionError(format!("no column named '{column}'"))
        })?;
        T::try_get(value)
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// `(column, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// `true` when the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render the row as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), scalar_to_json(value)))
            .collect::<serde_json::Map<String, serde_json::Value>>();
        serde_json::Value::Object(map)
    }
}

pub(crate) fn scalar_to_json(value: &ScalarValue) -> serde_json::Value {
    match value {
        ScalarValue::Null => serde_json::Value::Null,
        ScalarValue::Integer(v) => serde_json::Value::from(*v),
        ScalarValue::Real(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ScalarValue::Text(s) => serde_json::Value::String(s.clone()),
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'a> IntoIterator for &'a RawRow {
    type Item = &'a (String, ScalarValue);
    type IntoIter = std::slice::Iter<'a, (String, ScalarValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_order_is_preserved() {
        let row = RawRow::from_pairs([("title", "run"), ("id", "1")]);
        let names: Vec<&str> = row.column_names().collect();
        assert_eq!(names, vec!["title", "id"]);
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"title":"run","id":"1"}"#
        );
    }

    #[test]
    fn test_duplicate_column_replaces_value() {
        let mut row = RawRow::new();
        row.push("id", 1i64);
        row.push("id", 2i64);
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("id"), Some(&ScalarValue::Integer(2)));
    }

    #[test]
    fn test_try_get_missing_column() {
        let row = RawRow::from_pairs([("id", "1")]);
        let err = row.try_get::<String>("title").unwrap_err();
        assert!(err.to_string().contains("title"));
        assert_eq!(row.try_get::<i64>("id"), Ok(1));
    }

    #[test]
    fn test_to_json_with_null() {
        let mut row = RawRow::new();
        row.push("id", "1");
        row.push("time", ScalarValue::Null);
        assert_eq!(row.to_json(), serde_json::json!({"id": "1", "time": null}));
    }
}
