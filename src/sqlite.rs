//! SQLite backend
//!
//! [`SqliteExecutor`] runs contracts against an embedded `rusqlite`
//! connection. SQLite understands `:name` placeholders natively, so bound
//! parameters are matched to the statement by name.

use crate::executor::{LifeError, LifeExecutor};
use crate::query::binding::BoundParams;
use crate::value::{RawRow, ScalarValue};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, Row, Statement};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

impl rusqlite::ToSql for ScalarValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            ScalarValue::Null => ToSqlOutput::Owned(Value::Null),
            ScalarValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            ScalarValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            ScalarValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// [`LifeExecutor`] over a single SQLite connection
///
/// The connection is serialized behind a mutex; each call holds it for one
/// statement.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
    stringify_fetches: bool,
}

impl SqliteExecutor {
    /// Wrap an open connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            stringify_fetches: false,
        }
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::SqliteError` if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, LifeError> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Open (or create) a database file.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::SqliteError` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LifeError> {
        Ok(Self::new(Connection::open(path)?))
    }

    /// Return every fetched number as text.
    pub fn with_stringify_fetches(mut self, enabled: bool) -> Self {
        self.stringify_fetches = enabled;
        self
    }

    /// Run a batch of `;`-separated statements without parameters (schema setup).
    ///
    /// # Errors
    ///
    /// Returns `LifeError::SqliteError` if any statement fails.
    pub fn execute_batch(&self, sql: &str) -> Result<(), LifeError> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LifeError> {
        self.conn
            .lock()
            .map_err(|e| LifeError::Other(format!("SQLite connection lock poisoned: {e}")))
    }

    fn fetch(&self, query: &str, params: &BoundParams, limit: Option<usize>) -> Result<Vec<RawRow>, LifeError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(query)?;
        bind_named(&mut stmt, params)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(self.read_row(row, &columns)?);
            if limit.is_some_and(|max| out.len() >= max) {
                break;
            }
        }
        Ok(out)
    }

    fn read_row(&self, row: &Row<'_>, columns: &[String]) -> Result<RawRow, LifeError> {
        let mut raw = RawRow::new();
        for (idx, name) in columns.iter().enumerate() {
            let value = match row.get_ref(idx)? {
                ValueRef::Null => ScalarValue::Null,
                ValueRef::Integer(v) if self.stringify_fetches => ScalarValue::Text(v.to_string()),
                ValueRef::Integer(v) => ScalarValue::Integer(v),
                ValueRef::Real(v) if self.stringify_fetches => ScalarValue::Text(v.to_string()),
                ValueRef::Real(v) => ScalarValue::Real(v),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    let text = std::str::from_utf8(bytes).map_err(|e| {
                        LifeError::ParseError(format!("column '{name}' is not valid UTF-8: {e}"))
                    })?;
                    ScalarValue::Text(text.to_string())
                }
            };
            raw.push(name.clone(), value);
        }
        Ok(raw)
    }
}

/// Bind every named placeholder of `stmt` from `params`.
fn bind_named(stmt: &mut Statement<'_>, params: &BoundParams) -> Result<(), LifeError> {
    for index in 1..=stmt.parameter_count() {
        let placeholder = stmt.parameter_name(index).map(str::to_string).ok_or_else(|| {
            LifeError::QueryError(format!(
                "positional placeholder at index {index} is not supported, use :name"
            ))
        })?;
        let name = placeholder.trim_start_matches([':', '@', '$']);
        let value = params.get(name).ok_or_else(|| {
            LifeError::QueryError(format!("no value bound for placeholder {placeholder}"))
        })?;
        stmt.raw_bind_parameter(index, value)?;
    }
    Ok(())
}

impl LifeExecutor for SqliteExecutor {
    fn execute(&self, query: &str, params: &BoundParams) -> Result<u64, LifeError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(query)?;
        bind_named(&mut stmt, params)?;
        let affected = stmt.raw_execute()?;
        Ok(affected as u64)
    }

    fn query_one(&self, query: &str, params: &BoundParams) -> Result<Option<RawRow>, LifeError> {
        Ok(self.fetch(query, params, Some(1))?.into_iter().next())
    }

    fn query_all(&self, query: &str, params: &BoundParams) -> Result<Vec<RawRow>, LifeError> {
        self.fetch(query, params, None)
    }
}
