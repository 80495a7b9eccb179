//! `LifeExecutor` and the query executor stage
//!
//! [`LifeExecutor`] is the database access primitive the engine sits on: it
//! takes SQL text with `:name` placeholders plus a bound parameter map and
//! returns [`RawRow`]s or an affected-row count. Backends live in
//! [`connection`](crate::connection) (PostgreSQL) and [`sqlite`](crate::sqlite).
//!
//! [`QueryExecutor`] is the pipeline stage on top of it. It picks the call for
//! an [`ExecMode`], records metrics, and turns every driver failure into
//! [`QueryError::QueryExecutionFailed`]. It never retries.

use crate::error::QueryError;
use crate::query::binding::BoundParams;
use crate::value::RawRow;
use may_postgres::Error as PostgresError;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// `LifeExecutor` error type
#[derive(Debug)]
pub enum LifeError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// SQLite error from `rusqlite`
    SqliteError(rusqlite::Error),
    /// Query preparation or binding error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for LifeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifeError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            LifeError::SqliteError(e) => write!(f, "SQLite error: {e}"),
            LifeError::QueryError(s) => write!(f, "Query error: {s}"),
            LifeError::ParseError(s) => write!(f, "Parse error: {s}"),
            LifeError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for LifeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LifeError::PostgresError(e) => Some(e),
            LifeError::SqliteError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for LifeError {
    fn from(err: PostgresError) -> Self {
        LifeError::PostgresError(err)
    }
}

impl From<rusqlite::Error> for LifeError {
    fn from(err: rusqlite::Error) -> Self {
        LifeError::SqliteError(err)
    }
}

/// Trait for executing database operations
///
/// SQL text carries named placeholders (`:id`). Values present in `params`
/// but not referenced by the SQL are ignored; a placeholder with no value is
/// a [`LifeError::QueryError`].
///
/// # Examples
///
/// ```no_run
/// use lifequery::{BoundParams, LifeExecutor, SqliteExecutor};
///
/// # fn main() -> Result<(), lifequery::LifeError> {
/// let executor = SqliteExecutor::open_in_memory()?;
/// executor.execute_batch("CREATE TABLE todo (id TEXT, title TEXT)")?;
///
/// let mut params = BoundParams::new();
/// params.insert("id", "1");
/// params.insert("title", "run");
/// executor.execute("INSERT INTO todo (id, title) VALUES (:id, :title)", &params)?;
///
/// let row = executor.query_one("SELECT * FROM todo WHERE id = :id", &params)?;
/// assert!(row.is_some());
/// # Ok(())
/// # }
/// ```
pub trait LifeExecutor: Send + Sync {
    /// Execute a statement and return the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the statement fails.
    fn execute(&self, query: &str, params: &BoundParams) -> Result<u64, LifeError>;

    /// Execute a query and return its first row, or `None` when it yields nothing.
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the query fails.
    fn query_one(&self, query: &str, params: &BoundParams) -> Result<Option<RawRow>, LifeError>;

    /// Execute a query and return all rows in result order.
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the query fails.
    fn query_all(&self, query: &str, params: &BoundParams) -> Result<Vec<RawRow>, LifeError>;
}

impl<T: LifeExecutor + ?Sized> LifeExecutor for Arc<T> {
    fn execute(&self, query: &str, params: &BoundParams) -> Result<u64, LifeError> {
        (**self).execute(query, params)
    }

    fn query_one(&self, query: &str, params: &BoundParams) -> Result<Option<RawRow>, LifeError> {
        (**self).query_one(query, params)
    }

    fn query_all(&self, query: &str, params: &BoundParams) -> Result<Vec<RawRow>, LifeError> {
        (**self).query_all(query, params)
    }
}

/// How a bound statement is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// First row or nothing
    FetchOne,
    /// Every row, in result order
    FetchAll,
    /// Statement without a result set
    Mutate,
}

/// Outcome of [`QueryExecutor::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Executed {
    /// Result of [`ExecMode::FetchOne`]
    One(Option<RawRow>),
    /// Result of [`ExecMode::FetchAll`]
    All(Vec<RawRow>),
    /// Result of [`ExecMode::Mutate`]: whether at least one row was affected
    Affected(bool),
}

/// Runs bound statements and translates driver failures.
#[derive(Clone)]
pub struct QueryExecutor {
    executor: Arc<dyn LifeExecutor>,
}

impl QueryExecutor {
    /// Wrap a database primitive.
    pub fn new(executor: Arc<dyn LifeExecutor>) -> Self {
        Self { executor }
    }

    /// Access the wrapped primitive.
    pub fn inner(&self) -> &Arc<dyn LifeExecutor> {
        &self.executor
    }

    /// Run `sql` with `params` in `mode`.
    ///
    /// `query` names the contract for error reporting.
    ///
    /// # Errors
    ///
    /// Every driver failure becomes [`QueryError::QueryExecutionFailed`] carrying the cause.
    pub fn run(
        &self,
        query: &str,
        sql: &str,
        params: &BoundParams,
        mode: ExecMode,
    ) -> Result<Executed, QueryError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(query, mode).entered();

        let start = Instant::now();
        let result = match mode {
            ExecMode::FetchOne => self.executor.query_one(sql, params).map(Executed::One),
            ExecMode::FetchAll => self.executor.query_all(sql, params).map(Executed::All),
            ExecMode::Mutate => self
                .executor
                .execute(sql, params)
                .map(|affected| Executed::Affected(affected > 0)),
        };
        let duration = start.elapsed();

        #[cfg(feature = "metrics")]
        if let Some(metrics) = METRICS.as_ref() {
            metrics.record_query(duration);
            if result.is_err() {
                metrics.record_query_error();
            }
        }

        log::debug!(target: "lifequery", "query {query} ({mode:?}) finished in {duration:?}");

        result.map_err(|source| QueryError::QueryExecutionFailed {
            query: query.to_string(),
            source,
        })
    }
}

impl fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mock executor that captures SQL and serves canned rows
    struct MockExecutor {
        captured_sql: Mutex<Vec<String>>,
        rows: Vec<RawRow>,
        affected: u64,
        fail: bool,
    }

    impl MockExecutor {
        fn new(rows: Vec<RawRow>) -> Self {
            Self {
                captured_sql: Mutex::new(Vec::new()),
                rows,
                affected: 1,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(vec![])
            }
        }

        fn capture(&self, query: &str) -> Result<(), LifeError> {
            self.captured_sql.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(LifeError::QueryError("syntax error near \"SELEC\"".to_string()));
            }
            Ok(())
        }
    }

    impl LifeExecutor for MockExecutor {
        fn execute(&self, query: &str, _params: &BoundParams) -> Result<u64, LifeError> {
            self.capture(query)?;
            Ok(self.affected)
        }

        fn query_one(&self, query: &str, _params: &BoundParams) -> Result<Option<RawRow>, LifeError> {
            self.capture(query)?;
            Ok(self.rows.first().cloned())
        }

        fn query_all(&self, query: &str, _params: &BoundParams) -> Result<Vec<RawRow>, LifeError> {
            self.capture(query)?;
            Ok(self.rows.clone())
        }
    }

    #[test]
    fn test_life_error_display() {
        let err = LifeError::QueryError("test error".to_string());
        assert!(err.to_string().contains("Query error"));
        let err = LifeError::ParseError("test".to_string());
        assert!(err.to_string().contains("Parse error"));
        let err = LifeError::Other("test".to_string());
        assert!(err.to_string().contains("Execution error"));
    }

    #[test]
    fn test_fetch_one_without_rows_is_not_an_error() {
        let executor = QueryExecutor::new(Arc::new(MockExecutor::new(vec![])));
        let out = executor
            .run("todo_item", "SELECT 1", &BoundParams::new(), ExecMode::FetchOne)
            .unwrap();
        assert_eq!(out, Executed::One(None));
    }

    #[test]
    fn test_fetch_all_preserves_order() {
        let rows = vec![
            RawRow::from_pairs([("id", "2")]),
            RawRow::from_pairs([("id", "1")]),
        ];
        let executor = QueryExecutor::new(Arc::new(MockExecutor::new(rows.clone())));
        let out = executor
            .run("todo_list", "SELECT 1", &BoundParams::new(), ExecMode::FetchAll)
            .unwrap();
        assert_eq!(out, Executed::All(rows));
    }

    #[test]
    fn test_mutate_reports_affected() {
        let mock = MockExecutor {
            affected: 0,
            ..MockExecutor::new(vec![])
        };
        let executor = QueryExecutor::new(Arc::new(mock));
        let out = executor
            .run("todo_add", "INSERT", &BoundParams::new(), ExecMode::Mutate)
            .unwrap();
        assert_eq!(out, Executed::Affected(false));
    }

    #[test]
    fn test_driver_failure_is_wrapped_once() {
        let mock = Arc::new(MockExecutor::failing());
        let executor = QueryExecutor::new(mock.clone());
        let err = executor
            .run("todo_item", "SELEC 1", &BoundParams::new(), ExecMode::FetchOne)
            .unwrap_err();
        match err {
            QueryError::QueryExecutionFailed { query, source } => {
                assert_eq!(query, "todo_item");
                assert!(source.to_string().contains("syntax error"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // no retry
        assert_eq!(mock.captured_sql.lock().unwrap().len(), 1);
    }
}
