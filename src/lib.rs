//! # Lifequery
//!
//! Contract-first SQL for the `may` runtime: declare a query contract once,
//! keep its SQL in a `.sql` file, call it like a function.
//!
//! A contract names its parameters and result shape. The registry binds it
//! to its SQL at startup and hands out a [`QueryFacade`]; each call binds the
//! arguments, runs the statement on a [`LifeExecutor`] and returns a row, a
//! list, a hydrated entity, a lazy page collection or a mutation flag. Every
//! call leaves one event in the shared [`QueryLog`].
//!
//! ```rust
//! use std::sync::Arc;
//! use lifequery::{
//!     Args, PageSize, ParamDecl, ParamType, QueryContract, QueryLog, QueryRegistry, ResultShape,
//!     SqlMap, SqliteExecutor,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = SqliteExecutor::open_in_memory()?;
//! db.execute_batch("CREATE TABLE todo (id TEXT, title TEXT)")?;
//!
//! let sql = SqlMap::new()
//!     .with("todo_add", "INSERT INTO todo (id, title) VALUES (:id, :title)")
//!     .with("todo_list", "SELECT * FROM todo");
//! let log = Arc::new(QueryLog::new());
//! let registry = QueryRegistry::builder(Arc::new(sql), Arc::new(db), log.clone())
//!     .register(
//!         QueryContract::new("todo_add", ResultShape::Mutate)
//!             .param(ParamDecl::new("id", ParamType::Text))
//!             .param(ParamDecl::new("title", ParamType::Text)),
//!     )
//!     .register(QueryContract::new("todo_list", ResultShape::Page).per_page(PageSize::Fixed(10)))
//!     .build()?;
//!
//! registry.call("todo_add", Args::positional(["1", "run"]))?;
//! let pages = registry.call("todo_list", Args::new())?.into_pages()?;
//! assert_eq!(pages.page(1)?.data.len(), 1);
//! assert!(log.contains("query: todo_add"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod query;
pub mod query_log;
pub mod resource;
pub mod sqlite;
pub mod value;

pub use config::{LifeQueryConfig, ParamConfig, QueryDeclConfig};
pub use connection::{ConnectionError, MayPostgresExecutor};
pub use error::QueryError;
pub use executor::{ExecMode, Executed, LifeError, LifeExecutor, QueryExecutor};
pub use query::{
    bind, hydrate, Args, BoundParams, ConstructorArgs, CurrentTime, EntityBuilder, Hydrated, Page,
    PageSize, Pages, PagesIter, ParamBinding, ParamDecl, ParamType, QueryContract, QueryFacade,
    QueryOutput, QueryRegistry, QueryRegistryBuilder, ResultShape, UnixEpochTime, ValueProvider,
};
pub use query_log::{LogEvent, Outcome, QueryLog};
pub use resource::{SqlDir, SqlMap, SqlResolver};
pub use sqlite::SqliteExecutor;
pub use value::{RawRow, ScalarValue, TryGetable, ValueExtractionError, ValueType};
