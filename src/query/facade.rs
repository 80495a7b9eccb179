//! Query invocation façade
//!
//! A [`QueryFacade`] is the callable bound to one registered contract. Each
//! call runs binder, executor and hydrator (or counts the result and hands
//! back a lazy [`Pages`] for paginated contracts) and appends exactly one
//! event to the shared [`QueryLog`], whether the call succeeded or not.

use crate::error::QueryError;
use crate::executor::QueryExecutor;
use crate::query::binding::{bind, Args, BoundParams};
use crate::query::contract::QueryContract;
use crate::query::hydrate::{hydrate, Hydrated};
use crate::query::pagination::Pages;
use crate::query_log::{LogEvent, Outcome, QueryLog};
use crate::value::RawRow;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Result of one invocation, by contract shape
#[derive(Debug)]
pub enum QueryOutput {
    /// [`ResultShape::ScalarMap`](crate::ResultShape::ScalarMap)
    Row(Option<RawRow>),
    /// [`ResultShape::ListOfMaps`](crate::ResultShape::ListOfMaps)
    Rows(Vec<RawRow>),
    /// [`ResultShape::Entity`](crate::ResultShape::Entity)
    Entity(Option<Hydrated>),
    /// [`ResultShape::ListOfEntities`](crate::ResultShape::ListOfEntities)
    Entities(Vec<Hydrated>),
    /// [`ResultShape::Page`](crate::ResultShape::Page)
    Pages(Pages),
    /// [`ResultShape::Mutate`](crate::ResultShape::Mutate)
    Affected(bool),
}

impl QueryOutput {
    /// Variant name, for mismatch messages.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryOutput::Row(_) => "row",
            QueryOutput::Rows(_) => "rows",
            QueryOutput::Entity(_) => "entity",
            QueryOutput::Entities(_) => "entities",
            QueryOutput::Pages(_) => "pages",
            QueryOutput::Affected(_) => "affected",
        }
    }

    fn mismatch(self, expected: &str) -> QueryError {
        QueryError::ShapeMismatch {
            expected: expected.to_string(),
            actual: self.kind().to_string(),
        }
    }

    /// The single row of a scalar-map contract.
    ///
    /// # Errors
    ///
    /// [`QueryError::ShapeMismatch`] for any other shape.
    pub fn into_row(self) -> Result<Option<RawRow>, QueryError> {
        match self {
            QueryOutput::Row(row) => Ok(row),
            other => Err(other.mismatch("row")),
        }
    }

    /// The rows of a list contract.
    ///
    /// # Errors
    ///
    /// [`QueryError::ShapeMismatch`] for any other shape.
    pub fn into_rows(self) -> Result<Vec<RawRow>, QueryError> {
        match self {
            QueryOutput::Rows(rows) => Ok(rows),
            other => Err(other.mismatch("rows")),
        }
    }

    /// The entity of an entity contract, as `T`.
    ///
    /// # Errors
    ///
    /// [`QueryError::ShapeMismatch`] for any other shape or entity type.
    pub fn into_entity<T: Any>(self) -> Result<Option<T>, QueryError> {
        match self {
            QueryOutput::Entity(entity) => entity.map(Hydrated::downcast).transpose(),
            other => Err(other.mismatch("entity")),
        }
    }

    /// The entities of an entity-list contract, as `T`.
    ///
    /// # Errors
    ///
    /// [`QueryError::ShapeMismatch`] for any other shape or entity type.
    pub fn into_entities<T: Any>(self) -> Result<Vec<T>, QueryError> {
        match self {
            QueryOutput::Entities(entities) => entities.into_iter().map(Hydrated::downcast).collect(),
            other => Err(other.mismatch("entities")),
        }
    }

    /// The page collection of a paginated contract.
    ///
    /// # Errors
    ///
    /// [`QueryError::ShapeMismatch`] for any other shape.
    pub fn into_pages(self) -> Result<Pages, QueryError> {
        match self {
            QueryOutput::Pages(pages) => Ok(pages),
            other => Err(other.mismatch("pages")),
        }
    }

    /// Whether a mutation touched any row.
    ///
    /// # Errors
    ///
    /// [`QueryError::ShapeMismatch`] for any other shape.
    pub fn into_affected(self) -> Result<bool, QueryError> {
        match self {
            QueryOutput::Affected(affected) => Ok(affected),
            other => Err(other.mismatch("affected")),
        }
    }
}

/// Callable bound to one contract
pub struct QueryFacade {
    contract: Arc<QueryContract>,
    sql: Arc<str>,
    executor: QueryExecutor,
    log: Arc<QueryLog>,
}

impl QueryFacade {
    pub(crate) fn new(
        contract: Arc<QueryContract>,
        sql: impl Into<Arc<str>>,
        executor: QueryExecutor,
        log: Arc<QueryLog>,
    ) -> Self {
        Self {
            contract,
            sql: sql.into(),
            executor,
            log,
        }
    }

    /// Contract name.
    pub fn name(&self) -> &str {
        self.contract.name()
    }

    /// Resolved SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The contract this façade runs.
    pub fn contract(&self) -> &QueryContract {
        &self.contract
    }

    /// Invoke the contract.
    ///
    /// # Errors
    ///
    /// Any [`QueryError`] from binding, execution or hydration. The failure is
    /// logged before it is returned.
    pub fn call(&self, args: Args) -> Result<QueryOutput, QueryError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::invoke_query_span(self.name()).entered();

        #[cfg(feature = "metrics")]
        if let Some(metrics) = METRICS.as_ref() {
            metrics.record_invocation();
        }

        let mut bound = None;
        let result = self.run(&args, &mut bound);

        let outcome = match &result {
            Ok(output) => {
                log::info!(target: "lifequery", "query {} -> {}", self.name(), output.kind());
                Outcome::Ok
            }
            Err(err) => {
                log::warn!(target: "lifequery", "query {} failed: {err}", self.name());
                Outcome::Failed(err.to_string())
            }
        };
        let logged_args = bound.unwrap_or_else(|| args.summary());
        self.log.append(LogEvent::new(
            self.name(),
            self.contract.sql_name(),
            logged_args,
            outcome,
        ));
        result
    }

    fn run(&self, args: &Args, bound: &mut Option<BoundParams>) -> Result<QueryOutput, QueryError> {
        let params = bind(&self.contract, args)?;
        *bound = Some(params.clone());
        let query = self.contract.name();
        let shape = self.contract.shape();

        if let Some(mode) = shape.exec_mode() {
            let executed = self.executor.run(query, &self.sql, &params, mode)?;
            return hydrate(
                query,
                executed,
                shape,
                self.contract.entity_builder().map(|b| &**b),
            );
        }

        let page_size = self.contract.page_size().ok_or_else(|| QueryError::InvalidContract {
            query: query.to_string(),
            reason: "paginated contract without a page size".to_string(),
        })?;
        let per_page = page_size.resolve(query, &params)?;
        let pages = Pages::new(
            query,
            Arc::clone(&self.sql),
            params,
            per_page,
            self.executor.clone(),
            self.contract.entity_builder().cloned(),
        );
        // the count belongs to this invocation; a database fault is logged here
        pages.total()?;
        Ok(QueryOutput::Pages(pages))
    }
}

impl fmt::Debug for QueryFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryFacade")
            .field("contract", &self.contract)
            .field("sql", &self.sql)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{LifeError, LifeExecutor};
    use crate::query::contract::{ParamDecl, ParamType, ResultShape};
    use crate::query::pagination::PageSize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockExecutor {
        captured_sql: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MockExecutor {
        fn record(&self, query: &str) -> Result<(), LifeError> {
            self.captured_sql.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(LifeError::QueryError("no such table: todo".to_string()));
            }
            Ok(())
        }

        fn calls(&self) -> usize {
            self.captured_sql.lock().unwrap().len()
        }
    }

    impl LifeExecutor for MockExecutor {
        fn execute(&self, query: &str, _params: &BoundParams) -> Result<u64, LifeError> {
            self.record(query)?;
            Ok(1)
        }

        fn query_one(&self, query: &str, _params: &BoundParams) -> Result<Option<RawRow>, LifeError> {
            self.record(query)?;
            if query.contains("COUNT(*)") {
                return Ok(Some(RawRow::from_pairs([("total", "1")])));
            }
            Ok(Some(RawRow::from_pairs([("id", "1"), ("title", "run")])))
        }

        fn query_all(&self, query: &str, _params: &BoundParams) -> Result<Vec<RawRow>, LifeError> {
            self.record(query)?;
            Ok(vec![RawRow::from_pairs([("id", "1"), ("title", "run")])])
        }
    }

    fn facade(contract: QueryContract, mock: Arc<MockExecutor>, log: Arc<QueryLog>) -> QueryFacade {
        QueryFacade::new(
            Arc::new(contract),
            "SELECT * FROM todo WHERE id = :id",
            QueryExecutor::new(mock),
            log,
        )
    }

    fn todo_item() -> QueryContract {
        QueryContract::new("todo_item", ResultShape::ScalarMap).param(ParamDecl::new("id", ParamType::Text))
    }

    #[test]
    fn test_success_logs_bound_args() {
        let log = Arc::new(QueryLog::new());
        let facade = facade(todo_item(), Arc::new(MockExecutor::default()), log.clone());
        let row = facade.call(Args::new().with("id", "1")).unwrap().into_row().unwrap();
        assert_eq!(row.unwrap().get("title").and_then(|v| v.as_str()), Some("run"));
        assert!(log.contains(r#"query: todo_item({"id":"1"}) -> ok"#));
    }

    #[test]
    fn test_binding_failure_logged_without_db_access() {
        let log = Arc::new(QueryLog::new());
        let mock = Arc::new(MockExecutor::default());
        let facade = facade(todo_item(), mock.clone(), log.clone());
        let err = facade.call(Args::new()).unwrap_err();
        assert!(matches!(err, QueryError::MissingArgument { .. }));
        assert_eq!(mock.calls(), 0);
        assert_eq!(log.len(), 1);
        assert!(!log.events()[0].outcome.is_ok());
    }

    #[test]
    fn test_execution_failure_logged_once() {
        let log = Arc::new(QueryLog::new());
        let mock = Arc::new(MockExecutor {
            fail: true,
            ..MockExecutor::default()
        });
        let facade = facade(todo_item(), mock, log.clone());
        let err = facade.call(Args::new().with("id", "1")).unwrap_err();
        assert!(matches!(err, QueryError::QueryExecutionFailed { .. }));
        assert_eq!(log.len(), 1);
        assert!(log.contains(r#"query: todo_item({"id":"1"}) -> failed"#));
    }

    #[test]
    fn test_log_uses_sql_resource_name() {
        let log = Arc::new(QueryLog::new());
        let contract = QueryContract::new("todo_lookup", ResultShape::ScalarMap)
            .sql("todo_item")
            .param(ParamDecl::new("id", ParamType::Text));
        let facade = facade(contract, Arc::new(MockExecutor::default()), log.clone());
        facade.call(Args::positional(["1"])).unwrap();
        assert!(log.contains("query: todo_item("));
        assert_eq!(log.events()[0].query, "todo_lookup");
    }

    #[test]
    fn test_per_page_checked_before_db_access() {
        let log = Arc::new(QueryLog::new());
        let mock = Arc::new(MockExecutor::default());
        let contract = QueryContract::new("todo_list", ResultShape::Page)
            .param(ParamDecl::new("perPage", ParamType::Any))
            .per_page(PageSize::FromParam("perPage".into()));
        let facade = facade(contract, mock.clone(), log.clone());
        let err = facade.call(Args::positional(["1"])).unwrap_err();
        assert!(matches!(err, QueryError::PerPageNotInt { .. }));
        assert_eq!(mock.calls(), 0);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_pages_counted_within_call() {
        let log = Arc::new(QueryLog::new());
        let mock = Arc::new(MockExecutor::default());
        let contract = QueryContract::new("todo_list", ResultShape::Page).per_page(PageSize::Fixed(10));
        let facade = facade(contract, mock.clone(), log.clone());
        let pages = facade.call(Args::new()).unwrap().into_pages().unwrap();
        assert_eq!(mock.calls(), 1);
        assert_eq!(pages.max_per_page(), 10);
        assert_eq!(pages.total().unwrap(), 1);
        assert_eq!(mock.calls(), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_page_count_failure_logged() {
        let log = Arc::new(QueryLog::new());
        let mock = Arc::new(MockExecutor {
            fail: true,
            ..MockExecutor::default()
        });
        let contract = QueryContract::new("todo_list", ResultShape::Page).per_page(PageSize::Fixed(10));
        let facade = facade(contract, mock, log.clone());
        let err = facade.call(Args::new()).unwrap_err();
        assert!(matches!(err, QueryError::QueryExecutionFailed { .. }));
        assert_eq!(log.len(), 1);
        assert!(log.contains("query: todo_list({}) -> failed"));
    }

    #[test]
    fn test_wrong_output_accessor() {
        let facade = facade(todo_item(), Arc::new(MockExecutor::default()), Arc::new(QueryLog::new()));
        let err = facade.call(Args::new().with("id", "1")).unwrap().into_rows().unwrap_err();
        assert!(matches!(err, QueryError::ShapeMismatch { ref actual, .. } if actual == "row"));
    }
}
