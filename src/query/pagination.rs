//! Pagination engine
//!
//! A [`ResultShape::Page`](crate::ResultShape::Page) contract returns a lazy
//! [`Pages`] collection instead of rows. The total comes from a `COUNT(*)`
//! over the contract's SQL, run once by the invoking call and cached for the
//! lifetime of the collection; pages are fetched only when asked for.
//!
//! The page size is fixed at registration or read from a call argument
//! ([`PageSize::FromParam`]). A dynamic page size is checked before any
//! database access.

use crate::error::QueryError;
use crate::executor::{ExecMode, Executed, QueryExecutor};
use crate::query::binding::BoundParams;
use crate::query::contract::QueryContract;
use crate::query::hydrate::{build_all, ErasedEntityBuilder};
use crate::value::{RawRow, ScalarValue};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Where a paginated contract takes its page size from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSize {
    /// Constant page size
    Fixed(u64),
    /// Value of the named call argument; must be a positive integer
    FromParam(String),
}

impl PageSize {
    /// Registration-time check against the contract's declared parameters.
    pub(crate) fn validate(&self, contract: &QueryContract) -> Result<(), QueryError> {
        match self {
            PageSize::Fixed(0) => Err(QueryError::InvalidContract {
                query: contract.name.clone(),
                reason: "page size must be at least 1".to_string(),
            }),
            PageSize::Fixed(_) => Ok(()),
            PageSize::FromParam(source) if contract.find_param(source).is_none() => {
                Err(QueryError::InvalidDynamicVarName {
                    query: contract.name.clone(),
                    param: "per_page".to_string(),
                    source_name: source.clone(),
                })
            }
            PageSize::FromParam(_) => Ok(()),
        }
    }

    /// Resolve the page size for one invocation.
    ///
    /// # Errors
    ///
    /// [`QueryError::PerPageNotInt`] when the argument is not an integer above zero.
    pub(crate) fn resolve(&self, query: &str, params: &BoundParams) -> Result<u64, QueryError> {
        let source = match self {
            PageSize::Fixed(n) => return Ok(*n),
            PageSize::FromParam(source) => source,
        };
        let not_int = |actual: String| QueryError::PerPageNotInt {
            query: query.to_string(),
            param: source.clone(),
            actual,
        };
        match params.get(source) {
            Some(ScalarValue::Integer(n)) if *n > 0 => u64::try_from(*n).map_err(|_| not_int(n.to_string())),
            Some(ScalarValue::Integer(n)) => Err(not_int(n.to_string())),
            Some(other) => Err(not_int(other.type_name().to_string())),
            None => Err(not_int("nothing".to_string())),
        }
    }
}

/// One page of a paginated result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Items on this page, in result order
    pub data: Vec<T>,
    /// 1-based page number
    pub current_page: u64,
    /// Page size the collection was created with
    pub max_per_page: u64,
    /// Items across every page
    pub total: u64,
    /// Number of pages; 0 for an empty result
    pub page_count: u64,
}

impl<T> Page<T> {
    /// Is there a page after this one?
    pub fn has_next(&self) -> bool {
        self.current_page < self.page_count
    }

    /// Is there a page before this one?
    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    /// Number of items on this page.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` when the page holds no items.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// `SELECT COUNT(*)` over the contract's SQL.
pub(crate) fn count_sql(sql: &str) -> String {
    format!("SELECT COUNT(*) AS total FROM (\n{}\n) AS lifequery_count", strip_terminator(sql))
}

/// The contract's SQL restricted to one page.
pub(crate) fn page_sql(sql: &str, limit: u64, offset: u64) -> String {
    format!(
        "SELECT * FROM (\n{}\n) AS lifequery_page LIMIT {limit} OFFSET {offset}",
        strip_terminator(sql)
    )
}

fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// Lazily evaluated page collection
#[derive(Clone)]
pub struct Pages {
    query: String,
    sql: Arc<str>,
    params: BoundParams,
    per_page: u64,
    executor: QueryExecutor,
    entity: Option<Arc<dyn ErasedEntityBuilder>>,
    total: OnceCell<u64>,
}

impl Pages {
    pub(crate) fn new(
        query: impl Into<String>,
        sql: Arc<str>,
        params: BoundParams,
        per_page: u64,
        executor: QueryExecutor,
        entity: Option<Arc<dyn ErasedEntityBuilder>>,
    ) -> Self {
        Self {
            query: query.into(),
            sql,
            params,
            per_page,
            executor,
            entity,
            total: OnceCell::new(),
        }
    }

    /// Page size.
    pub fn max_per_page(&self) -> u64 {
        self.per_page
    }

    /// Parameters the collection was bound with.
    pub fn params(&self) -> &BoundParams {
        &self.params
    }

    /// Total number of items. Runs the count query on first use only.
    ///
    /// # Errors
    ///
    /// [`QueryError::QueryExecutionFailed`] if the count query fails.
    pub fn total(&self) -> Result<u64, QueryError> {
        self.total.get_or_try_init(|| self.count()).copied()
    }

    fn count(&self) -> Result<u64, QueryError> {
        let executed = self.executor.run(
            &self.query,
            &count_sql(&self.sql),
            &self.params,
            ExecMode::FetchOne,
        )?;
        let row = match executed {
            Executed::One(Some(row)) => row,
            _ => return Ok(0),
        };
        let total: i64 = row
            .try_get("total")
            .map_err(|e| self.count_failure(e.to_string()))?;
        let total = u64::try_from(total).map_err(|_| self.count_failure(format!("negative count {total}")))?;
        log::debug!(target: "lifequery", "query {} counted {total} rows", self.query);
        Ok(total)
    }

    fn count_failure(&self, reason: String) -> QueryError {
        QueryError::QueryExecutionFailed {
            query: self.query.clone(),
            source: crate::executor::LifeError::ParseError(format!("count query: {reason}")),
        }
    }

    /// Number of pages; 0 when the result is empty.
    ///
    /// # Errors
    ///
    /// [`QueryError::QueryExecutionFailed`] if the count query fails.
    pub fn page_count(&self) -> Result<u64, QueryError> {
        Ok(self.total()?.div_ceil(self.per_page))
    }

    /// Fetch page `n` as raw rows. Pages start at 1; a page past the end is
    /// empty but still carries the totals.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidPage`] for page 0, [`QueryError::QueryExecutionFailed`]
    /// if a query fails.
    pub fn page(&self, n: u64) -> Result<Page<RawRow>, QueryError> {
        if n == 0 {
            return Err(QueryError::InvalidPage {
                query: self.query.clone(),
                page: n,
            });
        }
        let total = self.total()?;
        let offset = (n - 1).saturating_mul(self.per_page);
        let data = if offset >= total {
            Vec::new()
        } else {
            match self.executor.run(
                &self.query,
                &page_sql(&self.sql, self.per_page, offset),
                &self.params,
                ExecMode::FetchAll,
            )? {
                Executed::All(rows) => rows,
                other => {
                    return Err(QueryError::ShapeMismatch {
                        expected: "rows".to_string(),
                        actual: format!("{other:?}"),
                    })
                }
            }
        };
        log::debug!(target: "lifequery", "query {} page {n}: {} rows", self.query, data.len());
        Ok(Page {
            data,
            current_page: n,
            max_per_page: self.per_page,
            total,
            page_count: total.div_ceil(self.per_page),
        })
    }

    /// Fetch page `n` hydrated through the contract's entity builder.
    ///
    /// # Errors
    ///
    /// As [`Pages::page`]; additionally [`QueryError::ShapeMismatch`] when the
    /// contract has no entity builder or builds something other than `T`, and
    /// [`QueryError::EntityConstructionFailed`] when a row cannot be hydrated.
    pub fn entity_page<T: Any>(&self, n: u64) -> Result<Page<T>, QueryError> {
        let builder = self.entity.as_ref().ok_or_else(|| QueryError::ShapeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            actual: "rows (no entity builder)".to_string(),
        })?;
        let page = self.page(n)?;
        let data = build_all(&self.query, &**builder, &page.data)?
            .into_iter()
            .map(|hydrated| hydrated.downcast::<T>())
            .collect::<Result<Vec<T>, QueryError>>()?;
        Ok(Page {
            data,
            current_page: page.current_page,
            max_per_page: page.max_per_page,
            total: page.total,
            page_count: page.page_count,
        })
    }

    /// Iterate over every page in order.
    pub fn iter(&self) -> PagesIter<'_> {
        PagesIter {
            pages: self,
            next: 1,
            page_count: None,
            done: false,
        }
    }
}

impl fmt::Debug for Pages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pages")
            .field("query", &self.query)
            .field("per_page", &self.per_page)
            .field("params", &self.params)
            .field("total", &self.total.get())
            .finish_non_exhaustive()
    }
}

impl<'a> IntoIterator for &'a Pages {
    type Item = Result<Page<RawRow>, QueryError>;
    type IntoIter = PagesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the pages of a [`Pages`] collection
///
/// Stops after the last page, or after yielding the first error.
pub struct PagesIter<'a> {
    pages: &'a Pages,
    next: u64,
    page_count: Option<u64>,
    done: bool,
}

impl Iterator for PagesIter<'_> {
    type Item = Result<Page<RawRow>, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let page_count = match self.page_count {
            Some(count) => count,
            None => match self.pages.page_count() {
                Ok(count) => *self.page_count.insert(count),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            },
        };
        if self.next > page_count {
            self.done = true;
            return None;
        }
        let page = self.pages.page(self.next);
        self.next += 1;
        if page.is_err() {
            self.done = true;
        }
        Some(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{LifeError, LifeExecutor};
    use crate::query::contract::{ParamDecl, ParamType, ResultShape};
    use crate::query::hydrate::EntityBuilder;
    use std::sync::Mutex;

    // Serves `total` rows and records every statement
    struct CountingExecutor {
        total: i64,
        captured_sql: Mutex<Vec<String>>,
    }

    impl CountingExecutor {
        fn new(total: i64) -> Arc<Self> {
            Arc::new(Self {
                total,
                captured_sql: Mutex::new(Vec::new()),
            })
        }

        fn captured(&self) -> Vec<String> {
            self.captured_sql.lock().unwrap().clone()
        }
    }

    impl LifeExecutor for CountingExecutor {
        fn execute(&self, _query: &str, _params: &BoundParams) -> Result<u64, LifeError> {
            Err(LifeError::Other("not a mutation".to_string()))
        }

        fn query_one(&self, query: &str, _params: &BoundParams) -> Result<Option<RawRow>, LifeError> {
            self.captured_sql.lock().unwrap().push(query.to_string());
            Ok(Some(RawRow::from_pairs([("total", self.total)])))
        }

        fn query_all(&self, query: &str, _params: &BoundParams) -> Result<Vec<RawRow>, LifeError> {
            self.captured_sql.lock().unwrap().push(query.to_string());
            Ok(vec![RawRow::from_pairs([("id", "1"), ("title", "run")])])
        }
    }

    fn pages(mock: Arc<CountingExecutor>, per_page: u64) -> Pages {
        Pages::new(
            "todo_list",
            Arc::from("SELECT * FROM todo;\n"),
            BoundParams::new(),
            per_page,
            QueryExecutor::new(mock),
            None,
        )
    }

    #[test]
    fn test_sql_wrapping() {
        assert_eq!(
            count_sql("SELECT * FROM todo; "),
            "SELECT COUNT(*) AS total FROM (\nSELECT * FROM todo\n) AS lifequery_count"
        );
        assert_eq!(
            page_sql("SELECT * FROM todo", 10, 20),
            "SELECT * FROM (\nSELECT * FROM todo\n) AS lifequery_page LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_sql_wrapping_keeps_trailing_comment_on_its_line() {
        let sql = page_sql("SELECT * FROM todo -- every todo", 10, 0);
        assert!(sql.contains("-- every todo\n) AS lifequery_page"));
        assert!(count_sql("SELECT * FROM todo -- every todo").ends_with("\n) AS lifequery_count"));
    }

    #[test]
    fn test_page_metadata() {
        let mock = CountingExecutor::new(5);
        let pages = pages(mock.clone(), 2);
        let page = pages.page(2).unwrap();
        assert_eq!(page.current_page, 2);
        assert_eq!(page.total, 5);
        assert_eq!(page.page_count, 3);
        assert!(page.has_next());
        assert!(page.has_previous());
        assert!(mock.captured()[1].ends_with("LIMIT 2 OFFSET 2"));
    }

    #[test]
    fn test_total_is_counted_once() {
        let mock = CountingExecutor::new(3);
        let pages = pages(mock.clone(), 10);
        pages.page(1).unwrap();
        pages.page(1).unwrap();
        assert_eq!(pages.total().unwrap(), 3);
        let counts = mock.captured().iter().filter(|sql| sql.contains("COUNT(*)")).count();
        assert_eq!(counts, 1);
    }

    #[test]
    fn test_page_zero_is_invalid() {
        let pages = pages(CountingExecutor::new(3), 10);
        assert!(matches!(pages.page(0), Err(QueryError::InvalidPage { page: 0, .. })));
    }

    #[test]
    fn test_page_past_end_skips_fetch() {
        let mock = CountingExecutor::new(3);
        let pages = pages(mock.clone(), 2);
        let page = pages.page(7).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total, 3);
        assert!(!page.has_next());
        assert_eq!(mock.captured().len(), 1);
    }

    #[test]
    fn test_empty_result() {
        let pages = pages(CountingExecutor::new(0), 2);
        assert_eq!(pages.page_count().unwrap(), 0);
        assert_eq!(pages.iter().count(), 0);
    }

    #[test]
    fn test_iter_yields_every_page() {
        let pages = pages(CountingExecutor::new(5), 2);
        let numbers: Vec<u64> = pages.iter().map(|p| p.unwrap().current_page).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_entity_page() {
        #[derive(Debug, serde::Deserialize)]
        struct Todo {
            title: String,
        }
        let mock = CountingExecutor::new(1);
        let pages = Pages::new(
            "todo_list",
            Arc::from("SELECT * FROM todo"),
            BoundParams::new(),
            5,
            QueryExecutor::new(mock),
            Some(Arc::new(EntityBuilder::<Todo>::fields())),
        );
        let page = pages.entity_page::<Todo>(1).unwrap();
        assert_eq!(page.data[0].title, "run");
        assert!(matches!(pages.entity_page::<String>(1), Err(QueryError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_page_size_resolution() {
        let size = PageSize::FromParam("perPage".to_string());
        let mut params = BoundParams::new();
        params.insert("perPage", 2i64);
        assert_eq!(size.resolve("todo_list", &params).unwrap(), 2);

        params.insert("perPage", "1");
        let err = size.resolve("todo_list", &params).unwrap_err();
        assert!(matches!(err, QueryError::PerPageNotInt { ref actual, .. } if actual == "text"));

        params.insert("perPage", 0i64);
        assert!(matches!(size.resolve("todo_list", &params), Err(QueryError::PerPageNotInt { .. })));
    }

    #[test]
    fn test_page_size_validation() {
        let contract = QueryContract::new("todo_list", ResultShape::Page)
            .param(ParamDecl::new("perPage", ParamType::Integer));
        assert!(PageSize::FromParam("perPage".into()).validate(&contract).is_ok());
        assert!(matches!(
            PageSize::FromParam("pageSize".into()).validate(&contract),
            Err(QueryError::InvalidDynamicVarName { .. })
        ));
        assert!(matches!(
            PageSize::Fixed(0).validate(&contract),
            Err(QueryError::InvalidContract { .. })
        ));
    }
}
