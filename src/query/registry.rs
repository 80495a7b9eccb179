//! Contract registry
//!
//! Contracts are collected by a [`QueryRegistryBuilder`], validated and
//! bound to their SQL once, and then served as immutable [`QueryFacade`]s.
//! A contract that can never work (dangling dynamic reference, missing SQL,
//! entity shape without a builder) fails the build, not the first call.
//!
//! ```rust
//! use std::sync::Arc;
//! use lifequery::{Args, ParamDecl, ParamType, QueryContract, QueryLog, QueryRegistry, ResultShape, SqlMap, SqliteExecutor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = SqliteExecutor::open_in_memory()?;
//! db.execute_batch("CREATE TABLE todo (id TEXT, title TEXT); INSERT INTO todo VALUES ('1', 'run');")?;
//!
//! let sql = SqlMap::new().with("todo_item", "SELECT * FROM todo WHERE id = :id");
//! let registry = QueryRegistry::builder(Arc::new(sql), Arc::new(db), Arc::new(QueryLog::new()))
//!     .register(QueryContract::new("todo_item", ResultShape::ScalarMap).param(ParamDecl::new("id", ParamType::Text)))
//!     .build()?;
//!
//! let row = registry.call("todo_item", Args::new().with("id", "1"))?.into_row()?;
//! assert!(row.is_some());
//! assert!(registry.log().contains("query: todo_item"));
//! # Ok(())
//! # }
//! ```

use crate::error::QueryError;
use crate::executor::{LifeExecutor, QueryExecutor};
use crate::query::binding::{validate_params, Args};
use crate::query::contract::{QueryContract, ResultShape};
use crate::query::facade::{QueryFacade, QueryOutput};
use crate::query_log::QueryLog;
use crate::resource::SqlResolver;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Collects contracts before validation
pub struct QueryRegistryBuilder {
    resolver: Arc<dyn SqlResolver>,
    executor: Arc<dyn LifeExecutor>,
    log: Arc<QueryLog>,
    contracts: Vec<QueryContract>,
}

impl QueryRegistryBuilder {
    /// Add a contract. Checked in [`QueryRegistryBuilder::build`].
    pub fn register(mut self, contract: QueryContract) -> Self {
        self.contracts.push(contract);
        self
    }

    /// Add several contracts.
    pub fn register_all(mut self, contracts: impl IntoIterator<Item = QueryContract>) -> Self {
        self.contracts.extend(contracts);
        self
    }

    /// Validate every contract, resolve its SQL and build the registry.
    ///
    /// # Errors
    ///
    /// The first failing contract's error: `DuplicateContract`,
    /// `InvalidDynamicVarName`, `InvalidContract` or `ResourceNotFound`.
    pub fn build(self) -> Result<QueryRegistry, QueryError> {
        let executor = QueryExecutor::new(self.executor);
        let mut facades: HashMap<String, Arc<QueryFacade>> = HashMap::with_capacity(self.contracts.len());
        let mut names = Vec::with_capacity(self.contracts.len());

        for contract in self.contracts {
            if facades.contains_key(contract.name()) {
                return Err(QueryError::DuplicateContract(contract.name().to_string()));
            }
            validate_contract(&contract)?;
            let sql = self.resolver.resolve(contract.sql_name())?;
            log::debug!(target: "lifequery", "registered query {} ({:?})", contract.name(), contract.shape());

            let name = contract.name().to_string();
            let facade = QueryFacade::new(Arc::new(contract), sql, executor.clone(), Arc::clone(&self.log));
            names.push(name.clone());
            facades.insert(name, Arc::new(facade));
        }

        Ok(QueryRegistry {
            facades,
            names,
            log: self.log,
        })
    }
}

/// Registration-time checks that do not need the SQL.
fn validate_contract(contract: &QueryContract) -> Result<(), QueryError> {
    validate_params(contract)?;

    let invalid = |reason: &str| QueryError::InvalidContract {
        query: contract.name().to_string(),
        reason: reason.to_string(),
    };

    if contract.shape().needs_entity() && contract.entity_builder().is_none() {
        return Err(invalid("entity shape without an entity builder"));
    }
    match (contract.shape(), contract.page_size()) {
        (ResultShape::Page, Some(size)) => size.validate(contract),
        (ResultShape::Page, None) => Err(invalid("paginated contract without a page size")),
        (_, Some(_)) => Err(invalid("page size on a contract that is not paginated")),
        (_, None) => Ok(()),
    }
}

/// Immutable set of registered façades, keyed by contract name
pub struct QueryRegistry {
    facades: HashMap<String, Arc<QueryFacade>>,
    names: Vec<String>,
    log: Arc<QueryLog>,
}

impl QueryRegistry {
    /// Start collecting contracts. Every façade shares `log`.
    pub fn builder(
        resolver: Arc<dyn SqlResolver>,
        executor: Arc<dyn LifeExecutor>,
        log: Arc<QueryLog>,
    ) -> QueryRegistryBuilder {
        QueryRegistryBuilder {
            resolver,
            executor,
            log,
            contracts: Vec::new(),
        }
    }

    /// The façade registered under `name`.
    ///
    /// # Errors
    ///
    /// [`QueryError::UnknownContract`] when nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<QueryFacade>, QueryError> {
        self.facades
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::UnknownContract(name.to_string()))
    }

    /// Look up and invoke a contract.
    ///
    /// # Errors
    ///
    /// [`QueryError::UnknownContract`], or whatever the invocation returns.
    pub fn call(&self, name: &str, args: Args) -> Result<QueryOutput, QueryError> {
        self.get(name)?.call(args)
    }

    /// Contract names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of registered contracts.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// `true` when no contract is registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The shared log.
    pub fn log(&self) -> &Arc<QueryLog> {
        &self.log
    }
}

impl fmt::Debug for QueryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRegistry")
            .field("contracts", &self.names)
            .field("log", &self.log)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LifeError;
    use crate::query::binding::BoundParams;
    use crate::query::contract::{ParamDecl, ParamType};
    use crate::query::hydrate::EntityBuilder;
    use crate::query::pagination::PageSize;
    use crate::resource::SqlMap;
    use crate::value::RawRow;

    struct NoDatabase;

    impl LifeExecutor for NoDatabase {
        fn execute(&self, _query: &str, _params: &BoundParams) -> Result<u64, LifeError> {
            Err(LifeError::Other("no database".to_string()))
        }

        fn query_one(&self, _query: &str, _params: &BoundParams) -> Result<Option<RawRow>, LifeError> {
            Err(LifeError::Other("no database".to_string()))
        }

        fn query_all(&self, _query: &str, _params: &BoundParams) -> Result<Vec<RawRow>, LifeError> {
            Err(LifeError::Other("no database".to_string()))
        }
    }

    fn builder() -> QueryRegistryBuilder {
        let sql = SqlMap::new()
            .with("todo_item", "SELECT * FROM todo WHERE id = :id")
            .with("todo_list", "SELECT * FROM todo");
        QueryRegistry::builder(Arc::new(sql), Arc::new(NoDatabase), Arc::new(QueryLog::new()))
    }

    fn todo_item() -> QueryContract {
        QueryContract::new("todo_item", ResultShape::ScalarMap).param(ParamDecl::new("id", ParamType::Text))
    }

    #[test]
    fn test_build_and_lookup() {
        let registry = builder()
            .register(todo_item())
            .register(QueryContract::new("todo_list", ResultShape::ListOfMaps))
            .build()
            .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["todo_item", "todo_list"]);
        assert_eq!(registry.get("todo_item").unwrap().sql(), "SELECT * FROM todo WHERE id = :id");
        assert!(matches!(registry.get("todo_gone"), Err(QueryError::UnknownContract(_))));
    }

    #[test]
    fn test_duplicate_contract() {
        let err = builder().register(todo_item()).register(todo_item()).build().unwrap_err();
        assert!(matches!(err, QueryError::DuplicateContract(ref name) if name == "todo_item"));
    }

    #[test]
    fn test_missing_sql_fails_build() {
        let err = builder()
            .register(QueryContract::new("todo_add", ResultShape::Mutate))
            .build()
            .unwrap_err();
        assert!(matches!(err, QueryError::ResourceNotFound(ref name) if name == "todo_add"));
    }

    #[test]
    fn test_dangling_per_page_source() {
        let contract = QueryContract::new("todo_list_dynamic", ResultShape::Page)
            .sql("todo_list")
            .param(ParamDecl::new("perPage", ParamType::Integer))
            .per_page(PageSize::FromParam("pageSize".into()));
        let err = builder().register(contract).build().unwrap_err();
        assert!(matches!(err, QueryError::InvalidDynamicVarName { .. }));
        assert!(err.is_programming_error());
    }

    #[test]
    fn test_shape_consistency() {
        let entity_without_builder = QueryContract::new("todo_list", ResultShape::ListOfEntities);
        assert!(matches!(
            builder().register(entity_without_builder).build(),
            Err(QueryError::InvalidContract { .. })
        ));

        let page_without_size = QueryContract::new("todo_list", ResultShape::Page);
        assert!(matches!(
            builder().register(page_without_size).build(),
            Err(QueryError::InvalidContract { .. })
        ));

        let size_on_list = QueryContract::new("todo_list", ResultShape::ListOfMaps).per_page(PageSize::Fixed(5));
        assert!(matches!(
            builder().register(size_on_list).build(),
            Err(QueryError::InvalidContract { .. })
        ));

        #[derive(serde::Deserialize)]
        struct Todo {
            #[allow(dead_code)]
            id: String,
        }
        let entity_page = QueryContract::new("todo_list", ResultShape::Page)
            .per_page(PageSize::Fixed(5))
            .entity(EntityBuilder::<Todo>::fields());
        assert!(builder().register(entity_page).build().is_ok());
    }

    #[test]
    fn test_call_unknown_contract_is_not_logged() {
        let registry = builder().register(todo_item()).build().unwrap();
        assert!(registry.call("todo_gone", Args::new()).is_err());
        assert!(registry.log().is_empty());
    }
}
