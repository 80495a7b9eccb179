//! Configuration
//!
//! [`LifeQueryConfig::load`] reads `config/config.toml` (optional) and then
//! `LIFEQUERY__*` environment variables, section `[lifequery]`. Environment
//! keys keep their prefix, so `LIFEQUERY__SQL_DIR` overrides `lifequery.sql_dir`:
//!
//! ```toml
//! [lifequery]
//! database_url = "sqlite::memory:"
//! sql_dir = "sql"
//!
//! [[lifequery.queries]]
//! name = "todo_list"
//! shape = "page"
//! per_page_param = "perPage"
//! params = [{ name = "perPage", type = "integer" }]
//! ```
//!
//! Declared queries cover the map, page and mutate shapes; entity contracts
//! need a Rust type and are registered in code.

use crate::connection::MayPostgresExecutor;
use crate::error::QueryError;
use crate::executor::LifeExecutor;
use crate::query::contract::{ParamDecl, ParamType, QueryContract, ResultShape};
use crate::query::pagination::PageSize;
use crate::query::registry::{QueryRegistry, QueryRegistryBuilder};
use crate::query_log::QueryLog;
use crate::resource::SqlDir;
use crate::sqlite::SqliteExecutor;
use crate::value::ScalarValue;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "LIFEQUERY";

/// One declared parameter
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ParamConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: ParamType,
    /// Constant value; the parameter ignores call-time input
    #[serde(default)]
    pub fixed_value: Option<ScalarValue>,
    /// Read the value from this other parameter
    #[serde(default)]
    pub dynamic_source_name: Option<String>,
    #[serde(default)]
    pub default: Option<ScalarValue>,
}

impl ParamConfig {
    fn to_decl(&self, query: &str) -> Result<ParamDecl, QueryError> {
        let mut decl = ParamDecl::new(self.name.clone(), self.ty);
        match (&self.fixed_value, &self.dynamic_source_name) {
            (Some(_), Some(_)) => {
                return Err(QueryError::Config(format!(
                    "query {query}: parameter {} sets fixed_value and dynamic_source_name",
                    self.name
                )))
            }
            (Some(value), None) => decl = decl.fixed(value.clone()),
            (None, Some(source)) => decl = decl.dynamic(source.clone()),
            (None, None) => {}
        }
        if let Some(default) = &self.default {
            decl = decl.default_value(default.clone());
        }
        Ok(decl)
    }
}

/// One declared query contract
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QueryDeclConfig {
    pub name: String,
    /// SQL resource name; defaults to `name`
    #[serde(default)]
    pub sql: Option<String>,
    pub shape: ResultShape,
    #[serde(default)]
    pub params: Vec<ParamConfig>,
    /// Fixed page size
    #[serde(default)]
    pub per_page: Option<u64>,
    /// Take the page size from this parameter
    #[serde(default)]
    pub per_page_param: Option<String>,
}

impl QueryDeclConfig {
    /// Build the contract this declaration describes.
    ///
    /// # Errors
    ///
    /// [`QueryError::Config`] when both `per_page` and `per_page_param` are set,
    /// or a parameter is both fixed and dynamic.
    pub fn to_contract(&self) -> Result<QueryContract, QueryError> {
        let mut contract = QueryContract::new(self.name.clone(), self.shape);
        if let Some(sql) = &self.sql {
            contract = contract.sql(sql.clone());
        }
        for param in &self.params {
            contract = contract.param(param.to_decl(&self.name)?);
        }
        match (self.per_page, &self.per_page_param) {
            (Some(_), Some(_)) => {
                return Err(QueryError::Config(format!(
                    "query {}: set per_page or per_page_param, not both",
                    self.name
                )))
            }
            (Some(n), None) => contract = contract.per_page(PageSize::Fixed(n)),
            (None, Some(param)) => contract = contract.per_page(PageSize::FromParam(param.clone())),
            (None, None) => {}
        }
        Ok(contract)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LifeQueryConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_sql_dir")]
    pub sql_dir: String,
    #[serde(default)]
    pub queries: Vec<QueryDeclConfig>,
}

impl Default for LifeQueryConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            sql_dir: default_sql_dir(),
            queries: Vec::new(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_sql_dir() -> String {
    "sql".to_string()
}

impl LifeQueryConfig {
    /// Load from `config/config.toml`, then `LIFEQUERY__*` env vars.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the merged sources cannot be read or the
    /// `[lifequery]` section is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from `path` (optional), then `LIFEQUERY__*` env vars.
    ///
    /// # Errors
    ///
    /// As [`LifeQueryConfig::load`].
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").keep_prefix(true))
            .build()?;

        match settings.get::<LifeQueryConfig>("lifequery") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => {
                log::debug!(target: "lifequery", "no [lifequery] section in {path}, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Message(format!(
                "lifequery configuration could not be loaded from file or environment: {e}"
            ))),
        }
    }

    /// Resolver over `sql_dir`.
    pub fn sql_dir(&self) -> SqlDir {
        SqlDir::new(&self.sql_dir)
    }

    /// Open the database named by `database_url`: `sqlite:<path>` (or
    /// `sqlite::memory:`) for SQLite, anything else is handed to PostgreSQL.
    ///
    /// # Errors
    ///
    /// [`QueryError::Config`] if the connection cannot be established.
    pub fn open_executor(&self) -> Result<Arc<dyn LifeExecutor>, QueryError> {
        if let Some(path) = self.database_url.strip_prefix("sqlite:") {
            let executor = if path == ":memory:" || path.is_empty() {
                SqliteExecutor::open_in_memory()
            } else {
                SqliteExecutor::open(path)
            }
            .map_err(|e| QueryError::Config(format!("cannot open {}: {e}", self.database_url)))?;
            return Ok(Arc::new(executor));
        }
        let executor = MayPostgresExecutor::connect(&self.database_url)
            .map_err(|e| QueryError::Config(format!("cannot connect to database: {e}")))?;
        Ok(Arc::new(executor))
    }

    /// Contracts declared under `queries`.
    ///
    /// # Errors
    ///
    /// [`QueryError::Config`] for an inconsistent declaration.
    pub fn contracts(&self) -> Result<Vec<QueryContract>, QueryError> {
        self.queries.iter().map(QueryDeclConfig::to_contract).collect()
    }

    /// Registry builder preloaded with the declared contracts, over `sql_dir`
    /// and `executor`. More contracts (entities) can be registered before building.
    ///
    /// # Errors
    ///
    /// [`QueryError::Config`] for an inconsistent declaration.
    pub fn registry_builder(
        &self,
        executor: Arc<dyn LifeExecutor>,
        log: Arc<QueryLog>,
    ) -> Result<QueryRegistryBuilder, QueryError> {
        Ok(QueryRegistry::builder(Arc::new(self.sql_dir()), executor, log).register_all(self.contracts()?))
    }
}

impl QueryRegistry {
    /// Open the configured database and register every declared contract.
    ///
    /// # Errors
    ///
    /// Configuration, connection or registration failures.
    pub fn from_config(config: &LifeQueryConfig, log: Arc<QueryLog>) -> Result<Self, QueryError> {
        config.registry_builder(config.open_executor()?, log)?.build()
    }
}
