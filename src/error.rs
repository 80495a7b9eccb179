//! Error taxonomy for contract registration and invocation
//!
//! Every failure a caller can see from a façade invocation is a
//! [`QueryError`]. Misconfiguration (a contract that can never work) and
//! operational faults (the database said no) are distinguished by
//! [`QueryError::is_programming_error`].

use crate::executor::LifeError;
use crate::value::ValueExtractionError;
use std::fmt;

/// Errors raised while registering or invoking query contracts
#[derive(Debug)]
pub enum QueryError {
    /// No SQL resource exists under this name
    ResourceNotFound(String),
    /// A direct parameter received no argument and has no default
    MissingArgument { query: String, param: String },
    /// An argument matches no declared parameter, or too many positional arguments
    UnexpectedArgument { query: String, argument: String },
    /// The same argument name was supplied twice
    DuplicateArgument { query: String, argument: String },
    /// A dynamic-name parameter (or page size) points at a parameter the contract does not declare
    InvalidDynamicVarName {
        query: String,
        param: String,
        source_name: String,
    },
    /// A bound value has the wrong runtime type for its declared parameter type
    TypeMismatch {
        query: String,
        param: String,
        expected: String,
        actual: String,
    },
    /// The dynamically supplied page size is not a positive integer
    PerPageNotInt {
        query: String,
        param: String,
        actual: String,
    },
    /// The database rejected or failed the statement
    QueryExecutionFailed { query: String, source: LifeError },
    /// A row could not be turned into the contract's entity
    EntityConstructionFailed {
        query: String,
        entity: String,
        reason: String,
    },
    /// Page numbers start at 1
    InvalidPage { query: String, page: u64 },
    /// The result was requested as a different shape or entity type than the contract produces
    ShapeMismatch { expected: String, actual: String },
    /// Two contracts registered under one name
    DuplicateContract(String),
    /// No contract registered under this name
    UnknownContract(String),
    /// A contract declaration is inconsistent
    InvalidContract { query: String, reason: String },
    /// Configuration could not be loaded
    Config(String),
}

impl QueryError {
    /// `true` for errors caused by contract or call-site mistakes rather than the database.
    pub fn is_programming_error(&self) -> bool {
        !matches!(
            self,
            QueryError::QueryExecutionFailed { .. } | QueryError::ResourceNotFound(_) | QueryError::Config(_)
        )
    }

    /// Build an [`QueryError::EntityConstructionFailed`] from a value extraction failure.
    pub fn entity(query: &str, entity: &str, err: &ValueExtractionError) -> Self {
        QueryError::EntityConstructionFailed {
            query: query.to_string(),
            entity: entity.to_string(),
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::ResourceNotFound(name) => write!(f, "SQL resource not found: {name}"),
            QueryError::MissingArgument { query, param } => {
                write!(f, "Missing argument '{param}' for query {query}")
            }
            QueryError::UnexpectedArgument { query, argument } => {
                write!(f, "Unexpected argument '{argument}' for query {query}")
            }
            QueryError::DuplicateArgument { query, argument } => {
                write!(f, "Argument '{argument}' given twice for query {query}")
            }
            QueryError::InvalidDynamicVarName {
                query,
                param,
                source_name,
            } => write!(
                f,
                "Invalid dynamic variable name in query {query}: '{param}' reads from '{source_name}', which is not a declared direct parameter"
            ),
            QueryError::TypeMismatch {
                query,
                param,
                expected,
                actual,
            } => write!(
                f,
                "Type mismatch for '{param}' in query {query}: expected {expected}, got {actual}"
            ),
            QueryError::PerPageNotInt {
                query,
                param,
                actual,
            } => write!(
                f,
                "Per-page value '{param}' in query {query} must be a positive integer, got {actual}"
            ),
            QueryError::QueryExecutionFailed { query, source } => {
                write!(f, "Query {query} failed: {source}")
            }
            QueryError::EntityConstructionFailed {
                query,
                entity,
                reason,
            } => write!(f, "Cannot construct {entity} for query {query}: {reason}"),
            QueryError::InvalidPage { query, page } => {
                write!(f, "Invalid page {page} for query {query}: pages start at 1")
            }
            QueryError::ShapeMismatch { expected, actual } => {
                write!(f, "Shape mismatch: expected {expected}, got {actual}")
            }
            QueryError::DuplicateContract(name) => {
                write!(f, "Query contract '{name}' is already registered")
            }
            QueryError::UnknownContract(name) => {
                write!(f, "No query contract registered as '{name}'")
            }
            QueryError::InvalidContract { query, reason } => {
                write!(f, "Invalid query contract {query}: {reason}")
            }
            QueryError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::QueryExecutionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for QueryError {
    fn from(err: config::ConfigError) -> Self {
        QueryError::Config(err.to_string())
    }
}
