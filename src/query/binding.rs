//! Parameter binding
//!
//! Turns call-time [`Args`] into the ordered [`BoundParams`] submitted with
//! the SQL. Each declared parameter is bound by its [`ParamBinding`]:
//!
//! - `Direct` - the call argument of the same name (or the declared default)
//! - `Fixed` - a constant set at registration; call-time values are ignored
//! - `DynamicName` - the value of another declared direct parameter
//! - `Provided` - the call argument if given, otherwise a [`ValueProvider`]
//!
//! Dynamic references are validated once, when the contract is registered.
//! Indirection is single-level: a dynamic parameter must read from a direct one.

use crate::error::QueryError;
use crate::query::contract::{ParamDecl, QueryContract};
use crate::value::ScalarValue;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Supplies a value for a parameter the caller left out.
pub trait ValueProvider: Send + Sync + fmt::Debug {
    /// Produce the value for this invocation.
    fn provide(&self) -> ScalarValue;
}

/// The current UTC time as `YYYY-MM-DD HH:MM:SS`
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentTime;

impl ValueProvider for CurrentTime {
    fn provide(&self) -> ScalarValue {
        ScalarValue::Text(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

/// Always `1970-01-01 00:00:00`; deterministic stand-in for [`CurrentTime`]
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixEpochTime;

impl UnixEpochTime {
    /// Text form of the epoch.
    pub const TEXT: &'static str = "1970-01-01 00:00:00";
}

impl ValueProvider for UnixEpochTime {
    fn provide(&self) -> ScalarValue {
        ScalarValue::Text(Self::TEXT.to_string())
    }
}

/// How a declared parameter gets its value
#[derive(Debug, Clone)]
pub enum ParamBinding {
    /// From the matching call argument
    Direct,
    /// Constant baked in at registration
    Fixed(ScalarValue),
    /// From the named call argument of another parameter
    DynamicName(String),
    /// From the call argument if supplied, else from the provider
    Provided(Arc<dyn ValueProvider>),
}

/// Ordered name to value map submitted with the SQL
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundParams {
    values: Vec<(String, ScalarValue)>,
}

impl BoundParams {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value, keeping the first insertion position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ScalarValue>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    /// Look up a bound value.
    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    /// Number of bound values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for BoundParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Call-time arguments, named and/or positional
///
/// ```rust
/// use lifequery::Args;
///
/// let named = Args::new().with("id", "1").with("title", "run");
/// let positional = Args::new().arg("1").arg("run");
/// assert_eq!(named.len(), positional.len());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    named: Vec<(String, ScalarValue)>,
    positional: Vec<ScalarValue>,
}

impl Args {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named argument.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    /// Add a positional argument; positions follow parameter declaration order.
    pub fn arg(mut self, value: impl Into<ScalarValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Positional arguments from an iterator of like-typed values.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Self {
            named: Vec::new(),
            positional: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Total number of supplied values.
    pub fn len(&self) -> usize {
        self.named.len() + self.positional.len()
    }

    /// `true` when nothing was supplied.
    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }

    /// What the caller supplied, for failure logging before binding completes.
    /// Positional values are keyed `#0`, `#1`, ...
    pub(crate) fn summary(&self) -> BoundParams {
        let mut summary = BoundParams::new();
        for (idx, value) in self.positional.iter().enumerate() {
            summary.values.push((format!("#{idx}"), value.clone()));
        }
        for (name, value) in &self.named {
            summary.values.push((name.clone(), value.clone()));
        }
        summary
    }
}

/// Parameters that accept call-time values, in declaration order.
fn accepts_call_value(param: &ParamDecl) -> bool {
    matches!(param.binding, ParamBinding::Direct | ParamBinding::Provided(_))
}

/// Check dynamic references and fixed/default values of a contract.
///
/// # Errors
///
/// - [`QueryError::InvalidContract`] for duplicate parameter names or ill-typed constants
/// - [`QueryError::InvalidDynamicVarName`] when a dynamic parameter's source is not a
///   declared direct parameter
pub fn validate_params(contract: &QueryContract) -> Result<(), QueryError> {
    let mut seen = HashSet::new();
    for param in &contract.params {
        if !seen.insert(param.name.as_str()) {
            return Err(QueryError::InvalidContract {
                query: contract.name.clone(),
                reason: format!("parameter '{}' declared twice", param.name),
            });
        }
    }

    for param in &contract.params {
        match &param.binding {
            ParamBinding::DynamicName(source) => {
                let is_direct_source = source != &param.name
                    && contract
                        .find_param(source)
                        .is_some_and(|p| matches!(p.binding, ParamBinding::Direct));
                if !is_direct_source {
                    return Err(QueryError::InvalidDynamicVarName {
                        query: contract.name.clone(),
                        param: param.name.clone(),
                        source_name: source.clone(),
                    });
                }
            }
            ParamBinding::Fixed(value) => check_constant(contract, param, value, "fixed value")?,
            ParamBinding::Direct | ParamBinding::Provided(_) => {}
        }
        if let Some(default) = &param.default {
            check_constant(contract, param, default, "default value")?;
        }
    }
    Ok(())
}

fn check_constant(
    contract: &QueryContract,
    param: &ParamDecl,
    value: &ScalarValue,
    what: &str,
) -> Result<(), QueryError> {
    if value.is_null() || param.ty.accepts(value) {
        return Ok(());
    }
    Err(QueryError::InvalidContract {
        query: contract.name.clone(),
        reason: format!(
            "{what} of '{}' is {}, declared {}",
            param.name,
            value.type_name(),
            param.ty.name()
        ),
    })
}

/// Collect supplied arguments by parameter name, rejecting unknown and duplicate names.
fn collect_supplied(contract: &QueryContract, args: &Args) -> Result<Vec<(String, ScalarValue)>, QueryError> {
    let mut supplied: Vec<(String, ScalarValue)> = Vec::with_capacity(args.len());
    let mut slots = contract.params.iter().filter(|p| accepts_call_value(p));

    for (idx, value) in args.positional.iter().enumerate() {
        let param = slots.next().ok_or_else(|| QueryError::UnexpectedArgument {
            query: contract.name.clone(),
            argument: format!("#{idx}"),
        })?;
        supplied.push((param.name.clone(), value.clone()));
    }

    for (name, value) in &args.named {
        // a dynamic slot is filled from its source argument only
        let takes_value = contract
            .find_param(name)
            .is_some_and(|p| !matches!(p.binding, ParamBinding::DynamicName(_)));
        if !takes_value {
            return Err(QueryError::UnexpectedArgument {
                query: contract.name.clone(),
                argument: name.clone(),
            });
        }
        if supplied.iter().any(|(n, _)| n == name) {
            return Err(QueryError::DuplicateArgument {
                query: contract.name.clone(),
                argument: name.clone(),
            });
        }
        supplied.push((name.clone(), value.clone()));
    }
    Ok(supplied)
}

/// Resolve one direct value: supplied argument, else default, else `MissingArgument`.
/// The flag tells whether the caller supplied it.
fn direct_value(
    contract: &QueryContract,
    param: &ParamDecl,
    supplied: &[(String, ScalarValue)],
) -> Result<(ScalarValue, bool), QueryError> {
    if let Some((_, value)) = supplied.iter().find(|(n, _)| *n == param.name) {
        return Ok((value.clone(), true));
    }
    param
        .default
        .clone()
        .map(|value| (value, false))
        .ok_or_else(|| QueryError::MissingArgument {
            query: contract.name.clone(),
            param: param.name.clone(),
        })
}

fn check_type(
    contract: &QueryContract,
    param: &ParamDecl,
    value: &ScalarValue,
    from_caller: bool,
) -> Result<(), QueryError> {
    // NULL from a default, provider or fixed value was accepted at registration
    let null_ok = value.is_null() && (param.nullable || !from_caller);
    if null_ok || param.ty.accepts(value) {
        return Ok(());
    }
    Err(QueryError::TypeMismatch {
        query: contract.name.clone(),
        param: param.name.clone(),
        expected: param.ty.name().to_string(),
        actual: value.type_name().to_string(),
    })
}

/// Bind `args` against `contract`, producing values in declaration order.
///
/// # Errors
///
/// `MissingArgument`, `UnexpectedArgument`, `DuplicateArgument` or `TypeMismatch`;
/// nothing is sent to the database when binding fails.
pub fn bind(contract: &QueryContract, args: &Args) -> Result<BoundParams, QueryError> {
    let supplied = collect_supplied(contract, args)?;
    let mut bound = BoundParams::new();

    for param in &contract.params {
        let (value, from_caller) = match &param.binding {
            ParamBinding::Direct => direct_value(contract, param, &supplied)?,
            ParamBinding::Fixed(value) => (value.clone(), false),
            ParamBinding::DynamicName(source) => {
                let source_param = contract.find_param(source).ok_or_else(|| {
                    QueryError::InvalidDynamicVarName {
                        query: contract.name.clone(),
                        param: param.name.clone(),
                        source_name: source.clone(),
                    }
                })?;
                direct_value(contract, source_param, &supplied)?
            }
            ParamBinding::Provided(provider) => supplied
                .iter()
                .find(|(n, _)| *n == param.name)
                .map_or_else(|| (provider.provide(), false), |(_, v)| (v.clone(), true)),
        };
        check_type(contract, param, &value, from_caller)?;
        bound.values.push((param.name.clone(), value));
    }
    Ok(bound)
}
