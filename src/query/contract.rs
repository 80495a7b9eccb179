//! Query contracts: declared parameters and result shape
//!
//! A [`QueryContract`] is the abstract signature of one callable query. It is
//! built once, validated by the registry and never mutated afterwards.
//!
//! ```rust
//! use lifequery::{PageSize, ParamDecl, ParamType, QueryContract, ResultShape};
//!
//! let contract = QueryContract::new("todo_list_dynamic", ResultShape::Page)
//!     .sql("todo_list")
//!     .param(ParamDecl::new("perPage", ParamType::Integer))
//!     .per_page(PageSize::FromParam("perPage".to_string()));
//! assert_eq!(contract.sql_name(), "todo_list");
//! ```

use crate::executor::ExecMode;
use crate::query::binding::{ParamBinding, ValueProvider};
use crate::query::hydrate::ErasedEntityBuilder;
use crate::query::pagination::PageSize;
use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Declared semantic type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// Integer values only
    Integer,
    /// Reals; integers are accepted too
    Real,
    /// Text only
    Text,
    /// Any scalar
    #[default]
    Any,
}

impl ParamType {
    /// Does `value` satisfy this type? `NULL` is handled by the caller.
    pub fn accepts(self, value: &ScalarValue) -> bool {
        match (self, value) {
            (ParamType::Any, _) => true,
            (ParamType::Integer, ScalarValue::Integer(_)) => true,
            (ParamType::Real, ScalarValue::Real(_) | ScalarValue::Integer(_)) => true,
            (ParamType::Text, ScalarValue::Text(_)) => true,
            _ => false,
        }
    }

    /// Lowercase name used in messages.
    pub fn name(self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Real => "real",
            ParamType::Text => "text",
            ParamType::Any => "any",
        }
    }
}

/// Closed set of result shapes a contract can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// First row as a mapping, or nothing
    ScalarMap,
    /// Every row as a mapping
    ListOfMaps,
    /// First row as a hydrated entity, or nothing
    Entity,
    /// Every row as a hydrated entity
    ListOfEntities,
    /// Lazily paginated collection
    Page,
    /// Statement without a result set; reports whether any row was affected
    Mutate,
}

impl ResultShape {
    /// Executor mode for shapes fetched in one round-trip; `None` for [`ResultShape::Page`].
    pub fn exec_mode(self) -> Option<ExecMode> {
        match self {
            ResultShape::ScalarMap | ResultShape::Entity => Some(ExecMode::FetchOne),
            ResultShape::ListOfMaps | ResultShape::ListOfEntities => Some(ExecMode::FetchAll),
            ResultShape::Mutate => Some(ExecMode::Mutate),
            ResultShape::Page => None,
        }
    }

    /// Shapes that need an entity builder.
    pub fn needs_entity(self) -> bool {
        matches!(self, ResultShape::Entity | ResultShape::ListOfEntities)
    }
}

/// One declared parameter and how its value is obtained
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub(crate) name: String,
    pub(crate) ty: ParamType,
    pub(crate) binding: ParamBinding,
    pub(crate) default: Option<ScalarValue>,
    pub(crate) nullable: bool,
}

impl ParamDecl {
    /// A direct parameter: its value comes from the call argument of the same name.
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            binding: ParamBinding::Direct,
            default: None,
            nullable: false,
        }
    }

    /// Bake in a constant; call-time values for this slot are ignored.
    pub fn fixed(mut self, value: impl Into<ScalarValue>) -> Self {
        self.binding = ParamBinding::Fixed(value.into());
        self
    }

    /// Read the value from another declared direct parameter at call time.
    pub fn dynamic(mut self, source: impl Into<String>) -> Self {
        self.binding = ParamBinding::DynamicName(source.into());
        self
    }

    /// Fill the value from `provider` when the caller omits it.
    pub fn provided(mut self, provider: impl ValueProvider + 'static) -> Self {
        self.binding = ParamBinding::Provided(Arc::new(provider));
        self
    }

    /// Value used when a direct argument is omitted.
    pub fn default_value(mut self, value: impl Into<ScalarValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Accept `NULL` as a call-time value.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn ty(&self) -> ParamType {
        self.ty
    }

    /// Binding rule.
    pub fn binding(&self) -> &ParamBinding {
        &self.binding
    }
}

/// Abstract, named query operation
#[derive(Clone)]
pub struct QueryContract {
    pub(crate) name: String,
    pub(crate) sql: Option<String>,
    pub(crate) params: Vec<ParamDecl>,
    pub(crate) shape: ResultShape,
    pub(crate) page_size: Option<PageSize>,
    pub(crate) entity: Option<Arc<dyn ErasedEntityBuilder>>,
}

impl QueryContract {
    /// Declare a contract. The SQL resource defaults to the contract name.
    pub fn new(name: impl Into<String>, shape: ResultShape) -> Self {
        Self {
            name: name.into(),
            sql: None,
            params: Vec::new(),
            shape,
            page_size: None,
            entity: None,
        }
    }

    /// Use a differently named SQL resource.
    pub fn sql(mut self, resource: impl Into<String>) -> Self {
        self.sql = Some(resource.into());
        self
    }

    /// Append a parameter; declaration order is binding order.
    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    /// Items per page for [`ResultShape::Page`] contracts.
    pub fn per_page(mut self, size: PageSize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Entity builder for entity shapes (or entity pages).
    pub fn entity(mut self, builder: impl ErasedEntityBuilder + 'static) -> Self {
        self.entity = Some(Arc::new(builder));
        self
    }

    /// Contract name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL resource name.
    pub fn sql_name(&self) -> &str {
        self.sql.as_deref().unwrap_or(&self.name)
    }

    /// Declared parameters in order.
    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    /// Declared result shape.
    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    /// Page size rule, for page contracts.
    pub fn page_size(&self) -> Option<&PageSize> {
        self.page_size.as_ref()
    }

    pub(crate) fn entity_builder(&self) -> Option<&Arc<dyn ErasedEntityBuilder>> {
        self.entity.as_ref()
    }

    pub(crate) fn find_param(&self, name: &str) -> Option<&ParamDecl> {
        self.params.iter().find(|p| p.name == name)
    }
}

impl fmt::Debug for QueryContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContract")
            .field("name", &self.name)
            .field("sql", &self.sql_name())
            .field("params", &self.params)
            .field("shape", &self.shape)
            .field("page_size", &self.page_size)
            .field("entity", &self.entity.as_ref().map(|e| e.entity_name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_type_accepts() {
        assert!(ParamType::Integer.accepts(&ScalarValue::Integer(2)));
        assert!(!ParamType::Integer.accepts(&ScalarValue::Text("2".into())));
        assert!(ParamType::Real.accepts(&ScalarValue::Integer(2)));
        assert!(ParamType::Text.accepts(&ScalarValue::Text("run".into())));
        assert!(ParamType::Any.accepts(&ScalarValue::Real(0.5)));
    }

    #[test]
    fn test_exec_mode_per_shape() {
        assert_eq!(ResultShape::ScalarMap.exec_mode(), Some(ExecMode::FetchOne));
        assert_eq!(ResultShape::ListOfEntities.exec_mode(), Some(ExecMode::FetchAll));
        assert_eq!(ResultShape::Mutate.exec_mode(), Some(ExecMode::Mutate));
        assert_eq!(ResultShape::Page.exec_mode(), None);
    }

    #[test]
    fn test_sql_name_defaults_to_contract_name() {
        let contract = QueryContract::new("todo_item", ResultShape::ScalarMap);
        assert_eq!(contract.sql_name(), "todo_item");
    }

    #[test]
    fn test_shape_deserializes_snake_case() {
        let shape: ResultShape = serde_json::from_str(r#""list_of_maps""#).unwrap();
        assert_eq!(shape, ResultShape::ListOfMaps);
        let ty: ParamType = serde_json::from_str(r#""integer""#).unwrap();
        assert_eq!(ty, ParamType::Integer);
    }
}
