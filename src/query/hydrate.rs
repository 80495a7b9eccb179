//! Result hydration
//!
//! Converts executed rows into the contract's result shape. Maps are passed
//! through untouched; entities are built by an [`EntityBuilder`], either by
//! populating fields directly (serde) or through a declared constructor
//! argument list.
//!
//! ```rust
//! use lifequery::{EntityBuilder, RawRow};
//! use lifequery::query::hydrate::ErasedEntityBuilder;
//!
//! #[derive(Debug)]
//! struct TodoConstruct {
//!     id: String,
//!     title: String,
//! }
//!
//! let builder = EntityBuilder::constructor(["id", "title"], |args| {
//!     Ok(TodoConstruct {
//!         id: args.at(0)?,
//!         title: args.get("title")?,
//!     })
//! });
//!
//! let row = RawRow::from_pairs([("id", "1"), ("title", "run")]);
//! let todo = builder.build("todo_item", &row).unwrap().downcast::<TodoConstruct>().unwrap();
//! assert_eq!(todo.title, "run");
//! ```

use crate::error::QueryError;
use crate::executor::Executed;
use crate::query::contract::ResultShape;
use crate::query::facade::QueryOutput;
use crate::value::{RawRow, TryGetable, ValueExtractionError};
use serde::de::DeserializeOwned;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// A hydrated entity with its concrete type erased
pub struct Hydrated {
    entity: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl Hydrated {
    fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            entity: type_name::<T>(),
            value: Box::new(value),
        }
    }

    /// Type name of the contained entity.
    pub fn entity_name(&self) -> &'static str {
        self.entity
    }

    /// Does this hold a `T`?
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrow the entity as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Recover the concrete entity.
    ///
    /// # Errors
    ///
    /// [`QueryError::ShapeMismatch`] when the entity is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, QueryError> {
        let entity = self.entity;
        self.value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| QueryError::ShapeMismatch {
                expected: type_name::<T>().to_string(),
                actual: entity.to_string(),
            })
    }
}

impl fmt::Debug for Hydrated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hydrated").field("entity", &self.entity).finish_non_exhaustive()
    }
}

/// Object-safe entity builder held by a contract
pub trait ErasedEntityBuilder: Send + Sync {
    /// Type name of the entity produced.
    fn entity_name(&self) -> &str;

    /// Build one entity from `row`.
    ///
    /// # Errors
    ///
    /// [`QueryError::EntityConstructionFailed`] when the row cannot satisfy the entity.
    fn build(&self, query: &str, row: &RawRow) -> Result<Hydrated, QueryError>;
}

/// Named, ordered view of a row handed to an entity constructor
#[derive(Debug, Clone, Copy)]
pub struct ConstructorArgs<'a> {
    names: &'a [String],
    row: &'a RawRow,
}

impl<'a> ConstructorArgs<'a> {
    /// Value of the argument `name`.
    ///
    /// # Errors
    ///
    /// Fails when the column is missing or has the wrong type.
    pub fn get<V: TryGetable>(&self, name: &str) -> Result<V, ValueExtractionError> {
        self.row.try_get(name)
    }

    /// Value of the `idx`-th declared argument.
    ///
    /// # Errors
    ///
    /// Fails when `idx` is out of range or the value has the wrong type.
    pub fn at<V: TryGetable>(&self, idx: usize) -> Result<V, ValueExtractionError> {
        let name = self.names.get(idx).ok_or_else(|| {
            ValueExtractionError::ConversionError(format!(
                "constructor takes {} arguments, asked for #{idx}",
                self.names.len()
            ))
        })?;
        self.row.try_get(name)
    }

    /// Declared argument names in order.
    pub fn names(&self) -> &'a [String] {
        self.names
    }

    /// Number of declared arguments.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// `true` for a nullary constructor.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

type BuildFn<T> = dyn Fn(&RawRow) -> Result<T, String> + Send + Sync;

/// Builds entities of type `T` from rows
pub struct EntityBuilder<T> {
    ctor_args: Vec<String>,
    build: Arc<BuildFn<T>>,
}

impl<T: DeserializeOwned + Send + Sync + 'static> EntityBuilder<T> {
    /// Populate `T`'s fields from same-named columns.
    ///
    /// Values are taken as the driver produced them; unknown columns are ignored.
    pub fn fields() -> Self {
        Self {
            ctor_args: Vec::new(),
            build: Arc::new(|row: &RawRow| {
                serde_json::from_value::<T>(row.to_json()).map_err(|e| e.to_string())
            }),
        }
    }
}

impl<T: Send + Sync + 'static> EntityBuilder<T> {
    /// Build `T` through a constructor taking the named columns in order.
    ///
    /// Every declared argument must be present in the row.
    pub fn constructor<I, S, F>(args: I, ctor: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(ConstructorArgs<'_>) -> Result<T, ValueExtractionError> + Send + Sync + 'static,
    {
        let names: Vec<String> = args.into_iter().map(Into::into).collect();
        let ctor_names = names.clone();
        Self {
            ctor_args: names,
            build: Arc::new(move |row: &RawRow| {
                if let Some(missing) = ctor_names.iter().find(|n| row.get(n).is_none()) {
                    return Err(format!("no column for constructor argument '{missing}'"));
                }
                ctor(ConstructorArgs {
                    names: &ctor_names,
                    row,
                })
                .map_err(|e| e.to_string())
            }),
        }
    }

    /// Declared constructor arguments; empty for field population.
    pub fn constructor_args(&self) -> &[String] {
        &self.ctor_args
    }
}

impl<T> Clone for EntityBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            ctor_args: self.ctor_args.clone(),
            build: Arc::clone(&self.build),
        }
    }
}

impl<T> fmt::Debug for EntityBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBuilder")
            .field("entity", &type_name::<T>())
            .field("ctor_args", &self.ctor_args)
            .finish()
    }
}

impl<T: Send + Sync + 'static> ErasedEntityBuilder for EntityBuilder<T> {
    fn entity_name(&self) -> &str {
        type_name::<T>()
    }

    fn build(&self, query: &str, row: &RawRow) -> Result<Hydrated, QueryError> {
        (self.build)(row).map(Hydrated::new).map_err(|reason| {
            QueryError::EntityConstructionFailed {
                query: query.to_string(),
                entity: type_name::<T>().to_string(),
                reason,
            }
        })
    }
}

/// Build one entity per row, preserving order.
pub(crate) fn build_all(
    query: &str,
    builder: &dyn ErasedEntityBuilder,
    rows: &[RawRow],
) -> Result<Vec<Hydrated>, QueryError> {
    rows.iter().map(|row| builder.build(query, row)).collect()
}

fn missing_builder(query: &str) -> QueryError {
    QueryError::InvalidContract {
        query: query.to_string(),
        reason: "entity shape without an entity builder".to_string(),
    }
}

/// Convert an executed statement into the output for `shape`.
///
/// # Errors
///
/// [`QueryError::EntityConstructionFailed`] when a row cannot be hydrated,
/// [`QueryError::ShapeMismatch`] when `executed` does not fit `shape`.
pub fn hydrate(
    query: &str,
    executed: Executed,
    shape: ResultShape,
    builder: Option<&dyn ErasedEntityBuilder>,
) -> Result<QueryOutput, QueryError> {
    match (shape, executed) {
        (ResultShape::ScalarMap, Executed::One(row)) => Ok(QueryOutput::Row(row)),
        (ResultShape::ListOfMaps, Executed::All(rows)) => Ok(QueryOutput::Rows(rows)),
        (ResultShape::Mutate, Executed::Affected(affected)) => Ok(QueryOutput::Affected(affected)),
        (ResultShape::Entity, Executed::One(row)) => {
            let builder = builder.ok_or_else(|| missing_builder(query))?;
            row.map(|row| builder.build(query, &row))
                .transpose()
                .map(QueryOutput::Entity)
        }
        (ResultShape::ListOfEntities, Executed::All(rows)) => {
            let builder = builder.ok_or_else(|| missing_builder(query))?;
            build_all(query, builder, &rows).map(QueryOutput::Entities)
        }
        (shape, executed) => Err(QueryError::ShapeMismatch {
            expected: format!("{shape:?}"),
            actual: format!("{executed:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Todo {
        id: String,
        title: String,
    }

    #[derive(Debug, PartialEq)]
    struct TodoConstruct {
        id: String,
        title: String,
    }

    fn construct_builder() -> EntityBuilder<TodoConstruct> {
        EntityBuilder::constructor(["id", "title"], |args| {
            Ok(TodoConstruct {
                id: args.at(0)?,
                title: args.at(1)?,
            })
        })
    }

    fn run_row() -> RawRow {
        RawRow::from_pairs([("id", "1"), ("title", "run")])
    }

    #[test]
    fn test_fields_builder() {
        let builder = EntityBuilder::<Todo>::fields();
        let todo: Todo = builder.build("todo_item", &run_row()).unwrap().downcast().unwrap();
        assert_eq!(
            todo,
            Todo {
                id: "1".into(),
                title: "run".into()
            }
        );
    }

    #[test]
    fn test_fields_builder_missing_column() {
        let builder = EntityBuilder::<Todo>::fields();
        let row = RawRow::from_pairs([("id", "1")]);
        let err = builder.build("todo_item", &row).unwrap_err();
        assert!(matches!(err, QueryError::EntityConstructionFailed { .. }));
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_constructor_builder_uses_declared_order() {
        let hydrated = construct_builder().build("todo_item", &run_row()).unwrap();
        assert!(hydrated.is::<TodoConstruct>());
        assert_eq!(hydrated.downcast_ref::<TodoConstruct>().unwrap().id, "1");
    }

    #[test]
    fn test_constructor_missing_argument() {
        let row = RawRow::from_pairs([("id", "1"), ("name", "run")]);
        let err = construct_builder().build("todo_item", &row).unwrap_err();
        match err {
            QueryError::EntityConstructionFailed { reason, .. } => assert!(reason.contains("'title'")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_downcast_to_wrong_type() {
        let hydrated = construct_builder().build("todo_item", &run_row()).unwrap();
        let err = hydrated.downcast::<Todo>().unwrap_err();
        assert!(matches!(err, QueryError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_hydrate_maps_untouched() {
        let out = hydrate(
            "todo_item",
            Executed::One(Some(run_row())),
            ResultShape::ScalarMap,
            None,
        )
        .unwrap();
        assert_eq!(out.into_row().unwrap(), Some(run_row()));
    }

    #[test]
    fn test_hydrate_entity_without_row() {
        let builder = construct_builder();
        let out = hydrate("todo_item", Executed::One(None), ResultShape::Entity, Some(&builder)).unwrap();
        assert!(out.into_entity::<TodoConstruct>().unwrap().is_none());
    }

    #[test]
    fn test_hydrate_entities_in_order() {
        let builder = construct_builder();
        let rows = vec![run_row(), RawRow::from_pairs([("id", "2"), ("title", "walk")])];
        let out = hydrate("todo_list", Executed::All(rows), ResultShape::ListOfEntities, Some(&builder)).unwrap();
        let todos = out.into_entities::<TodoConstruct>().unwrap();
        assert_eq!(todos[1].title, "walk");
    }

    #[test]
    fn test_hydrate_rejects_mismatched_execution() {
        let err = hydrate("todo_add", Executed::All(vec![]), ResultShape::Mutate, None).unwrap_err();
        assert!(matches!(err, QueryError::ShapeMismatch { .. }));
    }
}
