//! Value model for lifequery
//!
//! ## Types
//!
//! - **`ScalarValue`** - text, number or null; every argument, bound parameter and cell
//! - **`RawRow`** - ordered column name to `ScalarValue` mapping
//! - **`ValueType`** - converts Rust primitives into `ScalarValue`
//! - **`TryGetable`** - extracts Rust primitives back out, with `ValueExtractionError`

pub mod row;
pub mod try_getable;
pub mod types;

pub(crate) mod postgres;

pub use row::RawRow;
pub use try_getable::{TryGetable, ValueExtractionError};
pub use types::{ScalarValue, ValueType};
