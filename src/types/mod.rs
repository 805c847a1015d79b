//! Core data types: values, column types, expressions, schema objects.

pub mod coercion;
pub mod data_type;
pub mod expression;
pub mod query;
pub mod schema;
pub mod value;

pub use data_type::SqlType;
pub use expression::{ColumnRef, Expression};
pub use schema::{ColumnDef, ConstraintDef, ObjectName, ResultTable, TableSchema};
pub use value::{Row, Value};
