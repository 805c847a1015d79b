//! A SQL statement engine with a two-phase prepare/evaluate protocol
//!
//! This crate turns structured commands into executable statements:
//! - Prepare resolves names and compiles query plans from catalog
//!   metadata alone, without touching row data
//! - Prepared statements declare the tables they read, the tables they
//!   write, and whether they need exclusive access, for an external
//!   lock manager to consume
//! - Evaluate checks privileges, runs the plan, fires trigger events
//!   and returns a result table

pub mod catalog;
pub mod command;
pub mod error;
pub mod parsing;
pub mod planning;
pub mod resolve;
pub mod statement;
pub mod types;

pub use catalog::{Catalog, Connection};
pub use command::{Command, CommandValue};
pub use error::{Error, Result};
pub use planning::{MutationPlan, Planner, QueryPlan};
pub use statement::{Statement, StatementKind, StatementState};
pub use types::schema::{ColumnDef, ConstraintDef, ObjectName, ResultTable};
pub use types::value::{Row, Value};
