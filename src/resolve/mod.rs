//! Name resolution
//!
//! Resolves column and table references against the sources a statement
//! brings into scope, turning names into physical column offsets during
//! prepare so evaluation never does string lookups.

pub mod checker;
pub mod from_set;
pub mod from_source;

pub use checker::ColumnChecker;
pub use from_set::{FromSet, ResolvedColumn};
pub use from_source::FromSource;
