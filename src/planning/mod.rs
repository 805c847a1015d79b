//! Planning and evaluation
//!
//! `Planner` compiles select bodies into `QueryPlan` trees during
//! prepare; `evaluate` executes prepared expressions and plans during
//! evaluate. Nothing in this module mutates table data.

pub mod evaluate;
pub mod plan;
pub mod planner;

pub use evaluate::ExecutionContext;
pub use plan::QueryPlan;
pub use planner::{MutationPlan, Planner};
