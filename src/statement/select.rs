//! SELECT
//!
//! Prepare hands the whole select chain (simple or composite) plus the
//! ORDER BY keys to the planner; evaluate runs the compiled plan exactly
//! once. The plan tree rendering is emitted through `tracing::debug!` on
//! the error path and whenever the session plan-debug flag is set,
//! without altering the outcome either way.

use crate::catalog::Connection;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::planning::{ExecutionContext, Planner, QueryPlan};
use crate::types::query::{OrderByColumn, SelectExpr};
use crate::types::schema::{ObjectName, ResultTable};
use std::collections::BTreeSet;

#[derive(Debug)]
struct Prepared {
    plan: QueryPlan,
    labels: Vec<String>,
}

#[derive(Debug)]
pub struct Select {
    select: SelectExpr,
    order_by: Vec<OrderByColumn>,
    prepared: Option<Prepared>,
}

impl Select {
    pub fn from_command(command: &Command) -> Result<Self> {
        Ok(Select {
            select: command.select_field("select")?.clone(),
            order_by: command.order_by_field("order_by")?.to_vec(),
            prepared: None,
        })
    }

    fn prepared(&self) -> Result<&Prepared> {
        self.prepared
            .as_ref()
            .ok_or(Error::StatementState("unprepared"))
    }

    pub fn prepare(&mut self, conn: &Connection) -> Result<()> {
        let plan = Planner::new(conn).plan_query(&self.select, &self.order_by)?;
        let labels = plan.output_labels();
        self.prepared = Some(Prepared { plan, labels });
        Ok(())
    }

    pub fn evaluate(&self, conn: &Connection) -> Result<ResultTable> {
        let prepared = self.prepared()?;
        for table in self.reads_from()? {
            if !conn.can_select_from_table(&table) {
                return Err(Error::AccessDenied {
                    action: "select from".into(),
                    object: table.to_string(),
                });
            }
        }
        let ctx = ExecutionContext::new(conn);
        let outcome = prepared.plan.evaluate(&ctx);
        if outcome.is_err() || conn.plan_debug() {
            tracing::debug!("query plan:\n{}", prepared.plan.dump());
        }
        Ok(ResultTable::new(prepared.labels.clone(), outcome?))
    }

    pub fn reads_from(&self) -> Result<BTreeSet<ObjectName>> {
        let mut tables = BTreeSet::new();
        self.prepared()?.plan.discover_tables(&mut tables);
        Ok(tables)
    }
}
