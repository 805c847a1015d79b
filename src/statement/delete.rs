//! DELETE
//!
//! Shares the UPDATE machinery: the planner builds a row-identity plan
//! from the WHERE clause and optional LIMIT, and evaluation hands the
//! exact affected row set to the catalog.

use super::update::row_limit;
use crate::catalog::{Connection, TriggerEvent, TriggerKind};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::planning::{ExecutionContext, MutationPlan, Planner, QueryPlan};
use crate::types::expression::Expression;
use crate::types::schema::{ObjectName, ResultTable};
use std::collections::BTreeSet;

#[derive(Debug)]
struct Prepared {
    table: ObjectName,
    plan: QueryPlan,
}

#[derive(Debug)]
pub struct Delete {
    table_name: String,
    where_clause: Option<Expression>,
    limit: Option<i64>,
    prepared: Option<Prepared>,
}

impl Delete {
    pub fn from_command(command: &Command) -> Result<Self> {
        Ok(Delete {
            table_name: command.str_field("table")?.to_string(),
            where_clause: command.opt_expr_field("where")?.cloned(),
            limit: command.opt_int_field("limit")?,
            prepared: None,
        })
    }

    fn prepared(&self) -> Result<&Prepared> {
        self.prepared
            .as_ref()
            .ok_or(Error::StatementState("unprepared"))
    }

    pub fn prepare(&mut self, conn: &Connection) -> Result<()> {
        let MutationPlan { table, plan, .. } = Planner::new(conn).plan_mutation(
            &self.table_name,
            self.where_clause.as_ref(),
            row_limit(self.limit)?,
        )?;
        self.prepared = Some(Prepared { table, plan });
        Ok(())
    }

    pub fn evaluate(&self, conn: &Connection) -> Result<ResultTable> {
        let prepared = self.prepared()?;
        if !conn.can_delete_from_table(&prepared.table) {
            return Err(Error::AccessDenied {
                action: "delete from".into(),
                object: prepared.table.to_string(),
            });
        }
        let ctx = ExecutionContext::new(conn);
        let affected = prepared.plan.evaluate_with_ids(&ctx)?;
        let ids: Vec<_> = affected.into_iter().map(|(id, _)| id).collect();
        let count = conn.delete_rows(&prepared.table, &ids)?;
        if count > 0 {
            conn.notify_trigger_event(TriggerEvent {
                kind: TriggerKind::Delete,
                table: prepared.table.clone(),
                count,
            });
        }
        Ok(ResultTable::affected(count))
    }

    pub fn reads_from(&self, conn: &Connection) -> Result<BTreeSet<ObjectName>> {
        let prepared = self.prepared()?;
        let mut tables = BTreeSet::new();
        prepared.plan.discover_tables(&mut tables);
        for linked in conn.relationally_linked_tables(&prepared.table) {
            tables.insert(linked);
        }
        Ok(tables)
    }

    pub fn writes_to(&self) -> Result<BTreeSet<ObjectName>> {
        Ok(BTreeSet::from([self.prepared()?.table.clone()]))
    }

    pub fn is_exclusive(&self) -> Result<bool> {
        Ok(Connection::is_reserved_table(&self.prepared()?.table))
    }
}
