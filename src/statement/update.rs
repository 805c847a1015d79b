//! UPDATE
//!
//! The affected row set comes from a planner-built scan/filter/limit
//! chain evaluated with row identity, the same machinery SELECT uses.
//! Assignment values resolve against the target table's columns so they
//! can read the old row; sub-selects in SET are rejected outright.

use crate::catalog::{Connection, TriggerEvent, TriggerKind};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::planning::{ExecutionContext, MutationPlan, Planner, evaluate::evaluate};
use crate::types::expression::Expression;
use crate::types::query::Assignment;
use crate::types::schema::{ObjectName, ResultTable};
use std::collections::BTreeSet;

#[derive(Debug)]
struct Prepared {
    table: ObjectName,
    plan: crate::planning::QueryPlan,
    /// (schema offset, resolved value expression) per assignment.
    assignments: Vec<(usize, Expression)>,
}

#[derive(Debug)]
pub struct Update {
    table_name: String,
    assignments: Vec<Assignment>,
    where_clause: Option<Expression>,
    limit: Option<i64>,
    prepared: Option<Prepared>,
}

impl Update {
    pub fn from_command(command: &Command) -> Result<Self> {
        Ok(Update {
            table_name: command.str_field("table")?.to_string(),
            assignments: command.assignments_field("set")?.to_vec(),
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
        if self.assignments.is_empty() {
            return Err(Error::Command("UPDATE requires assignments".into()));
        }
        let planner = Planner::new(conn);
        let MutationPlan {
            table,
            from_set,
            plan,
        } = planner.plan_mutation(
            &self.table_name,
            self.where_clause.as_ref(),
            row_limit(self.limit)?,
        )?;

        let mut assignments = Vec::with_capacity(self.assignments.len());
        let mut seen = Vec::new();
        for assignment in &self.assignments {
            if assignment.value.contains_subquery() {
                return Err(Error::IllegalSubquery("an UPDATE SET assignment"));
            }
            let resolved = from_set.resolve(&assignment.column)?;
            if seen.contains(&resolved.column) {
                return Err(Error::DuplicateColumn(resolved.name));
            }
            seen.push(resolved.column);
            let value = assignment.value.clone().resolve(
                &mut |column| from_set.resolve_offset(column),
                &mut |_| Err(Error::IllegalSubquery("an UPDATE SET assignment")),
            )?;
            assignments.push((resolved.column, value));
        }

        self.prepared = Some(Prepared {
            table,
            plan,
            assignments,
        });
        Ok(())
    }

    pub fn evaluate(&self, conn: &Connection) -> Result<ResultTable> {
        let prepared = self.prepared()?;
        if !conn.can_update_table(&prepared.table) {
            return Err(Error::AccessDenied {
                action: "update".into(),
                object: prepared.table.to_string(),
            });
        }
        let ctx = ExecutionContext::new(conn);
        let affected = prepared.plan.evaluate_with_ids(&ctx)?;
        let mut updates = Vec::with_capacity(affected.len());
        for (id, row) in affected {
            let mut replacement = row.clone();
            for (index, expr) in &prepared.assignments {
                replacement[*index] = evaluate(expr, Some(&row), Some(&ctx))?;
            }
            updates.push((id, replacement));
        }
        let count = conn.update_rows(&prepared.table, updates)?;
        if count > 0 {
            conn.notify_trigger_event(TriggerEvent {
                kind: TriggerKind::Update,
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
        for (_, expr) in &prepared.assignments {
            for plan in expr.subplans() {
                plan.discover_tables(&mut tables);
            }
        }
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

/// Interprets the LIMIT command field: a negative value means unlimited.
pub(super) fn row_limit(limit: Option<i64>) -> Result<Option<usize>> {
    match limit {
        None => Ok(None),
        Some(n) if n < 0 => Ok(None),
        Some(n) => Ok(Some(n as usize)),
    }
}
