//! Query plan trees
//!
//! A `QueryPlan` is a tree of relational stages produced by the planner
//! during prepare and executed during evaluate. Stages own prepared
//! (Field-resolved) expressions; execution walks the tree bottom-up and
//! never consults names again.

use crate::catalog::RowId;
use crate::error::{Error, Result};
use crate::planning::evaluate::{self, ExecutionContext, add_values};
use crate::types::expression::Expression;
use crate::types::query::CompositeOp;
use crate::types::schema::ObjectName;
use crate::types::value::{Row, RowKey, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// An aggregate function, with names already validated by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunc::Count),
            "SUM" => Some(AggregateFunc::Sum),
            "AVG" => Some(AggregateFunc::Avg),
            "MIN" => Some(AggregateFunc::Min),
            "MAX" => Some(AggregateFunc::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

/// One aggregate call inside an Aggregate stage. A missing argument is
/// `COUNT(*)`: it counts rows rather than non-null values.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub func: AggregateFunc,
    pub arg: Option<Expression>,
}

/// One relational stage.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Produces a single empty row; the source for FROM-less selects.
    Nothing,
    /// Full scan of a base table. `label` is the name the query knows the
    /// source by (the alias, when one was given).
    Scan {
        table: ObjectName,
        label: ObjectName,
    },
    /// A derived table: a planned sub-select in FROM.
    Derived {
        plan: Box<QueryPlan>,
        label: ObjectName,
    },
    /// Cartesian product of two sources; join conditions filter above.
    Product {
        left: Box<QueryPlan>,
        right: Box<QueryPlan>,
    },
    Filter {
        source: Box<QueryPlan>,
        predicate: Expression,
    },
    Project {
        source: Box<QueryPlan>,
        expressions: Vec<Expression>,
        labels: Vec<String>,
    },
    /// Groups by the key expressions and folds the aggregate calls.
    /// Output rows are the key values followed by the aggregate results.
    Aggregate {
        source: Box<QueryPlan>,
        group_by: Vec<Expression>,
        aggregates: Vec<AggregateCall>,
    },
    Sort {
        source: Box<QueryPlan>,
        keys: Vec<(Expression, bool)>,
    },
    Distinct {
        source: Box<QueryPlan>,
    },
    Limit {
        source: Box<QueryPlan>,
        limit: usize,
    },
    /// Set composition of two plans of equal width.
    Composite {
        op: CompositeOp,
        all: bool,
        left: Box<QueryPlan>,
        right: Box<QueryPlan>,
    },
}

impl QueryPlan {
    /// Executes the plan, producing its output rows in order.
    pub fn evaluate(&self, ctx: &ExecutionContext) -> Result<Vec<Row>> {
        match self {
            QueryPlan::Nothing => Ok(vec![Vec::new()]),
            QueryPlan::Scan { table, .. } => Ok(ctx
                .connection()
                .scan_table(table)?
                .into_iter()
                .map(|(_, row)| row)
                .collect()),
            QueryPlan::Derived { plan, .. } => plan.evaluate(ctx),
            QueryPlan::Product { left, right } => {
                let left = left.evaluate(ctx)?;
                let right = right.evaluate(ctx)?;
                let mut out = Vec::with_capacity(left.len() * right.len());
                for l in &left {
                    for r in &right {
                        let mut row = l.clone();
                        row.extend(r.iter().cloned());
                        out.push(row);
                    }
                }
                Ok(out)
            }
            QueryPlan::Filter { source, predicate } => {
                let mut out = Vec::new();
                for row in source.evaluate(ctx)? {
                    if evaluate::evaluate(predicate, Some(&row), Some(ctx))?.is_true() {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            QueryPlan::Project {
                source,
                expressions,
                ..
            } => {
                let mut out = Vec::new();
                for row in source.evaluate(ctx)? {
                    let mut projected = Vec::with_capacity(expressions.len());
                    for expr in expressions {
                        projected.push(evaluate::evaluate(expr, Some(&row), Some(ctx))?);
                    }
                    out.push(projected);
                }
                Ok(out)
            }
            QueryPlan::Aggregate {
                source,
                group_by,
                aggregates,
            } => Self::aggregate(ctx, source, group_by, aggregates),
            QueryPlan::Sort { source, keys } => {
                let rows = source.evaluate(ctx)?;
                let mut keyed = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut key = Vec::with_capacity(keys.len());
                    for (expr, _) in keys {
                        key.push(evaluate::evaluate(expr, Some(&row), Some(ctx))?);
                    }
                    keyed.push((key, row));
                }
                keyed.sort_by(|(a, _), (b, _)| {
                    for (i, (_, ascending)) in keys.iter().enumerate() {
                        let ord = a[i].total_cmp(&b[i]);
                        let ord = if *ascending { ord } else { ord.reverse() };
                        if ord != std::cmp::Ordering::Equal {
                            return ord;
                        }
                    }
                    std::cmp::Ordering::Equal
                });
                Ok(keyed.into_iter().map(|(_, row)| row).collect())
            }
            QueryPlan::Distinct { source } => {
                let mut seen = BTreeSet::new();
                let mut out = Vec::new();
                for row in source.evaluate(ctx)? {
                    if seen.insert(RowKey(row.clone())) {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            QueryPlan::Limit { source, limit } => {
                let mut rows = source.evaluate(ctx)?;
                rows.truncate(*limit);
                Ok(rows)
            }
            QueryPlan::Composite {
                op,
                all,
                left,
                right,
            } => {
                let left = left.evaluate(ctx)?;
                let right = right.evaluate(ctx)?;
                if let (Some(l), Some(r)) = (left.first(), right.first()) {
                    if l.len() != r.len() {
                        return Err(Error::ArityMismatch(format!(
                            "{} sides produce {} and {} columns",
                            op,
                            l.len(),
                            r.len()
                        )));
                    }
                }
                Ok(Self::compose(*op, *all, left, right))
            }
        }
    }

    /// Executes a plan that preserves row identity, yielding row ids
    /// alongside rows. Only scan/filter/limit chains qualify; the
    /// planner builds exactly those for UPDATE and DELETE.
    pub fn evaluate_with_ids(&self, ctx: &ExecutionContext) -> Result<Vec<(RowId, Row)>> {
        match self {
            QueryPlan::Scan { table, .. } => ctx.connection().scan_table(table),
            QueryPlan::Filter { source, predicate } => {
                let mut out = Vec::new();
                for (id, row) in source.evaluate_with_ids(ctx)? {
                    if evaluate::evaluate(predicate, Some(&row), Some(ctx))?.is_true() {
                        out.push((id, row));
                    }
                }
                Ok(out)
            }
            QueryPlan::Limit { source, limit } => {
                let mut rows = source.evaluate_with_ids(ctx)?;
                rows.truncate(*limit);
                Ok(rows)
            }
            _ => Err(Error::InvalidValue(
                "plan stage does not preserve row identity".into(),
            )),
        }
    }

    fn aggregate(
        ctx: &ExecutionContext,
        source: &QueryPlan,
        group_by: &[Expression],
        aggregates: &[AggregateCall],
    ) -> Result<Vec<Row>> {
        let mut groups: BTreeMap<RowKey, Vec<Accumulator>> = BTreeMap::new();
        for row in source.evaluate(ctx)? {
            let mut key = Vec::with_capacity(group_by.len());
            for expr in group_by {
                key.push(evaluate::evaluate(expr, Some(&row), Some(ctx))?);
            }
            let accumulators = groups.entry(RowKey(key)).or_insert_with(|| {
                aggregates.iter().map(|c| Accumulator::new(c.func)).collect()
            });
            for (call, acc) in aggregates.iter().zip(accumulators.iter_mut()) {
                match &call.arg {
                    None => acc.add_row(),
                    Some(expr) => {
                        acc.add(evaluate::evaluate(expr, Some(&row), Some(ctx))?)?
                    }
                }
            }
        }
        // A grand aggregate over zero rows still produces one row
        if groups.is_empty() && group_by.is_empty() {
            groups.insert(
                RowKey(Vec::new()),
                aggregates.iter().map(|c| Accumulator::new(c.func)).collect(),
            );
        }
        let mut out = Vec::with_capacity(groups.len());
        for (key, accumulators) in groups {
            let mut row = key.0;
            for acc in accumulators {
                row.push(acc.finish()?);
            }
            out.push(row);
        }
        Ok(out)
    }

    fn compose(op: CompositeOp, all: bool, left: Vec<Row>, right: Vec<Row>) -> Vec<Row> {
        match (op, all) {
            (CompositeOp::Union, true) => {
                let mut out = left;
                out.extend(right);
                out
            }
            (CompositeOp::Union, false) => {
                let mut seen = BTreeSet::new();
                let mut out = Vec::new();
                for row in left.into_iter().chain(right) {
                    if seen.insert(RowKey(row.clone())) {
                        out.push(row);
                    }
                }
                out
            }
            (CompositeOp::Intersect, all) => {
                let mut counts: BTreeMap<RowKey, usize> = BTreeMap::new();
                for row in right {
                    *counts.entry(RowKey(row)).or_insert(0) += 1;
                }
                let mut out = Vec::new();
                let mut emitted = BTreeSet::new();
                for row in left {
                    let key = RowKey(row.clone());
                    match counts.get_mut(&key) {
                        Some(n) if *n > 0 => {
                            if all {
                                *n -= 1;
                                out.push(row);
                            } else if emitted.insert(key) {
                                out.push(row);
                            }
                        }
                        _ => {}
                    }
                }
                out
            }
            (CompositeOp::Except, all) => {
                let mut counts: BTreeMap<RowKey, usize> = BTreeMap::new();
                for row in right {
                    *counts.entry(RowKey(row)).or_insert(0) += 1;
                }
                let mut out = Vec::new();
                let mut emitted = BTreeSet::new();
                for row in left {
                    let key = RowKey(row.clone());
                    match counts.get_mut(&key) {
                        Some(n) if *n > 0 => {
                            if all {
                                *n -= 1;
                            }
                        }
                        _ => {
                            if all || emitted.insert(key) {
                                out.push(row);
                            }
                        }
                    }
                }
                out
            }
        }
    }

    /// Output column labels, where the plan shape determines them.
    pub fn output_labels(&self) -> Vec<String> {
        match self {
            QueryPlan::Project { labels, .. } => labels.clone(),
            QueryPlan::Derived { plan, .. } => plan.output_labels(),
            QueryPlan::Filter { source, .. }
            | QueryPlan::Sort { source, .. }
            | QueryPlan::Distinct { source }
            | QueryPlan::Limit { source, .. } => source.output_labels(),
            QueryPlan::Composite { left, .. } => left.output_labels(),
            QueryPlan::Nothing
            | QueryPlan::Scan { .. }
            | QueryPlan::Product { .. }
            | QueryPlan::Aggregate { .. } => Vec::new(),
        }
    }

    /// Collects every base table the plan touches, including tables
    /// reached through sub-selects inside expressions.
    pub fn discover_tables(&self, out: &mut BTreeSet<ObjectName>) {
        fn from_expr(expr: &Expression, out: &mut BTreeSet<ObjectName>) {
            for plan in expr.subplans() {
                plan.discover_tables(out);
            }
        }
        match self {
            QueryPlan::Nothing => {}
            QueryPlan::Scan { table, .. } => {
                out.insert(table.clone());
            }
            QueryPlan::Derived { plan, .. } => plan.discover_tables(out),
            QueryPlan::Product { left, right } => {
                left.discover_tables(out);
                right.discover_tables(out);
            }
            QueryPlan::Filter { source, predicate } => {
                source.discover_tables(out);
                from_expr(predicate, out);
            }
            QueryPlan::Project {
                source,
                expressions,
                ..
            } => {
                source.discover_tables(out);
                for expr in expressions {
                    from_expr(expr, out);
                }
            }
            QueryPlan::Aggregate {
                source,
                group_by,
                aggregates,
            } => {
                source.discover_tables(out);
                for expr in group_by {
                    from_expr(expr, out);
                }
                for call in aggregates {
                    if let Some(expr) = &call.arg {
                        from_expr(expr, out);
                    }
                }
            }
            QueryPlan::Sort { source, keys } => {
                source.discover_tables(out);
                for (expr, _) in keys {
                    from_expr(expr, out);
                }
            }
            QueryPlan::Distinct { source } => source.discover_tables(out),
            QueryPlan::Limit { source, .. } => source.discover_tables(out),
            QueryPlan::Composite { left, right, .. } => {
                left.discover_tables(out);
                right.discover_tables(out);
            }
        }
    }

    /// Renders the plan tree, one stage per line, children indented.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(0, &mut out);
        out
    }

    fn dump_into(&self, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match self {
            QueryPlan::Nothing => {
                let _ = writeln!(out, "{}Nothing", pad);
            }
            QueryPlan::Scan { table, label } => {
                if label == table {
                    let _ = writeln!(out, "{}Scan: {}", pad, table);
                } else {
                    let _ = writeln!(out, "{}Scan: {} AS {}", pad, table, label.name);
                }
            }
            QueryPlan::Derived { plan, label } => {
                let _ = writeln!(out, "{}Derived: {}", pad, label.name);
                plan.dump_into(depth + 1, out);
            }
            QueryPlan::Product { left, right } => {
                let _ = writeln!(out, "{}Product", pad);
                left.dump_into(depth + 1, out);
                right.dump_into(depth + 1, out);
            }
            QueryPlan::Filter { source, predicate } => {
                let _ = writeln!(out, "{}Filter: {}", pad, predicate);
                source.dump_into(depth + 1, out);
            }
            QueryPlan::Project {
                source,
                expressions,
                labels,
            } => {
                let items: Vec<String> = expressions
                    .iter()
                    .zip(labels.iter())
                    .map(|(e, l)| format!("{} AS {}", e, l))
                    .collect();
                let _ = writeln!(out, "{}Project: {}", pad, items.join(", "));
                source.dump_into(depth + 1, out);
            }
            QueryPlan::Aggregate {
                source,
                group_by,
                aggregates,
            } => {
                let keys: Vec<String> = group_by.iter().map(|e| e.to_string()).collect();
                let calls: Vec<String> = aggregates
                    .iter()
                    .map(|c| match &c.arg {
                        Some(e) => format!("{}({})", c.func.name(), e),
                        None => format!("{}(*)", c.func.name()),
                    })
                    .collect();
                let _ = writeln!(
                    out,
                    "{}Aggregate: [{}] group by [{}]",
                    pad,
                    calls.join(", "),
                    keys.join(", ")
                );
                source.dump_into(depth + 1, out);
            }
            QueryPlan::Sort { source, keys } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|(e, asc)| format!("{} {}", e, if *asc { "ASC" } else { "DESC" }))
                    .collect();
                let _ = writeln!(out, "{}Sort: {}", pad, keys.join(", "));
                source.dump_into(depth + 1, out);
            }
            QueryPlan::Distinct { source } => {
                let _ = writeln!(out, "{}Distinct", pad);
                source.dump_into(depth + 1, out);
            }
            QueryPlan::Limit { source, limit } => {
                let _ = writeln!(out, "{}Limit: {}", pad, limit);
                source.dump_into(depth + 1, out);
            }
            QueryPlan::Composite {
                op,
                all,
                left,
                right,
            } => {
                let _ = writeln!(out, "{}{}{}", pad, op, if *all { " ALL" } else { "" });
                left.dump_into(depth + 1, out);
                right.dump_into(depth + 1, out);
            }
        }
    }
}

/// Running state for one aggregate call within one group.
enum Accumulator {
    Count(i64),
    Sum(Option<Value>),
    Avg { sum: Option<Value>, count: i64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    fn new(func: AggregateFunc) -> Self {
        match func {
            AggregateFunc::Count => Accumulator::Count(0),
            AggregateFunc::Sum => Accumulator::Sum(None),
            AggregateFunc::Avg => Accumulator::Avg {
                sum: None,
                count: 0,
            },
            AggregateFunc::Min => Accumulator::Min(None),
            AggregateFunc::Max => Accumulator::Max(None),
        }
    }

    /// Folds in one row for an argument-less call (COUNT(*)).
    fn add_row(&mut self) {
        if let Accumulator::Count(n) = self {
            *n += 1;
        }
    }

    /// Folds in one argument value. NULL values are skipped, per SQL.
    fn add(&mut self, value: Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum(sum) => {
                *sum = Some(match sum.take() {
                    Some(acc) => add_values(&acc, &value)?,
                    None => value,
                });
            }
            Accumulator::Avg { sum, count } => {
                *sum = Some(match sum.take() {
                    Some(acc) => add_values(&acc, &value)?,
                    None => value,
                });
                *count += 1;
            }
            Accumulator::Min(min) => {
                let replace = match min {
                    Some(current) => {
                        value.compare(current) == Some(std::cmp::Ordering::Less)
                    }
                    None => true,
                };
                if replace {
                    *min = Some(value);
                }
            }
            Accumulator::Max(max) => {
                let replace = match max {
                    Some(current) => {
                        value.compare(current) == Some(std::cmp::Ordering::Greater)
                    }
                    None => true,
                };
                if replace {
                    *max = Some(value);
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Value> {
        Ok(match self {
            Accumulator::Count(n) => Value::Integer(n),
            Accumulator::Sum(sum) => sum.unwrap_or(Value::Null),
            Accumulator::Avg { sum, count } => match sum {
                Some(sum) => Value::Double(sum.as_f64()? / count as f64),
                None => Value::Null,
            },
            Accumulator::Min(v) | Accumulator::Max(v) => v.unwrap_or(Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_row(values: &[i64]) -> Row {
        values.iter().map(|&i| Value::Integer(i)).collect()
    }

    #[test]
    fn union_dedups_unless_all() {
        let left = vec![int_row(&[1]), int_row(&[2])];
        let right = vec![int_row(&[2]), int_row(&[3])];
        let merged = QueryPlan::compose(CompositeOp::Union, false, left.clone(), right.clone());
        assert_eq!(merged, vec![int_row(&[1]), int_row(&[2]), int_row(&[3])]);
        let merged = QueryPlan::compose(CompositeOp::Union, true, left, right);
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn intersect_and_except() {
        let left = vec![int_row(&[1]), int_row(&[2]), int_row(&[2])];
        let right = vec![int_row(&[2]), int_row(&[4])];
        assert_eq!(
            QueryPlan::compose(CompositeOp::Intersect, false, left.clone(), right.clone()),
            vec![int_row(&[2])]
        );
        assert_eq!(
            QueryPlan::compose(CompositeOp::Except, false, left, right),
            vec![int_row(&[1])]
        );
    }

    #[test]
    fn except_all_respects_multiplicity() {
        let left = vec![int_row(&[2]), int_row(&[2]), int_row(&[2])];
        let right = vec![int_row(&[2])];
        assert_eq!(
            QueryPlan::compose(CompositeOp::Except, true, left, right),
            vec![int_row(&[2]), int_row(&[2])]
        );
    }

    #[test]
    fn count_skips_nulls_and_count_rows_does_not() {
        let mut count = Accumulator::new(AggregateFunc::Count);
        count.add(Value::Null).unwrap();
        count.add(Value::Integer(1)).unwrap();
        assert_eq!(count.finish().unwrap(), Value::Integer(1));

        let mut rows = Accumulator::new(AggregateFunc::Count);
        rows.add_row();
        rows.add_row();
        assert_eq!(rows.finish().unwrap(), Value::Integer(2));
    }

    #[test]
    fn sum_over_no_values_is_null() {
        let sum = Accumulator::new(AggregateFunc::Sum);
        assert_eq!(sum.finish().unwrap(), Value::Null);
    }

    #[test]
    fn min_max_track_extremes() {
        let mut min = Accumulator::new(AggregateFunc::Min);
        let mut max = Accumulator::new(AggregateFunc::Max);
        for v in [3, 1, 2] {
            min.add(Value::Integer(v)).unwrap();
            max.add(Value::Integer(v)).unwrap();
        }
        assert_eq!(min.finish().unwrap(), Value::Integer(1));
        assert_eq!(max.finish().unwrap(), Value::Integer(3));
    }
}
