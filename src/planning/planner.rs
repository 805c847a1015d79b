//! Query planning
//!
//! The planner turns a SELECT expression into a `QueryPlan` tree during
//! prepare: it builds the set of visible sources, resolves every column
//! reference to a flat row offset, compiles sub-selects into subplans,
//! and lifts aggregate calls into an Aggregate stage. All catalog lookups
//! happen here; the resulting plan is self-contained.

use crate::catalog::Connection;
use crate::error::{Error, Result};
use crate::planning::plan::{AggregateCall, AggregateFunc, QueryPlan};
use crate::resolve::{FromSet, FromSource};
use crate::types::expression::Expression;
use crate::types::query::{
    FromKind, OrderByColumn, SelectColumn, SelectExpr, SimpleSelect,
};
use crate::types::schema::ObjectName;
use crate::types::value::Value;

/// A planned UPDATE or DELETE row source. The plan preserves row
/// identity, so the statement can read first and write after.
pub struct MutationPlan {
    pub table: ObjectName,
    pub from_set: FromSet,
    pub plan: QueryPlan,
}

pub struct Planner<'a> {
    connection: &'a Connection,
}

fn names_eq(a: &str, b: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

impl<'a> Planner<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        Planner { connection }
    }

    /// Plans a select chain with its trailing ORDER BY.
    pub fn plan_query(
        &self,
        select: &SelectExpr,
        order_by: &[OrderByColumn],
    ) -> Result<QueryPlan> {
        match select {
            SelectExpr::Simple(simple) => self.plan_simple(simple, order_by),
            SelectExpr::Composite {
                op,
                all,
                left,
                right,
            } => {
                let left = self.plan_select(left)?;
                let right = self.plan_select(right)?;
                let left_labels = left.output_labels();
                if left_labels.len() != right.output_labels().len() {
                    return Err(Error::ArityMismatch(format!(
                        "{} sides produce {} and {} columns",
                        op,
                        left_labels.len(),
                        right.output_labels().len()
                    )));
                }
                let mut plan = QueryPlan::Composite {
                    op: *op,
                    all: *all,
                    left: Box::new(left),
                    right: Box::new(right),
                };
                if !order_by.is_empty() {
                    let keys = self.output_sort_keys(order_by, &left_labels)?;
                    plan = QueryPlan::Sort {
                        source: Box::new(plan),
                        keys,
                    };
                }
                Ok(plan)
            }
        }
    }

    /// Plans a select chain without ordering; the form sub-selects take.
    pub fn plan_select(&self, select: &SelectExpr) -> Result<QueryPlan> {
        self.plan_query(select, &[])
    }

    /// Builds the set of sources a simple select brings into scope, with
    /// one source plan per FROM entry.
    pub fn generate_from_set(
        &self,
        simple: &SimpleSelect,
    ) -> Result<(FromSet, Vec<QueryPlan>)> {
        let ignore_case = self.connection.ignore_case();
        let mut set = FromSet::new(ignore_case);
        let mut plans = Vec::new();
        for clause in &simple.from {
            match &clause.source {
                FromKind::Table(raw) => {
                    let root = self.connection.resolve_table_name(raw)?;
                    let given = match &clause.alias {
                        Some(alias) => ObjectName::new(root.schema.clone(), alias.clone()),
                        None => root.clone(),
                    };
                    let schema = self.connection.table_schema(&root)?;
                    set.add_source(FromSource::base(
                        given.clone(),
                        root.clone(),
                        schema.column_names(),
                    ));
                    plans.push(QueryPlan::Scan {
                        table: root,
                        label: given,
                    });
                }
                FromKind::Subquery(sub) => {
                    let alias = clause.alias.clone().ok_or_else(|| {
                        Error::Command("a sub-select in FROM requires an alias".into())
                    })?;
                    let plan = self.plan_select(sub)?;
                    let labels = plan.output_labels();
                    let given = ObjectName::new(self.connection.current_schema(), alias);
                    set.add_source(FromSource::derived(given.clone(), labels));
                    plans.push(QueryPlan::Derived {
                        plan: Box::new(plan),
                        label: given,
                    });
                }
            }
        }
        Ok((set, plans))
    }

    /// Resolves an expression against a from-set: columns become fields,
    /// sub-selects become subplans.
    pub fn resolve_expression(
        &self,
        expr: Expression,
        from_set: &FromSet,
    ) -> Result<Expression> {
        expr.resolve(
            &mut |column| from_set.resolve_offset(column),
            &mut |sub| self.plan_select(sub),
        )
    }

    /// Plans the row source for UPDATE and DELETE: a scan/filter/limit
    /// chain over a single table, preserving row identity.
    pub fn plan_mutation(
        &self,
        raw_table: &str,
        where_clause: Option<&Expression>,
        limit: Option<usize>,
    ) -> Result<MutationPlan> {
        let table = self.connection.resolve_table_name(raw_table)?;
        let schema = self.connection.table_schema(&table)?;
        let mut from_set = FromSet::new(self.connection.ignore_case());
        from_set.add_source(FromSource::base(
            table.clone(),
            table.clone(),
            schema.column_names(),
        ));
        let mut plan = QueryPlan::Scan {
            table: table.clone(),
            label: table.clone(),
        };
        if let Some(predicate) = where_clause {
            if predicate.contains_aggregate() {
                return Err(Error::InvalidValue(
                    "aggregate function in WHERE".into(),
                ));
            }
            let predicate = self.resolve_expression(predicate.clone(), &from_set)?;
            plan = QueryPlan::Filter {
                source: Box::new(plan),
                predicate,
            };
        }
        if let Some(limit) = limit {
            plan = QueryPlan::Limit {
                source: Box::new(plan),
                limit,
            };
        }
        Ok(MutationPlan {
            table,
            from_set,
            plan,
        })
    }

    fn plan_simple(
        &self,
        simple: &SimpleSelect,
        order_by: &[OrderByColumn],
    ) -> Result<QueryPlan> {
        let ignore_case = self.connection.ignore_case();
        let (from_set, source_plans) = self.generate_from_set(simple)?;

        let mut plan = match source_plans.len() {
            0 => QueryPlan::Nothing,
            _ => {
                let mut iter = source_plans.into_iter();
                let mut plan = iter.next().ok_or_else(|| {
                    Error::InvalidValue("empty source plan list".into())
                })?;
                for right in iter {
                    plan = QueryPlan::Product {
                        left: Box::new(plan),
                        right: Box::new(right),
                    };
                }
                plan
            }
        };

        if let Some(predicate) = &simple.where_clause {
            if predicate.contains_aggregate() {
                return Err(Error::InvalidValue(
                    "aggregate function in WHERE".into(),
                ));
            }
            let predicate = self.resolve_expression(predicate.clone(), &from_set)?;
            plan = QueryPlan::Filter {
                source: Box::new(plan),
                predicate,
            };
        }

        let aggregated = !simple.group_by.is_empty()
            || simple.having.is_some()
            || simple.columns.iter().any(|c| match c {
                SelectColumn::Expr { expr, .. } => expr.contains_aggregate(),
                SelectColumn::All { .. } => false,
            });

        let (mut expressions, mut labels) = if aggregated {
            let (aggregate_plan, expressions, labels) =
                self.plan_aggregation(simple, plan, &from_set)?;
            plan = aggregate_plan;
            (expressions, labels)
        } else {
            self.expand_select_columns(simple, &from_set, ignore_case)?
        };

        // ORDER BY resolves against the output labels first; for plain
        // selects an unmatched key is planned as a hidden projection
        // column and trimmed after the sort.
        let mut keys = Vec::with_capacity(order_by.len());
        let visible = labels.len();
        for key in order_by {
            if let Some(field) =
                self.match_output_key(&key.expr, &labels[..visible], ignore_case)?
            {
                keys.push((Expression::Field(field), key.ascending));
                continue;
            }
            if aggregated || simple.distinct {
                return Err(Error::ColumnNotFound(format!(
                    "ORDER BY key {} is not an output column",
                    key.expr
                )));
            }
            let resolved = self.resolve_expression(key.expr.clone(), &from_set)?;
            labels.push(key.expr.to_string());
            expressions.push(resolved);
            keys.push((Expression::Field(expressions.len() - 1), key.ascending));
        }
        let hidden = labels.len() - visible;

        plan = QueryPlan::Project {
            source: Box::new(plan),
            expressions,
            labels,
        };
        if simple.distinct {
            plan = QueryPlan::Distinct {
                source: Box::new(plan),
            };
        }
        if !keys.is_empty() {
            plan = QueryPlan::Sort {
                source: Box::new(plan),
                keys,
            };
        }
        if hidden > 0 {
            let trimmed = plan.output_labels();
            plan = QueryPlan::Project {
                source: Box::new(plan),
                expressions: (0..visible).map(Expression::Field).collect(),
                labels: trimmed.into_iter().take(visible).collect(),
            };
        }
        Ok(plan)
    }

    /// Expands the select list of a non-aggregate query into projection
    /// expressions and labels.
    fn expand_select_columns(
        &self,
        simple: &SimpleSelect,
        from_set: &FromSet,
        ignore_case: bool,
    ) -> Result<(Vec<Expression>, Vec<String>)> {
        let mut expressions = Vec::new();
        let mut labels = Vec::new();
        for column in &simple.columns {
            match column {
                SelectColumn::All { table } => {
                    let mut matched = false;
                    for (si, source) in from_set.sources().iter().enumerate() {
                        if let Some(table) = table {
                            if !source.matches_qualifier(None, table, ignore_case) {
                                continue;
                            }
                        }
                        matched = true;
                        for (ci, name) in source.columns.iter().enumerate() {
                            expressions.push(Expression::Field(from_set.offset_of(si, ci)));
                            labels.push(name.clone());
                        }
                    }
                    if !matched {
                        return Err(Error::TableNotFound(
                            table.clone().unwrap_or_else(|| "*".into()),
                        ));
                    }
                }
                SelectColumn::Expr { expr, alias } => {
                    labels.push(match alias {
                        Some(alias) => alias.clone(),
                        None => Self::default_label(expr),
                    });
                    expressions.push(self.resolve_expression(expr.clone(), from_set)?);
                }
            }
        }
        Ok((expressions, labels))
    }

    /// Plans the Aggregate stage and the projection over it. Returns the
    /// plan up to (but excluding) the projection, plus the projection's
    /// expressions and labels, which refer to the aggregate output row:
    /// group keys first, then one field per lifted aggregate call.
    fn plan_aggregation(
        &self,
        simple: &SimpleSelect,
        source: QueryPlan,
        from_set: &FromSet,
    ) -> Result<(QueryPlan, Vec<Expression>, Vec<String>)> {
        let mut group_by = Vec::with_capacity(simple.group_by.len());
        for expr in &simple.group_by {
            if expr.contains_aggregate() {
                return Err(Error::InvalidValue(
                    "aggregate function in GROUP BY".into(),
                ));
            }
            group_by.push(self.resolve_expression(expr.clone(), from_set)?);
        }

        let mut calls = Vec::new();
        let mut expressions = Vec::new();
        let mut labels = Vec::new();
        for column in &simple.columns {
            let SelectColumn::Expr { expr, alias } = column else {
                return Err(Error::InvalidValue(
                    "* cannot be combined with aggregation".into(),
                ));
            };
            labels.push(match alias {
                Some(alias) => alias.clone(),
                None => Self::default_label(expr),
            });
            let resolved = self.resolve_expression(expr.clone(), from_set)?;
            expressions.push(Self::lift_aggregates(resolved, &group_by, &mut calls)?);
        }

        let having = match &simple.having {
            Some(expr) => {
                let resolved = self.resolve_expression(expr.clone(), from_set)?;
                Some(Self::lift_aggregates(resolved, &group_by, &mut calls)?)
            }
            None => None,
        };

        let mut plan = QueryPlan::Aggregate {
            source: Box::new(source),
            group_by,
            aggregates: calls,
        };
        if let Some(predicate) = having {
            plan = QueryPlan::Filter {
                source: Box::new(plan),
                predicate,
            };
        }
        Ok((plan, expressions, labels))
    }

    /// Rewrites a resolved expression for evaluation above the Aggregate
    /// stage: group-key subexpressions become fields over the key prefix,
    /// aggregate calls are appended to `calls` and become fields after it.
    /// Anything else that still reads the source row is an error.
    fn lift_aggregates(
        expr: Expression,
        group_by: &[Expression],
        calls: &mut Vec<AggregateCall>,
    ) -> Result<Expression> {
        use Expression::*;
        if let Some(i) = group_by.iter().position(|g| g == &expr) {
            return Ok(Field(i));
        }
        let mut lift =
            |e: Box<Expression>, calls: &mut Vec<AggregateCall>| -> Result<Box<Expression>> {
                Ok(Box::new(Self::lift_aggregates(*e, group_by, calls)?))
            };
        Ok(match expr {
            Constant(v) => Constant(v),
            Function(name, mut args) => match AggregateFunc::from_name(&name) {
                Some(func) => {
                    if args.len() > 1 {
                        return Err(Error::ArityMismatch(format!(
                            "{} takes at most one argument",
                            func.name()
                        )));
                    }
                    let arg = args.pop();
                    if let Some(arg) = &arg {
                        if arg.contains_aggregate() {
                            return Err(Error::InvalidValue(
                                "nested aggregate function".into(),
                            ));
                        }
                    }
                    calls.push(AggregateCall { func, arg });
                    Field(group_by.len() + calls.len() - 1)
                }
                None => Function(
                    name,
                    args.into_iter()
                        .map(|a| Self::lift_aggregates(a, group_by, calls))
                        .collect::<Result<_>>()?,
                ),
            },
            And(l, r) => And(lift(l, calls)?, lift(r, calls)?),
            Or(l, r) => Or(lift(l, calls)?, lift(r, calls)?),
            Not(e) => Not(lift(e, calls)?),
            Equal(l, r) => Equal(lift(l, calls)?, lift(r, calls)?),
            NotEqual(l, r) => NotEqual(lift(l, calls)?, lift(r, calls)?),
            GreaterThan(l, r) => GreaterThan(lift(l, calls)?, lift(r, calls)?),
            GreaterThanOrEqual(l, r) => {
                GreaterThanOrEqual(lift(l, calls)?, lift(r, calls)?)
            }
            LessThan(l, r) => LessThan(lift(l, calls)?, lift(r, calls)?),
            LessThanOrEqual(l, r) => LessThanOrEqual(lift(l, calls)?, lift(r, calls)?),
            Add(l, r) => Add(lift(l, calls)?, lift(r, calls)?),
            Subtract(l, r) => Subtract(lift(l, calls)?, lift(r, calls)?),
            Multiply(l, r) => Multiply(lift(l, calls)?, lift(r, calls)?),
            Divide(l, r) => Divide(lift(l, calls)?, lift(r, calls)?),
            Negate(e) => Negate(lift(e, calls)?),
            Like {
                expr,
                pattern,
                negated,
            } => Like {
                expr: lift(expr, calls)?,
                pattern: lift(pattern, calls)?,
                negated,
            },
            Between {
                expr,
                low,
                high,
                negated,
            } => Between {
                expr: lift(expr, calls)?,
                low: lift(low, calls)?,
                high: lift(high, calls)?,
                negated,
            },
            InList {
                expr,
                list,
                negated,
            } => InList {
                expr: lift(expr, calls)?,
                list: list
                    .into_iter()
                    .map(|e| Self::lift_aggregates(e, group_by, calls))
                    .collect::<Result<_>>()?,
                negated,
            },
            IsNull { expr, negated } => IsNull {
                expr: lift(expr, calls)?,
                negated,
            },
            // Uncorrelated subplans carry no source-row reads
            Subplan(p) => Subplan(p),
            InSubplan {
                expr,
                plan,
                negated,
            } => InSubplan {
                expr: lift(expr, calls)?,
                plan,
                negated,
            },
            other @ (Field(_) | Column(_) | Subquery(_)) => {
                return Err(Error::InvalidValue(format!(
                    "{} must appear in GROUP BY or inside an aggregate",
                    other
                )));
            }
        })
    }

    /// Matches an ORDER BY key against output labels (name or ordinal).
    fn match_output_key(
        &self,
        expr: &Expression,
        labels: &[String],
        ignore_case: bool,
    ) -> Result<Option<usize>> {
        match expr {
            Expression::Constant(Value::Integer(n)) => {
                let n = *n;
                if n < 1 || n as usize > labels.len() {
                    return Err(Error::InvalidValue(format!(
                        "ORDER BY position {} is out of range",
                        n
                    )));
                }
                Ok(Some(n as usize - 1))
            }
            Expression::Column(c) if c.table.is_none() => {
                let mut matches = labels
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| names_eq(l, &c.column, ignore_case));
                let Some((i, _)) = matches.next() else {
                    return Ok(None);
                };
                if let Some((j, _)) = matches.next() {
                    return Err(Error::AmbiguousColumn {
                        name: c.column.clone(),
                        matches: vec![labels[i].clone(), labels[j].clone()],
                    });
                }
                Ok(Some(i))
            }
            _ => Ok(None),
        }
    }

    /// ORDER BY keys over a composite, which only exposes output columns.
    fn output_sort_keys(
        &self,
        order_by: &[OrderByColumn],
        labels: &[String],
    ) -> Result<Vec<(Expression, bool)>> {
        let ignore_case = self.connection.ignore_case();
        let mut keys = Vec::with_capacity(order_by.len());
        for key in order_by {
            match self.match_output_key(&key.expr, labels, ignore_case)? {
                Some(field) => keys.push((Expression::Field(field), key.ascending)),
                None => {
                    return Err(Error::ColumnNotFound(format!(
                        "ORDER BY key {} is not an output column",
                        key.expr
                    )));
                }
            }
        }
        Ok(keys)
    }

    fn default_label(expr: &Expression) -> String {
        match expr {
            Expression::Column(c) => c.column.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::planning::evaluate::ExecutionContext;
    use crate::types::data_type::SqlType;
    use crate::types::expression::ColumnRef;
    use crate::types::query::FromClause;
    use crate::types::schema::{TableColumn, TableSchema};

    fn setup() -> (Catalog, Connection) {
        let catalog = Catalog::new();
        let conn = catalog.connect("admin");
        let columns = vec![
            TableColumn {
                name: "id".into(),
                sql_type: SqlType::Integer,
                not_null: true,
                default: None,
            },
            TableColumn {
                name: "name".into(),
                sql_type: SqlType::VarChar { size: 100 },
                not_null: false,
                default: None,
            },
        ];
        conn.create_table(TableSchema::new(ObjectName::new("APP", "Part"), columns))
            .unwrap();
        let part = ObjectName::new("APP", "Part");
        for (id, name) in [(1, "bolt"), (2, "nut"), (3, "bolt")] {
            conn.insert_row(
                &part,
                vec![Value::Integer(id), Value::Str(name.into())],
            )
            .unwrap();
        }
        (catalog, conn)
    }

    fn select_all(table: &str) -> SimpleSelect {
        SimpleSelect {
            columns: vec![SelectColumn::All { table: None }],
            from: vec![FromClause {
                source: FromKind::Table(table.into()),
                alias: None,
            }],
            ..SimpleSelect::default()
        }
    }

    #[test]
    fn plans_and_runs_a_filtered_select() {
        let (_catalog, conn) = setup();
        let planner = Planner::new(&conn);
        let mut simple = select_all("Part");
        simple.where_clause = Some(Expression::GreaterThan(
            Box::new(Expression::Column(ColumnRef::bare("id"))),
            Box::new(Expression::Constant(Value::Integer(1))),
        ));
        let plan = planner
            .plan_query(&SelectExpr::Simple(simple), &[])
            .unwrap();
        let ctx = ExecutionContext::new(&conn);
        let rows = plan.evaluate(&ctx).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(plan.output_labels(), vec!["id", "name"]);
    }

    #[test]
    fn order_by_source_column_stays_hidden() {
        let (_catalog, conn) = setup();
        let planner = Planner::new(&conn);
        let simple = SimpleSelect {
            columns: vec![SelectColumn::Expr {
                expr: Expression::Column(ColumnRef::bare("name")),
                alias: None,
            }],
            from: vec![FromClause {
                source: FromKind::Table("Part".into()),
                alias: None,
            }],
            ..SimpleSelect::default()
        };
        let order = vec![OrderByColumn {
            expr: Expression::Column(ColumnRef::bare("id")),
            ascending: false,
        }];
        let plan = planner
            .plan_query(&SelectExpr::Simple(simple), &order)
            .unwrap();
        let ctx = ExecutionContext::new(&conn);
        let rows = plan.evaluate(&ctx).unwrap();
        // Sorted by id descending, but only name in the output
        assert_eq!(
            rows,
            vec![
                vec![Value::Str("bolt".into())],
                vec![Value::Str("nut".into())],
                vec![Value::Str("bolt".into())],
            ]
        );
        assert_eq!(plan.output_labels(), vec!["name"]);
    }

    #[test]
    fn aggregates_group_and_count() {
        let (_catalog, conn) = setup();
        let planner = Planner::new(&conn);
        let simple = SimpleSelect {
            columns: vec![
                SelectColumn::Expr {
                    expr: Expression::Column(ColumnRef::bare("name")),
                    alias: None,
                },
                SelectColumn::Expr {
                    expr: Expression::Function("COUNT".into(), vec![]),
                    alias: Some("n".into()),
                },
            ],
            from: vec![FromClause {
                source: FromKind::Table("Part".into()),
                alias: None,
            }],
            group_by: vec![Expression::Column(ColumnRef::bare("name"))],
            ..SimpleSelect::default()
        };
        let plan = planner
            .plan_query(&SelectExpr::Simple(simple), &[])
            .unwrap();
        let ctx = ExecutionContext::new(&conn);
        let rows = plan.evaluate(&ctx).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Str("bolt".into()), Value::Integer(2)],
                vec![Value::Str("nut".into()), Value::Integer(1)],
            ]
        );
    }

    #[test]
    fn naked_column_next_to_aggregate_is_rejected() {
        let (_catalog, conn) = setup();
        let planner = Planner::new(&conn);
        let simple = SimpleSelect {
            columns: vec![
                SelectColumn::Expr {
                    expr: Expression::Column(ColumnRef::bare("id")),
                    alias: None,
                },
                SelectColumn::Expr {
                    expr: Expression::Function("COUNT".into(), vec![]),
                    alias: None,
                },
            ],
            from: vec![FromClause {
                source: FromKind::Table("Part".into()),
                alias: None,
            }],
            group_by: vec![Expression::Column(ColumnRef::bare("name"))],
            ..SimpleSelect::default()
        };
        assert!(
            planner
                .plan_query(&SelectExpr::Simple(simple), &[])
                .is_err()
        );
    }

    #[test]
    fn mutation_plan_preserves_row_ids() {
        let (_catalog, conn) = setup();
        let planner = Planner::new(&conn);
        let predicate = Expression::Equal(
            Box::new(Expression::Column(ColumnRef::bare("name"))),
            Box::new(Expression::Constant(Value::Str("bolt".into()))),
        );
        let mutation = planner
            .plan_mutation("Part", Some(&predicate), Some(1))
            .unwrap();
        let ctx = ExecutionContext::new(&conn);
        let rows = mutation.plan.evaluate_with_ids(&ctx).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1[0], Value::Integer(1));
    }

    #[test]
    fn composite_width_mismatch_is_rejected() {
        let (_catalog, conn) = setup();
        let planner = Planner::new(&conn);
        let narrow = SimpleSelect {
            columns: vec![SelectColumn::Expr {
                expr: Expression::Column(ColumnRef::bare("id")),
                alias: None,
            }],
            from: vec![FromClause {
                source: FromKind::Table("Part".into()),
                alias: None,
            }],
            ..SimpleSelect::default()
        };
        let composite = SelectExpr::Composite {
            op: crate::types::query::CompositeOp::Union,
            all: false,
            left: Box::new(SelectExpr::Simple(select_all("Part"))),
            right: Box::new(SelectExpr::Simple(narrow)),
        };
        assert!(matches!(
            planner.plan_query(&composite, &[]),
            Err(Error::ArityMismatch(_))
        ));
    }
}
