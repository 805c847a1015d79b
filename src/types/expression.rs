//! SQL expressions
//!
//! An expression starts life with named column references (`Column`) and
//! raw sub-selects (`Subquery`). During prepare, name resolution rewrites
//! every `Column` to a `Field` offset and the planner compiles every
//! `Subquery` into a `Subplan`. A prepared expression therefore never
//! consults the catalog again; evaluation only needs a row.

use crate::error::Result;
use crate::planning::plan::QueryPlan;
use crate::types::query::SelectExpr;
use crate::types::value::Value;
use std::fmt::{self, Display};

/// A possibly-qualified column name, prior to resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn bare(column: impl Into<String>) -> Self {
        ColumnRef {
            schema: None,
            table: None,
            column: column.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            schema: None,
            table: Some(table.into()),
            column: column.into(),
        }
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{}.", schema)?;
        }
        if let Some(table) = &self.table {
            write!(f, "{}.", table)?;
        }
        write!(f, "{}", self.column)
    }
}

/// An expression tree over values, column references and sub-selects.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A constant value.
    Constant(Value),
    /// A named column reference; resolved to `Field` during prepare.
    Column(ColumnRef),
    /// A resolved column offset into the current row.
    Field(usize),

    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),

    Equal(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),
    GreaterThan(Box<Expression>, Box<Expression>),
    GreaterThanOrEqual(Box<Expression>, Box<Expression>),
    LessThan(Box<Expression>, Box<Expression>),
    LessThanOrEqual(Box<Expression>, Box<Expression>),

    Add(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),

    Like {
        expr: Box<Expression>,
        pattern: Box<Expression>,
        negated: bool,
    },
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },

    /// Function call (aggregates included; the planner decides which).
    Function(String, Vec<Expression>),

    /// A raw sub-select, as delivered by the parser.
    Subquery(Box<SelectExpr>),
    /// A compiled scalar sub-select.
    Subplan(Box<QueryPlan>),
    /// `expr IN (SELECT ...)`, compiled.
    InSubplan {
        expr: Box<Expression>,
        plan: Box<QueryPlan>,
        negated: bool,
    },
}

/// Aggregate functions the planner recognizes.
pub const AGGREGATE_FUNCTIONS: [&str; 5] = ["COUNT", "SUM", "AVG", "MIN", "MAX"];

impl Expression {
    /// Visits every node in the tree, including compiled subplan children.
    pub fn for_each<'a>(&'a self, f: &mut impl FnMut(&'a Expression)) {
        f(self);
        match self {
            Expression::Constant(_)
            | Expression::Column(_)
            | Expression::Field(_)
            | Expression::Subquery(_)
            | Expression::Subplan(_) => {}
            Expression::And(l, r)
            | Expression::Or(l, r)
            | Expression::Equal(l, r)
            | Expression::NotEqual(l, r)
            | Expression::GreaterThan(l, r)
            | Expression::GreaterThanOrEqual(l, r)
            | Expression::LessThan(l, r)
            | Expression::LessThanOrEqual(l, r)
            | Expression::Add(l, r)
            | Expression::Subtract(l, r)
            | Expression::Multiply(l, r)
            | Expression::Divide(l, r) => {
                l.for_each(f);
                r.for_each(f);
            }
            Expression::Not(e) | Expression::Negate(e) => e.for_each(f),
            Expression::Like { expr, pattern, .. } => {
                expr.for_each(f);
                pattern.for_each(f);
            }
            Expression::Between {
                expr, low, high, ..
            } => {
                expr.for_each(f);
                low.for_each(f);
                high.for_each(f);
            }
            Expression::InList { expr, list, .. } => {
                expr.for_each(f);
                for item in list {
                    item.for_each(f);
                }
            }
            Expression::IsNull { expr, .. } => expr.for_each(f),
            Expression::Function(_, args) => {
                for arg in args {
                    arg.for_each(f);
                }
            }
            Expression::InSubplan { expr, .. } => expr.for_each(f),
        }
    }

    /// True if the tree contains a sub-select (raw or compiled).
    pub fn contains_subquery(&self) -> bool {
        let mut found = false;
        self.for_each(&mut |e| {
            if matches!(
                e,
                Expression::Subquery(_) | Expression::Subplan(_) | Expression::InSubplan { .. }
            ) {
                found = true;
            }
        });
        found
    }

    /// True if this node is an aggregate function call.
    pub fn is_aggregate(&self) -> bool {
        match self {
            Expression::Function(name, _) => {
                let upper = name.to_ascii_uppercase();
                AGGREGATE_FUNCTIONS.contains(&upper.as_str())
            }
            _ => false,
        }
    }

    /// True if the tree contains an aggregate call at any depth.
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.for_each(&mut |e| {
            if e.is_aggregate() {
                found = true;
            }
        });
        found
    }

    /// Collects the compiled subplans in the tree.
    pub fn subplans(&self) -> Vec<&QueryPlan> {
        let mut plans = Vec::new();
        self.for_each(&mut |e| match e {
            Expression::Subplan(p) => plans.push(p.as_ref()),
            Expression::InSubplan { plan, .. } => plans.push(plan.as_ref()),
            _ => {}
        });
        plans
    }

    /// Rewrites the tree bottom-up: every `Column` through `resolve`, every
    /// raw `Subquery` through `plan`. Used once, during prepare.
    pub fn resolve(
        self,
        resolve: &mut impl FnMut(&ColumnRef) -> Result<usize>,
        plan: &mut impl FnMut(&SelectExpr) -> Result<QueryPlan>,
    ) -> Result<Expression> {
        use Expression::*;
        let mut bin = |l: Box<Expression>,
                       r: Box<Expression>,
                       resolve: &mut dyn FnMut(&ColumnRef) -> Result<usize>,
                       plan: &mut dyn FnMut(&SelectExpr) -> Result<QueryPlan>|
         -> Result<(Box<Expression>, Box<Expression>)> {
            Ok((
                Box::new(l.resolve_dyn(resolve, plan)?),
                Box::new(r.resolve_dyn(resolve, plan)?),
            ))
        };
        Ok(match self {
            Constant(v) => Constant(v),
            Column(c) => Field(resolve(&c)?),
            Field(i) => Field(i),
            And(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                And(l, r)
            }
            Or(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                Or(l, r)
            }
            Not(e) => Not(Box::new(e.resolve_dyn(resolve, plan)?)),
            Equal(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                Equal(l, r)
            }
            NotEqual(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                NotEqual(l, r)
            }
            GreaterThan(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                GreaterThan(l, r)
            }
            GreaterThanOrEqual(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                GreaterThanOrEqual(l, r)
            }
            LessThan(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                LessThan(l, r)
            }
            LessThanOrEqual(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                LessThanOrEqual(l, r)
            }
            Add(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                Add(l, r)
            }
            Subtract(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                Subtract(l, r)
            }
            Multiply(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                Multiply(l, r)
            }
            Divide(l, r) => {
                let (l, r) = bin(l, r, resolve, plan)?;
                Divide(l, r)
            }
            Negate(e) => Negate(Box::new(e.resolve_dyn(resolve, plan)?)),
            Like {
                expr,
                pattern,
                negated,
            } => Like {
                expr: Box::new(expr.resolve_dyn(resolve, plan)?),
                pattern: Box::new(pattern.resolve_dyn(resolve, plan)?),
                negated,
            },
            Between {
                expr,
                low,
                high,
                negated,
            } => Between {
                expr: Box::new(expr.resolve_dyn(resolve, plan)?),
                low: Box::new(low.resolve_dyn(resolve, plan)?),
                high: Box::new(high.resolve_dyn(resolve, plan)?),
                negated,
            },
            InList {
                expr,
                list,
                negated,
            } => InList {
                expr: Box::new(expr.resolve_dyn(resolve, plan)?),
                list: list
                    .into_iter()
                    .map(|e| e.resolve_dyn(resolve, plan))
                    .collect::<Result<_>>()?,
                negated,
            },
            IsNull { expr, negated } => IsNull {
                expr: Box::new(expr.resolve_dyn(resolve, plan)?),
                negated,
            },
            Function(name, args) => Function(
                name,
                args.into_iter()
                    .map(|e| e.resolve_dyn(resolve, plan))
                    .collect::<Result<_>>()?,
            ),
            Subquery(select) => Subplan(Box::new(plan(&select)?)),
            Subplan(p) => Subplan(p),
            InSubplan {
                expr,
                plan: p,
                negated,
            } => InSubplan {
                expr: Box::new(expr.resolve_dyn(resolve, plan)?),
                plan: p,
                negated,
            },
        })
    }

    fn resolve_dyn(
        self,
        resolve: &mut dyn FnMut(&ColumnRef) -> Result<usize>,
        plan: &mut dyn FnMut(&SelectExpr) -> Result<QueryPlan>,
    ) -> Result<Expression> {
        self.resolve(&mut |c| resolve(c), &mut |s| plan(s))
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Expression::*;
        match self {
            Constant(v) => write!(f, "{}", v),
            Column(c) => write!(f, "{}", c),
            Field(i) => write!(f, "#{}", i),
            And(l, r) => write!(f, "({} AND {})", l, r),
            Or(l, r) => write!(f, "({} OR {})", l, r),
            Not(e) => write!(f, "(NOT {})", e),
            Equal(l, r) => write!(f, "({} = {})", l, r),
            NotEqual(l, r) => write!(f, "({} <> {})", l, r),
            GreaterThan(l, r) => write!(f, "({} > {})", l, r),
            GreaterThanOrEqual(l, r) => write!(f, "({} >= {})", l, r),
            LessThan(l, r) => write!(f, "({} < {})", l, r),
            LessThanOrEqual(l, r) => write!(f, "({} <= {})", l, r),
            Add(l, r) => write!(f, "({} + {})", l, r),
            Subtract(l, r) => write!(f, "({} - {})", l, r),
            Multiply(l, r) => write!(f, "({} * {})", l, r),
            Divide(l, r) => write!(f, "({} / {})", l, r),
            Negate(e) => write!(f, "(-{})", e),
            Like {
                expr,
                pattern,
                negated,
            } => write!(
                f,
                "({}{} LIKE {})",
                expr,
                if *negated { " NOT" } else { "" },
                pattern
            ),
            Between {
                expr,
                low,
                high,
                negated,
            } => write!(
                f,
                "({}{} BETWEEN {} AND {})",
                expr,
                if *negated { " NOT" } else { "" },
                low,
                high
            ),
            InList {
                expr,
                list,
                negated,
            } => {
                write!(f, "({}{} IN (", expr, if *negated { " NOT" } else { "" })?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "))")
            }
            IsNull { expr, negated } => write!(
                f,
                "({} IS{} NULL)",
                expr,
                if *negated { " NOT" } else { "" }
            ),
            Function(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Subquery(_) => write!(f, "(SELECT ...)"),
            Subplan(_) => write!(f, "(subplan)"),
            InSubplan { expr, negated, .. } => write!(
                f,
                "({}{} IN (subplan))",
                expr,
                if *negated { " NOT" } else { "" }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::value::Value;

    #[test]
    fn subplans_are_collected_and_usable_after_the_walk() {
        let expr = Expression::And(
            Box::new(Expression::Subplan(Box::new(QueryPlan::Nothing))),
            Box::new(Expression::InSubplan {
                expr: Box::new(Expression::Constant(Value::Integer(1))),
                plan: Box::new(QueryPlan::Nothing),
                negated: false,
            }),
        );
        let plans = expr.subplans();
        assert_eq!(plans.len(), 2);
        assert!(plans.iter().all(|p| matches!(p, QueryPlan::Nothing)));
    }
}
