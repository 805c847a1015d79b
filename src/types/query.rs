//! Query-side statement structures
//!
//! `SelectExpr` is a recursive sum type: a plain SELECT body, or a
//! composite (UNION/INTERSECT/EXCEPT) of two chains. Composite chains are
//! compiled top-down by the planner; nothing walks a mutable `next` link.

use crate::types::expression::{ColumnRef, Expression};

/// A SELECT expression, possibly composed with further selects.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectExpr {
    Simple(SimpleSelect),
    Composite {
        op: CompositeOp,
        all: bool,
        left: Box<SelectExpr>,
        right: Box<SelectExpr>,
    },
}

impl SelectExpr {
    /// The leftmost simple select, which fixes the output shape of a chain.
    pub fn head(&self) -> &SimpleSelect {
        match self {
            SelectExpr::Simple(s) => s,
            SelectExpr::Composite { left, .. } => left.head(),
        }
    }
}

/// Set-composition operator between two selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    Union,
    Intersect,
    Except,
}

impl std::fmt::Display for CompositeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompositeOp::Union => write!(f, "UNION"),
            CompositeOp::Intersect => write!(f, "INTERSECT"),
            CompositeOp::Except => write!(f, "EXCEPT"),
        }
    }
}

/// One plain SELECT body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpleSelect {
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub from: Vec<FromClause>,
    pub where_clause: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
}

/// One entry in the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    /// `*` or `T.*`
    All { table: Option<String> },
    /// An expression with an optional alias.
    Expr {
        expr: Expression,
        alias: Option<String>,
    },
}

/// One entry in the FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub source: FromKind,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromKind {
    /// A base table, by possibly-qualified name.
    Table(String),
    /// A derived table (sub-select in FROM).
    Subquery(Box<SelectExpr>),
}

/// Sort key for ORDER BY.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByColumn {
    pub expr: Expression,
    pub ascending: bool,
}

/// A `column = value` assignment (UPDATE SET, or SET-style INSERT).
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: ColumnRef,
    pub value: Expression,
}
