//! Schema definition objects
//!
//! `ColumnDef` and `ConstraintDef` are parse-time value objects consumed by
//! CREATE TABLE. They are converted into the physical `TableSchema` /
//! `TableColumn` descriptors before anything reaches the table store.

use crate::error::{Error, Result};
use crate::types::data_type::SqlType;
use crate::types::expression::Expression;
use crate::types::value::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectName {
    pub schema: String,
    pub name: String,
}

impl ObjectName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectName {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn eq_ignore_case(&self, other: &ObjectName) -> bool {
        self.schema.eq_ignore_ascii_case(&other.schema)
            && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A column definition from CREATE TABLE, before physical conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    /// Required runtime class for OBJECT columns.
    pub class_constraint: Option<String>,
    /// Requested index scheme for the storage layer.
    pub index_scheme: Option<String>,
    pub default: Option<Expression>,
    pub not_null: bool,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        ColumnDef {
            name: name.into(),
            sql_type,
            class_constraint: None,
            index_scheme: None,
            default: None,
            not_null: false,
            primary_key: false,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, expr: Expression) -> Self {
        self.default = Some(expr);
        self
    }

    /// Converts to the physical column descriptor.
    pub fn to_physical(&self) -> TableColumn {
        TableColumn {
            name: self.name.clone(),
            sql_type: self.sql_type.clone(),
            not_null: self.not_null,
            default: self.default.clone(),
        }
    }
}

/// Referential action for FOREIGN KEY update/delete rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForeignKeyRule {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
}

/// A table constraint definition from CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDef {
    pub name: Option<String>,
    pub kind: ConstraintKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    PrimaryKey {
        columns: Vec<String>,
    },
    Unique {
        columns: Vec<String>,
    },
    ForeignKey {
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
        update_rule: ForeignKeyRule,
        delete_rule: ForeignKeyRule,
        deferred: bool,
    },
    Check {
        expr: Expression,
    },
}

impl ConstraintDef {
    pub fn primary_key(columns: Vec<String>) -> Self {
        ConstraintDef {
            name: None,
            kind: ConstraintKind::PrimaryKey { columns },
        }
    }

    pub fn unique(columns: Vec<String>) -> Self {
        ConstraintDef {
            name: None,
            kind: ConstraintKind::Unique { columns },
        }
    }

    /// Builds a FOREIGN KEY constraint. The two column lists must have the
    /// same, nonzero length; this invariant holds for every constructed
    /// value, so downstream code never re-checks it.
    pub fn foreign_key(
        columns: Vec<String>,
        ref_table: impl Into<String>,
        ref_columns: Vec<String>,
    ) -> Result<Self> {
        if columns.is_empty() || columns.len() != ref_columns.len() {
            return Err(Error::InvalidValue(format!(
                "foreign key column lists must match: {} vs {}",
                columns.len(),
                ref_columns.len()
            )));
        }
        Ok(ConstraintDef {
            name: None,
            kind: ConstraintKind::ForeignKey {
                columns,
                ref_table: ref_table.into(),
                ref_columns,
                update_rule: ForeignKeyRule::default(),
                delete_rule: ForeignKeyRule::default(),
                deferred: false,
            },
        })
    }

    pub fn check(expr: Expression) -> Self {
        ConstraintDef {
            name: None,
            kind: ConstraintKind::Check { expr },
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A physical column descriptor, as seen by the table store.
#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    pub name: String,
    pub sql_type: SqlType,
    pub not_null: bool,
    pub default: Option<Expression>,
}

/// A physical table descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: ObjectName,
    pub columns: Vec<TableColumn>,
}

impl TableSchema {
    pub fn new(name: ObjectName, columns: Vec<TableColumn>) -> Self {
        TableSchema { name, columns }
    }

    /// Finds a column by name under the given case mode. An exact match
    /// wins; otherwise a case-insensitive lookup matching more than one
    /// declared column is an ambiguity error, never a silent pick.
    pub fn column_index(&self, name: &str, ignore_case: bool) -> Result<usize> {
        if let Some(index) = self.columns.iter().position(|c| c.name == name) {
            return Ok(index);
        }
        if !ignore_case {
            return Err(Error::ColumnNotFound(name.to_string()));
        }
        let mut matches = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name.eq_ignore_ascii_case(name));
        let Some((index, _)) = matches.next() else {
            return Err(Error::ColumnNotFound(name.to_string()));
        };
        if let Some((other, _)) = matches.next() {
            return Err(Error::AmbiguousColumn {
                name: name.to_string(),
                matches: vec![
                    self.columns[index].name.clone(),
                    self.columns[other].name.clone(),
                ],
            });
        }
        Ok(index)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// The uniform result of evaluating any statement: one relational table.
/// DML returns a one-row/one-column affected count, DDL a zero-row table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        ResultTable { columns, rows }
    }

    /// Zero-row result for DDL statements.
    pub fn empty() -> Self {
        ResultTable {
            columns: vec!["result".into()],
            rows: vec![],
        }
    }

    /// One-row/one-column affected-count result for DML statements.
    pub fn affected(count: usize) -> Self {
        ResultTable {
            columns: vec!["result".into()],
            rows: vec![vec![crate::types::value::Value::Integer(count as i64)]],
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case_colliding_schema() -> TableSchema {
        let column = |name: &str| TableColumn {
            name: name.into(),
            sql_type: SqlType::Integer,
            not_null: false,
            default: None,
        };
        TableSchema::new(
            ObjectName::new("APP", "T"),
            vec![column("id"), column("ID")],
        )
    }

    #[test]
    fn column_index_prefers_the_exact_match() {
        let schema = case_colliding_schema();
        assert_eq!(schema.column_index("id", true).unwrap(), 0);
        assert_eq!(schema.column_index("ID", true).unwrap(), 1);
    }

    #[test]
    fn column_index_reports_case_collisions_as_ambiguity() {
        let schema = case_colliding_schema();
        assert!(matches!(
            schema.column_index("Id", true),
            Err(Error::AmbiguousColumn { .. })
        ));
        assert!(matches!(
            schema.column_index("Id", false),
            Err(Error::ColumnNotFound(_))
        ));
    }
}
