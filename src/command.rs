//! Statement command envelopes
//!
//! A `Command` is the parsed, typed request a statement is constructed
//! from: a tag naming the statement kind plus a bag of named fields.
//! Typed accessors fail with `Error::Command` when a field is missing or
//! has the wrong shape, so statement constructors stay declarative.

use crate::error::{Error, Result};
use crate::types::expression::Expression;
use crate::types::query::{Assignment, OrderByColumn, SelectExpr};
use crate::types::schema::{ColumnDef, ConstraintDef};
use std::collections::HashMap;

/// One typed field of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    Str(String),
    Bool(bool),
    Int(i64),
    StrList(Vec<String>),
    Expr(Expression),
    /// Rows of value expressions, for VALUES-style inserts.
    ExprRows(Vec<Vec<Expression>>),
    Select(SelectExpr),
    Columns(Vec<ColumnDef>),
    Constraints(Vec<ConstraintDef>),
    Assignments(Vec<Assignment>),
    OrderBy(Vec<OrderByColumn>),
}

/// A parsed statement request.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    tag: String,
    fields: HashMap<String, CommandValue>,
}

impl Command {
    pub fn new(tag: impl Into<String>) -> Self {
        Command {
            tag: tag.into(),
            fields: HashMap::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn set(mut self, key: impl Into<String>, value: CommandValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn with_str(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, CommandValue::Str(value.into()))
    }

    pub fn with_bool(self, key: impl Into<String>, value: bool) -> Self {
        self.set(key, CommandValue::Bool(value))
    }

    pub fn with_int(self, key: impl Into<String>, value: i64) -> Self {
        self.set(key, CommandValue::Int(value))
    }

    fn missing(&self, key: &str) -> Error {
        Error::Command(format!("{} is missing field '{}'", self.tag, key))
    }

    fn wrong_shape(&self, key: &str, expected: &str) -> Error {
        Error::Command(format!(
            "{} field '{}' is not a {}",
            self.tag, key, expected
        ))
    }

    pub fn get(&self, key: &str) -> Option<&CommandValue> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Result<&str> {
        match self.fields.get(key) {
            Some(CommandValue::Str(s)) => Ok(s),
            Some(_) => Err(self.wrong_shape(key, "string")),
            None => Err(self.missing(key)),
        }
    }

    pub fn opt_str_field(&self, key: &str) -> Result<Option<&str>> {
        match self.fields.get(key) {
            Some(CommandValue::Str(s)) => Ok(Some(s)),
            Some(_) => Err(self.wrong_shape(key, "string")),
            None => Ok(None),
        }
    }

    /// Boolean field, absent meaning `default`.
    pub fn bool_field(&self, key: &str, default: bool) -> Result<bool> {
        match self.fields.get(key) {
            Some(CommandValue::Bool(b)) => Ok(*b),
            Some(_) => Err(self.wrong_shape(key, "boolean")),
            None => Ok(default),
        }
    }

    pub fn opt_int_field(&self, key: &str) -> Result<Option<i64>> {
        match self.fields.get(key) {
            Some(CommandValue::Int(i)) => Ok(Some(*i)),
            Some(_) => Err(self.wrong_shape(key, "integer")),
            None => Ok(None),
        }
    }

    pub fn opt_str_list_field(&self, key: &str) -> Result<Option<&[String]>> {
        match self.fields.get(key) {
            Some(CommandValue::StrList(list)) => Ok(Some(list)),
            Some(_) => Err(self.wrong_shape(key, "name list")),
            None => Ok(None),
        }
    }

    pub fn opt_expr_field(&self, key: &str) -> Result<Option<&Expression>> {
        match self.fields.get(key) {
            Some(CommandValue::Expr(e)) => Ok(Some(e)),
            Some(_) => Err(self.wrong_shape(key, "expression")),
            None => Ok(None),
        }
    }

    pub fn opt_expr_rows_field(&self, key: &str) -> Result<Option<&[Vec<Expression>]>> {
        match self.fields.get(key) {
            Some(CommandValue::ExprRows(rows)) => Ok(Some(rows)),
            Some(_) => Err(self.wrong_shape(key, "value rows")),
            None => Ok(None),
        }
    }

    pub fn select_field(&self, key: &str) -> Result<&SelectExpr> {
        match self.fields.get(key) {
            Some(CommandValue::Select(s)) => Ok(s),
            Some(_) => Err(self.wrong_shape(key, "select expression")),
            None => Err(self.missing(key)),
        }
    }

    pub fn opt_select_field(&self, key: &str) -> Result<Option<&SelectExpr>> {
        match self.fields.get(key) {
            Some(CommandValue::Select(s)) => Ok(Some(s)),
            Some(_) => Err(self.wrong_shape(key, "select expression")),
            None => Ok(None),
        }
    }

    pub fn columns_field(&self, key: &str) -> Result<&[ColumnDef]> {
        match self.fields.get(key) {
            Some(CommandValue::Columns(c)) => Ok(c),
            Some(_) => Err(self.wrong_shape(key, "column list")),
            None => Err(self.missing(key)),
        }
    }

    pub fn opt_constraints_field(&self, key: &str) -> Result<&[ConstraintDef]> {
        match self.fields.get(key) {
            Some(CommandValue::Constraints(c)) => Ok(c),
            Some(_) => Err(self.wrong_shape(key, "constraint list")),
            None => Ok(&[]),
        }
    }

    pub fn assignments_field(&self, key: &str) -> Result<&[Assignment]> {
        match self.fields.get(key) {
            Some(CommandValue::Assignments(a)) => Ok(a),
            Some(_) => Err(self.wrong_shape(key, "assignment list")),
            None => Err(self.missing(key)),
        }
    }

    pub fn opt_assignments_field(&self, key: &str) -> Result<Option<&[Assignment]>> {
        match self.fields.get(key) {
            Some(CommandValue::Assignments(a)) => Ok(Some(a)),
            Some(_) => Err(self.wrong_shape(key, "assignment list")),
            None => Ok(None),
        }
    }

    pub fn order_by_field(&self, key: &str) -> Result<&[OrderByColumn]> {
        match self.fields.get(key) {
            Some(CommandValue::OrderBy(o)) => Ok(o),
            Some(_) => Err(self.wrong_shape(key, "order-by list")),
            None => Ok(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_report_missing_and_mistyped_fields() {
        let cmd = Command::new("insert")
            .with_str("table", "Part")
            .with_bool("distinct", true);
        assert_eq!(cmd.str_field("table").unwrap(), "Part");
        assert!(matches!(cmd.str_field("ghost"), Err(Error::Command(_))));
        assert!(matches!(cmd.str_field("distinct"), Err(Error::Command(_))));
        assert!(cmd.bool_field("missing", false).unwrap() == false);
    }

    #[test]
    fn absent_optional_fields_default_cleanly() {
        let cmd = Command::new("select");
        assert_eq!(cmd.opt_expr_field("where").unwrap(), None);
        assert!(cmd.order_by_field("order_by").unwrap().is_empty());
        assert!(cmd.opt_constraints_field("constraints").unwrap().is_empty());
    }
}
