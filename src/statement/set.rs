//! SET
//!
//! Session-level switches: a named variable, autocommit, the isolation
//! level, the current schema, and the identifier case mode. Variable
//! values are expressions evaluated without a row; sub-selects are
//! rejected during prepare.

use crate::catalog::Connection;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::planning::evaluate::evaluate;
use crate::types::expression::Expression;
use crate::types::schema::ResultTable;

#[derive(Debug)]
enum SetAction {
    Variable { name: String, value: Expression },
    AutoCommit(bool),
    IsolationLevel(String),
    Schema(String),
    IgnoreCase(bool),
}

#[derive(Debug)]
pub struct SetStatement {
    action: SetAction,
}

impl SetStatement {
    pub fn from_command(command: &Command) -> Result<Self> {
        let action = match command.str_field("action")? {
            "variable" => SetAction::Variable {
                name: command.str_field("name")?.to_string(),
                value: command
                    .opt_expr_field("value")?
                    .cloned()
                    .ok_or_else(|| Error::Command("set is missing field 'value'".into()))?,
            },
            "auto_commit" => SetAction::AutoCommit(command.bool_field("on", true)?),
            "isolation_level" => {
                SetAction::IsolationLevel(command.str_field("level")?.to_string())
            }
            "schema" => SetAction::Schema(command.str_field("name")?.to_string()),
            "ignore_case" => SetAction::IgnoreCase(command.bool_field("on", false)?),
            other => {
                return Err(Error::Command(format!("unknown set action '{}'", other)));
            }
        };
        Ok(SetStatement { action })
    }

    pub fn prepare(&mut self, _conn: &Connection) -> Result<()> {
        if let SetAction::Variable { value, .. } = &self.action {
            if value.contains_subquery() {
                return Err(Error::IllegalSubquery("a SET value"));
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, conn: &Connection) -> Result<ResultTable> {
        match &self.action {
            SetAction::Variable { name, value } => {
                conn.set_var(name, evaluate(value, None, None)?);
            }
            SetAction::AutoCommit(on) => conn.set_auto_commit(*on),
            SetAction::IsolationLevel(level) => conn.set_isolation_level(level),
            SetAction::Schema(name) => conn.set_current_schema(name)?,
            SetAction::IgnoreCase(on) => conn.set_ignore_case(*on),
        }
        Ok(ResultTable::empty())
    }
}
