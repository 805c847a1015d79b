//! CREATE SCHEMA / DROP SCHEMA

use crate::catalog::Connection;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::types::schema::ResultTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaAction {
    Create,
    Drop,
}

#[derive(Debug)]
pub struct SchemaStatement {
    action: SchemaAction,
    name: String,
}

impl SchemaStatement {
    pub fn from_command(command: &Command) -> Result<Self> {
        let action = match command.str_field("action")? {
            "create" => SchemaAction::Create,
            "drop" => SchemaAction::Drop,
            other => {
                return Err(Error::Command(format!(
                    "unknown schema action '{}'",
                    other
                )));
            }
        };
        Ok(SchemaStatement {
            action,
            name: command.str_field("name")?.to_string(),
        })
    }

    pub fn prepare(&mut self, _conn: &Connection) -> Result<()> {
        if self.name.is_empty() || self.name.contains('.') {
            return Err(Error::InvalidValue(format!(
                "invalid schema name '{}'",
                self.name
            )));
        }
        Ok(())
    }

    pub fn evaluate(&self, conn: &Connection) -> Result<ResultTable> {
        if !conn.can_create_and_drop_schema() {
            return Err(Error::AccessDenied {
                action: match self.action {
                    SchemaAction::Create => "create schema".into(),
                    SchemaAction::Drop => "drop schema".into(),
                },
                object: self.name.clone(),
            });
        }
        match self.action {
            SchemaAction::Create => conn.create_schema(&self.name)?,
            SchemaAction::Drop => conn.drop_schema(&self.name)?,
        }
        Ok(ResultTable::empty())
    }
}
