//! SHOW
//!
//! Metadata queries over the catalog and session: tables in the current
//! schema, all schemas, session variables, and session status.

use crate::catalog::Connection;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::types::schema::ResultTable;
use crate::types::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShowTarget {
    Tables,
    Schemas,
    Variables,
    Status,
}

#[derive(Debug)]
pub struct ShowStatement {
    target: ShowTarget,
}

impl ShowStatement {
    pub fn from_command(command: &Command) -> Result<Self> {
        let target = match command.str_field("target")? {
            "tables" => ShowTarget::Tables,
            "schemas" => ShowTarget::Schemas,
            "variables" => ShowTarget::Variables,
            "status" => ShowTarget::Status,
            other => {
                return Err(Error::Command(format!("unknown show target '{}'", other)));
            }
        };
        Ok(ShowStatement { target })
    }

    pub fn prepare(&mut self, _conn: &Connection) -> Result<()> {
        Ok(())
    }

    pub fn evaluate(&self, conn: &Connection) -> Result<ResultTable> {
        Ok(match self.target {
            ShowTarget::Tables => ResultTable::new(
                vec!["table".into()],
                conn.list_tables(&conn.current_schema())
                    .into_iter()
                    .map(|name| vec![Value::Str(name)])
                    .collect(),
            ),
            ShowTarget::Schemas => ResultTable::new(
                vec!["schema".into()],
                conn.list_schemas()
                    .into_iter()
                    .map(|name| vec![Value::Str(name)])
                    .collect(),
            ),
            ShowTarget::Variables => ResultTable::new(
                vec!["name".into(), "value".into()],
                conn.session_vars()
                    .into_iter()
                    .map(|(name, value)| vec![Value::Str(name), value])
                    .collect(),
            ),
            ShowTarget::Status => {
                let settings = conn.settings();
                let rows = vec![
                    ("user", Value::Str(conn.user())),
                    ("schema", Value::Str(settings.current_schema)),
                    ("auto_commit", Value::Bool(settings.auto_commit)),
                    ("isolation_level", Value::Str(settings.isolation_level)),
                    ("ignore_case", Value::Bool(settings.ignore_case)),
                ];
                ResultTable::new(
                    vec!["name".into(), "value".into()],
                    rows.into_iter()
                        .map(|(name, value)| vec![Value::Str(name.into()), value])
                        .collect(),
                )
            }
        })
    }
}
