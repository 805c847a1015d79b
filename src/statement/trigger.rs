//! CREATE TRIGGER / DROP TRIGGER
//!
//! Triggers are named listeners on one table, filtered by event kind.
//! The engine only records firings; procedural trigger bodies live
//! outside this layer.

use crate::catalog::{Connection, TriggerKind};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::types::schema::{ObjectName, ResultTable};

#[derive(Debug)]
struct Prepared {
    table: ObjectName,
    kinds: Vec<TriggerKind>,
}

#[derive(Debug)]
pub struct CreateTrigger {
    name: String,
    table_name: String,
    events: Vec<String>,
    prepared: Option<Prepared>,
}

impl CreateTrigger {
    pub fn from_command(command: &Command) -> Result<Self> {
        let events = command
            .opt_str_list_field("events")?
            .map(|e| e.to_vec())
            .unwrap_or_default();
        Ok(CreateTrigger {
            name: command.str_field("name")?.to_string(),
            table_name: command.str_field("table")?.to_string(),
            events,
            prepared: None,
        })
    }

    fn prepared(&self) -> Result<&Prepared> {
        self.prepared
            .as_ref()
            .ok_or(Error::StatementState("unprepared"))
    }

    pub fn prepare(&mut self, conn: &Connection) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Command("trigger requires a name".into()));
        }
        if self.events.is_empty() {
            return Err(Error::Command("trigger requires at least one event".into()));
        }
        let mut kinds = Vec::with_capacity(self.events.len());
        for event in &self.events {
            kinds.push(match event.to_ascii_lowercase().as_str() {
                "insert" => TriggerKind::Insert,
                "update" => TriggerKind::Update,
                "delete" => TriggerKind::Delete,
                other => {
                    return Err(Error::InvalidValue(format!(
                        "unknown trigger event '{}'",
                        other
                    )));
                }
            });
        }
        let table = conn.resolve_table_name(&self.table_name)?;
        self.prepared = Some(Prepared { table, kinds });
        Ok(())
    }

    pub fn evaluate(&self, conn: &Connection) -> Result<ResultTable> {
        let prepared = self.prepared()?;
        if !conn.can_create_trigger(&prepared.table) {
            return Err(Error::AccessDenied {
                action: "create trigger on".into(),
                object: prepared.table.to_string(),
            });
        }
        conn.create_trigger(&self.name, &prepared.table, prepared.kinds.clone())?;
        Ok(ResultTable::empty())
    }
}

#[derive(Debug)]
pub struct DropTrigger {
    name: String,
}

impl DropTrigger {
    pub fn from_command(command: &Command) -> Result<Self> {
        Ok(DropTrigger {
            name: command.str_field("name")?.to_string(),
        })
    }

    pub fn prepare(&mut self, _conn: &Connection) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Command("trigger requires a name".into()));
        }
        Ok(())
    }

    pub fn evaluate(&self, conn: &Connection) -> Result<ResultTable> {
        conn.drop_trigger(&self.name)?;
        Ok(ResultTable::empty())
    }
}
