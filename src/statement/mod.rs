//! Statements and the two-phase protocol
//!
//! A `Statement` wraps one statement kind behind the strict lifecycle
//! `Unprepared -> Prepared -> Evaluated`. Prepare resolves names and
//! builds plans against catalog metadata only; evaluate checks
//! privileges, touches row data and returns one `ResultTable`. Between
//! the two phases a lock manager may consult `reads_from`, `writes_to`
//! and `is_exclusive`; those declarations are a superset of the tables
//! evaluation actually touches.

mod create_table;
mod delete;
mod insert;
mod schema;
mod select;
mod set;
mod show;
mod trigger;
mod update;

pub use create_table::CreateTable;
pub use delete::Delete;
pub use insert::Insert;
pub use schema::SchemaStatement;
pub use select::Select;
pub use set::SetStatement;
pub use show::ShowStatement;
pub use trigger::{CreateTrigger, DropTrigger};
pub use update::Update;

use crate::catalog::Connection;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::types::schema::{ObjectName, ResultTable};
use std::collections::BTreeSet;

/// Lifecycle of one statement. `Evaluated` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Unprepared,
    Prepared,
    Evaluated,
}

/// The closed set of statement kinds.
#[derive(Debug)]
pub enum StatementKind {
    CreateTable(CreateTable),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Select(Select),
    Schema(SchemaStatement),
    Set(SetStatement),
    Show(ShowStatement),
    CreateTrigger(CreateTrigger),
    DropTrigger(DropTrigger),
}

#[derive(Debug)]
pub struct Statement {
    kind: StatementKind,
    state: StatementState,
}

impl Statement {
    /// Constructs the right statement kind from a command's tag. Field
    /// validation beyond shape happens in `prepare`.
    pub fn from_command(command: &Command) -> Result<Statement> {
        let kind = match command.tag() {
            "create_table" => StatementKind::CreateTable(CreateTable::from_command(command)?),
            "insert" => StatementKind::Insert(Insert::from_command(command)?),
            "update" => StatementKind::Update(Update::from_command(command)?),
            "delete" => StatementKind::Delete(Delete::from_command(command)?),
            "select" => StatementKind::Select(Select::from_command(command)?),
            "schema" => StatementKind::Schema(SchemaStatement::from_command(command)?),
            "set" => StatementKind::Set(SetStatement::from_command(command)?),
            "show" => StatementKind::Show(ShowStatement::from_command(command)?),
            "create_trigger" => {
                StatementKind::CreateTrigger(CreateTrigger::from_command(command)?)
            }
            "drop_trigger" => StatementKind::DropTrigger(DropTrigger::from_command(command)?),
            other => {
                return Err(Error::Command(format!("unknown statement tag '{}'", other)));
            }
        };
        Ok(Statement {
            kind,
            state: StatementState::Unprepared,
        })
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    fn kind_name(&self) -> &'static str {
        match &self.kind {
            StatementKind::CreateTable(_) => "create table",
            StatementKind::Insert(_) => "insert",
            StatementKind::Update(_) => "update",
            StatementKind::Delete(_) => "delete",
            StatementKind::Select(_) => "select",
            StatementKind::Schema(_) => "schema",
            StatementKind::Set(_) => "set",
            StatementKind::Show(_) => "show",
            StatementKind::CreateTrigger(_) => "create trigger",
            StatementKind::DropTrigger(_) => "drop trigger",
        }
    }

    /// Phase one: resolve names, build plans, validate semantics.
    /// Metadata-only; no row data is read.
    pub fn prepare(&mut self, conn: &Connection) -> Result<()> {
        match self.state {
            StatementState::Unprepared => {}
            StatementState::Prepared => {
                return Err(Error::StatementState("already prepared"));
            }
            StatementState::Evaluated => {
                return Err(Error::StatementState("already evaluated"));
            }
        }
        tracing::debug!(kind = self.kind_name(), "preparing statement");
        match &mut self.kind {
            StatementKind::CreateTable(s) => s.prepare(conn)?,
            StatementKind::Insert(s) => s.prepare(conn)?,
            StatementKind::Update(s) => s.prepare(conn)?,
            StatementKind::Delete(s) => s.prepare(conn)?,
            StatementKind::Select(s) => s.prepare(conn)?,
            StatementKind::Schema(s) => s.prepare(conn)?,
            StatementKind::Set(s) => s.prepare(conn)?,
            StatementKind::Show(s) => s.prepare(conn)?,
            StatementKind::CreateTrigger(s) => s.prepare(conn)?,
            StatementKind::DropTrigger(s) => s.prepare(conn)?,
        }
        self.state = StatementState::Prepared;
        Ok(())
    }

    /// Phase two: privilege check, execution, result. Requires a
    /// successful `prepare`; runs at most once.
    pub fn evaluate(&mut self, conn: &Connection) -> Result<ResultTable> {
        match self.state {
            StatementState::Prepared => {}
            StatementState::Unprepared => {
                return Err(Error::StatementState("unprepared"));
            }
            StatementState::Evaluated => {
                return Err(Error::StatementState("already evaluated"));
            }
        }
        tracing::debug!(kind = self.kind_name(), "evaluating statement");
        let result = match &self.kind {
            StatementKind::CreateTable(s) => s.evaluate(conn)?,
            StatementKind::Insert(s) => s.evaluate(conn)?,
            StatementKind::Update(s) => s.evaluate(conn)?,
            StatementKind::Delete(s) => s.evaluate(conn)?,
            StatementKind::Select(s) => s.evaluate(conn)?,
            StatementKind::Schema(s) => s.evaluate(conn)?,
            StatementKind::Set(s) => s.evaluate(conn)?,
            StatementKind::Show(s) => s.evaluate(conn)?,
            StatementKind::CreateTrigger(s) => s.evaluate(conn)?,
            StatementKind::DropTrigger(s) => s.evaluate(conn)?,
        };
        self.state = StatementState::Evaluated;
        Ok(result)
    }

    fn require_prepared(&self) -> Result<()> {
        match self.state {
            StatementState::Prepared | StatementState::Evaluated => Ok(()),
            StatementState::Unprepared => Err(Error::StatementState("unprepared")),
        }
    }

    /// True for schema-mutating statements and for DML against reserved
    /// system tables.
    pub fn is_exclusive(&self) -> Result<bool> {
        self.require_prepared()?;
        match &self.kind {
            StatementKind::CreateTable(_)
            | StatementKind::Schema(_)
            | StatementKind::Set(_) => Ok(true),
            StatementKind::Insert(s) => s.is_exclusive(),
            StatementKind::Update(s) => s.is_exclusive(),
            StatementKind::Delete(s) => s.is_exclusive(),
            StatementKind::Select(_)
            | StatementKind::Show(_)
            | StatementKind::CreateTrigger(_)
            | StatementKind::DropTrigger(_) => Ok(false),
        }
    }

    /// Every table evaluation may read, directly or transitively.
    pub fn reads_from(&self, conn: &Connection) -> Result<BTreeSet<ObjectName>> {
        self.require_prepared()?;
        match &self.kind {
            StatementKind::Insert(s) => s.reads_from(conn),
            StatementKind::Update(s) => s.reads_from(conn),
            StatementKind::Delete(s) => s.reads_from(conn),
            StatementKind::Select(s) => s.reads_from(),
            StatementKind::CreateTable(_)
            | StatementKind::Schema(_)
            | StatementKind::Set(_)
            | StatementKind::Show(_)
            | StatementKind::CreateTrigger(_)
            | StatementKind::DropTrigger(_) => Ok(BTreeSet::new()),
        }
    }

    /// Every table evaluation may write.
    pub fn writes_to(&self) -> Result<BTreeSet<ObjectName>> {
        self.require_prepared()?;
        match &self.kind {
            StatementKind::Insert(s) => s.writes_to(),
            StatementKind::Update(s) => s.writes_to(),
            StatementKind::Delete(s) => s.writes_to(),
            StatementKind::CreateTable(_)
            | StatementKind::Select(_)
            | StatementKind::Schema(_)
            | StatementKind::Set(_)
            | StatementKind::Show(_)
            | StatementKind::CreateTrigger(_)
            | StatementKind::DropTrigger(_) => Ok(BTreeSet::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::command::CommandValue;
    use crate::types::data_type::SqlType;
    use crate::types::schema::ColumnDef;

    fn create_table_command() -> Command {
        Command::new("create_table")
            .with_str("table", "T")
            .set(
                "columns",
                CommandValue::Columns(vec![ColumnDef::new("id", SqlType::Integer)]),
            )
    }

    #[test]
    fn evaluate_before_prepare_is_a_state_error() {
        let catalog = Catalog::new();
        let conn = catalog.connect("admin");
        let mut stmt = Statement::from_command(&create_table_command()).unwrap();
        assert!(matches!(
            stmt.evaluate(&conn),
            Err(Error::StatementState(_))
        ));
        assert!(matches!(
            stmt.reads_from(&conn),
            Err(Error::StatementState(_))
        ));
    }

    #[test]
    fn lifecycle_is_strictly_ordered_and_terminal() {
        let catalog = Catalog::new();
        let conn = catalog.connect("admin");
        let mut stmt = Statement::from_command(&create_table_command()).unwrap();
        stmt.prepare(&conn).unwrap();
        assert!(matches!(
            stmt.prepare(&conn),
            Err(Error::StatementState(_))
        ));
        assert!(stmt.is_exclusive().unwrap());
        stmt.evaluate(&conn).unwrap();
        assert_eq!(stmt.state(), StatementState::Evaluated);
        assert!(matches!(
            stmt.evaluate(&conn),
            Err(Error::StatementState(_))
        ));
    }

    #[test]
    fn unknown_tag_is_a_command_error() {
        let command = Command::new("vacuum");
        assert!(matches!(
            Statement::from_command(&command),
            Err(Error::Command(_))
        ));
    }
}
