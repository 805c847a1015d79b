//! In-memory catalog and table store
//!
//! This is the Connection/catalog collaborator the statement layer
//! consumes: schema and table metadata, privileges, constraint
//! registration and enforcement, triggers, session variables and
//! relational-link discovery. Deliberately minimal storage (no indexes,
//! no persistence); durable storage sits behind a different layer.

mod connection;

pub use connection::{Connection, SessionSettings};

use crate::error::{Error, Result};
use crate::types::expression::Expression;
use crate::types::schema::{ForeignKeyRule, ObjectName, TableSchema};
use crate::types::value::{Row, Value};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Tables whose name carries this prefix are reserved for the system;
/// DML against them runs in exclusive mode.
pub const SYSTEM_TABLE_PREFIX: &str = "sys_";

/// Schema used when a session does not pick one.
pub const DEFAULT_SCHEMA: &str = "APP";

/// Row identity within one table, stable for the life of the row.
pub type RowId = u64;

/// Kind of DML event a trigger listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Insert => write!(f, "INSERT"),
            TriggerKind::Update => write!(f, "UPDATE"),
            TriggerKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// One fired trigger event: kind, table, affected-row count.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    pub table: ObjectName,
    pub count: usize,
}

/// A registered trigger definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDef {
    pub name: String,
    pub table: ObjectName,
    pub kinds: Vec<TriggerKind>,
    pub fired: usize,
}

/// Privileges grantable on a table or schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
}

/// A registered constraint with column names resolved to offsets.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredConstraint {
    PrimaryKey {
        name: Option<String>,
        columns: Vec<usize>,
    },
    Unique {
        name: Option<String>,
        columns: Vec<usize>,
    },
    ForeignKey {
        name: Option<String>,
        columns: Vec<usize>,
        ref_table: ObjectName,
        ref_columns: Vec<usize>,
        update_rule: ForeignKeyRule,
        delete_rule: ForeignKeyRule,
        deferred: bool,
    },
    Check {
        name: Option<String>,
        /// Field-resolved against the owning table's columns.
        expr: Expression,
    },
}

#[derive(Debug)]
pub(crate) struct TableEntry {
    pub schema: TableSchema,
    pub rows: Vec<(RowId, Row)>,
    pub next_row_id: RowId,
    pub constraints: Vec<StoredConstraint>,
}

#[derive(Debug, Default)]
pub(crate) struct SchemaEntry {
    /// Keyed by table name exactly as created.
    pub tables: HashMap<String, TableEntry>,
}

#[derive(Default)]
pub(crate) struct CatalogInner {
    pub schemas: HashMap<String, SchemaEntry>,
    pub triggers: HashMap<String, TriggerDef>,
    pub superusers: HashSet<String>,
    /// (user, object, privilege); object is "schema" or "schema.table".
    pub grants: HashSet<(String, String, Privilege)>,
}

/// The shared catalog. Cheap to clone; all clones see the same state.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<RwLock<CatalogInner>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// New catalog with the default schema and an `admin` superuser.
    pub fn new() -> Self {
        let mut inner = CatalogInner::default();
        inner.schemas.insert(DEFAULT_SCHEMA.into(), SchemaEntry::default());
        inner.superusers.insert("admin".into());
        Catalog {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Opens a session for the given user.
    pub fn connect(&self, user: impl Into<String>) -> Connection {
        Connection::new(self.clone(), user.into())
    }

    pub fn add_superuser(&self, user: impl Into<String>) {
        self.inner.write().superusers.insert(user.into());
    }

    pub fn grant(&self, user: impl Into<String>, object: impl Into<String>, privilege: Privilege) {
        self.inner
            .write()
            .grants
            .insert((user.into(), object.into(), privilege));
    }

    pub(crate) fn read(&self) -> parking_lot::RwLockReadGuard<'_, CatalogInner> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> parking_lot::RwLockWriteGuard<'_, CatalogInner> {
        self.inner.write()
    }
}

impl CatalogInner {
    /// Resolves a schema name under the given case mode, returning the
    /// stored (canonical) name. A case-insensitive lookup matching more
    /// than one schema is an ambiguity error, not a miss.
    pub fn find_schema(&self, name: &str, ignore_case: bool) -> Result<Option<&str>> {
        if let Some((stored, _)) = self.schemas.get_key_value(name) {
            return Ok(Some(stored.as_str()));
        }
        if ignore_case {
            let mut matches = self
                .schemas
                .keys()
                .filter(|k| k.eq_ignore_ascii_case(name));
            let Some(first) = matches.next() else {
                return Ok(None);
            };
            if let Some(second) = matches.next() {
                return Err(Error::AmbiguousSchema {
                    name: name.to_string(),
                    matches: vec![first.clone(), second.clone()],
                });
            }
            return Ok(Some(first.as_str()));
        }
        Ok(None)
    }

    /// Resolves a table name inside a schema under the given case mode,
    /// returning the stored (canonical) name.
    pub fn find_table<'a>(
        &'a self,
        schema: &str,
        table: &str,
        ignore_case: bool,
    ) -> Result<Option<(&'a str, &'a TableEntry)>> {
        let Some(entry) = self.schemas.get(schema) else {
            return Ok(None);
        };
        if let Some((name, t)) = entry.tables.get_key_value(table) {
            return Ok(Some((name.as_str(), t)));
        }
        if ignore_case {
            let mut matches = entry
                .tables
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(table));
            let Some((name, t)) = matches.next() else {
                return Ok(None);
            };
            if let Some((other, _)) = matches.next() {
                return Err(Error::AmbiguousTable {
                    name: table.to_string(),
                    matches: vec![name.clone(), other.clone()],
                });
            }
            return Ok(Some((name.as_str(), t)));
        }
        Ok(None)
    }

    pub fn table(&self, name: &ObjectName) -> Result<&TableEntry> {
        self.schemas
            .get(&name.schema)
            .and_then(|s| s.tables.get(&name.name))
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &ObjectName) -> Result<&mut TableEntry> {
        self.schemas
            .get_mut(&name.schema)
            .and_then(|s| s.tables.get_mut(&name.name))
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Tables relationally linked to `table`: FK in either direction.
    pub fn linked_tables(&self, table: &ObjectName) -> Vec<ObjectName> {
        let mut linked = Vec::new();
        // Outgoing links from the table itself
        if let Ok(entry) = self.table(table) {
            for c in &entry.constraints {
                if let StoredConstraint::ForeignKey { ref_table, .. } = c {
                    if ref_table != table && !linked.contains(ref_table) {
                        linked.push(ref_table.clone());
                    }
                }
            }
        }
        // Incoming links from every other table
        for (schema_name, schema) in &self.schemas {
            for (table_name, entry) in &schema.tables {
                let owner = ObjectName::new(schema_name.clone(), table_name.clone());
                if &owner == table {
                    continue;
                }
                for c in &entry.constraints {
                    if let StoredConstraint::ForeignKey { ref_table, .. } = c {
                        if ref_table == table && !linked.contains(&owner) {
                            linked.push(owner.clone());
                        }
                    }
                }
            }
        }
        linked
    }
}

impl TableEntry {
    pub fn new(schema: TableSchema) -> Self {
        TableEntry {
            schema,
            rows: Vec::new(),
            next_row_id: 0,
            constraints: Vec::new(),
        }
    }

    /// Values of the given columns in a row, as a comparable key.
    /// None if any component is NULL (NULL keys never participate in
    /// uniqueness or FK matching).
    pub fn key_of(row: &Row, columns: &[usize]) -> Option<Vec<Value>> {
        let key: Vec<Value> = columns.iter().map(|&i| row[i].clone()).collect();
        if key.iter().any(|v| v.is_null()) {
            None
        } else {
            Some(key)
        }
    }

    /// True if some row (other than `exclude`) carries the key.
    pub fn contains_key(&self, columns: &[usize], key: &[Value], exclude: Option<RowId>) -> bool {
        self.rows.iter().any(|(id, row)| {
            if Some(*id) == exclude {
                return false;
            }
            columns
                .iter()
                .zip(key.iter())
                .all(|(&i, v)| row[i] == *v)
        })
    }

    fn constraint_label(name: &Option<String>, fallback: &str, table: &ObjectName) -> String {
        match name {
            Some(n) => format!("{} on {}", n, table),
            None => format!("{} on {}", fallback, table),
        }
    }

    /// Enforces this table's own constraints for a candidate row.
    /// `exclude` is the row being replaced, for updates.
    pub fn check_row_constraints(
        &self,
        inner: &CatalogInner,
        row: &Row,
        exclude: Option<RowId>,
        touched: &mut Vec<ObjectName>,
    ) -> Result<()> {
        for constraint in &self.constraints {
            match constraint {
                StoredConstraint::PrimaryKey { name, columns } => {
                    for &i in columns {
                        if row[i].is_null() {
                            return Err(Error::NullConstraintViolation(
                                self.schema.columns[i].name.clone(),
                            ));
                        }
                    }
                    let Some(key) = Self::key_of(row, columns) else {
                        continue;
                    };
                    if self.contains_key(columns, &key, exclude) {
                        return Err(Error::PrimaryKeyViolation(Self::constraint_label(
                            name,
                            "PRIMARY KEY",
                            &self.schema.name,
                        )));
                    }
                }
                StoredConstraint::Unique { name, columns } => {
                    if let Some(key) = Self::key_of(row, columns) {
                        if self.contains_key(columns, &key, exclude) {
                            return Err(Error::UniqueConstraintViolation(
                                Self::constraint_label(name, "UNIQUE", &self.schema.name),
                            ));
                        }
                    }
                }
                StoredConstraint::ForeignKey {
                    name,
                    columns,
                    ref_table,
                    ref_columns,
                    ..
                } => {
                    let Some(key) = Self::key_of(row, columns) else {
                        continue;
                    };
                    // Validating an FK reads the referenced table
                    if !touched.contains(ref_table) {
                        touched.push(ref_table.clone());
                    }
                    let parent = if ref_table == &self.schema.name {
                        self
                    } else {
                        inner.table(ref_table)?
                    };
                    if !parent.contains_key(ref_columns, &key, None) {
                        return Err(Error::ForeignKeyViolation(Self::constraint_label(
                            name,
                            "FOREIGN KEY",
                            &self.schema.name,
                        )));
                    }
                }
                StoredConstraint::Check { name, expr } => {
                    let outcome = crate::planning::evaluate::evaluate(expr, Some(row), None)?;
                    // NULL outcomes pass, per SQL CHECK semantics
                    if matches!(outcome, Value::Bool(false)) {
                        return Err(Error::CheckConstraintViolation(Self::constraint_label(
                            name,
                            "CHECK",
                            &self.schema.name,
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Verifies no other table still references the given rows of `table`
/// before they are removed or re-keyed.
pub(crate) fn ensure_not_referenced(
    inner: &CatalogInner,
    table: &ObjectName,
    rows: &[Row],
    touched: &mut Vec<ObjectName>,
) -> Result<()> {
    for (schema_name, schema) in &inner.schemas {
        for (table_name, entry) in &schema.tables {
            for constraint in &entry.constraints {
                let StoredConstraint::ForeignKey {
                    name,
                    columns,
                    ref_table,
                    ref_columns,
                    ..
                } = constraint
                else {
                    continue;
                };
                if ref_table != table {
                    continue;
                }
                let child = ObjectName::new(schema_name.clone(), table_name.clone());
                if !touched.contains(&child) {
                    touched.push(child.clone());
                }
                for row in rows {
                    let Some(key) = TableEntry::key_of(row, ref_columns) else {
                        continue;
                    };
                    if entry.contains_key(columns, &key, None) {
                        return Err(Error::ForeignKeyViolation(format!(
                            "{} rows are still referenced by {}",
                            table,
                            match name {
                                Some(n) => format!("constraint {} on {}", n, child),
                                None => child.to_string(),
                            }
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}
