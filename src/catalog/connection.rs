//! One session against the shared catalog
//!
//! A `Connection` carries the per-session settings (current schema,
//! identifier case mode, plan-debug flag), session variables, the trigger
//! event log, and the touched-table record that makes the lock declaration
//! contract checkable in tests.

use super::{
    Catalog, DEFAULT_SCHEMA, Privilege, RowId, SYSTEM_TABLE_PREFIX, SchemaEntry, StoredConstraint,
    TableEntry, TriggerDef, TriggerEvent, TriggerKind, ensure_not_referenced,
};
use crate::error::{Error, Result};
use crate::types::coercion;
use crate::types::expression::Expression;
use crate::types::schema::{ForeignKeyRule, ObjectName, TableSchema};
use crate::types::value::{Row, Value};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub current_schema: String,
    /// Uniform case mode for identifier comparison in this session.
    pub ignore_case: bool,
    /// When set, SELECT dumps its plan tree even on success.
    pub plan_debug: bool,
    pub auto_commit: bool,
    pub isolation_level: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            current_schema: DEFAULT_SCHEMA.into(),
            ignore_case: false,
            plan_debug: false,
            auto_commit: true,
            isolation_level: "SERIALIZABLE".into(),
        }
    }
}

#[derive(Debug)]
struct SessionState {
    settings: SessionSettings,
    vars: HashMap<String, Value>,
    trigger_log: Vec<TriggerEvent>,
}

/// One session: the statement layer's view of the catalog.
pub struct Connection {
    catalog: Catalog,
    user: String,
    session: Mutex<SessionState>,
    touched_reads: Mutex<BTreeSet<ObjectName>>,
    touched_writes: Mutex<BTreeSet<ObjectName>>,
}

impl Connection {
    pub(super) fn new(catalog: Catalog, user: String) -> Self {
        Connection {
            catalog,
            user,
            session: Mutex::new(SessionState {
                settings: SessionSettings::default(),
                vars: HashMap::new(),
                trigger_log: Vec::new(),
            }),
            touched_reads: Mutex::new(BTreeSet::new()),
            touched_writes: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn user(&self) -> String {
        self.user.clone()
    }

    // --- session settings ---

    pub fn current_schema(&self) -> String {
        self.session.lock().settings.current_schema.clone()
    }

    pub fn set_current_schema(&self, schema: &str) -> Result<()> {
        let ignore_case = self.ignore_case();
        let canonical = {
            let inner = self.catalog.read();
            inner
                .find_schema(schema, ignore_case)?
                .ok_or_else(|| Error::SchemaNotFound(schema.to_string()))?
                .to_string()
        };
        self.session.lock().settings.current_schema = canonical;
        Ok(())
    }

    pub fn ignore_case(&self) -> bool {
        self.session.lock().settings.ignore_case
    }

    pub fn set_ignore_case(&self, ignore_case: bool) {
        self.session.lock().settings.ignore_case = ignore_case;
    }

    pub fn plan_debug(&self) -> bool {
        self.session.lock().settings.plan_debug
    }

    pub fn set_plan_debug(&self, on: bool) {
        self.session.lock().settings.plan_debug = on;
    }

    pub fn set_auto_commit(&self, on: bool) {
        self.session.lock().settings.auto_commit = on;
    }

    pub fn set_isolation_level(&self, level: &str) {
        self.session.lock().settings.isolation_level = level.to_string();
    }

    pub fn set_var(&self, name: &str, value: Value) {
        self.session.lock().vars.insert(name.to_string(), value);
    }

    pub fn get_var(&self, name: &str) -> Option<Value> {
        self.session.lock().vars.get(name).cloned()
    }

    pub fn session_vars(&self) -> Vec<(String, Value)> {
        let session = self.session.lock();
        let mut vars: Vec<_> = session
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars
    }

    pub fn settings(&self) -> SessionSettings {
        self.session.lock().settings.clone()
    }

    // --- name resolution ---

    /// Qualifies a possibly schema-prefixed table name against the current
    /// schema, without requiring existence.
    pub fn qualify_table_name(&self, raw: &str) -> Result<ObjectName> {
        let parts: Vec<&str> = raw.split('.').collect();
        match parts.as_slice() {
            [table] => Ok(ObjectName::new(self.current_schema(), *table)),
            [schema, table] => Ok(ObjectName::new(*schema, *table)),
            _ => Err(Error::InvalidValue(format!("invalid table name '{}'", raw))),
        }
    }

    /// Resolves a table name to its canonical stored form, honoring the
    /// session case mode. Fails if the table does not exist.
    pub fn resolve_table_name(&self, raw: &str) -> Result<ObjectName> {
        let candidate = self.qualify_table_name(raw)?;
        let ignore_case = self.ignore_case();
        let inner = self.catalog.read();
        let schema = inner
            .find_schema(&candidate.schema, ignore_case)?
            .ok_or_else(|| Error::SchemaNotFound(candidate.schema.clone()))?
            .to_string();
        match inner.find_table(&schema, &candidate.name, ignore_case)? {
            Some((stored, _)) => Ok(ObjectName::new(schema, stored)),
            None => Err(Error::TableNotFound(candidate.to_string())),
        }
    }

    pub fn table_exists(&self, name: &ObjectName) -> bool {
        let inner = self.catalog.read();
        inner
            .schemas
            .get(&name.schema)
            .map(|s| s.tables.contains_key(&name.name))
            .unwrap_or(false)
    }

    pub fn table_schema(&self, name: &ObjectName) -> Result<TableSchema> {
        let inner = self.catalog.read();
        Ok(inner.table(name)?.schema.clone())
    }

    /// True if the table name carries the reserved system prefix.
    pub fn is_reserved_table(name: &ObjectName) -> bool {
        name.name
            .to_ascii_lowercase()
            .starts_with(SYSTEM_TABLE_PREFIX)
    }

    // --- schemas ---

    pub fn schema_exists(&self, name: &str) -> bool {
        self.catalog.read().schemas.contains_key(name)
    }

    pub fn create_schema(&self, name: &str) -> Result<()> {
        let mut inner = self.catalog.write();
        if inner.schemas.contains_key(name) {
            return Err(Error::DuplicateSchema(name.to_string()));
        }
        inner.schemas.insert(name.to_string(), SchemaEntry::default());
        Ok(())
    }

    pub fn drop_schema(&self, name: &str) -> Result<()> {
        if name == self.current_schema() || name == DEFAULT_SCHEMA {
            return Err(Error::InvalidValue(format!(
                "cannot drop the active schema '{}'",
                name
            )));
        }
        let mut inner = self.catalog.write();
        let Some(entry) = inner.schemas.get(name) else {
            return Err(Error::SchemaNotFound(name.to_string()));
        };
        if !entry.tables.is_empty() {
            return Err(Error::SchemaNotEmpty(name.to_string()));
        }
        inner.schemas.remove(name);
        Ok(())
    }

    pub fn list_schemas(&self) -> Vec<String> {
        let mut names: Vec<String> = self.catalog.read().schemas.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_tables(&self, schema: &str) -> Vec<String> {
        let inner = self.catalog.read();
        let mut names: Vec<String> = inner
            .schemas
            .get(schema)
            .map(|s| s.tables.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    // --- privileges ---

    fn has_privilege(&self, object: &str, privilege: Privilege) -> bool {
        let inner = self.catalog.read();
        if inner.superusers.contains(&self.user) {
            return true;
        }
        inner
            .grants
            .contains(&(self.user.clone(), object.to_string(), privilege))
    }

    fn table_privilege(&self, table: &ObjectName, privilege: Privilege) -> bool {
        self.has_privilege(&table.to_string(), privilege)
            || self.has_privilege(&table.schema, privilege)
    }

    pub fn can_create_table(&self, table: &ObjectName) -> bool {
        self.has_privilege(&table.schema, Privilege::Create)
            || self.has_privilege(&table.to_string(), Privilege::Create)
    }

    pub fn can_select_from_table(&self, table: &ObjectName) -> bool {
        self.table_privilege(table, Privilege::Select)
    }

    pub fn can_insert_into_table(&self, table: &ObjectName) -> bool {
        self.table_privilege(table, Privilege::Insert)
    }

    pub fn can_update_table(&self, table: &ObjectName) -> bool {
        self.table_privilege(table, Privilege::Update)
    }

    pub fn can_delete_from_table(&self, table: &ObjectName) -> bool {
        self.table_privilege(table, Privilege::Delete)
    }

    pub fn can_create_and_drop_schema(&self) -> bool {
        self.catalog.read().superusers.contains(&self.user)
    }

    pub fn can_create_trigger(&self, table: &ObjectName) -> bool {
        self.table_privilege(table, Privilege::Update)
    }

    /// Grants every table privilege on `table` to `user`.
    pub fn grant_all_on_table(&self, user: &str, table: &ObjectName) {
        for privilege in [
            Privilege::Select,
            Privilege::Insert,
            Privilege::Update,
            Privilege::Delete,
            Privilege::Drop,
        ] {
            self.catalog.grant(user, table.to_string(), privilege);
        }
    }

    // --- tables & rows ---

    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        let name = schema.name.clone();
        let mut inner = self.catalog.write();
        let entry = inner
            .schemas
            .get_mut(&name.schema)
            .ok_or_else(|| Error::SchemaNotFound(name.schema.clone()))?;
        if entry.tables.contains_key(&name.name) {
            return Err(Error::DuplicateTable(name.to_string()));
        }
        entry
            .tables
            .insert(name.name.clone(), TableEntry::new(schema));
        Ok(())
    }

    /// Scans a table, recording the read. Returned rows are a snapshot;
    /// evaluation never mutates what it scans.
    pub fn scan_table(&self, name: &ObjectName) -> Result<Vec<(RowId, Row)>> {
        self.touched_reads.lock().insert(name.clone());
        let inner = self.catalog.read();
        Ok(inner.table(name)?.rows.clone())
    }

    /// Inserts one row (already in schema order), coercing values and
    /// enforcing constraints. Returns the new row's id.
    pub fn insert_row(&self, name: &ObjectName, row: Row) -> Result<RowId> {
        self.touched_writes.lock().insert(name.clone());
        let mut fk_reads = Vec::new();
        let mut inner = self.catalog.write();
        let row = {
            let inner_ref = &*inner;
            let entry = inner_ref.table(name)?;
            let row = coercion::coerce_row(row, &entry.schema)?;
            entry.check_row_constraints(inner_ref, &row, None, &mut fk_reads)?;
            row
        };
        let entry = inner.table_mut(name)?;
        let id = entry.next_row_id;
        entry.next_row_id += 1;
        entry.rows.push((id, row));
        drop(inner);
        self.record_reads(fk_reads);
        Ok(id)
    }

    /// Applies prepared row replacements, enforcing constraints. Rows are
    /// identified by the ids obtained from a scan of the same table.
    pub fn update_rows(&self, name: &ObjectName, updates: Vec<(RowId, Row)>) -> Result<usize> {
        self.touched_writes.lock().insert(name.clone());
        let mut fk_reads = Vec::new();
        let mut inner = self.catalog.write();
        let coerced: Vec<(RowId, Row)> = {
            let inner_ref = &*inner;
            let entry = inner_ref.table(name)?;
            let mut coerced = Vec::with_capacity(updates.len());
            for (id, row) in updates {
                let row = coercion::coerce_row(row, &entry.schema)?;
                entry.check_row_constraints(inner_ref, &row, Some(id), &mut fk_reads)?;
                // Re-keying a referenced row must not orphan children
                if let Some((_, old)) = entry.rows.iter().find(|(rid, _)| *rid == id) {
                    if old != &row {
                        ensure_not_referenced(inner_ref, name, &[old.clone()], &mut fk_reads)?;
                    }
                }
                coerced.push((id, row));
            }
            coerced
        };
        let entry = inner.table_mut(name)?;
        let mut count = 0;
        for (id, row) in coerced {
            if let Some(slot) = entry.rows.iter_mut().find(|(rid, _)| *rid == id) {
                slot.1 = row;
                count += 1;
            }
        }
        drop(inner);
        self.record_reads(fk_reads);
        Ok(count)
    }

    /// Deletes the identified rows, enforcing incoming FK constraints.
    pub fn delete_rows(&self, name: &ObjectName, ids: &[RowId]) -> Result<usize> {
        self.touched_writes.lock().insert(name.clone());
        let mut fk_reads = Vec::new();
        let mut inner = self.catalog.write();
        {
            let inner_ref = &*inner;
            let entry = inner_ref.table(name)?;
            let doomed: Vec<Row> = entry
                .rows
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(_, row)| row.clone())
                .collect();
            ensure_not_referenced(inner_ref, name, &doomed, &mut fk_reads)?;
        }
        let entry = inner.table_mut(name)?;
        let before = entry.rows.len();
        entry.rows.retain(|(id, _)| !ids.contains(id));
        let count = before - entry.rows.len();
        drop(inner);
        self.record_reads(fk_reads);
        Ok(count)
    }

    // --- constraints ---

    fn column_indexes(
        schema: &TableSchema,
        columns: &[String],
        ignore_case: bool,
    ) -> Result<Vec<usize>> {
        columns
            .iter()
            .map(|c| schema.column_index(c, ignore_case))
            .collect()
    }

    pub fn add_primary_key_constraint(
        &self,
        table: &ObjectName,
        columns: &[String],
        name: Option<String>,
    ) -> Result<()> {
        let ignore_case = self.ignore_case();
        let mut inner = self.catalog.write();
        let entry = inner.table_mut(table)?;
        let columns = Self::column_indexes(&entry.schema, columns, ignore_case)?;
        entry
            .constraints
            .push(StoredConstraint::PrimaryKey { name, columns });
        Ok(())
    }

    pub fn add_unique_constraint(
        &self,
        table: &ObjectName,
        columns: &[String],
        name: Option<String>,
    ) -> Result<()> {
        let ignore_case = self.ignore_case();
        let mut inner = self.catalog.write();
        let entry = inner.table_mut(table)?;
        let columns = Self::column_indexes(&entry.schema, columns, ignore_case)?;
        entry
            .constraints
            .push(StoredConstraint::Unique { name, columns });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_foreign_key_constraint(
        &self,
        table: &ObjectName,
        columns: &[String],
        ref_table: &ObjectName,
        ref_columns: &[String],
        update_rule: ForeignKeyRule,
        delete_rule: ForeignKeyRule,
        deferred: bool,
        name: Option<String>,
    ) -> Result<()> {
        let ignore_case = self.ignore_case();
        let mut inner = self.catalog.write();
        let ref_indexes = {
            let parent = inner.table(ref_table)?;
            Self::column_indexes(&parent.schema, ref_columns, ignore_case)?
        };
        let entry = inner.table_mut(table)?;
        let columns = Self::column_indexes(&entry.schema, columns, ignore_case)?;
        entry.constraints.push(StoredConstraint::ForeignKey {
            name,
            columns,
            ref_table: ref_table.clone(),
            ref_columns: ref_indexes,
            update_rule,
            delete_rule,
            deferred,
        });
        Ok(())
    }

    /// Registers a CHECK constraint. The expression must reference only
    /// the owning table's columns and must not contain a sub-select.
    pub fn add_check_constraint(
        &self,
        table: &ObjectName,
        expr: Expression,
        name: Option<String>,
    ) -> Result<()> {
        if expr.contains_subquery() {
            return Err(Error::IllegalSubquery("a CHECK constraint"));
        }
        let ignore_case = self.ignore_case();
        let mut inner = self.catalog.write();
        let entry = inner.table_mut(table)?;
        let schema = entry.schema.clone();
        let expr = expr.resolve(
            &mut |column| schema.column_index(&column.column, ignore_case),
            &mut |_| Err(Error::IllegalSubquery("a CHECK constraint")),
        )?;
        entry
            .constraints
            .push(StoredConstraint::Check { name, expr });
        Ok(())
    }

    /// Tables relationally linked to `table` (FK in either direction).
    pub fn relationally_linked_tables(&self, table: &ObjectName) -> Vec<ObjectName> {
        self.catalog.read().linked_tables(table)
    }

    // --- triggers ---

    pub fn create_trigger(
        &self,
        name: &str,
        table: &ObjectName,
        kinds: Vec<TriggerKind>,
    ) -> Result<()> {
        let mut inner = self.catalog.write();
        if inner.triggers.contains_key(name) {
            return Err(Error::DuplicateTrigger(name.to_string()));
        }
        inner.triggers.insert(
            name.to_string(),
            TriggerDef {
                name: name.to_string(),
                table: table.clone(),
                kinds,
                fired: 0,
            },
        );
        Ok(())
    }

    pub fn drop_trigger(&self, name: &str) -> Result<()> {
        let mut inner = self.catalog.write();
        if inner.triggers.remove(name).is_none() {
            return Err(Error::TriggerNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn trigger_exists(&self, name: &str) -> bool {
        self.catalog.read().triggers.contains_key(name)
    }

    /// Delivers a trigger event to matching triggers and the session log.
    pub fn notify_trigger_event(&self, event: TriggerEvent) {
        let mut inner = self.catalog.write();
        for trigger in inner.triggers.values_mut() {
            if trigger.table == event.table && trigger.kinds.contains(&event.kind) {
                trigger.fired += 1;
            }
        }
        drop(inner);
        self.session.lock().trigger_log.push(event);
    }

    pub fn trigger_log(&self) -> Vec<TriggerEvent> {
        self.session.lock().trigger_log.clone()
    }

    pub fn trigger_fired_count(&self, name: &str) -> usize {
        self.catalog
            .read()
            .triggers
            .get(name)
            .map(|t| t.fired)
            .unwrap_or(0)
    }

    // --- touched-table instrumentation ---

    fn record_reads(&self, tables: Vec<ObjectName>) {
        let mut reads = self.touched_reads.lock();
        for t in tables {
            reads.insert(t);
        }
    }

    /// Every table whose row data was read or written since the last reset.
    pub fn touched_tables(&self) -> BTreeSet<ObjectName> {
        let mut all = self.touched_reads.lock().clone();
        all.extend(self.touched_writes.lock().iter().cloned());
        all
    }

    pub fn reset_touched(&self) {
        self.touched_reads.lock().clear();
        self.touched_writes.lock().clear();
    }
}
