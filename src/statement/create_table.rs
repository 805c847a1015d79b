//! CREATE TABLE
//!
//! Prepare converts the declared columns to physical descriptors,
//! validates every name against the declaration itself (the table does
//! not exist yet), synthesizes table-level constraints from per-column
//! flags, and resolves foreign key references, which may point at the
//! table being created. Evaluate creates the table, grants the creator
//! full privileges and registers the prepared constraints.

use crate::catalog::Connection;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::resolve::ColumnChecker;
use crate::types::expression::Expression;
use crate::types::schema::{
    ColumnDef, ConstraintDef, ConstraintKind, ForeignKeyRule, ObjectName, ResultTable,
    TableSchema,
};

fn names_eq(a: &str, b: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

/// A constraint validated during prepare, with canonical column names and
/// the referenced table fully resolved.
#[derive(Debug, Clone)]
enum PreparedConstraint {
    PrimaryKey {
        name: Option<String>,
        columns: Vec<String>,
    },
    Unique {
        name: Option<String>,
        columns: Vec<String>,
    },
    ForeignKey {
        name: Option<String>,
        columns: Vec<String>,
        ref_table: ObjectName,
        ref_columns: Vec<String>,
        update_rule: ForeignKeyRule,
        delete_rule: ForeignKeyRule,
        deferred: bool,
    },
    Check {
        name: Option<String>,
        expr: Expression,
    },
}

#[derive(Debug)]
struct Prepared {
    target: ObjectName,
    schema: TableSchema,
    constraints: Vec<PreparedConstraint>,
}

#[derive(Debug)]
pub struct CreateTable {
    table_name: String,
    if_not_exists: bool,
    columns: Vec<ColumnDef>,
    constraints: Vec<ConstraintDef>,
    prepared: Option<Prepared>,
}

impl CreateTable {
    pub fn from_command(command: &Command) -> Result<Self> {
        Ok(CreateTable {
            table_name: command.str_field("table")?.to_string(),
            if_not_exists: command.bool_field("if_not_exists", false)?,
            columns: command.columns_field("columns")?.to_vec(),
            constraints: command.opt_constraints_field("constraints")?.to_vec(),
            prepared: None,
        })
    }

    fn prepared(&self) -> Result<&Prepared> {
        self.prepared
            .as_ref()
            .ok_or(Error::StatementState("unprepared"))
    }

    pub fn prepare(&mut self, conn: &Connection) -> Result<()> {
        if self.table_name.contains('.') {
            return Err(Error::InvalidValue(format!(
                "table name '{}' may not be qualified",
                self.table_name
            )));
        }
        if self.columns.is_empty() {
            return Err(Error::Command("CREATE TABLE requires columns".into()));
        }
        let ignore_case = conn.ignore_case();
        let target = ObjectName::new(conn.current_schema(), self.table_name.clone());

        // Duplicate detection honors the session case mode
        let column_names: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        for (i, name) in column_names.iter().enumerate() {
            if column_names[..i]
                .iter()
                .any(|other| names_eq(other, name, ignore_case))
            {
                return Err(Error::DuplicateColumn(name.clone()));
            }
        }

        let checker = ColumnChecker::new(&self.table_name, column_names.clone(), ignore_case);
        for column in &self.columns {
            if let Some(default) = &column.default {
                checker.qualify_expression(default.clone())?;
            }
        }

        let mut constraints = Vec::new();

        // Per-column flags become table-level constraints
        let pk_columns: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        if !pk_columns.is_empty() {
            constraints.push(PreparedConstraint::PrimaryKey {
                name: None,
                columns: pk_columns,
            });
        }
        for column in self.columns.iter().filter(|c| c.unique) {
            constraints.push(PreparedConstraint::Unique {
                name: None,
                columns: vec![column.name.clone()],
            });
        }

        for constraint in &self.constraints {
            constraints.push(self.prepare_constraint(conn, &checker, &target, constraint)?);
        }

        self.prepared = Some(Prepared {
            target: target.clone(),
            schema: TableSchema::new(
                target,
                self.columns.iter().map(|c| c.to_physical()).collect(),
            ),
            constraints,
        });
        Ok(())
    }

    fn prepare_constraint(
        &self,
        conn: &Connection,
        checker: &ColumnChecker,
        target: &ObjectName,
        constraint: &ConstraintDef,
    ) -> Result<PreparedConstraint> {
        let ignore_case = conn.ignore_case();
        let resolve_list = |columns: &[String]| -> Result<Vec<String>> {
            columns
                .iter()
                .map(|raw| checker.resolve(&parse_column_name(raw)))
                .collect()
        };
        Ok(match &constraint.kind {
            ConstraintKind::PrimaryKey { columns } => PreparedConstraint::PrimaryKey {
                name: constraint.name.clone(),
                columns: resolve_list(columns)?,
            },
            ConstraintKind::Unique { columns } => PreparedConstraint::Unique {
                name: constraint.name.clone(),
                columns: resolve_list(columns)?,
            },
            ConstraintKind::Check { expr } => {
                // Resolution against the declaration proves every name;
                // the catalog stores the original expression.
                checker.qualify_expression(expr.clone())?;
                PreparedConstraint::Check {
                    name: constraint.name.clone(),
                    expr: expr.clone(),
                }
            }
            ConstraintKind::ForeignKey {
                columns,
                ref_table,
                ref_columns,
                update_rule,
                delete_rule,
                deferred,
            } => {
                let columns = resolve_list(columns)?;
                let candidate = conn.qualify_table_name(ref_table)?;
                // The referenced table may be the one being created; its
                // descriptor comes from this statement, not the catalog.
                let (ref_table, ref_columns) = if candidate.schema == target.schema
                    && names_eq(&candidate.name, &target.name, ignore_case)
                {
                    (target.clone(), resolve_list(ref_columns)?)
                } else {
                    let resolved = conn.resolve_table_name(ref_table)?;
                    let schema = conn.table_schema(&resolved)?;
                    let mut canonical = Vec::with_capacity(ref_columns.len());
                    for column in ref_columns {
                        let index = schema.column_index(column, ignore_case)?;
                        canonical.push(schema.columns[index].name.clone());
                    }
                    (resolved, canonical)
                };
                PreparedConstraint::ForeignKey {
                    name: constraint.name.clone(),
                    columns,
                    ref_table,
                    ref_columns,
                    update_rule: *update_rule,
                    delete_rule: *delete_rule,
                    deferred: *deferred,
                }
            }
        })
    }

    pub fn evaluate(&self, conn: &Connection) -> Result<ResultTable> {
        let prepared = self.prepared()?;
        if !conn.can_create_table(&prepared.target) {
            return Err(Error::AccessDenied {
                action: "create table".into(),
                object: prepared.target.to_string(),
            });
        }
        if !conn.schema_exists(&prepared.target.schema) {
            return Err(Error::SchemaNotFound(prepared.target.schema.clone()));
        }
        if conn.table_exists(&prepared.target) {
            if self.if_not_exists {
                return Ok(ResultTable::empty());
            }
            return Err(Error::DuplicateTable(prepared.target.to_string()));
        }
        conn.create_table(prepared.schema.clone())?;
        conn.grant_all_on_table(&conn.user(), &prepared.target);
        for constraint in &prepared.constraints {
            match constraint {
                PreparedConstraint::PrimaryKey { name, columns } => {
                    conn.add_primary_key_constraint(
                        &prepared.target,
                        columns,
                        name.clone(),
                    )?;
                }
                PreparedConstraint::Unique { name, columns } => {
                    conn.add_unique_constraint(&prepared.target, columns, name.clone())?;
                }
                PreparedConstraint::ForeignKey {
                    name,
                    columns,
                    ref_table,
                    ref_columns,
                    update_rule,
                    delete_rule,
                    deferred,
                } => {
                    conn.add_foreign_key_constraint(
                        &prepared.target,
                        columns,
                        ref_table,
                        ref_columns,
                        *update_rule,
                        *delete_rule,
                        *deferred,
                        name.clone(),
                    )?;
                }
                PreparedConstraint::Check { name, expr } => {
                    conn.add_check_constraint(&prepared.target, expr.clone(), name.clone())?;
                }
            }
        }
        Ok(ResultTable::empty())
    }
}

/// Splits an optionally "table."-prefixed constraint column name.
fn parse_column_name(raw: &str) -> crate::types::expression::ColumnRef {
    use crate::types::expression::ColumnRef;
    match raw.split_once('.') {
        Some((table, column)) => ColumnRef::qualified(table, column),
        None => ColumnRef::bare(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::command::CommandValue;
    use crate::types::data_type::SqlType;
    use crate::types::value::Value;

    fn create_command(columns: Vec<ColumnDef>) -> Command {
        Command::new("create_table")
            .with_str("table", "Part")
            .set("columns", CommandValue::Columns(columns))
    }

    #[test]
    fn case_duplicate_columns_depend_on_session_mode() {
        let catalog = Catalog::new();
        let conn = catalog.connect("admin");
        let columns = vec![
            ColumnDef::new("id", SqlType::Integer),
            ColumnDef::new("ID", SqlType::Integer),
        ];

        let mut stmt = CreateTable::from_command(&create_command(columns.clone())).unwrap();
        assert!(stmt.prepare(&conn).is_ok());

        conn.set_ignore_case(true);
        let mut stmt = CreateTable::from_command(&create_command(columns)).unwrap();
        assert!(matches!(
            stmt.prepare(&conn),
            Err(Error::DuplicateColumn(_))
        ));
    }

    #[test]
    fn qualified_target_name_is_rejected() {
        let catalog = Catalog::new();
        let conn = catalog.connect("admin");
        let command = Command::new("create_table")
            .with_str("table", "APP.Part")
            .set(
                "columns",
                CommandValue::Columns(vec![ColumnDef::new("id", SqlType::Integer)]),
            );
        let mut stmt = CreateTable::from_command(&command).unwrap();
        assert!(matches!(stmt.prepare(&conn), Err(Error::InvalidValue(_))));
    }

    #[test]
    fn self_referencing_foreign_key_prepares() {
        let catalog = Catalog::new();
        let conn = catalog.connect("admin");
        let columns = vec![
            ColumnDef::new("id", SqlType::Integer).primary_key(),
            ColumnDef::new("parent", SqlType::Integer),
        ];
        let fk = ConstraintDef::foreign_key(
            vec!["parent".into()],
            "Part",
            vec!["id".into()],
        )
        .unwrap();
        let command = create_command(columns)
            .set("constraints", CommandValue::Constraints(vec![fk]));
        let mut stmt = CreateTable::from_command(&command).unwrap();
        stmt.prepare(&conn).unwrap();
        let prepared = stmt.prepared.as_ref().unwrap();
        assert!(prepared.constraints.iter().any(|c| matches!(
            c,
            PreparedConstraint::ForeignKey { ref_table, .. }
                if ref_table == &ObjectName::new("APP", "Part")
        )));
    }

    #[test]
    fn table_prefix_in_constraint_columns_is_stripped() {
        let catalog = Catalog::new();
        let conn = catalog.connect("admin");
        let columns = vec![ColumnDef::new("id", SqlType::Integer)];
        let command = create_command(columns).set(
            "constraints",
            CommandValue::Constraints(vec![ConstraintDef::unique(vec!["Part.id".into()])]),
        );
        let mut stmt = CreateTable::from_command(&command).unwrap();
        stmt.prepare(&conn).unwrap();
        let prepared = stmt.prepared.as_ref().unwrap();
        assert!(prepared.constraints.iter().any(|c| matches!(
            c,
            PreparedConstraint::Unique { columns, .. } if columns == &vec!["id".to_string()]
        )));
    }

    #[test]
    fn create_and_reuse_with_if_not_exists() {
        let catalog = Catalog::new();
        let conn = catalog.connect("admin");
        let columns = vec![ColumnDef::new("id", SqlType::Integer)
            .default(Expression::Constant(Value::Integer(0)))];
        let mut stmt = CreateTable::from_command(&create_command(columns.clone())).unwrap();
        stmt.prepare(&conn).unwrap();
        let result = stmt.evaluate(&conn).unwrap();
        assert_eq!(result.row_count(), 0);

        let command = create_command(columns).with_bool("if_not_exists", true);
        let mut again = CreateTable::from_command(&command).unwrap();
        again.prepare(&conn).unwrap();
        assert!(again.evaluate(&conn).is_ok());
    }
}
