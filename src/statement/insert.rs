//! INSERT
//!
//! Exactly one of three row sources: literal VALUES rows, a nested
//! SELECT, or a single SET-style assignment list. Prepare resolves the
//! target column list, checks arities and rejects sub-selects inside
//! VALUES/SET; evaluate materializes one stored row per logical input
//! row, filling unspecified columns from their declared defaults.

use crate::catalog::{Connection, TriggerEvent, TriggerKind};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::planning::{ExecutionContext, Planner, QueryPlan, evaluate::evaluate};
use crate::types::expression::Expression;
use crate::types::query::{Assignment, SelectExpr};
use crate::types::schema::{ObjectName, ResultTable, TableSchema};
use crate::types::value::{Row, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
enum InsertSource {
    Values(Vec<Vec<Expression>>),
    Select(SelectExpr),
    Set(Vec<Assignment>),
}

#[derive(Debug)]
enum PreparedSource {
    Values(Vec<Vec<Expression>>),
    Plan(QueryPlan),
    Set(Vec<Expression>),
}

#[derive(Debug)]
struct Prepared {
    table: ObjectName,
    schema: TableSchema,
    /// Schema offsets of the columns the source provides, in source order.
    column_indexes: Vec<usize>,
    source: PreparedSource,
}

#[derive(Debug)]
pub struct Insert {
    table_name: String,
    columns: Vec<String>,
    source: InsertSource,
    prepared: Option<Prepared>,
}

impl Insert {
    pub fn from_command(command: &Command) -> Result<Self> {
        let values = command.opt_expr_rows_field("values")?;
        let select = command.opt_select_field("select")?;
        let set = command.opt_assignments_field("set")?;
        let source = match (values, select, set) {
            (Some(rows), None, None) => InsertSource::Values(rows.to_vec()),
            (None, Some(select), None) => InsertSource::Select(select.clone()),
            (None, None, Some(set)) => InsertSource::Set(set.to_vec()),
            _ => {
                return Err(Error::Command(
                    "INSERT requires exactly one of values, select or set".into(),
                ));
            }
        };
        Ok(Insert {
            table_name: command.str_field("table")?.to_string(),
            columns: command
                .opt_str_list_field("columns")?
                .map(|c| c.to_vec())
                .unwrap_or_default(),
            source,
            prepared: None,
        })
    }

    fn prepared(&self) -> Result<&Prepared> {
        self.prepared
            .as_ref()
            .ok_or(Error::StatementState("unprepared"))
    }

    fn resolve_columns(
        schema: &TableSchema,
        names: &[String],
        ignore_case: bool,
    ) -> Result<Vec<usize>> {
        let mut indexes = Vec::with_capacity(names.len());
        for name in names {
            let index = schema.column_index(name, ignore_case)?;
            if indexes.contains(&index) {
                return Err(Error::DuplicateColumn(name.clone()));
            }
            indexes.push(index);
        }
        Ok(indexes)
    }

    pub fn prepare(&mut self, conn: &Connection) -> Result<()> {
        let table = conn.resolve_table_name(&self.table_name)?;
        let schema = conn.table_schema(&table)?;
        let ignore_case = conn.ignore_case();

        let (column_indexes, source) = match &self.source {
            InsertSource::Values(rows) => {
                if rows.is_empty() {
                    return Err(Error::Command("INSERT VALUES requires rows".into()));
                }
                let indexes = if self.columns.is_empty() {
                    (0..schema.columns.len()).collect()
                } else {
                    Self::resolve_columns(&schema, &self.columns, ignore_case)?
                };
                for row in rows {
                    if row.len() != indexes.len() {
                        return Err(Error::ArityMismatch(format!(
                            "VALUES row has {} expressions for {} columns",
                            row.len(),
                            indexes.len()
                        )));
                    }
                    for expr in row {
                        if expr.contains_subquery() {
                            return Err(Error::IllegalSubquery("INSERT VALUES"));
                        }
                    }
                }
                (indexes, PreparedSource::Values(rows.clone()))
            }
            InsertSource::Select(select) => {
                let indexes = if self.columns.is_empty() {
                    (0..schema.columns.len()).collect::<Vec<_>>()
                } else {
                    Self::resolve_columns(&schema, &self.columns, ignore_case)?
                };
                let plan = Planner::new(conn).plan_query(select, &[])?;
                let width = plan.output_labels().len();
                if width != indexes.len() {
                    return Err(Error::ArityMismatch(format!(
                        "nested select produces {} columns for {} target columns",
                        width,
                        indexes.len()
                    )));
                }
                (indexes, PreparedSource::Plan(plan))
            }
            InsertSource::Set(assignments) => {
                let names: Vec<String> = assignments
                    .iter()
                    .map(|a| a.column.column.clone())
                    .collect();
                let indexes = Self::resolve_columns(&schema, &names, ignore_case)?;
                let mut values = Vec::with_capacity(assignments.len());
                for assignment in assignments {
                    if assignment.value.contains_subquery() {
                        return Err(Error::IllegalSubquery("an INSERT SET assignment"));
                    }
                    values.push(assignment.value.clone());
                }
                (indexes, PreparedSource::Set(values))
            }
        };

        self.prepared = Some(Prepared {
            table,
            schema,
            column_indexes,
            source,
        });
        Ok(())
    }

    /// Builds one full-width stored row from provided values, filling the
    /// other columns from their defaults (NULL when defaultless).
    fn complete_row(prepared: &Prepared, provided: Vec<Value>) -> Result<Row> {
        let mut row = vec![None; prepared.schema.columns.len()];
        for (index, value) in prepared.column_indexes.iter().zip(provided) {
            row[*index] = Some(value);
        }
        row.into_iter()
            .zip(&prepared.schema.columns)
            .map(|(slot, column)| match slot {
                Some(value) => Ok(value),
                None => match &column.default {
                    Some(default) => evaluate(default, None, None),
                    None => Ok(Value::Null),
                },
            })
            .collect()
    }

    pub fn evaluate(&self, conn: &Connection) -> Result<ResultTable> {
        let prepared = self.prepared()?;
        if !conn.can_insert_into_table(&prepared.table) {
            return Err(Error::AccessDenied {
                action: "insert into".into(),
                object: prepared.table.to_string(),
            });
        }
        let ctx = ExecutionContext::new(conn);
        let input_rows: Vec<Vec<Value>> = match &prepared.source {
            PreparedSource::Values(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for exprs in rows {
                    let mut row = Vec::with_capacity(exprs.len());
                    for expr in exprs {
                        row.push(evaluate(expr, None, Some(&ctx))?);
                    }
                    out.push(row);
                }
                out
            }
            PreparedSource::Plan(plan) => plan.evaluate(&ctx)?,
            PreparedSource::Set(values) => {
                let mut row = Vec::with_capacity(values.len());
                for expr in values {
                    row.push(evaluate(expr, None, Some(&ctx))?);
                }
                vec![row]
            }
        };
        let mut count = 0;
        for provided in input_rows {
            let row = Self::complete_row(prepared, provided)?;
            conn.insert_row(&prepared.table, row)?;
            count += 1;
        }
        if count > 0 {
            conn.notify_trigger_event(TriggerEvent {
                kind: TriggerKind::Insert,
                table: prepared.table.clone(),
                count,
            });
        }
        Ok(ResultTable::affected(count))
    }

    pub fn reads_from(&self, conn: &Connection) -> Result<BTreeSet<ObjectName>> {
        let prepared = self.prepared()?;
        let mut tables = BTreeSet::new();
        match &prepared.source {
            PreparedSource::Plan(plan) => plan.discover_tables(&mut tables),
            PreparedSource::Values(_) | PreparedSource::Set(_) => {}
        }
        for linked in conn.relationally_linked_tables(&prepared.table) {
            tables.insert(linked);
        }
        Ok(tables)
    }

    pub fn writes_to(&self) -> Result<BTreeSet<ObjectName>> {
        Ok(BTreeSet::from([self.prepared()?.table.clone()]))
    }

    pub fn is_exclusive(&self) -> Result<bool> {
        Ok(Connection::is_reserved_table(&self.prepared()?.table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::command::CommandValue;
    use crate::types::data_type::SqlType;
    use crate::types::schema::TableColumn;

    fn setup() -> (Catalog, Connection) {
        let catalog = Catalog::new();
        let conn = catalog.connect("admin");
        conn.create_table(TableSchema::new(
            ObjectName::new("APP", "T"),
            vec![
                TableColumn {
                    name: "id".into(),
                    sql_type: SqlType::Integer,
                    not_null: true,
                    default: None,
                },
                TableColumn {
                    name: "name".into(),
                    sql_type: SqlType::VarChar { size: 50 },
                    not_null: false,
                    default: Some(Expression::Constant(Value::Str("unnamed".into()))),
                },
            ],
        ))
        .unwrap();
        (catalog, conn)
    }

    fn values_command(rows: Vec<Vec<Expression>>) -> Command {
        Command::new("insert")
            .with_str("table", "T")
            .set("columns", CommandValue::StrList(vec!["id".into()]))
            .set("values", CommandValue::ExprRows(rows))
    }

    #[test]
    fn mismatched_values_arity_fails_prepare() {
        let (_catalog, conn) = setup();
        let rows = vec![
            vec![Expression::Constant(Value::Integer(1))],
            vec![
                Expression::Constant(Value::Integer(2)),
                Expression::Constant(Value::Integer(3)),
            ],
        ];
        let mut stmt = Insert::from_command(&values_command(rows)).unwrap();
        assert!(matches!(
            stmt.prepare(&conn),
            Err(Error::ArityMismatch(_))
        ));
    }

    #[test]
    fn subquery_in_values_is_illegal() {
        let (_catalog, conn) = setup();
        let sub = Expression::Subquery(Box::new(SelectExpr::Simple(Default::default())));
        let mut stmt = Insert::from_command(&values_command(vec![vec![sub]])).unwrap();
        assert!(matches!(
            stmt.prepare(&conn),
            Err(Error::IllegalSubquery(_))
        ));
    }

    #[test]
    fn unspecified_columns_take_defaults() {
        let (_catalog, conn) = setup();
        let rows = vec![vec![Expression::Constant(Value::Integer(1))]];
        let mut stmt = Insert::from_command(&values_command(rows)).unwrap();
        stmt.prepare(&conn).unwrap();
        let result = stmt.evaluate(&conn).unwrap();
        assert_eq!(result.rows[0][0], Value::Integer(1));

        let rows = conn.scan_table(&ObjectName::new("APP", "T")).unwrap();
        assert_eq!(rows[0].1[1], Value::Str("unnamed".into()));
    }

    #[test]
    fn two_sources_at_once_are_rejected() {
        let command = Command::new("insert")
            .with_str("table", "T")
            .set("values", CommandValue::ExprRows(vec![]))
            .set("set", CommandValue::Assignments(vec![]));
        assert!(matches!(
            Insert::from_command(&command),
            Err(Error::Command(_))
        ));
    }
}
