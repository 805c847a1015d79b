//! Common test utilities for statement integration tests
#![allow(dead_code)]

use granite_sql::catalog::{Catalog, Connection};
use granite_sql::command::CommandValue;
use granite_sql::parsing::ConditionParser;
use granite_sql::types::SqlType;
use granite_sql::types::expression::{ColumnRef, Expression};
use granite_sql::types::query::{
    Assignment, FromClause, FromKind, OrderByColumn, SelectColumn, SelectExpr, SimpleSelect,
};
use granite_sql::{ColumnDef, Command, ResultTable, Statement, Value};

/// Test context holding one catalog and one admin session.
pub struct TestContext {
    pub catalog: Catalog,
    pub conn: Connection,
}

pub fn setup_test() -> TestContext {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let catalog = Catalog::new();
    let conn = catalog.connect("admin");
    TestContext { catalog, conn }
}

impl TestContext {
    /// Opens a second session against the same catalog.
    pub fn connect(&self, user: &str) -> Connection {
        self.catalog.connect(user)
    }

    /// Runs the full statement lifecycle for one command.
    pub fn run(&self, command: Command) -> granite_sql::Result<ResultTable> {
        let mut stmt = Statement::from_command(&command)?;
        stmt.prepare(&self.conn)?;
        stmt.evaluate(&self.conn)
    }

    /// Runs a command and panics on failure.
    pub fn exec(&self, command: Command) -> ResultTable {
        self.run(command).expect("statement should succeed")
    }

    /// Builds a statement and prepares it, returning it for lock
    /// declaration inspection.
    pub fn prepared(&self, command: Command) -> granite_sql::Result<Statement> {
        let mut stmt = Statement::from_command(&command)?;
        stmt.prepare(&self.conn)?;
        Ok(stmt)
    }

    /// Creates a table from `(name, type)` column declarations.
    pub fn create_table(&self, table: &str, columns: Vec<ColumnDef>) {
        self.exec(
            Command::new("create_table")
                .with_str("table", table)
                .set("columns", CommandValue::Columns(columns)),
        );
    }

    /// Inserts literal rows parsed from the value mini-language, one
    /// source string per row.
    pub fn insert_values(&self, table: &str, rows: &[&str]) -> ResultTable {
        self.exec(insert_command(table, rows))
    }

    /// Runs `SELECT <columns> FROM <table> [WHERE <condition>]`.
    pub fn select(
        &self,
        table: &str,
        columns: &[&str],
        where_clause: Option<&str>,
    ) -> granite_sql::Result<ResultTable> {
        self.run(select_command(table, columns, where_clause))
    }
}

/// Parses one expression from the condition mini-language.
pub fn expr(source: &str) -> Expression {
    ConditionParser::from_source(source, &[])
        .and_then(|mut p| p.parse_condition())
        .expect("expression should parse")
}

/// Parses one expression with `%N` substitutions.
pub fn expr_with(source: &str, substitutions: &[Value]) -> Expression {
    ConditionParser::from_source(source, substitutions)
        .and_then(|mut p| p.parse_condition())
        .expect("expression should parse")
}

/// Parses a parenthesized value list into one VALUES row.
pub fn values_row(source: &str) -> Vec<Expression> {
    ConditionParser::from_source(source, &[])
        .and_then(|mut p| p.parse_value_list())
        .expect("value row should parse")
}

pub fn insert_command(table: &str, rows: &[&str]) -> Command {
    let rows: Vec<Vec<Expression>> = rows.iter().map(|r| values_row(r)).collect();
    Command::new("insert")
        .with_str("table", table)
        .set("values", CommandValue::ExprRows(rows))
}

pub fn select_command(table: &str, columns: &[&str], where_clause: Option<&str>) -> Command {
    Command::new("select").set(
        "select",
        CommandValue::Select(SelectExpr::Simple(simple_select(
            table,
            columns,
            where_clause,
        ))),
    )
}

pub fn simple_select(table: &str, columns: &[&str], where_clause: Option<&str>) -> SimpleSelect {
    let columns = if columns == ["*"] {
        vec![SelectColumn::All { table: None }]
    } else {
        columns
            .iter()
            .map(|c| SelectColumn::Expr {
                expr: expr(c),
                alias: None,
            })
            .collect()
    };
    SimpleSelect {
        columns,
        from: vec![FromClause {
            source: FromKind::Table(table.to_string()),
            alias: None,
        }],
        where_clause: where_clause.map(expr),
        ..SimpleSelect::default()
    }
}

pub fn order_by(keys: &[(&str, bool)]) -> CommandValue {
    CommandValue::OrderBy(
        keys.iter()
            .map(|(source, ascending)| OrderByColumn {
                expr: expr(source),
                ascending: *ascending,
            })
            .collect(),
    )
}

pub fn assignments(pairs: &[(&str, &str)]) -> CommandValue {
    CommandValue::Assignments(
        pairs
            .iter()
            .map(|(column, value)| Assignment {
                column: ColumnRef::bare(*column),
                value: expr(value),
            })
            .collect(),
    )
}

/// `id INTEGER PRIMARY KEY, name VARCHAR` style two-column table used by
/// most tests.
pub fn id_name_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", SqlType::Integer).primary_key(),
        ColumnDef::new("name", SqlType::VarChar { size: 50 }),
    ]
}
