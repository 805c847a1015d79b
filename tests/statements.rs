//! Statement lifecycle tests: DDL, DML, triggers and privileges

mod common;

use common::{
    assignments, expr, id_name_columns, insert_command, select_command, setup_test, values_row,
};
use granite_sql::catalog::TriggerKind;
use granite_sql::command::CommandValue;
use granite_sql::types::SqlType;
use granite_sql::{ColumnDef, Command, Error, Statement, Value};

#[test]
fn create_table_returns_zero_rows() {
    let ctx = setup_test();
    let result = ctx.run(
        Command::new("create_table")
            .with_str("table", "Part")
            .set("columns", CommandValue::Columns(id_name_columns())),
    );
    let table = result.unwrap();
    assert_eq!(table.row_count(), 0);
}

#[test]
fn duplicate_create_honors_if_not_exists() {
    let ctx = setup_test();
    ctx.create_table("Part", id_name_columns());

    let again = ctx.run(
        Command::new("create_table")
            .with_str("table", "Part")
            .set("columns", CommandValue::Columns(id_name_columns())),
    );
    assert!(matches!(again, Err(Error::DuplicateTable(_))));

    let tolerated = ctx.run(
        Command::new("create_table")
            .with_str("table", "Part")
            .with_bool("if_not_exists", true)
            .set("columns", CommandValue::Columns(id_name_columns())),
    );
    assert!(tolerated.is_ok());
}

#[test]
fn insert_then_select_round_trips_rows() {
    let ctx = setup_test();
    ctx.create_table("Part", id_name_columns());

    let affected = ctx.insert_values("Part", &["(1, 'bolt')", "(2, 'nut')"]);
    assert_eq!(affected.rows, vec![vec![Value::Integer(2)]]);

    let result = ctx.select("Part", &["*"], None).unwrap();
    assert_eq!(result.columns, vec!["id", "name"]);
    assert_eq!(result.row_count(), 2);
    assert!(result.rows.contains(&vec![
        Value::Integer(1),
        Value::Str("bolt".into())
    ]));
}

#[test]
fn insert_values_arity_must_match_column_list() {
    let ctx = setup_test();
    ctx.create_table("Part", id_name_columns());

    let short = ctx.run(
        Command::new("insert")
            .with_str("table", "Part")
            .set(
                "columns",
                CommandValue::StrList(vec!["id".into(), "name".into()]),
            )
            .set("values", CommandValue::ExprRows(vec![values_row("(1)")])),
    );
    assert!(matches!(short, Err(Error::ArityMismatch(_))));
}

#[test]
fn insert_fills_missing_columns_from_defaults() {
    let ctx = setup_test();
    ctx.create_table(
        "Part",
        vec![
            ColumnDef::new("id", SqlType::Integer).primary_key(),
            ColumnDef::new("name", SqlType::VarChar { size: 50 })
                .default(expr("'unnamed'")),
        ],
    );

    ctx.exec(
        Command::new("insert")
            .with_str("table", "Part")
            .set("columns", CommandValue::StrList(vec!["id".into()]))
            .set("values", CommandValue::ExprRows(vec![values_row("(7)")])),
    );

    let result = ctx.select("Part", &["name"], Some("id = 7")).unwrap();
    assert_eq!(result.rows, vec![vec![Value::Str("unnamed".into())]]);
}

#[test]
fn update_fires_one_trigger_event_per_statement() {
    let ctx = setup_test();
    ctx.create_table("Part", id_name_columns());
    ctx.insert_values("Part", &["(1, 'bolt')", "(2, 'nut')"]);

    ctx.exec(
        Command::new("create_trigger")
            .with_str("name", "part_audit")
            .with_str("table", "Part")
            .set("events", CommandValue::StrList(vec!["update".into()])),
    );

    let affected = ctx.exec(
        Command::new("update")
            .with_str("table", "Part")
            .set("set", assignments(&[("name", "'washer'")]))
            .set("where", CommandValue::Expr(expr("id = 2"))),
    );
    assert_eq!(affected.rows, vec![vec![Value::Integer(1)]]);
    assert_eq!(ctx.conn.trigger_fired_count("part_audit"), 1);

    let updates: Vec<_> = ctx
        .conn
        .trigger_log()
        .into_iter()
        .filter(|e| e.kind == TriggerKind::Update)
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].count, 1);

    let result = ctx.select("Part", &["name"], Some("id = 2")).unwrap();
    assert_eq!(result.rows, vec![vec![Value::Str("washer".into())]]);
}

#[test]
fn update_reads_old_row_values() {
    let ctx = setup_test();
    ctx.create_table(
        "Counter",
        vec![ColumnDef::new("n", SqlType::Integer).not_null()],
    );
    ctx.insert_values("Counter", &["(10)"]);

    ctx.exec(
        Command::new("update")
            .with_str("table", "Counter")
            .set("set", assignments(&[("n", "n + 1")])),
    );

    let result = ctx.select("Counter", &["n"], None).unwrap();
    assert_eq!(result.rows, vec![vec![Value::Integer(11)]]);
}

#[test]
fn delete_removes_only_matching_rows() {
    let ctx = setup_test();
    ctx.create_table("Part", id_name_columns());
    ctx.insert_values("Part", &["(1, 'bolt')", "(2, 'nut')"]);

    let affected = ctx.exec(
        Command::new("delete")
            .with_str("table", "Part")
            .set("where", CommandValue::Expr(expr("name LIKE 'b%'"))),
    );
    assert_eq!(affected.rows, vec![vec![Value::Integer(1)]]);

    let result = ctx.select("Part", &["id"], None).unwrap();
    assert_eq!(result.rows, vec![vec![Value::Integer(2)]]);
}

#[test]
fn delete_with_limit_caps_the_affected_set() {
    let ctx = setup_test();
    ctx.create_table("Part", id_name_columns());
    ctx.insert_values("Part", &["(1, 'a')", "(2, 'b')", "(3, 'c')"]);

    let affected = ctx.exec(
        Command::new("delete")
            .with_str("table", "Part")
            .with_int("limit", 2),
    );
    assert_eq!(affected.rows, vec![vec![Value::Integer(2)]]);
    assert_eq!(ctx.select("Part", &["id"], None).unwrap().row_count(), 1);
}

#[test]
fn subquery_is_rejected_in_set_and_values() {
    let ctx = setup_test();
    ctx.create_table("Part", id_name_columns());

    let select = common::simple_select("Part", &["id"], None);
    let sub = granite_sql::types::expression::Expression::Subquery(Box::new(
        granite_sql::types::query::SelectExpr::Simple(select),
    ));

    let in_values = ctx.run(
        Command::new("insert").with_str("table", "Part").set(
            "values",
            CommandValue::ExprRows(vec![vec![sub.clone(), expr("'x'")]]),
        ),
    );
    assert!(matches!(in_values, Err(Error::IllegalSubquery(_))));

    let in_set = ctx.run(
        Command::new("set")
            .with_str("action", "variable")
            .with_str("name", "v")
            .set("value", CommandValue::Expr(sub)),
    );
    assert!(matches!(in_set, Err(Error::IllegalSubquery(_))));
}

#[test]
fn drop_trigger_requires_an_existing_trigger() {
    let ctx = setup_test();
    let missing = ctx.run(Command::new("drop_trigger").with_str("name", "ghost"));
    assert!(matches!(missing, Err(Error::TriggerNotFound(_))));

    ctx.create_table("Part", id_name_columns());
    ctx.exec(
        Command::new("create_trigger")
            .with_str("name", "part_audit")
            .with_str("table", "Part")
            .set(
                "events",
                CommandValue::StrList(vec!["insert".into(), "delete".into()]),
            ),
    );
    ctx.exec(Command::new("drop_trigger").with_str("name", "part_audit"));
}

#[test]
fn schema_create_set_and_show() {
    let ctx = setup_test();
    ctx.exec(
        Command::new("schema")
            .with_str("action", "create")
            .with_str("name", "INVENTORY"),
    );

    let schemas = ctx.exec(Command::new("show").with_str("target", "schemas"));
    assert!(
        schemas
            .rows
            .iter()
            .any(|r| r == &vec![Value::Str("INVENTORY".into())])
    );

    ctx.exec(
        Command::new("set")
            .with_str("action", "schema")
            .with_str("name", "INVENTORY"),
    );
    ctx.create_table("Part", id_name_columns());

    let tables = ctx.exec(Command::new("show").with_str("target", "tables"));
    assert_eq!(tables.rows, vec![vec![Value::Str("Part".into())]]);
}

#[test]
fn schema_switch_reports_case_collisions_as_ambiguity() {
    let ctx = setup_test();
    for name in ["INVENTORY", "inventory"] {
        ctx.exec(
            Command::new("schema")
                .with_str("action", "create")
                .with_str("name", name),
        );
    }
    ctx.exec(
        Command::new("set")
            .with_str("action", "ignore_case")
            .with_bool("on", true),
    );

    let err = ctx.run(
        Command::new("set")
            .with_str("action", "schema")
            .with_str("name", "Inventory"),
    );
    assert!(matches!(err, Err(Error::AmbiguousSchema { .. })), "{err:?}");

    // An exact name still switches
    ctx.exec(
        Command::new("set")
            .with_str("action", "schema")
            .with_str("name", "inventory"),
    );
}

#[test]
fn session_variables_show_up_in_show_variables() {
    let ctx = setup_test();
    ctx.exec(
        Command::new("set")
            .with_str("action", "variable")
            .with_str("name", "threshold")
            .set("value", CommandValue::Expr(expr("2 + 3"))),
    );

    let vars = ctx.exec(Command::new("show").with_str("target", "variables"));
    assert!(
        vars.rows
            .contains(&vec![Value::Str("threshold".into()), Value::Integer(5)])
    );
}

#[test]
fn ignore_case_mode_relaxes_column_resolution() {
    let ctx = setup_test();
    ctx.create_table("Part", id_name_columns());
    ctx.insert_values("Part", &["(1, 'bolt')"]);

    let strict = ctx.select("Part", &["ID"], None);
    assert!(matches!(strict, Err(Error::ColumnNotFound(_))));

    ctx.exec(
        Command::new("set")
            .with_str("action", "ignore_case")
            .with_bool("on", true),
    );
    let relaxed = ctx.select("Part", &["ID"], None).unwrap();
    assert_eq!(relaxed.row_count(), 1);
}

#[test]
fn insert_column_list_rejects_case_collisions() {
    let ctx = setup_test();
    // Legal in strict mode: the names differ only in case
    ctx.create_table(
        "T",
        vec![
            ColumnDef::new("id", SqlType::Integer),
            ColumnDef::new("ID", SqlType::Integer),
        ],
    );
    ctx.exec(
        Command::new("set")
            .with_str("action", "ignore_case")
            .with_bool("on", true),
    );

    let err = ctx.run(
        Command::new("insert")
            .with_str("table", "T")
            .set("columns", CommandValue::StrList(vec!["Id".into()]))
            .set("values", CommandValue::ExprRows(vec![values_row("(7)")])),
    );
    assert!(matches!(err, Err(Error::AmbiguousColumn { .. })), "{err:?}");

    // An exact name still resolves past the collision
    ctx.exec(
        Command::new("insert")
            .with_str("table", "T")
            .set("columns", CommandValue::StrList(vec!["ID".into()]))
            .set("values", CommandValue::ExprRows(vec![values_row("(7)")])),
    );
}

#[test]
fn privileges_gate_evaluation_not_preparation() {
    let ctx = setup_test();
    ctx.create_table("Part", id_name_columns());

    let guest = ctx.connect("guest");
    let mut stmt = Statement::from_command(&select_command("Part", &["*"], None)).unwrap();
    stmt.prepare(&guest).unwrap();
    let denied = stmt.evaluate(&guest);
    assert!(matches!(denied, Err(Error::AccessDenied { .. })));

    ctx.catalog.grant(
        "guest",
        "APP.Part",
        granite_sql::catalog::Privilege::Select,
    );
    let mut stmt = Statement::from_command(&select_command("Part", &["*"], None)).unwrap();
    stmt.prepare(&guest).unwrap();
    assert!(stmt.evaluate(&guest).is_ok());
}

#[test]
fn insert_into_unknown_table_fails_at_prepare() {
    let ctx = setup_test();
    let missing = ctx.run(insert_command("Ghost", &["(1, 'x')"]));
    assert!(matches!(missing, Err(Error::TableNotFound(_))));
}
