//! Lock declaration tests
//!
//! Prepared statements declare the tables they read and write before
//! evaluation. These tests check the declarations against the tables a
//! statement actually touches, using the connection's touched-table
//! instrumentation.

mod common;

use common::{assignments, expr, id_name_columns, insert_command, select_command, setup_test};
use granite_sql::command::CommandValue;
use granite_sql::types::SqlType;
use granite_sql::{ColumnDef, Command, ConstraintDef, ObjectName};

fn orders_with_part_fk(ctx: &common::TestContext) {
    ctx.create_table("Part", id_name_columns());
    ctx.insert_values("Part", &["(1, 'bolt')", "(2, 'nut')"]);

    let fk = ConstraintDef::foreign_key(
        vec!["part_id".into()],
        "Part",
        vec!["id".into()],
    )
    .unwrap();
    ctx.exec(
        Command::new("create_table")
            .with_str("table", "Ord")
            .set(
                "columns",
                CommandValue::Columns(vec![
                    ColumnDef::new("id", SqlType::Integer).primary_key(),
                    ColumnDef::new("part_id", SqlType::Integer).not_null(),
                ]),
            )
            .set("constraints", CommandValue::Constraints(vec![fk])),
    );
}

#[test]
fn select_declares_reads_and_nothing_else() {
    let ctx = setup_test();
    ctx.create_table("Part", id_name_columns());

    let stmt = ctx.prepared(select_command("Part", &["*"], None)).unwrap();
    let reads = stmt.reads_from(&ctx.conn).unwrap();
    assert!(reads.contains(&ObjectName::new("APP", "Part")));
    assert!(stmt.writes_to().unwrap().is_empty());
    assert!(!stmt.is_exclusive().unwrap());
}

#[test]
fn insert_declares_foreign_key_parents_as_reads() {
    let ctx = setup_test();
    orders_with_part_fk(&ctx);

    let stmt = ctx.prepared(insert_command("Ord", &["(10, 1)"])).unwrap();
    let reads = stmt.reads_from(&ctx.conn).unwrap();
    let writes = stmt.writes_to().unwrap();
    assert!(reads.contains(&ObjectName::new("APP", "Part")));
    assert_eq!(
        writes.into_iter().collect::<Vec<_>>(),
        vec![ObjectName::new("APP", "Ord")]
    );
}

#[test]
fn declared_tables_cover_everything_evaluation_touches() {
    let ctx = setup_test();
    orders_with_part_fk(&ctx);
    ctx.insert_values("Ord", &["(10, 1)", "(11, 2)"]);

    // A table with no relational link to Ord, read only through the
    // WHERE sub-select.
    ctx.create_table(
        "Watermark",
        vec![ColumnDef::new("cutoff", SqlType::Integer)],
    );
    ctx.insert_values("Watermark", &["(10)"]);

    let sub = granite_sql::types::expression::Expression::Subquery(Box::new(
        granite_sql::types::query::SelectExpr::Simple(common::simple_select(
            "Watermark",
            &["MAX(cutoff)"],
            None,
        )),
    ));
    let predicate = granite_sql::types::expression::Expression::Equal(
        Box::new(expr("id")),
        Box::new(sub),
    );
    let command = Command::new("update")
        .with_str("table", "Ord")
        .set("set", assignments(&[("part_id", "2")]))
        .set("where", CommandValue::Expr(predicate));

    let mut stmt = granite_sql::Statement::from_command(&command).unwrap();
    stmt.prepare(&ctx.conn).unwrap();

    let mut declared = stmt.reads_from(&ctx.conn).unwrap();
    declared.extend(stmt.writes_to().unwrap());

    ctx.conn.reset_touched();
    stmt.evaluate(&ctx.conn).unwrap();
    let touched = ctx.conn.touched_tables();

    assert!(
        touched.is_subset(&declared),
        "evaluation touched {touched:?} but declared only {declared:?}"
    );
    assert!(declared.contains(&ObjectName::new("APP", "Watermark")));
    assert!(declared.contains(&ObjectName::new("APP", "Part")));
}

#[test]
fn dml_against_reserved_tables_is_exclusive() {
    let ctx = setup_test();
    ctx.create_table(
        "sys_settings",
        vec![
            ColumnDef::new("k", SqlType::VarChar { size: 50 }).primary_key(),
            ColumnDef::new("v", SqlType::VarChar { size: 50 }),
        ],
    );
    ctx.create_table("Part", id_name_columns());

    let reserved = ctx
        .prepared(insert_command("sys_settings", &["('a', 'b')"]))
        .unwrap();
    assert!(reserved.is_exclusive().unwrap());

    let ordinary = ctx.prepared(insert_command("Part", &["(1, 'x')"])).unwrap();
    assert!(!ordinary.is_exclusive().unwrap());
}

#[test]
fn ddl_and_session_statements_are_exclusive_with_empty_sets() {
    let ctx = setup_test();

    let create = ctx
        .prepared(
            Command::new("create_table")
                .with_str("table", "Part")
                .set("columns", CommandValue::Columns(id_name_columns())),
        )
        .unwrap();
    assert!(create.is_exclusive().unwrap());
    assert!(create.reads_from(&ctx.conn).unwrap().is_empty());
    assert!(create.writes_to().unwrap().is_empty());

    let set = ctx
        .prepared(
            Command::new("set")
                .with_str("action", "ignore_case")
                .with_bool("on", true),
        )
        .unwrap();
    assert!(set.is_exclusive().unwrap());

    let show = ctx
        .prepared(Command::new("show").with_str("target", "status"))
        .unwrap();
    assert!(!show.is_exclusive().unwrap());
}

#[test]
fn update_reads_include_where_scan_and_linked_tables() {
    let ctx = setup_test();
    orders_with_part_fk(&ctx);
    ctx.insert_values("Ord", &["(10, 1)"]);

    let command = Command::new("update")
        .with_str("table", "Ord")
        .set("set", assignments(&[("part_id", "2")]))
        .set("where", CommandValue::Expr(expr("part_id = 1")));
    let stmt = ctx.prepared(command).unwrap();

    let reads = stmt.reads_from(&ctx.conn).unwrap();
    assert!(reads.contains(&ObjectName::new("APP", "Ord")));
    assert!(reads.contains(&ObjectName::new("APP", "Part")));

    let foreign_key_holds = ctx.run(
        Command::new("update")
            .with_str("table", "Ord")
            .set("set", assignments(&[("part_id", "99")])),
    );
    assert!(matches!(
        foreign_key_holds,
        Err(granite_sql::Error::ForeignKeyViolation(_))
    ));
}
