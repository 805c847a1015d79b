//! Column checking for table declarations
//!
//! `ColumnChecker` is a small value type used while declaring a table,
//! before the table exists in the catalog. It validates column
//! references inside default expressions and check constraints against
//! the declared column list, normalizing away a redundant
//! "table.column" prefix and applying the session's case mode.

use crate::error::{Error, Result};
use crate::types::expression::{ColumnRef, Expression};

#[derive(Debug, Clone)]
pub struct ColumnChecker {
    table_name: String,
    columns: Vec<String>,
    ignore_case: bool,
}

fn names_eq(a: &str, b: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

impl ColumnChecker {
    pub fn new(table_name: impl Into<String>, columns: Vec<String>, ignore_case: bool) -> Self {
        ColumnChecker {
            table_name: table_name.into(),
            columns,
            ignore_case,
        }
    }

    /// Resolves one column name to its declared canonical form. A
    /// qualifier naming the table being declared is accepted and
    /// stripped; any other qualifier is rejected.
    pub fn resolve(&self, reference: &ColumnRef) -> Result<String> {
        if reference.schema.is_some() {
            return Err(Error::ColumnNotFound(reference.to_string()));
        }
        if let Some(table) = &reference.table {
            if !names_eq(table, &self.table_name, self.ignore_case) {
                return Err(Error::ColumnNotFound(reference.to_string()));
            }
        }
        let mut matches = self
            .columns
            .iter()
            .filter(|c| names_eq(c, &reference.column, self.ignore_case));
        let Some(first) = matches.next() else {
            return Err(Error::ColumnNotFound(reference.to_string()));
        };
        if let Some(second) = matches.next() {
            return Err(Error::AmbiguousColumn {
                name: reference.column.clone(),
                matches: vec![first.clone(), second.clone()],
            });
        }
        Ok(first.clone())
    }

    /// Index of a declared column, after the same normalization.
    pub fn resolve_index(&self, reference: &ColumnRef) -> Result<usize> {
        let canonical = self.resolve(reference)?;
        self.columns
            .iter()
            .position(|c| c == &canonical)
            .ok_or_else(|| Error::ColumnNotFound(reference.to_string()))
    }

    /// Rewrites every column reference in an expression to its declared
    /// field offset. Used on default expressions and check constraint
    /// bodies at declaration time.
    pub fn qualify_expression(&self, expr: Expression) -> Result<Expression> {
        let mut resolve = |reference: &ColumnRef| self.resolve_index(reference);
        let mut no_plans = |_: &crate::types::query::SelectExpr| {
            Err(Error::IllegalSubquery("a column declaration"))
        };
        // Resolution to Field offsets also proves every name is declared.
        expr.resolve(&mut resolve, &mut no_plans)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::value::Value;

    fn checker() -> ColumnChecker {
        ColumnChecker::new(
            "Part",
            vec!["id".into(), "name".into(), "price".into()],
            false,
        )
    }

    #[test]
    fn strips_own_table_prefix() {
        let c = checker();
        assert_eq!(c.resolve(&ColumnRef::qualified("Part", "name")).unwrap(), "name");
        assert_eq!(c.resolve(&ColumnRef::bare("price")).unwrap(), "price");
    }

    #[test]
    fn rejects_foreign_table_prefix() {
        let c = checker();
        assert!(matches!(
            c.resolve(&ColumnRef::qualified("Other", "name")),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn case_mode_controls_matching() {
        let strict = checker();
        assert!(strict.resolve(&ColumnRef::bare("NAME")).is_err());

        let lax = ColumnChecker::new("Part", vec!["id".into(), "name".into()], true);
        assert_eq!(lax.resolve(&ColumnRef::bare("NAME")).unwrap(), "name");
    }

    #[test]
    fn case_insensitive_collision_is_ambiguous() {
        let lax = ColumnChecker::new("T", vec!["id".into(), "ID".into()], true);
        assert!(matches!(
            lax.resolve(&ColumnRef::bare("Id")),
            Err(Error::AmbiguousColumn { .. })
        ));
    }

    #[test]
    fn qualify_rewrites_references_to_fields() {
        let c = checker();
        let expr = Expression::GreaterThan(
            Box::new(Expression::Column(ColumnRef::qualified("Part", "price"))),
            Box::new(Expression::Constant(Value::Integer(0))),
        );
        let resolved = c.qualify_expression(expr).unwrap();
        match resolved {
            Expression::GreaterThan(lhs, _) => {
                assert_eq!(*lhs, Expression::Field(2));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }
}
