//! A single resolvable table source
//!
//! Wraps one physical or derived table under a {given, root} name pair:
//! `FROM Part P` has root `Part` and given `P`. All matching honors the
//! session's case mode uniformly.

use crate::error::{Error, Result};
use crate::types::schema::ObjectName;

#[derive(Debug, Clone, PartialEq)]
pub struct FromSource {
    /// The name the query refers to this source by (alias if present).
    pub given: ObjectName,
    /// The underlying table name (equal to `given` when not aliased).
    pub root: ObjectName,
    /// Column names exposed by this source, in order.
    pub columns: Vec<String>,
    /// True for sub-selects in FROM.
    pub derived: bool,
}

fn names_eq(a: &str, b: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

impl FromSource {
    pub fn base(given: ObjectName, root: ObjectName, columns: Vec<String>) -> Self {
        FromSource {
            given,
            root,
            columns,
            derived: false,
        }
    }

    pub fn derived(given: ObjectName, columns: Vec<String>) -> Self {
        FromSource {
            root: given.clone(),
            given,
            columns,
            derived: true,
        }
    }

    /// Does this source answer to the given (schema, table) qualifier?
    pub fn matches_qualifier(
        &self,
        schema: Option<&str>,
        table: &str,
        ignore_case: bool,
    ) -> bool {
        if let Some(schema) = schema {
            if !names_eq(&self.given.schema, schema, ignore_case) {
                return false;
            }
        }
        names_eq(&self.given.name, table, ignore_case)
    }

    /// How many of this source's columns match the name? `None` counts all
    /// columns. Under case-insensitive mode the count may exceed one;
    /// callers must treat that as ambiguity.
    pub fn column_match_count(&self, column: Option<&str>, ignore_case: bool) -> usize {
        match column {
            None => self.columns.len(),
            Some(name) => self
                .columns
                .iter()
                .filter(|c| names_eq(c, name, ignore_case))
                .count(),
        }
    }

    /// Resolves a column name to its unique offset within this source.
    pub fn resolve_column(&self, column: &str, ignore_case: bool) -> Result<usize> {
        let mut matches = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| names_eq(c, column, ignore_case));
        let Some((index, _)) = matches.next() else {
            return Err(Error::ColumnNotFound(format!("{}.{}", self.given, column)));
        };
        if let Some((other, _)) = matches.next() {
            return Err(Error::AmbiguousColumn {
                name: column.to_string(),
                matches: vec![
                    format!("{}.{}", self.given, self.columns[index]),
                    format!("{}.{}", self.given, self.columns[other]),
                ],
            });
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part_source() -> FromSource {
        FromSource::base(
            ObjectName::new("APP", "P"),
            ObjectName::new("APP", "Part"),
            vec!["id".into(), "name".into(), "ID2".into()],
        )
    }

    #[test]
    fn alias_answers_to_given_name_only() {
        let src = part_source();
        assert!(src.matches_qualifier(None, "P", false));
        assert!(!src.matches_qualifier(None, "Part", false));
        assert!(src.matches_qualifier(Some("APP"), "p", true));
        assert!(!src.matches_qualifier(Some("OTHER"), "P", true));
    }

    #[test]
    fn case_insensitive_count_can_exceed_one() {
        let src = FromSource::base(
            ObjectName::new("APP", "T"),
            ObjectName::new("APP", "T"),
            vec!["id".into(), "ID".into()],
        );
        assert_eq!(src.column_match_count(Some("id"), false), 1);
        assert_eq!(src.column_match_count(Some("id"), true), 2);
        assert_eq!(src.column_match_count(None, false), 2);
        assert!(matches!(
            src.resolve_column("Id", true),
            Err(Error::AmbiguousColumn { .. })
        ));
    }

    #[test]
    fn resolve_returns_unique_offset() {
        let src = part_source();
        assert_eq!(src.resolve_column("name", false).unwrap(), 1);
        assert!(matches!(
            src.resolve_column("missing", false),
            Err(Error::ColumnNotFound(_))
        ));
    }
}
