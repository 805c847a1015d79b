//! The resolved set of sources visible to one statement
//!
//! A `FromSet` aggregates one `FromSource` per FROM-clause entry and is
//! the structure any bare or qualified variable is resolved against.
//! Every lookup returns exactly one physical column or an explicit
//! not-found/ambiguity error; resolution is deterministic, so resolving
//! the same name twice yields the same column.

use super::from_source::FromSource;
use crate::error::{Error, Result};
use crate::types::expression::ColumnRef;
use crate::types::schema::ObjectName;

/// A column fully resolved against a FromSet.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumn {
    /// Index of the owning source within the set.
    pub source: usize,
    /// Column offset within the owning source.
    pub column: usize,
    /// The source's given name.
    pub table: ObjectName,
    /// Canonical column name as declared.
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct FromSet {
    sources: Vec<FromSource>,
    ignore_case: bool,
}

impl FromSet {
    pub fn new(ignore_case: bool) -> Self {
        FromSet {
            sources: Vec::new(),
            ignore_case,
        }
    }

    pub fn add_source(&mut self, source: FromSource) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[FromSource] {
        &self.sources
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Total number of columns across all sources; the width of the row
    /// the plan's source stage produces.
    pub fn total_columns(&self) -> usize {
        self.sources.iter().map(|s| s.columns.len()).sum()
    }

    /// Flat offset of a column within the combined source row.
    pub fn offset_of(&self, source: usize, column: usize) -> usize {
        let before: usize = self.sources[..source]
            .iter()
            .map(|s| s.columns.len())
            .sum();
        before + column
    }

    /// Resolves a possibly-qualified reference to exactly one column.
    pub fn resolve(&self, reference: &ColumnRef) -> Result<ResolvedColumn> {
        let mut found: Option<ResolvedColumn> = None;
        let mut candidates: Vec<String> = Vec::new();

        for (si, source) in self.sources.iter().enumerate() {
            if let Some(table) = &reference.table {
                if !source.matches_qualifier(
                    reference.schema.as_deref(),
                    table,
                    self.ignore_case,
                ) {
                    continue;
                }
            }
            let count = source.column_match_count(Some(&reference.column), self.ignore_case);
            if count == 0 {
                continue;
            }
            // A count above one is a case-insensitive collision inside a
            // single source; resolve_column reports it with both names.
            let ci = source.resolve_column(&reference.column, self.ignore_case)?;
            candidates.push(format!("{}.{}", source.given, source.columns[ci]));
            if found.is_none() {
                found = Some(ResolvedColumn {
                    source: si,
                    column: ci,
                    table: source.given.clone(),
                    name: source.columns[ci].clone(),
                });
            }
        }

        match (found, candidates.len()) {
            (Some(resolved), 1) => Ok(resolved),
            (None, _) => Err(Error::ColumnNotFound(reference.to_string())),
            (Some(_), _) => Err(Error::AmbiguousColumn {
                name: reference.to_string(),
                matches: candidates,
            }),
        }
    }

    /// Resolves a reference straight to its flat row offset.
    pub fn resolve_offset(&self, reference: &ColumnRef) -> Result<usize> {
        let resolved = self.resolve(reference)?;
        Ok(self.offset_of(resolved.source, resolved.column))
    }

    /// The qualified output labels of all columns, in source order.
    pub fn all_labels(&self) -> Vec<String> {
        self.sources
            .iter()
            .flat_map(|s| s.columns.iter().map(|c| c.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_table_set() -> FromSet {
        let mut set = FromSet::new(false);
        set.add_source(FromSource::base(
            ObjectName::new("APP", "T"),
            ObjectName::new("APP", "T"),
            vec!["id".into(), "name".into()],
        ));
        set.add_source(FromSource::base(
            ObjectName::new("APP", "U"),
            ObjectName::new("APP", "U"),
            vec!["id".into(), "amount".into()],
        ));
        set
    }

    #[test]
    fn bare_unique_name_resolves_and_is_idempotent() {
        let set = two_table_set();
        let first = set.resolve(&ColumnRef::bare("name")).unwrap();
        let second = set.resolve(&ColumnRef::bare("name")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.table, ObjectName::new("APP", "T"));
        assert_eq!(set.offset_of(first.source, first.column), 1);
    }

    #[test]
    fn bare_shared_name_is_ambiguous() {
        let set = two_table_set();
        let err = set.resolve(&ColumnRef::bare("id")).unwrap_err();
        assert!(matches!(err, Error::AmbiguousColumn { .. }), "{err:?}");
    }

    #[test]
    fn qualifier_disambiguates() {
        let set = two_table_set();
        let resolved = set.resolve(&ColumnRef::qualified("U", "id")).unwrap();
        assert_eq!(resolved.source, 1);
        assert_eq!(set.offset_of(resolved.source, resolved.column), 2);
    }

    #[test]
    fn unknown_name_is_not_found() {
        let set = two_table_set();
        assert!(matches!(
            set.resolve(&ColumnRef::bare("ghost")),
            Err(Error::ColumnNotFound(_))
        ));
    }
}
