/// LiveBuffer Search
///
/// A search term is matched against the human-readable rendering of each
/// searchable field. The result carries an overall flag plus the set of
/// fields that matched, which the renderer uses for highlighting.

use crate::row::{Field, FieldId, ValueLookup};
use std::collections::BTreeSet;

/// Result of matching one row against a search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub matches: bool,
    pub field_matches: BTreeSet<FieldId>,
}

impl SearchMatch {
    /// Vacuous match: used when no term is active.
    pub fn all() -> Self {
        SearchMatch {
            matches: true,
            field_matches: BTreeSet::new(),
        }
    }
}

/// Computes per-field search matches for a row.
pub trait SearchMatcher: Send + Sync {
    fn search_match(&self, term: &str, fields: &[Field], values: ValueLookup<'_>) -> SearchMatch;
}

/// Case-insensitive substring search over rendered values. A term equal to
/// the row id also matches, without highlighting any field.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainsSearch;

impl SearchMatcher for ContainsSearch {
    fn search_match(&self, term: &str, fields: &[Field], values: ValueLookup<'_>) -> SearchMatch {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return SearchMatch::all();
        }

        let field_matches: BTreeSet<FieldId> = fields
            .iter()
            .filter(|field| {
                field
                    .field_type
                    .human_readable(values.get(field.id))
                    .to_lowercase()
                    .contains(&term)
            })
            .map(|field| field.id)
            .collect();

        let id_match = values.row().id.to_string() == term;
        SearchMatch {
            matches: id_match || !field_matches.is_empty(),
            field_matches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{FieldType, FieldValue, Row, SelectOption};
    use std::collections::HashMap;

    fn fields() -> Vec<Field> {
        vec![
            Field::new(1, "name", FieldType::Text),
            Field::new(
                2,
                "status",
                FieldType::SingleSelect {
                    options: vec![SelectOption::new(7, "Archived")],
                },
            ),
        ]
    }

    #[test]
    fn test_blank_term_matches_everything() {
        let row = Row::new(1, 1.0);
        assert_eq!(
            ContainsSearch.search_match("  ", &fields(), row.lookup(None)),
            SearchMatch::all()
        );
    }

    #[test]
    fn test_matches_rendered_option_name() {
        let row = Row::new(1, 1.0)
            .with_value(1, FieldValue::Text("Quarterly report".to_string()))
            .with_value(2, FieldValue::SelectOption(7));

        let result = ContainsSearch.search_match("ARCH", &fields(), row.lookup(None));
        assert!(result.matches);
        assert_eq!(result.field_matches, BTreeSet::from([2]));

        let result = ContainsSearch.search_match("report", &fields(), row.lookup(None));
        assert_eq!(result.field_matches, BTreeSet::from([1]));
    }

    #[test]
    fn test_row_id_matches_without_fields() {
        let row = Row::new(42, 1.0);
        let result = ContainsSearch.search_match("42", &fields(), row.lookup(None));
        assert!(result.matches);
        assert!(result.field_matches.is_empty());
    }

    #[test]
    fn test_overrides_change_the_match() {
        let row = Row::new(1, 1.0).with_value(1, FieldValue::Text("alpha".to_string()));
        let mut overrides = HashMap::new();
        overrides.insert(1, FieldValue::Text("beta".to_string()));

        assert!(ContainsSearch.search_match("alpha", &fields(), row.lookup(None)).matches);
        assert!(!ContainsSearch
            .search_match("alpha", &fields(), row.lookup(Some(&overrides)))
            .matches);
    }
}
