/// LiveBuffer Membership
///
/// Decides whether a row belongs in a view. A row is visible iff it passes
/// the view's filter tree and, when the view hides non-matching rows and a
/// search term is active, the search.
///
/// Both checks accept field-value overrides so the pre- and post-edit states
/// of a row can be compared before anything is mutated.
///
/// # Examples
///
/// ```
/// use livebuffer::{Field, FieldType, FieldValue, Filter, FilterGroup, FilterType, Row, ViewContext, ViewDefinition};
///
/// let fields = vec![Field::new(1, "name", FieldType::Text)];
/// let view = ViewDefinition {
///     filters: FilterGroup::and(vec![Filter::new(1, FilterType::Contains("a".to_string()))]),
///     ..ViewDefinition::default()
/// };
/// let context = ViewContext::new(fields, view);
///
/// let row = Row::new(1, 1.0).with_value(1, FieldValue::Text("alpha".to_string()));
/// assert!(context.is_visible(&row, None));
/// ```

use crate::filter::{FilterGroup, FilterTreeEvaluator, StandardFilters};
use crate::row::{Field, FieldId, FieldValue, Row};
use crate::search::{ContainsSearch, SearchMatch, SearchMatcher};
use crate::sort::{RowComparator, SortKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The parts of a view's configuration that affect which rows it holds and
/// in what order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewDefinition {
    pub filters: FilterGroup,
    pub filters_disabled: bool,
    pub sorts: Vec<SortKey>,
    pub search: Option<String>,
    /// When false, search only highlights and never hides rows.
    pub hide_non_matching: bool,
    /// Fields hidden in this view are not searched.
    pub hidden_fields: Vec<FieldId>,
    pub group_by: Vec<FieldId>,
}

impl Default for ViewDefinition {
    fn default() -> Self {
        ViewDefinition {
            filters: FilterGroup::default(),
            filters_disabled: false,
            sorts: Vec::new(),
            search: None,
            hide_non_matching: true,
            hidden_fields: Vec::new(),
            group_by: Vec::new(),
        }
    }
}

impl ViewDefinition {
    /// The active search term, if any. Blank terms count as no search.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}

/// Combines a filter-tree evaluator with a search matcher.
#[derive(Clone)]
pub struct MembershipEvaluator {
    filters: Arc<dyn FilterTreeEvaluator>,
    search: Arc<dyn SearchMatcher>,
}

impl Default for MembershipEvaluator {
    fn default() -> Self {
        MembershipEvaluator {
            filters: Arc::new(StandardFilters::default()),
            search: Arc::new(ContainsSearch),
        }
    }
}

impl fmt::Debug for MembershipEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MembershipEvaluator").finish_non_exhaustive()
    }
}

impl MembershipEvaluator {
    pub fn new(filters: Arc<dyn FilterTreeEvaluator>, search: Arc<dyn SearchMatcher>) -> Self {
        MembershipEvaluator { filters, search }
    }

    /// Always true when filtering is disabled for the view.
    pub fn matches_filters(
        &self,
        view: &ViewDefinition,
        fields: &[Field],
        row: &Row,
        overrides: Option<&HashMap<FieldId, FieldValue>>,
    ) -> bool {
        if view.filters_disabled || view.filters.is_empty() {
            return true;
        }
        self.filters.matches(&view.filters, fields, row.lookup(overrides))
    }

    /// No-op returning a vacuous match when `term` is None. Otherwise
    /// `matches` is the real result only when `hide_non_matching` is set;
    /// field matches are always computed for highlighting.
    pub fn search_match(
        &self,
        row: &Row,
        term: Option<&str>,
        hide_non_matching: bool,
        fields: &[Field],
        overrides: Option<&HashMap<FieldId, FieldValue>>,
    ) -> SearchMatch {
        let Some(term) = term else {
            return SearchMatch::all();
        };
        let mut result = self.search.search_match(term, fields, row.lookup(overrides));
        if !hide_non_matching {
            result.matches = true;
        }
        result
    }
}

/// Everything needed to evaluate rows against one view: its fields, its
/// definition, the evaluators and the derived comparator.
#[derive(Debug, Clone)]
pub struct ViewContext {
    fields: Vec<Field>,
    view: ViewDefinition,
    evaluator: MembershipEvaluator,
    comparator: RowComparator,
}

impl ViewContext {
    pub fn new(fields: Vec<Field>, view: ViewDefinition) -> Self {
        Self::with_evaluator(fields, view, MembershipEvaluator::default())
    }

    pub fn with_evaluator(fields: Vec<Field>, view: ViewDefinition, evaluator: MembershipEvaluator) -> Self {
        let comparator = RowComparator::new(&view.sorts, &fields);
        ViewContext {
            fields,
            view,
            evaluator,
            comparator,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn view(&self) -> &ViewDefinition {
        &self.view
    }

    pub fn comparator(&self) -> &RowComparator {
        &self.comparator
    }

    /// Swap the view definition, rebuilding the comparator.
    pub fn set_view(&mut self, view: ViewDefinition) {
        self.comparator = RowComparator::new(&view.sorts, &self.fields);
        self.view = view;
    }

    pub fn set_search(&mut self, term: Option<String>) {
        self.view.search = term;
    }

    pub fn matches_filters(&self, row: &Row, overrides: Option<&HashMap<FieldId, FieldValue>>) -> bool {
        self.evaluator
            .matches_filters(&self.view, &self.fields, row, overrides)
    }

    pub fn search_match(&self, row: &Row, overrides: Option<&HashMap<FieldId, FieldValue>>) -> SearchMatch {
        let searchable: Vec<Field> = self
            .fields
            .iter()
            .filter(|f| !self.view.hidden_fields.contains(&f.id))
            .cloned()
            .collect();
        self.evaluator.search_match(
            row,
            self.view.search_term(),
            self.view.hide_non_matching,
            &searchable,
            overrides,
        )
    }

    pub fn is_visible(&self, row: &Row, overrides: Option<&HashMap<FieldId, FieldValue>>) -> bool {
        self.matches_filters(row, overrides) && self.search_match(row, overrides).matches
    }

    /// Write the search annotations into the row's meta block.
    pub fn annotate(&self, row: &mut Row) {
        let result = self.search_match(row, None);
        row.meta.matches_search = result.matches;
        row.meta.field_search_matches = result.field_matches;
    }
}
