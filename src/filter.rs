/// LiveBuffer Filters
///
/// A view's filters form a tree: a group has a conjunction, leaf filters and
/// nested groups. Filter types are a closed enum, so evaluating one is a
/// `match`, not a lookup by type name.
///
/// The tree is evaluated through the `FilterTreeEvaluator` trait so callers
/// can substitute their own semantics; `StandardFilters` is the default.

use crate::row::{Field, FieldId, FieldType, FieldValue, OptionId, ValueLookup};
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterConjunction {
    #[default]
    And,
    Or,
}

/// Filter types. Text parameters that are empty make the filter a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FilterType {
    Equal(String),
    NotEqual(String),
    Contains(String),
    ContainsNot(String),
    Empty,
    NotEmpty,
    HigherThan(f64),
    LowerThan(f64),
    Boolean(bool),
    SingleSelectEqual(OptionId),
    SingleSelectNotEqual(OptionId),
    DateEqual(NaiveDate),
    DateBefore(NaiveDate),
    DateAfter(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: FieldId,
    #[serde(rename = "filter")]
    pub filter_type: FilterType,
}

impl Filter {
    pub fn new(field: FieldId, filter_type: FilterType) -> Self {
        Filter { field, filter_type }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub conjunction: FilterConjunction,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub groups: Vec<FilterGroup>,
}

impl FilterGroup {
    pub fn and(filters: Vec<Filter>) -> Self {
        FilterGroup {
            conjunction: FilterConjunction::And,
            filters,
            groups: Vec::new(),
        }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        FilterGroup {
            conjunction: FilterConjunction::Or,
            filters,
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: FilterGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.groups.iter().all(FilterGroup::is_empty)
    }
}

/// Evaluates a filter tree against a row's (possibly overridden) values.
pub trait FilterTreeEvaluator: Send + Sync {
    fn matches(&self, tree: &FilterGroup, fields: &[Field], values: ValueLookup<'_>) -> bool;
}

/// Default filter semantics.
#[derive(Debug, Clone, Copy)]
pub struct StandardFilters {
    /// Offset used to turn date-times into calendar days for date filters.
    pub timezone: FixedOffset,
}

impl Default for StandardFilters {
    fn default() -> Self {
        StandardFilters { timezone: Utc.fix() }
    }
}

impl FilterTreeEvaluator for StandardFilters {
    fn matches(&self, tree: &FilterGroup, fields: &[Field], values: ValueLookup<'_>) -> bool {
        self.group_matches(tree, fields, values)
    }
}

impl StandardFilters {
    fn group_matches(&self, group: &FilterGroup, fields: &[Field], values: ValueLookup<'_>) -> bool {
        let mut results = group
            .filters
            .iter()
            .map(|filter| self.filter_matches(filter, fields, values))
            .chain(
                group
                    .groups
                    .iter()
                    .filter(|g| !g.is_empty())
                    .map(|g| self.group_matches(g, fields, values)),
            )
            .peekable();

        if results.peek().is_none() {
            return true;
        }
        match group.conjunction {
            FilterConjunction::And => results.all(|r| r),
            FilterConjunction::Or => results.any(|r| r),
        }
    }

    fn filter_matches(&self, filter: &Filter, fields: &[Field], values: ValueLookup<'_>) -> bool {
        // Filters on fields that no longer exist are ignored
        let Some(field) = fields.iter().find(|f| f.id == filter.field) else {
            return true;
        };
        let value = values.get(field.id);
        let text = || field.field_type.human_readable(value);

        match &filter.filter_type {
            FilterType::Equal(param) if param.is_empty() => true,
            FilterType::Equal(param) => equals(&field.field_type, value, param, &text()),
            FilterType::NotEqual(param) if param.is_empty() => true,
            FilterType::NotEqual(param) => !equals(&field.field_type, value, param, &text()),
            FilterType::Contains(param) if param.is_empty() => true,
            FilterType::Contains(param) => contains(&text(), param),
            FilterType::ContainsNot(param) if param.is_empty() => true,
            FilterType::ContainsNot(param) => !contains(&text(), param),
            FilterType::Empty => value.is_empty(),
            FilterType::NotEmpty => !value.is_empty(),
            FilterType::HigherThan(n) => value.as_f64().map(|v| v > *n).unwrap_or(false),
            FilterType::LowerThan(n) => value.as_f64().map(|v| v < *n).unwrap_or(false),
            FilterType::Boolean(b) => value.as_bool().unwrap_or(false) == *b,
            FilterType::SingleSelectEqual(id) => value.as_option_id() == Some(*id),
            FilterType::SingleSelectNotEqual(id) => value.as_option_id() != Some(*id),
            FilterType::DateEqual(day) => value.as_day(self.timezone) == Some(*day),
            FilterType::DateBefore(day) => value
                .as_day(self.timezone)
                .map(|d| d < *day)
                .unwrap_or(false),
            FilterType::DateAfter(day) => value
                .as_day(self.timezone)
                .map(|d| d > *day)
                .unwrap_or(false),
        }
    }
}

fn equals(field_type: &FieldType, value: &FieldValue, param: &str, text: &str) -> bool {
    match (field_type, value) {
        (FieldType::Number { .. }, FieldValue::Number(n)) => param
            .trim()
            .parse::<f64>()
            .map(|p| p == *n)
            .unwrap_or(false),
        _ => text == param,
    }
}

fn contains(text: &str, param: &str) -> bool {
    text.to_lowercase().contains(&param.to_lowercase())
}
