/// LiveBuffer Row Ordering
///
/// A `RowComparator` is derived from a view's sort list. Rows are compared
/// key by key; ties fall back to the fractional `order` and finally to the
/// id, so two distinct rows never compare equal.

use crate::row::{Field, FieldId, FieldType, FieldValue, Row};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A single sort key specifying a field and order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: FieldId,
    pub order: SortOrder,
}

impl SortKey {
    pub fn ascending(field: FieldId) -> Self {
        SortKey {
            field,
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(field: FieldId) -> Self {
        SortKey {
            field,
            order: SortOrder::Descending,
        }
    }
}

/// Total order over rows for one view.
#[derive(Debug, Clone, Default)]
pub struct RowComparator {
    keys: Vec<(SortKey, FieldType)>,
}

impl RowComparator {
    /// Build from the view's sort list. Keys referring to unknown fields are
    /// skipped.
    pub fn new(sorts: &[SortKey], fields: &[Field]) -> Self {
        let keys = sorts
            .iter()
            .filter_map(|key| {
                fields
                    .iter()
                    .find(|f| f.id == key.field)
                    .map(|f| (key.clone(), f.field_type.clone()))
            })
            .collect();
        RowComparator { keys }
    }

    /// Comparator with no explicit sort: `order`, then id.
    pub fn by_order() -> Self {
        RowComparator { keys: Vec::new() }
    }

    pub fn has_explicit_sort(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for (key, field_type) in &self.keys {
            let cmp = compare_values(field_type, a.value(key.field), b.value(key.field));
            let cmp = match key.order {
                SortOrder::Ascending => cmp,
                SortOrder::Descending => cmp.reverse(),
            };
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        a.order
            .total_cmp(&b.order)
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Empty values sort first in ascending order.
fn compare_values(field_type: &FieldType, a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }

    match (a, b) {
        (FieldValue::Number(x), FieldValue::Number(y)) => x.total_cmp(y),
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x.cmp(y),
        (FieldValue::Text(x), FieldValue::Text(y)) => x
            .to_lowercase()
            .cmp(&y.to_lowercase())
            .then_with(|| x.cmp(y)),
        (FieldValue::Date(x), FieldValue::Date(y)) => x.cmp(y),
        (FieldValue::DateTime(x), FieldValue::DateTime(y)) => x.cmp(y),
        (FieldValue::Date(x), FieldValue::DateTime(y)) => {
            x.cmp(&y.date_naive()).then(Ordering::Less)
        }
        (FieldValue::DateTime(x), FieldValue::Date(y)) => {
            x.date_naive().cmp(y).then(Ordering::Greater)
        }
        (FieldValue::SelectOption(_), FieldValue::SelectOption(_)) => {
            let x = field_type.human_readable(a);
            let y = field_type.human_readable(b);
            x.to_lowercase().cmp(&y.to_lowercase())
        }
        // Mixed types: deterministic by variant
        (x, y) => variant_rank(x).cmp(&variant_rank(y)),
    }
}

fn variant_rank(value: &FieldValue) -> u8 {
    match value {
        FieldValue::Null => 0,
        FieldValue::Bool(_) => 1,
        FieldValue::Number(_) => 2,
        FieldValue::Text(_) => 3,
        FieldValue::Date(_) => 4,
        FieldValue::DateTime(_) => 5,
        FieldValue::SelectOption(_) => 6,
    }
}
