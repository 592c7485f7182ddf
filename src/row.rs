/// LiveBuffer Row and Field Model
///
/// A Row is an opaque record with a stable integer id, a fractional `order`
/// used as the fallback sort key, and a map of field values. Every row also
/// carries a non-serialized annotation block (`RowMeta`) describing its local
/// UI state: loading, dragging, search matches and per-view metadata.
///
/// Field behavior (human-readable rendering, grouping equality) is a closed
/// enum resolved when a `Field` is constructed, not a registry lookup.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type RowId = u64;
pub type FieldId = u64;
pub type OptionId = u64;

/// Field value enum covering every supported field type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    SelectOption(OptionId),
}

static NULL_VALUE: FieldValue = FieldValue::Null;

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Null or a blank string. Used by the empty/not-empty filters.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_option_id(&self) -> Option<OptionId> {
        match self {
            FieldValue::SelectOption(v) => Some(*v),
            _ => None,
        }
    }

    /// The calendar day of a date value. Date-times are shifted into
    /// `offset` before truncating.
    pub fn as_day(&self, offset: FixedOffset) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            FieldValue::DateTime(dt) => Some(dt.with_timezone(&offset).date_naive()),
            _ => None,
        }
    }
}

/// A single select option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: OptionId,
    pub value: String,
    #[serde(default)]
    pub color: String,
}

impl SelectOption {
    pub fn new(id: OptionId, value: impl Into<String>) -> Self {
        SelectOption {
            id,
            value: value.into(),
            color: String::new(),
        }
    }
}

/// Field types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number {
        #[serde(default)]
        decimal_places: u8,
    },
    Boolean,
    Date {
        #[serde(default)]
        include_time: bool,
    },
    SingleSelect {
        #[serde(default)]
        options: Vec<SelectOption>,
    },
}

/// Hashable, totally ordered projection of a value used as a group key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GroupValue {
    Null,
    Bool(bool),
    /// IEEE bits of the number with `-0.0` folded into `0.0`.
    Number(u64),
    Text(String),
    Date(NaiveDate),
    Option(OptionId),
}

impl FieldType {
    /// Text shown to the user for this value; search matches against it.
    pub fn human_readable(&self, value: &FieldValue) -> String {
        match (self, value) {
            (_, FieldValue::Null) => String::new(),
            (FieldType::Number { decimal_places }, FieldValue::Number(n)) => {
                format!("{:.*}", *decimal_places as usize, n)
            }
            (FieldType::Boolean, FieldValue::Bool(b)) => {
                if *b { "true".to_string() } else { "false".to_string() }
            }
            (FieldType::Date { include_time: true }, FieldValue::DateTime(dt)) => {
                dt.format("%Y-%m-%d %H:%M").to_string()
            }
            (FieldType::Date { .. }, FieldValue::DateTime(dt)) => {
                dt.format("%Y-%m-%d").to_string()
            }
            (_, FieldValue::Date(d)) => d.format("%Y-%m-%d").to_string(),
            (FieldType::SingleSelect { options }, FieldValue::SelectOption(id)) => options
                .iter()
                .find(|o| o.id == *id)
                .map(|o| o.value.clone())
                .unwrap_or_default(),
            (_, FieldValue::Text(s)) => s.clone(),
            (_, FieldValue::Number(n)) => n.to_string(),
            (_, FieldValue::Bool(b)) => b.to_string(),
            (_, FieldValue::DateTime(dt)) => dt.to_rfc3339(),
            (_, FieldValue::SelectOption(id)) => id.to_string(),
        }
    }

    /// Group key for this value. Single selects compare option ids and
    /// date-times group per day.
    pub fn group_key(&self, value: &FieldValue) -> GroupValue {
        match value {
            FieldValue::Null => GroupValue::Null,
            FieldValue::Bool(b) => GroupValue::Bool(*b),
            FieldValue::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                GroupValue::Number(n.to_bits())
            }
            FieldValue::Text(s) if s.is_empty() => GroupValue::Null,
            FieldValue::Text(s) => GroupValue::Text(s.clone()),
            FieldValue::Date(d) => GroupValue::Date(*d),
            FieldValue::DateTime(dt) => match self {
                FieldType::Date { include_time: true } => GroupValue::Text(dt.to_rfc3339()),
                _ => GroupValue::Date(dt.date_naive()),
            },
            FieldValue::SelectOption(id) => GroupValue::Option(*id),
        }
    }
}

/// A field of the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    #[serde(default)]
    pub primary: bool,
}

impl Field {
    pub fn new(id: FieldId, name: impl Into<String>, field_type: FieldType) -> Self {
        Field {
            id,
            name: name.into(),
            field_type,
            primary: false,
        }
    }
}

/// Local, non-serialized annotations attached to a row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMeta {
    pub loading: bool,
    pub dragging: bool,
    pub matches_search: bool,
    pub field_search_matches: BTreeSet<FieldId>,
    /// Arbitrary per-view metadata such as comment counts.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Default for RowMeta {
    fn default() -> Self {
        RowMeta {
            loading: false,
            dragging: false,
            matches_search: true,
            field_search_matches: BTreeSet::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// A row of the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub order: f64,
    #[serde(default)]
    pub values: HashMap<FieldId, FieldValue>,
    #[serde(skip)]
    pub meta: RowMeta,
}

impl Row {
    pub fn new(id: RowId, order: f64) -> Self {
        Row {
            id,
            order,
            values: HashMap::new(),
            meta: RowMeta::default(),
        }
    }

    pub fn with_value(mut self, field: FieldId, value: FieldValue) -> Self {
        self.values.insert(field, value);
        self
    }

    /// Value of a field, `Null` when the row doesn't carry it.
    pub fn value(&self, field: FieldId) -> &FieldValue {
        self.values.get(&field).unwrap_or(&NULL_VALUE)
    }

    /// A copy of this row with `changes` merged into its values. The
    /// annotation block is carried over.
    pub fn with_changes(&self, changes: &HashMap<FieldId, FieldValue>) -> Row {
        let mut row = self.clone();
        for (field, value) in changes {
            row.values.insert(*field, value.clone());
        }
        row
    }

    /// Lookup over this row's values with optional overrides applied.
    pub fn lookup<'a>(&'a self, overrides: Option<&'a HashMap<FieldId, FieldValue>>) -> ValueLookup<'a> {
        ValueLookup { row: self, overrides }
    }
}

/// Read access to a row's values with hypothetical overrides layered on top,
/// so pre- and post-edit states can be evaluated without mutating the row.
#[derive(Debug, Clone, Copy)]
pub struct ValueLookup<'a> {
    row: &'a Row,
    overrides: Option<&'a HashMap<FieldId, FieldValue>>,
}

impl<'a> ValueLookup<'a> {
    pub fn get(&self, field: FieldId) -> &'a FieldValue {
        if let Some(value) = self.overrides.and_then(|o| o.get(&field)) {
            return value;
        }
        self.row.value(field)
    }

    pub fn row(&self) -> &'a Row {
        self.row
    }
}
