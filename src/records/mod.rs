//! Financial statement records
//!
//! Records arrive either flat (`{"company": "A", "total_assets": 10}`) or in the
//! storage backend's envelope shape (`{"id": "rec1", "fields": {...}}`).
//! The shape is resolved once here; everything downstream reads [`Fields`],
//! the lower-cased view of either shape.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const ENVELOPE_KEY: &str = "fields";

/// One company-period financial statement.
#[derive(Debug, Clone, PartialEq)]
pub enum FinancialRecord {
    /// Plain field → value mapping.
    Flat(Map<String, Value>),
    /// Storage-backend envelope: record metadata plus a nested `fields` mapping.
    Envelope {
        id: Option<String>,
        created_time: Option<String>,
        fields: Map<String, Value>,
    },
}

impl FinancialRecord {
    /// Classify an arbitrary JSON value. Non-objects become an empty flat record.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return FinancialRecord::Flat(Map::new());
        };

        match map.remove(ENVELOPE_KEY) {
            Some(Value::Object(fields)) => FinancialRecord::Envelope {
                id: map.get("id").and_then(Value::as_str).map(str::to_string),
                created_time: map
                    .get("createdTime")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                fields,
            },
            // A scalar "fields" entry is just another flat field
            Some(other) => {
                map.insert(ENVELOPE_KEY.to_string(), other);
                FinancialRecord::Flat(map)
            }
            None => FinancialRecord::Flat(map),
        }
    }

    /// Field mapping as stored, keys untouched.
    pub fn raw_fields(&self) -> &Map<String, Value> {
        match self {
            FinancialRecord::Flat(map) => map,
            FinancialRecord::Envelope { fields, .. } => fields,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            FinancialRecord::Flat(_) => None,
            FinancialRecord::Envelope { id, .. } => id.as_deref(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            FinancialRecord::Flat(map) => Value::Object(map.clone()),
            FinancialRecord::Envelope {
                id,
                created_time,
                fields,
            } => {
                let mut map = Map::new();
                if let Some(id) = id {
                    map.insert("id".to_string(), Value::String(id.clone()));
                }
                if let Some(created_time) = created_time {
                    map.insert("createdTime".to_string(), Value::String(created_time.clone()));
                }
                map.insert(ENVELOPE_KEY.to_string(), Value::Object(fields.clone()));
                Value::Object(map)
            }
        }
    }
}

impl From<Value> for FinancialRecord {
    fn from(value: Value) -> Self {
        FinancialRecord::from_value(value)
    }
}

impl Serialize for FinancialRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FinancialRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(FinancialRecord::from_value)
    }
}

/// Canonical, case-insensitive field mapping of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    fn from_map(map: &Map<String, Value>) -> Self {
        Self(
            map.iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(&key.to_lowercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// First alias holding a JSON number. Strings, nulls and booleans are
    /// skipped rather than parsed, so placeholder text never reads as a value.
    pub fn number(&self, keys: &[&str]) -> Option<f64> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .find_map(|value| match value {
                Value::Number(n) => n.as_f64(),
                _ => None,
            })
    }

    /// String form of a field, used for company / period matching.
    pub fn text(&self, key: &str) -> String {
        match self.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

pub fn extract_fields(record: &FinancialRecord) -> Fields {
    Fields::from_map(record.raw_fields())
}

/// Same as [`extract_fields`] for a record that has not been classified yet.
pub fn extract_fields_from_value(value: &Value) -> Fields {
    match value {
        Value::Object(_) => extract_fields(&FinancialRecord::from_value(value.clone())),
        _ => Fields::default(),
    }
}

pub fn get_number(fields: &Fields, keys: &[&str], default: f64) -> f64 {
    fields.number(keys).unwrap_or(default)
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(normalize).filter(|v| !v.is_empty())
}

/// Pick one record: company + period match, then company match, then the first record.
pub fn select_record<'a, I>(
    records: I,
    company: Option<&str>,
    period: Option<&str>,
) -> Option<&'a FinancialRecord>
where
    I: IntoIterator<Item = &'a FinancialRecord>,
{
    // Single pass over the source; scanning happens on the materialized list
    let records: Vec<&FinancialRecord> = records.into_iter().collect();
    let first = *records.first()?;

    let company = non_blank(company);
    let period = non_blank(period);

    let matches = |record: &FinancialRecord, key: &str, wanted: &str| {
        normalize(&extract_fields(record).text(key)) == wanted
    };

    if let (Some(company), Some(period)) = (company.as_deref(), period.as_deref()) {
        if let Some(found) = records
            .iter()
            .find(|r| matches(r, "company", company) && matches(r, "period", period))
        {
            return Some(*found);
        }
    }

    if let Some(company) = company.as_deref() {
        if let Some(found) = records.iter().find(|r| matches(r, "company", company)) {
            return Some(*found);
        }
    }

    Some(first)
}
