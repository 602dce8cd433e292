//! Records and typed field values

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::core::identity::{EntityId, TenantId};

/// Field names every record carries regardless of resource
pub const AUDIT_FIELDS: &[&str] = &["id", "number", "created", "updated"];

/// A scalar field value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view used for comparisons and aggregation
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            FieldValue::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    /// Plain-text rendering (empty for null)
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Case-insensitive substring match; null never matches
    pub fn contains_ci(&self, needle_lower: &str) -> bool {
        if self.is_null() {
            return false;
        }
        self.to_text().to_lowercase().contains(needle_lower)
    }

    /// Ordering rank: nulls first, then numerics, then text and dates.
    /// Mirrors SQLite's cross-type ordering so in-memory and SQL sorts agree.
    fn rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) | FieldValue::Integer(_) | FieldValue::Number(_) => 1,
            FieldValue::Text(_) | FieldValue::Date(_) => 2,
        }
    }

    /// Natural ordering of the value's type: numeric for numbers,
    /// lexicographic for text, chronological for dates.
    pub fn natural_cmp(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::Date(a), FieldValue::Date(b)) => a.cmp(b),
            _ => match self.rank().cmp(&other.rank()) {
                Ordering::Equal => match self.rank() {
                    0 => Ordering::Equal,
                    1 => {
                        let a = self.as_f64().unwrap_or_default();
                        let b = other.as_f64().unwrap_or_default();
                        a.total_cmp(&b)
                    }
                    _ => self.to_text().cmp(&other.to_text()),
                },
                ord => ord,
            },
        }
    }

    /// JSON representation used by the store
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Bool(b) => JsonValue::Bool(*b),
            FieldValue::Integer(i) => JsonValue::from(*i),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Text(s) => JsonValue::String(s.clone()),
            FieldValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        }
    }

    /// Best-effort conversion from JSON without schema information
    pub fn from_json_untyped(value: &JsonValue) -> FieldValue {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Number(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => FieldValue::Text(s.clone()),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(FieldValue::from_json_untyped(&value))
    }
}

/// Map of field name to value
pub type Fields = BTreeMap<String, FieldValue>;

/// A stored record of any resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: EntityId,
    /// Human-readable secondary identifier (e.g. `ITEM-000042`)
    pub number: String,
    pub tenant: TenantId,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub fields: Fields,
}

impl Record {
    /// Get a stored field value
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Value of a stored or audit field, null when absent
    pub fn value_of(&self, field: &str) -> FieldValue {
        match field {
            "id" => FieldValue::Text(self.id.to_string()),
            "number" => FieldValue::Text(self.number.clone()),
            "created" => FieldValue::Text(format_timestamp(&self.created)),
            "updated" => FieldValue::Text(format_timestamp(&self.updated)),
            _ => self.fields.get(field).cloned().unwrap_or_default(),
        }
    }
}

/// Current time at the precision timestamps are stored with
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 timestamps so text order equals chronological order
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`format_timestamp`]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_ordering_numeric() {
        assert_eq!(
            FieldValue::Integer(9).natural_cmp(&FieldValue::Integer(10)),
            Ordering::Less
        );
        assert_eq!(
            FieldValue::Integer(2).natural_cmp(&FieldValue::Number(2.0)),
            Ordering::Equal
        );
        assert_eq!(
            FieldValue::Number(10.5).natural_cmp(&FieldValue::Integer(3)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_natural_ordering_dates_and_nulls() {
        let early = FieldValue::Date(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        let late = FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(early.natural_cmp(&late), Ordering::Less);
        assert_eq!(FieldValue::Null.natural_cmp(&early), Ordering::Less);
        assert_eq!(FieldValue::Null.natural_cmp(&FieldValue::Null), Ordering::Equal);
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let v = FieldValue::Text("Carrier Air Filter".to_string());
        assert!(v.contains_ci("air fil"));
        assert!(!FieldValue::Null.contains_ci(""));
    }

    #[test]
    fn test_json_conversion() {
        assert_eq!(FieldValue::Integer(4).to_json(), serde_json::json!(4));
        assert_eq!(
            FieldValue::from_json_untyped(&serde_json::json!(2.5)),
            FieldValue::Number(2.5)
        );
        assert_eq!(
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()).to_json(),
            serde_json::json!("2024-03-01")
        );
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let ts = parse_timestamp("2024-05-01T10:00:00Z").unwrap();
        let formatted = format_timestamp(&ts);
        assert_eq!(formatted, "2024-05-01T10:00:00.000000Z");
        assert_eq!(parse_timestamp(&formatted), Some(ts));
    }
}
