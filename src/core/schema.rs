//! Field registries: typed schemas for every list-managed resource
//!
//! Each resource declares its fields once. The registry is the single place
//! where raw strings (form input, CSV cells, filter arguments) become typed
//! [`FieldValue`]s, so unknown or malformed keys are rejected at the boundary.

use chrono::NaiveDate;
use miette::Diagnostic;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::identity::EntityPrefix;
use crate::core::record::{FieldValue, Fields, Record, AUDIT_FIELDS};

/// The type of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Date,
    Bool,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::Bool => "boolean",
        }
    }
}

/// A declared field of a resource
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Must be present and non-empty on create
    pub required: bool,
    /// Inclusive lower bound for numeric fields
    pub min: Option<f64>,
    /// Included in free-text search
    pub searchable: bool,
    /// Allowed values (case-insensitive, stored lowercase); empty means any
    pub choices: &'static [&'static str],
    /// Example value for CSV templates
    pub example: &'static str,
    /// Set on create only; updates naming the field fail with this message
    pub fixed_after_create: Option<&'static str>,
}

impl FieldDef {
    pub const TEXT: FieldDef = FieldDef {
        name: "",
        kind: FieldKind::Text,
        required: false,
        min: None,
        searchable: false,
        choices: &[],
        example: "",
        fixed_after_create: None,
    };
    pub const INTEGER: FieldDef = FieldDef {
        kind: FieldKind::Integer,
        ..FieldDef::TEXT
    };
    pub const NUMBER: FieldDef = FieldDef {
        kind: FieldKind::Number,
        ..FieldDef::TEXT
    };
    pub const DATE: FieldDef = FieldDef {
        kind: FieldKind::Date,
        ..FieldDef::TEXT
    };
    pub const BOOL: FieldDef = FieldDef {
        kind: FieldKind::Bool,
        ..FieldDef::TEXT
    };

    /// Parse a non-empty raw string into this field's type, enforcing bounds
    pub fn parse(&self, raw: &str) -> Result<FieldValue, String> {
        let value = self.parse_value(raw)?;
        if let (Some(min), Some(n)) = (self.min, value.as_f64()) {
            if n < min {
                return Err(format!("must be at least {}", min));
            }
        }
        Ok(value)
    }

    /// Parse a raw string into this field's type without checking bounds
    pub fn parse_value(&self, raw: &str) -> Result<FieldValue, String> {
        let raw = raw.trim();
        let value = match self.kind {
            FieldKind::Text => {
                if self.choices.is_empty() {
                    FieldValue::Text(raw.to_string())
                } else {
                    let lower = raw.to_lowercase();
                    if !self.choices.contains(&lower.as_str()) {
                        return Err(format!(
                            "'{}' is not one of: {}",
                            raw,
                            self.choices.join(", ")
                        ));
                    }
                    FieldValue::Text(lower)
                }
            }
            FieldKind::Integer => raw
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("'{}' is not a valid integer", raw))?,
            FieldKind::Number => match raw.parse::<f64>() {
                Ok(n) if n.is_finite() => FieldValue::Number(n),
                _ => return Err(format!("'{}' is not a valid number", raw)),
            },
            FieldKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(FieldValue::Date)
                .map_err(|_| format!("'{}' is not a valid date (expected YYYY-MM-DD)", raw))?,
            FieldKind::Bool => match raw.to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => FieldValue::Bool(true),
                "false" | "no" | "n" | "0" => FieldValue::Bool(false),
                _ => return Err(format!("'{}' is not a valid boolean", raw)),
            },
        };
        Ok(value)
    }

    /// Value stored when an optional field is absent on create:
    /// zero for unbounded or zero-floored numerics, null otherwise
    pub fn absent_value(&self) -> FieldValue {
        let zero_ok = self.min.map_or(true, |m| m <= 0.0);
        match self.kind {
            FieldKind::Integer if zero_ok => FieldValue::Integer(0),
            FieldKind::Number if zero_ok => FieldValue::Number(0.0),
            _ => FieldValue::Null,
        }
    }

    /// Convert a stored JSON value back into this field's type
    pub fn decode(&self, value: &JsonValue) -> FieldValue {
        match (self.kind, value) {
            (_, JsonValue::Null) => FieldValue::Null,
            (FieldKind::Date, JsonValue::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(FieldValue::Date)
                .unwrap_or_else(|_| FieldValue::Text(s.clone())),
            (FieldKind::Number, JsonValue::Number(n)) => {
                FieldValue::Number(n.as_f64().unwrap_or_default())
            }
            (FieldKind::Bool, JsonValue::Number(n)) => FieldValue::Bool(n.as_i64() == Some(1)),
            (_, other) => FieldValue::from_json_untyped(other),
        }
    }
}

/// A field derived from a record at read time; never stored, so only the
/// client-side refiner can filter or sort on it
#[derive(Clone, Copy)]
pub struct ComputedField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub compute: fn(&Record, NaiveDate) -> FieldValue,
}

impl std::fmt::Debug for ComputedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedField")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Static description of a list-managed resource
#[derive(Debug)]
pub struct ResourceSchema {
    pub prefix: EntityPrefix,
    /// Store table name
    pub table: &'static str,
    /// Singular name for messages (e.g., "inventory item")
    pub name: &'static str,
    /// Plural name for messages
    pub name_plural: &'static str,
    pub fields: &'static [FieldDef],
    pub computed: &'static [ComputedField],
    /// Default columns for list output
    pub list_columns: &'static [&'static str],
}

/// Whether a payload creates a record or patches an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    Update,
}

/// A single failing field
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every failing field of one payload
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("validation failed for {}", summarize(.errors))]
#[diagnostic(
    code(fsd::validation_failed),
    help("correct the listed fields and submit again")
)]
pub struct ValidationErrors {
    #[related]
    pub errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationErrors {
    /// Names of failing fields in report order
    pub fn fields(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.field.as_str()).collect()
    }

    /// One-line human-readable reason
    pub fn reason(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl ResourceSchema {
    /// Look up a declared field (case-insensitive)
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        let name = name.trim();
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Look up a computed field (case-insensitive)
    pub fn computed_field(&self, name: &str) -> Option<&'static ComputedField> {
        let name = name.trim();
        self.computed.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Canonical audit field name, if `name` is one
    pub fn audit_field(name: &str) -> Option<&'static str> {
        let name = name.trim();
        AUDIT_FIELDS
            .iter()
            .copied()
            .find(|f| f.eq_ignore_ascii_case(name))
    }

    /// Fields included in free-text search
    pub fn search_fields(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.searchable)
            .map(|f| f.name)
            .collect()
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static FieldDef> {
        self.fields.iter().filter(|f| f.required)
    }

    fn position(&self, name: &str) -> usize {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .unwrap_or(usize::MAX)
    }

    /// Validate a raw payload into typed fields, reporting every failure.
    ///
    /// Keys are matched case-insensitively; unknown keys are errors. Values
    /// are trimmed, and an empty value counts as absent. On create, required
    /// fields must be present and absent optional fields get their default.
    pub fn validate(
        &self,
        payload: &BTreeMap<String, String>,
        mode: ValidationMode,
    ) -> Result<Fields, ValidationErrors> {
        let mut fields = Fields::new();
        let mut errors: Vec<FieldError> = Vec::new();

        for (key, raw) in payload {
            let Some(def) = self.field(key) else {
                let message = match Self::audit_field(key) {
                    Some(_) => "is assigned by the store and cannot be set".to_string(),
                    None => format!("unknown field for {}", self.name),
                };
                errors.push(FieldError {
                    field: key.trim().to_lowercase(),
                    message,
                });
                continue;
            };

            if let (ValidationMode::Update, Some(message)) = (mode, def.fixed_after_create) {
                errors.push(FieldError {
                    field: def.name.to_string(),
                    message: message.to_string(),
                });
                continue;
            }

            let trimmed = raw.trim();
            if trimmed.is_empty() {
                if def.required {
                    errors.push(FieldError {
                        field: def.name.to_string(),
                        message: "is required".to_string(),
                    });
                } else {
                    fields.insert(def.name.to_string(), FieldValue::Null);
                }
                continue;
            }

            match def.parse(trimmed) {
                Ok(value) => {
                    fields.insert(def.name.to_string(), value);
                }
                Err(message) => errors.push(FieldError {
                    field: def.name.to_string(),
                    message,
                }),
            }
        }

        if mode == ValidationMode::Create {
            for def in self.fields {
                let mentioned = payload.keys().any(|k| def.name.eq_ignore_ascii_case(k.trim()));
                if mentioned {
                    continue;
                }
                if def.required {
                    errors.push(FieldError {
                        field: def.name.to_string(),
                        message: "is required".to_string(),
                    });
                } else {
                    fields.insert(def.name.to_string(), def.absent_value());
                }
            }
        }

        if errors.is_empty() {
            Ok(fields)
        } else {
            errors.sort_by(|a, b| {
                self.position(&a.field)
                    .cmp(&self.position(&b.field))
                    .then_with(|| a.field.cmp(&b.field))
            });
            errors.dedup();
            Err(ValidationErrors { errors })
        }
    }

    /// Decode stored JSON fields using the registry
    pub fn decode(&self, data: &Map<String, JsonValue>) -> Fields {
        data.iter()
            .map(|(key, value)| {
                let decoded = match self.field(key) {
                    Some(def) => def.decode(value),
                    None => FieldValue::from_json_untyped(value),
                };
                (key.clone(), decoded)
            })
            .collect()
    }

    /// Encode typed fields as a JSON object for storage
    pub fn encode(fields: &Fields) -> Map<String, JsonValue> {
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_FIELDS: &[FieldDef] = &[
        FieldDef {
            name: "name",
            required: true,
            searchable: true,
            ..FieldDef::TEXT
        },
        FieldDef {
            name: "quantity",
            required: true,
            min: Some(0.0),
            ..FieldDef::INTEGER
        },
        FieldDef {
            name: "status",
            choices: &["open", "closed"],
            ..FieldDef::TEXT
        },
        FieldDef {
            name: "year",
            min: Some(1900.0),
            ..FieldDef::INTEGER
        },
    ];

    static TEST_SCHEMA: ResourceSchema = ResourceSchema {
        prefix: EntityPrefix::Item,
        table: "test",
        name: "test record",
        name_plural: "test records",
        fields: TEST_FIELDS,
        computed: &[],
        list_columns: &["name"],
    };

    fn payload(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_validate_reports_every_failing_field() {
        let err = TEST_SCHEMA
            .validate(
                &payload(&[("name", "  "), ("quantity", "abc"), ("status", "pending")]),
                ValidationMode::Create,
            )
            .unwrap_err();
        assert_eq!(err.fields(), vec!["name", "quantity", "status"]);
    }

    #[test]
    fn test_empty_and_single_space_are_both_empty() {
        for blank in ["", " "] {
            let err = TEST_SCHEMA
                .validate(&payload(&[("name", blank), ("quantity", "1")]), ValidationMode::Create)
                .unwrap_err();
            assert_eq!(err.fields(), vec!["name"]);
        }
    }

    #[test]
    fn test_negative_quantity_rejected_zero_accepted() {
        let err = TEST_SCHEMA
            .validate(&payload(&[("name", "Filter"), ("quantity", "-1")]), ValidationMode::Create)
            .unwrap_err();
        assert_eq!(err.errors[0].message, "must be at least 0");

        let fields = TEST_SCHEMA
            .validate(&payload(&[("name", "Filter"), ("quantity", "0")]), ValidationMode::Create)
            .unwrap();
        assert_eq!(fields["quantity"], FieldValue::Integer(0));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = TEST_SCHEMA
            .validate(&payload(&[("colour", "red")]), ValidationMode::Update)
            .unwrap_err();
        assert_eq!(err.fields(), vec!["colour"]);
    }

    #[test]
    fn test_audit_fields_are_read_only() {
        let err = TEST_SCHEMA
            .validate(&payload(&[("number", "ITEM-000001")]), ValidationMode::Update)
            .unwrap_err();
        assert_eq!(err.errors[0].message, "is assigned by the store and cannot be set");
    }

    #[test]
    fn test_create_fills_absent_optional_fields() {
        let fields = TEST_SCHEMA
            .validate(&payload(&[("NAME", "Coil"), ("quantity", "3")]), ValidationMode::Create)
            .unwrap();
        assert_eq!(fields["name"], FieldValue::Text("Coil".to_string()));
        assert_eq!(fields["status"], FieldValue::Null);
        // year has a floor above zero, so it is not defaulted to 0
        assert_eq!(fields["year"], FieldValue::Null);
    }

    #[test]
    fn test_update_only_touches_present_fields() {
        let fields = TEST_SCHEMA
            .validate(&payload(&[("status", "CLOSED")]), ValidationMode::Update)
            .unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["status"], FieldValue::Text("closed".to_string()));
    }
}
