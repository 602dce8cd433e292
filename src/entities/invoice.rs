//! Invoice resource - customer billing

use chrono::NaiveDate;

use crate::core::identity::EntityPrefix;
use crate::core::record::{FieldValue, Record};
use crate::core::schema::{ComputedField, FieldDef, FieldKind, ResourceSchema};

pub const STATUSES: &[&str] = &["draft", "sent", "paid", "overdue", "void"];

static FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "customer",
        required: true,
        searchable: true,
        example: "Maple Street Dental",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "status",
        required: true,
        searchable: true,
        choices: STATUSES,
        example: "sent",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "issue_date",
        required: true,
        example: "2024-04-01",
        ..FieldDef::DATE
    },
    FieldDef {
        name: "due_date",
        required: true,
        example: "2024-05-01",
        ..FieldDef::DATE
    },
    FieldDef {
        name: "amount",
        required: true,
        min: Some(0.0),
        example: "480.00",
        ..FieldDef::NUMBER
    },
    FieldDef {
        name: "notes",
        searchable: true,
        ..FieldDef::TEXT
    },
];

static COMPUTED: &[ComputedField] = &[ComputedField {
    name: "days_until_due",
    kind: FieldKind::Integer,
    compute: |record, today| days_until_due(record, today).map_or(FieldValue::Null, FieldValue::Integer),
}];

pub static SCHEMA: ResourceSchema = ResourceSchema {
    prefix: EntityPrefix::Inv,
    table: "invoices",
    name: "invoice",
    name_plural: "invoices",
    fields: FIELDS,
    computed: COMPUTED,
    list_columns: &["number", "customer", "status", "due_date", "amount"],
};

/// Days from `today` until the due date (negative when past due)
pub fn days_until_due(record: &Record, today: NaiveDate) -> Option<i64> {
    let due = record.get("due_date")?.as_date()?;
    Some((due - today).num_days())
}

/// Whether an invoice still expects payment
pub fn is_outstanding(record: &Record) -> bool {
    !matches!(
        record.get("status").map(|s| s.to_text()).as_deref(),
        Some("paid") | Some("void") | Some("draft")
    )
}
