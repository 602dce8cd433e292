//! Purchase order resource - stock ordered from suppliers

use crate::core::identity::EntityPrefix;
use crate::core::schema::{FieldDef, ResourceSchema};

pub const STATUSES: &[&str] = &["draft", "ordered", "received", "cancelled"];

static FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "supplier",
        required: true,
        searchable: true,
        example: "Johnstone Supply",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "status",
        required: true,
        searchable: true,
        choices: STATUSES,
        example: "ordered",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "order_date",
        required: true,
        example: "2024-03-04",
        ..FieldDef::DATE
    },
    FieldDef {
        name: "expected_date",
        example: "2024-03-11",
        ..FieldDef::DATE
    },
    FieldDef {
        name: "total",
        min: Some(0.0),
        example: "1250.00",
        ..FieldDef::NUMBER
    },
    FieldDef {
        name: "notes",
        searchable: true,
        ..FieldDef::TEXT
    },
];

pub static SCHEMA: ResourceSchema = ResourceSchema {
    prefix: EntityPrefix::Po,
    table: "purchase_orders",
    name: "purchase order",
    name_plural: "purchase orders",
    fields: FIELDS,
    computed: &[],
    list_columns: &["number", "supplier", "status", "order_date", "expected_date", "total"],
};
