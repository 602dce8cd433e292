//! Inventory item resource - parts and consumables held in stock

use crate::core::identity::EntityPrefix;
use crate::core::record::{FieldValue, Record};
use crate::core::schema::{ComputedField, FieldDef, FieldKind, ResourceSchema};

static FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "name",
        required: true,
        searchable: true,
        example: "Pleated Air Filter 16x25x1",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "category",
        required: true,
        searchable: true,
        example: "filters",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "quantity",
        required: true,
        min: Some(0.0),
        example: "40",
        fixed_after_create: Some("changes only through `fsd stock adjust` or `fsd stock set`"),
        ..FieldDef::INTEGER
    },
    FieldDef {
        name: "unit_cost",
        min: Some(0.0),
        example: "6.25",
        ..FieldDef::NUMBER
    },
    FieldDef {
        name: "reorder_level",
        min: Some(0.0),
        example: "10",
        ..FieldDef::INTEGER
    },
    FieldDef {
        name: "sku",
        searchable: true,
        example: "FLT-16251",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "supplier",
        searchable: true,
        example: "Johnstone Supply",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "location",
        example: "Warehouse A",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "description",
        searchable: true,
        ..FieldDef::TEXT
    },
];

static COMPUTED: &[ComputedField] = &[
    ComputedField {
        name: "stock_value",
        kind: FieldKind::Number,
        compute: |record, _| stock_value(record).map_or(FieldValue::Null, FieldValue::Number),
    },
    ComputedField {
        name: "needs_reorder",
        kind: FieldKind::Bool,
        compute: |record, _| FieldValue::Bool(needs_reorder(record)),
    },
];

pub static SCHEMA: ResourceSchema = ResourceSchema {
    prefix: EntityPrefix::Item,
    table: "inventory_items",
    name: "inventory item",
    name_plural: "inventory items",
    fields: FIELDS,
    computed: COMPUTED,
    list_columns: &["number", "name", "category", "quantity", "unit_cost", "location"],
};

/// quantity x unit_cost, if both are set
pub fn stock_value(record: &Record) -> Option<f64> {
    let quantity = record.get("quantity")?.as_f64()?;
    let unit_cost = record.get("unit_cost")?.as_f64()?;
    Some(quantity * unit_cost)
}

/// Whether stock is at or below the reorder level
pub fn needs_reorder(record: &Record) -> bool {
    let quantity = record.get("quantity").and_then(|v| v.as_i64());
    let level = record.get("reorder_level").and_then(|v| v.as_i64());
    matches!((quantity, level), (Some(q), Some(l)) if l > 0 && q <= l)
}
