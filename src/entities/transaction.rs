//! Inventory transaction resource - stock movements against items

use crate::core::identity::EntityPrefix;
use crate::core::schema::{FieldDef, ResourceSchema};

pub const KINDS: &[&str] = &["in", "out", "adjust"];

static FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "item_id",
        required: true,
        searchable: true,
        example: "ITEM-01HV6Z8Q5S7Y1M3K9D2R4T6W8X",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "kind",
        required: true,
        searchable: true,
        choices: KINDS,
        example: "out",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "quantity",
        required: true,
        example: "-2",
        ..FieldDef::INTEGER
    },
    FieldDef {
        name: "reason",
        searchable: true,
        example: "Used on job 4471",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "performed_by",
        example: "dana",
        ..FieldDef::TEXT
    },
];

pub static SCHEMA: ResourceSchema = ResourceSchema {
    prefix: EntityPrefix::Txn,
    table: "inventory_transactions",
    name: "inventory transaction",
    name_plural: "inventory transactions",
    fields: FIELDS,
    computed: &[],
    list_columns: &["number", "created", "item_id", "kind", "quantity", "reason"],
};

/// Transaction kind for a signed stock delta
pub fn kind_for_delta(delta: i64) -> &'static str {
    if delta >= 0 {
        "in"
    } else {
        "out"
    }
}
