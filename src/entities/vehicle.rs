//! Vehicle resource - fleet vans and trucks

use crate::core::identity::EntityPrefix;
use crate::core::schema::{FieldDef, ResourceSchema};

pub const STATUSES: &[&str] = &["active", "maintenance", "inactive"];

static FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "name",
        required: true,
        searchable: true,
        example: "Van 12",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "license_plate",
        required: true,
        searchable: true,
        example: "HVC-2231",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "make",
        searchable: true,
        example: "Ford",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "model",
        searchable: true,
        example: "Transit 250",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "year",
        min: Some(1900.0),
        example: "2021",
        ..FieldDef::INTEGER
    },
    FieldDef {
        name: "vin",
        searchable: true,
        example: "1FTBW2CM5MKA12345",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "status",
        choices: STATUSES,
        example: "active",
        ..FieldDef::TEXT
    },
    FieldDef {
        name: "mileage",
        min: Some(0.0),
        example: "48210",
        ..FieldDef::NUMBER
    },
    FieldDef {
        name: "fuel_economy_mpg",
        min: Some(0.0),
        example: "17.5",
        ..FieldDef::NUMBER
    },
    FieldDef {
        name: "last_service",
        example: "2024-02-10",
        ..FieldDef::DATE
    },
    FieldDef {
        name: "next_service",
        example: "2024-08-10",
        ..FieldDef::DATE
    },
];

pub static SCHEMA: ResourceSchema = ResourceSchema {
    prefix: EntityPrefix::Veh,
    table: "vehicles",
    name: "vehicle",
    name_plural: "vehicles",
    fields: FIELDS,
    computed: &[],
    list_columns: &["number", "name", "license_plate", "status", "mileage", "next_service"],
};
