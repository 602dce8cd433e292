//! Resource definitions
//!
//! FSD manages the following list-managed resources:
//!
//! **Fleet:**
//! - [`vehicle`] - Service vehicles with mileage, fuel economy and service dates
//!
//! **Inventory:**
//! - [`inventory`] - Stocked items with quantities, costs and reorder levels
//! - [`transaction`] - Stock movements recorded against inventory items
//! - [`purchase_order`] - Orders placed with suppliers
//!
//! **Billing:**
//! - [`invoice`] - Customer invoices with due dates

pub mod inventory;
pub mod invoice;
pub mod purchase_order;
pub mod transaction;
pub mod vehicle;

use crate::core::identity::EntityPrefix;
use crate::core::schema::ResourceSchema;

/// Get the field registry for a resource prefix
pub fn schema_for(prefix: EntityPrefix) -> &'static ResourceSchema {
    match prefix {
        EntityPrefix::Veh => &vehicle::SCHEMA,
        EntityPrefix::Item => &inventory::SCHEMA,
        EntityPrefix::Po => &purchase_order::SCHEMA,
        EntityPrefix::Inv => &invoice::SCHEMA,
        EntityPrefix::Txn => &transaction::SCHEMA,
    }
}

/// All resource registries in display order
pub fn all_schemas() -> impl Iterator<Item = &'static ResourceSchema> {
    EntityPrefix::all().iter().map(|p| schema_for(*p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_prefix_has_a_schema() {
        for prefix in EntityPrefix::all() {
            assert_eq!(schema_for(*prefix).prefix, *prefix);
        }
    }

    #[test]
    fn test_tables_are_distinct() {
        let tables: HashSet<_> = all_schemas().map(|s| s.table).collect();
        assert_eq!(tables.len(), EntityPrefix::all().len());
    }

    #[test]
    fn test_list_columns_and_search_fields_are_declared() {
        for schema in all_schemas() {
            for col in schema.list_columns {
                assert!(
                    schema.field(col).is_some()
                        || schema.computed_field(col).is_some()
                        || ResourceSchema::audit_field(col).is_some(),
                    "{}: unknown list column {}",
                    schema.table,
                    col
                );
            }
            assert!(!schema.search_fields().is_empty(), "{} has no search fields", schema.table);
        }
    }

    #[test]
    fn test_field_names_do_not_shadow_audit_fields() {
        for schema in all_schemas() {
            for field in schema.fields {
                assert!(ResourceSchema::audit_field(field.name).is_none());
            }
        }
    }
}
