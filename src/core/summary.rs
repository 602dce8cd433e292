//! Tenant-wide totals computed from full scans

use chrono::NaiveDate;
use serde::Serialize;

use crate::core::identity::TenantId;
use crate::core::record::Record;
use crate::core::store::{Store, StoreError};
use crate::entities::{inventory, invoice, vehicle};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventorySummary {
    pub items: usize,
    /// Sum of quantity x unit_cost
    pub total_value: f64,
    pub needs_reorder: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetSummary {
    pub vehicles: usize,
    pub active: usize,
    /// Mean of fuel economy over vehicles that report one
    pub average_mpg: Option<f64>,
    /// Vehicles whose next service date is on or before today
    pub service_due: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceSummary {
    pub invoices: usize,
    pub outstanding: usize,
    pub outstanding_total: f64,
    /// Outstanding invoices past their due date
    pub past_due: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub tenant: String,
    pub as_of: NaiveDate,
    pub inventory: InventorySummary,
    pub fleet: FleetSummary,
    pub invoices: InvoiceSummary,
}

pub fn summarize_inventory(items: &[Record]) -> InventorySummary {
    InventorySummary {
        items: items.len(),
        total_value: items.iter().filter_map(inventory::stock_value).sum(),
        needs_reorder: items.iter().filter(|r| inventory::needs_reorder(r)).count(),
    }
}

pub fn summarize_fleet(vehicles: &[Record], today: NaiveDate) -> FleetSummary {
    let mpg: Vec<f64> = vehicles
        .iter()
        .filter_map(|r| r.get("fuel_economy_mpg").and_then(|v| v.as_f64()))
        .filter(|mpg| *mpg > 0.0)
        .collect();
    let average_mpg = if mpg.is_empty() {
        None
    } else {
        Some(mpg.iter().sum::<f64>() / mpg.len() as f64)
    };

    FleetSummary {
        vehicles: vehicles.len(),
        active: vehicles
            .iter()
            .filter(|r| r.value_of("status").to_text() == vehicle::STATUSES[0])
            .count(),
        average_mpg,
        service_due: vehicles
            .iter()
            .filter_map(|r| r.get("next_service").and_then(|v| v.as_date()))
            .filter(|due| *due <= today)
            .count(),
    }
}

pub fn summarize_invoices(invoices: &[Record], today: NaiveDate) -> InvoiceSummary {
    let outstanding: Vec<&Record> = invoices.iter().filter(|r| invoice::is_outstanding(r)).collect();
    InvoiceSummary {
        invoices: invoices.len(),
        outstanding: outstanding.len(),
        outstanding_total: outstanding
            .iter()
            .filter_map(|r| r.get("amount").and_then(|v| v.as_f64()))
            .sum(),
        past_due: outstanding
            .iter()
            .filter(|r| invoice::days_until_due(r, today).is_some_and(|d| d < 0))
            .count(),
    }
}

/// Scan every summarized table for one tenant
pub fn summarize(store: &dyn Store, tenant: &TenantId, today: NaiveDate) -> Result<Summary, StoreError> {
    let items = store.scan(&inventory::SCHEMA, tenant)?;
    let vehicles = store.scan(&vehicle::SCHEMA, tenant)?;
    let invoices = store.scan(&invoice::SCHEMA, tenant)?;
    tracing::debug!(
        tenant = %tenant,
        items = items.len(),
        vehicles = vehicles.len(),
        invoices = invoices.len(),
        "summary scan"
    );

    Ok(Summary {
        tenant: tenant.to_string(),
        as_of: today,
        inventory: summarize_inventory(&items),
        fleet: summarize_fleet(&vehicles, today),
        invoices: summarize_invoices(&invoices, today),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mutator::{FormMutator, Payload};
    use crate::core::schema::ResourceSchema;
    use crate::core::store::MemoryStore;

    fn create(store: &dyn Store, tenant: &TenantId, schema: &'static ResourceSchema, pairs: &[(&str, &str)]) {
        let payload: Payload = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FormMutator::new(store, schema).create(tenant, &payload).unwrap();
    }

    #[test]
    fn test_summary_totals() {
        let store = MemoryStore::new();
        let acme = TenantId::parse("acme").unwrap();
        let other = TenantId::parse("other").unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();

        let item = |name, qty, cost, level| {
            vec![("name", name), ("category", "parts"), ("quantity", qty), ("unit_cost", cost), ("reorder_level", level)]
        };
        create(&store, &acme, &inventory::SCHEMA, &item("Filter", "10", "2.5", "5"));
        create(&store, &acme, &inventory::SCHEMA, &item("Coil", "2", "100", "2"));
        create(&store, &other, &inventory::SCHEMA, &item("Fan", "1000", "1000", "0"));

        create(&store, &acme, &vehicle::SCHEMA, &[("name", "Van 1"), ("license_plate", "A1"), ("fuel_economy_mpg", "16"), ("status", "active"), ("next_service", "2024-04-01")]);
        create(&store, &acme, &vehicle::SCHEMA, &[("name", "Van 2"), ("license_plate", "A2"), ("fuel_economy_mpg", "20"), ("status", "maintenance")]);
        create(&store, &acme, &vehicle::SCHEMA, &[("name", "Van 3"), ("license_plate", "A3")]);

        let inv = |status, due, amount| {
            vec![("customer", "Maple"), ("status", status), ("issue_date", "2024-03-01"), ("due_date", due), ("amount", amount)]
        };
        create(&store, &acme, &invoice::SCHEMA, &inv("sent", "2024-04-01", "100"));
        create(&store, &acme, &invoice::SCHEMA, &inv("sent", "2024-05-01", "50.5"));
        create(&store, &acme, &invoice::SCHEMA, &inv("paid", "2024-04-01", "900"));

        let summary = summarize(&store, &acme, today).unwrap();
        assert_eq!(summary.inventory.items, 2);
        assert_eq!(summary.inventory.total_value, 225.0);
        assert_eq!(summary.inventory.needs_reorder, 1);

        assert_eq!(summary.fleet.vehicles, 3);
        assert_eq!(summary.fleet.active, 1);
        assert_eq!(summary.fleet.average_mpg, Some(18.0));
        assert_eq!(summary.fleet.service_due, 1);

        assert_eq!(summary.invoices.outstanding, 2);
        assert_eq!(summary.invoices.outstanding_total, 150.5);
        assert_eq!(summary.invoices.past_due, 1);
    }

    #[test]
    fn test_empty_tenant() {
        let store = MemoryStore::new();
        let tenant = TenantId::parse("acme").unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();
        let summary = summarize(&store, &tenant, today).unwrap();
        assert_eq!(summary.inventory, InventorySummary::default());
        assert_eq!(summary.fleet.average_mpg, None);
    }
}
