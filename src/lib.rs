//! FSD: Field Service Desk
//!
//! Multi-tenant records for a field-service business: fleet vehicles,
//! inventory items and their stock movements, purchase orders and invoices.
//! Records live in a per-project SQLite store; the library exposes list
//! queries, validated create/update/delete, bulk CSV import and export.

pub mod cli;
pub mod core;
pub mod entities;
