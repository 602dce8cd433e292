//! Record storage
//!
//! The [`Store`] trait is the only boundary through which records are read
//! or written. Every call is scoped to one resource table and one tenant.
//!
//! Two implementations are provided:
//! - [`SqliteStore`] - persistent, backed by a local SQLite database
//! - [`MemoryStore`] - in-process, with fault injection for tests

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use thiserror::Error;

use crate::core::identity::{EntityId, EntityPrefix, TenantId};
use crate::core::query::{Condition, ResolvedSort};
use crate::core::record::{Fields, Record};
use crate::core::schema::ResourceSchema;

/// Errors raised by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("insufficient stock for {item}: {on_hand} on hand, cannot apply {delta}")]
    InsufficientStock {
        item: String,
        on_hand: i64,
        delta: i64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Free-text search resolved to concrete fields
#[derive(Debug, Clone)]
pub struct TextSearch {
    /// Lowercased search term
    pub needle: String,
    pub fields: Vec<&'static str>,
}

impl TextSearch {
    pub fn matches(&self, record: &Record) -> bool {
        self.fields
            .iter()
            .any(|f| record.value_of(f).contains_ci(&self.needle))
    }
}

/// A fully resolved select against one resource table
#[derive(Debug, Clone)]
pub struct StoreQuery {
    pub schema: &'static ResourceSchema,
    pub tenant: TenantId,
    pub conditions: Vec<Condition>,
    pub search: Option<TextSearch>,
    pub sort: ResolvedSort,
    pub offset: u64,
    pub limit: u64,
}

impl StoreQuery {
    /// Whether a record of the right table and tenant passes every condition
    /// and the search
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
            && self.search.as_ref().map_or(true, |s| s.matches(record))
    }
}

/// Rows of one window plus the number of rows matching overall
#[derive(Debug, Clone)]
pub struct Selection {
    pub records: Vec<Record>,
    pub total_count: u64,
}

/// Result of an atomic stock adjustment
#[derive(Debug, Clone)]
pub struct StockMovement {
    /// The inventory item after the adjustment
    pub item: Record,
    /// The inventory transaction recorded with it
    pub transaction: Record,
}

/// Storage backend for list-managed records
pub trait Store {
    /// Filter, sort and window records of one table and tenant
    fn select(&self, query: &StoreQuery) -> Result<Selection, StoreError>;

    /// Every record of one table and tenant in creation order
    fn scan(&self, schema: &ResourceSchema, tenant: &TenantId) -> Result<Vec<Record>, StoreError>;

    fn get(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        id: &EntityId,
    ) -> Result<Option<Record>, StoreError>;

    /// Look up a record by its secondary number (e.g. `ITEM-000042`)
    fn find_by_number(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        number: &str,
    ) -> Result<Option<Record>, StoreError>;

    /// Insert a batch atomically: either every row is stored or none is.
    /// The store assigns `id`, `number`, `created` and `updated`.
    fn insert(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        rows: &[Fields],
    ) -> Result<Vec<Record>, StoreError>;

    /// Replace the given fields of an existing record and bump `updated`
    fn update(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        id: &EntityId,
        patch: &Fields,
    ) -> Result<Record, StoreError>;

    fn delete(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        id: &EntityId,
    ) -> Result<(), StoreError>;

    /// Add `delta` to an inventory item's quantity and record the inventory
    /// transaction `txn` in one atomic step. Fails without writing if the
    /// quantity would drop below zero.
    fn adjust_stock(
        &self,
        tenant: &TenantId,
        item_id: &EntityId,
        delta: i64,
        txn: &Fields,
    ) -> Result<StockMovement, StoreError>;
}

/// Human-readable secondary number for the `seq`th record of a resource
pub fn format_number(prefix: EntityPrefix, seq: u64) -> String {
    format!("{}-{:06}", prefix, seq)
}

/// Quantity field of an inventory item, zero when unset
pub(crate) fn quantity_of(item: &Record) -> i64 {
    item.get("quantity").and_then(|v| v.as_i64()).unwrap_or(0)
}

pub(crate) fn check_stock(item: &Record, delta: i64) -> Result<i64, StoreError> {
    let on_hand = quantity_of(item);
    match on_hand.checked_add(delta) {
        Some(next) if next >= 0 => Ok(next),
        _ => Err(StoreError::InsufficientStock {
            item: item.number.clone(),
            on_hand,
            delta,
        }),
    }
}
