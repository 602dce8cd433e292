//! Stock movements
//!
//! Every change to an item's quantity goes through [`StockLedger`], which
//! writes the new quantity and an inventory transaction in one store call.

use tracing::info;

use crate::core::engine::{ListQueryEngine, QueryError};
use crate::core::identity::TenantId;
use crate::core::mutator::{MutationError, Payload};
use crate::core::query::{FilterSpec, Predicate, SortSpec};
use crate::core::record::Record;
use crate::core::schema::{FieldError, ValidationErrors, ValidationMode};
use crate::core::store::{quantity_of, StockMovement, Store, StoreError};
use crate::entities::{inventory, transaction};

/// Who made a movement and why
#[derive(Debug, Clone, Default)]
pub struct MovementNote {
    pub reason: Option<String>,
    pub performed_by: Option<String>,
}

pub struct StockLedger<'a> {
    store: &'a dyn Store,
    items: ListQueryEngine<'a>,
    transactions: ListQueryEngine<'a>,
}

impl<'a> StockLedger<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            items: ListQueryEngine::new(store, &inventory::SCHEMA),
            transactions: ListQueryEngine::new(store, &transaction::SCHEMA),
        }
    }

    fn item(&self, tenant: &TenantId, reference: &str) -> Result<Record, MutationError> {
        self.items
            .find(tenant, reference)
            .map_err(unavailable)?
            .ok_or_else(|| MutationError::NotFound {
                resource: inventory::SCHEMA.name,
                id: reference.trim().to_string(),
            })
    }

    /// Add `delta` (negative to remove) to an item's quantity
    pub fn adjust(
        &self,
        tenant: &TenantId,
        item_ref: &str,
        delta: i64,
        note: &MovementNote,
    ) -> Result<StockMovement, MutationError> {
        if delta == 0 {
            return Err(ValidationErrors {
                errors: vec![FieldError {
                    field: "quantity".to_string(),
                    message: "must not be zero".to_string(),
                }],
            }
            .into());
        }
        let item = self.item(tenant, item_ref)?;
        self.apply(tenant, &item, delta, transaction::kind_for_delta(delta), note)
    }

    /// Set an item's quantity outright, recorded as an `adjust` movement.
    /// Setting the quantity already on hand is rejected like a zero adjust.
    pub fn set_quantity(
        &self,
        tenant: &TenantId,
        item_ref: &str,
        quantity: i64,
        note: &MovementNote,
    ) -> Result<StockMovement, MutationError> {
        if quantity < 0 {
            return Err(ValidationErrors {
                errors: vec![FieldError {
                    field: "quantity".to_string(),
                    message: "must be at least 0".to_string(),
                }],
            }
            .into());
        }
        let item = self.item(tenant, item_ref)?;
        let delta = quantity - quantity_of(&item);
        if delta == 0 {
            return Err(ValidationErrors {
                errors: vec![FieldError {
                    field: "quantity".to_string(),
                    message: format!("already {} on hand", quantity),
                }],
            }
            .into());
        }
        self.apply(tenant, &item, delta, "adjust", note)
    }

    fn apply(
        &self,
        tenant: &TenantId,
        item: &Record,
        delta: i64,
        kind: &str,
        note: &MovementNote,
    ) -> Result<StockMovement, MutationError> {
        let mut payload = Payload::new();
        payload.insert("item_id".to_string(), item.id.to_string());
        payload.insert("kind".to_string(), kind.to_string());
        payload.insert("quantity".to_string(), delta.to_string());
        if let Some(reason) = &note.reason {
            payload.insert("reason".to_string(), reason.clone());
        }
        if let Some(who) = &note.performed_by {
            payload.insert("performed_by".to_string(), who.clone());
        }
        let txn = transaction::SCHEMA.validate(&payload, ValidationMode::Create)?;

        let movement = self
            .store
            .adjust_stock(tenant, &item.id, delta, &txn)
            .map_err(|e| MutationError::from_store(&inventory::SCHEMA, e))?;

        info!(
            tenant = %tenant,
            item = %movement.item.number,
            delta,
            kind,
            on_hand = quantity_of(&movement.item),
            "stock moved"
        );
        Ok(movement)
    }

    /// Movements for one item, newest first
    pub fn history(&self, tenant: &TenantId, item_ref: &str) -> Result<Vec<Record>, MutationError> {
        let item = self.item(tenant, item_ref)?;
        let filter = FilterSpec::new().and(Predicate::eq("item_id", item.id.to_string()));
        self.transactions
            .fetch_all(tenant, &filter, None, Some(&SortSpec::desc("number")))
            .map_err(unavailable)
    }
}

/// Lookups here only fail when the store does
fn unavailable(err: QueryError) -> MutationError {
    match err {
        QueryError::StoreUnavailable(inner) => MutationError::StoreUnavailable(inner),
        other => MutationError::StoreUnavailable(StoreError::Corrupt(other.to_string())),
    }
}
