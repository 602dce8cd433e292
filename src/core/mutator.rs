//! Form submission: validated create, update and delete

use std::collections::BTreeMap;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::identity::{EntityId, TenantId};
use crate::core::record::Record;
use crate::core::schema::{ResourceSchema, ValidationErrors, ValidationMode};
use crate::core::store::{Store, StoreError};

/// Errors from create, update, delete and stock adjustment
#[derive(Debug, Error, Diagnostic)]
pub enum MutationError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    ValidationFailed(#[from] ValidationErrors),

    #[error("{resource} not found: {id}")]
    #[diagnostic(code(fsd::not_found))]
    NotFound { resource: &'static str, id: String },

    #[error("insufficient stock for {item}: {on_hand} on hand, cannot apply {delta}")]
    #[diagnostic(code(fsd::insufficient_stock))]
    InsufficientStock {
        item: String,
        on_hand: i64,
        delta: i64,
    },

    #[error("the record store is unavailable")]
    #[diagnostic(code(fsd::store_unavailable), help("nothing was saved; try again"))]
    StoreUnavailable(#[source] StoreError),
}

impl MutationError {
    /// Map a store failure for a record of `schema`
    pub(crate) fn from_store(schema: &ResourceSchema, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => MutationError::NotFound {
                resource: schema.name,
                id,
            },
            StoreError::InsufficientStock {
                item,
                on_hand,
                delta,
            } => MutationError::InsufficientStock {
                item,
                on_hand,
                delta,
            },
            other => {
                warn!(table = schema.table, error = %other, "store write failed");
                MutationError::StoreUnavailable(other)
            }
        }
    }
}

/// Raw form input: field name to unparsed value
pub type Payload = BTreeMap<String, String>;

/// Validates and writes records of one resource
pub struct FormMutator<'a> {
    store: &'a dyn Store,
    schema: &'static ResourceSchema,
}

impl<'a> FormMutator<'a> {
    pub fn new(store: &'a dyn Store, schema: &'static ResourceSchema) -> Self {
        Self { store, schema }
    }

    pub fn schema(&self) -> &'static ResourceSchema {
        self.schema
    }

    /// Create a record, or update `existing` with the fields in `payload`.
    ///
    /// Every failing field is reported at once. Nothing is written unless
    /// the whole payload validates, and exactly one store write is made.
    pub fn submit(
        &self,
        tenant: &TenantId,
        existing: Option<&EntityId>,
        payload: &Payload,
    ) -> Result<Record, MutationError> {
        match existing {
            None => {
                let fields = self.schema.validate(payload, ValidationMode::Create)?;
                let record = self
                    .store
                    .insert(self.schema, tenant, std::slice::from_ref(&fields))
                    .map_err(|e| MutationError::from_store(self.schema, e))?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        MutationError::StoreUnavailable(StoreError::Corrupt(
                            "insert returned no record".to_string(),
                        ))
                    })?;
                debug!(table = self.schema.table, id = %record.id, "created");
                Ok(record)
            }
            Some(id) => {
                let fields = self.schema.validate(payload, ValidationMode::Update)?;
                self.check_prefix(id)?;
                let record = self
                    .store
                    .update(self.schema, tenant, id, &fields)
                    .map_err(|e| MutationError::from_store(self.schema, e))?;
                debug!(table = self.schema.table, id = %record.id, fields = fields.len(), "updated");
                Ok(record)
            }
        }
    }

    pub fn create(&self, tenant: &TenantId, payload: &Payload) -> Result<Record, MutationError> {
        self.submit(tenant, None, payload)
    }

    pub fn update(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        payload: &Payload,
    ) -> Result<Record, MutationError> {
        self.submit(tenant, Some(id), payload)
    }

    pub fn delete(&self, tenant: &TenantId, id: &EntityId) -> Result<(), MutationError> {
        self.check_prefix(id)?;
        self.store
            .delete(self.schema, tenant, id)
            .map_err(|e| MutationError::from_store(self.schema, e))?;
        debug!(table = self.schema.table, id = %id, "deleted");
        Ok(())
    }

    fn check_prefix(&self, id: &EntityId) -> Result<(), MutationError> {
        if id.prefix() != self.schema.prefix {
            return Err(MutationError::NotFound {
                resource: self.schema.name,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityPrefix;
    use crate::core::record::FieldValue;
    use crate::core::store::MemoryStore;
    use crate::entities::{inventory, transaction, vehicle};

    fn tenant() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    fn payload(pairs: &[(&str, &str)]) -> Payload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn failing_fields(err: MutationError) -> Vec<String> {
        match err {
            MutationError::ValidationFailed(v) => v.fields().iter().map(|f| f.to_string()).collect(),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_blank_required_text() {
        let store = MemoryStore::new();
        let mutator = FormMutator::new(&store, &inventory::SCHEMA);
        for blank in ["", " ", "\t  "] {
            let err = mutator
                .create(
                    &tenant(),
                    &payload(&[("name", blank), ("category", "filters"), ("quantity", "1")]),
                )
                .unwrap_err();
            assert_eq!(failing_fields(err), vec!["name"]);
        }
        assert_eq!(store.insert_calls(), 0);
    }

    #[test]
    fn test_quantity_validation_boundaries() {
        let store = MemoryStore::new();
        let mutator = FormMutator::new(&store, &inventory::SCHEMA);
        let base = |qty: &str| payload(&[("name", "Filter"), ("category", "filters"), ("quantity", qty)]);

        assert_eq!(failing_fields(mutator.create(&tenant(), &base("abc")).unwrap_err()), vec!["quantity"]);
        assert_eq!(failing_fields(mutator.create(&tenant(), &base("-1")).unwrap_err()), vec!["quantity"]);

        let record = mutator.create(&tenant(), &base("0")).unwrap();
        assert_eq!(record.get("quantity"), Some(&FieldValue::Integer(0)));
    }

    #[test]
    fn test_reports_every_failing_field() {
        let store = MemoryStore::new();
        let mutator = FormMutator::new(&store, &vehicle::SCHEMA);
        let err = mutator
            .create(
                &tenant(),
                &payload(&[("year", "1850"), ("mileage", "far"), ("status", "parked")]),
            )
            .unwrap_err();
        assert_eq!(
            failing_fields(err),
            vec!["name", "license_plate", "year", "status", "mileage"]
        );
    }

    #[test]
    fn test_update_replaces_only_present_fields() {
        let store = MemoryStore::new();
        let mutator = FormMutator::new(&store, &inventory::SCHEMA);
        let created = mutator
            .create(
                &tenant(),
                &payload(&[
                    ("name", "Coil"),
                    ("category", "hvac"),
                    ("quantity", "4"),
                    ("location", "Van 3"),
                ]),
            )
            .unwrap();

        let updated = mutator
            .update(&tenant(), &created.id, &payload(&[("unit_cost", "7.5")]))
            .unwrap();
        assert_eq!(updated.get("unit_cost"), Some(&FieldValue::Number(7.5)));
        assert_eq!(updated.get("quantity"), Some(&FieldValue::Integer(4)));
        assert_eq!(updated.get("location"), created.get("location"));
        assert_eq!(updated.number, created.number);
        assert_eq!(updated.created, created.created);
        assert!(updated.updated >= created.updated);
    }

    #[test]
    fn test_update_rejects_blank_required_field() {
        let store = MemoryStore::new();
        let mutator = FormMutator::new(&store, &inventory::SCHEMA);
        let created = mutator
            .create(
                &tenant(),
                &payload(&[("name", "Coil"), ("category", "hvac"), ("quantity", "4")]),
            )
            .unwrap();
        let err = mutator
            .update(&tenant(), &created.id, &payload(&[("name", "  ")]))
            .unwrap_err();
        assert_eq!(failing_fields(err), vec!["name"]);
    }

    #[test]
    fn test_update_cannot_change_stock_quantity() {
        let store = MemoryStore::new();
        let mutator = FormMutator::new(&store, &inventory::SCHEMA);
        let created = mutator
            .create(
                &tenant(),
                &payload(&[("name", "Coil"), ("category", "hvac"), ("quantity", "4")]),
            )
            .unwrap();

        let err = mutator
            .update(&tenant(), &created.id, &payload(&[("quantity", "99"), ("location", "Van 2")]))
            .unwrap_err();
        assert_eq!(failing_fields(err), vec!["quantity"]);

        let stored = store.get(&inventory::SCHEMA, &tenant(), &created.id).unwrap().unwrap();
        assert_eq!(stored.get("quantity"), Some(&FieldValue::Integer(4)));
        assert!(store.scan(&transaction::SCHEMA, &tenant()).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_record_is_not_found() {
        let store = MemoryStore::new();
        let mutator = FormMutator::new(&store, &inventory::SCHEMA);
        let missing = EntityId::new(EntityPrefix::Item);
        assert!(matches!(
            mutator.update(&tenant(), &missing, &payload(&[("location", "Van 1")])),
            Err(MutationError::NotFound { .. })
        ));
        assert!(matches!(
            mutator.delete(&tenant(), &missing),
            Err(MutationError::NotFound { .. })
        ));
        let wrong_kind = EntityId::new(EntityPrefix::Veh);
        assert!(matches!(
            mutator.delete(&tenant(), &wrong_kind),
            Err(MutationError::NotFound { .. })
        ));
    }

    #[test]
    fn test_store_failure_is_not_retried() {
        let store = MemoryStore::new();
        store.fail_insert_call(1);
        let mutator = FormMutator::new(&store, &inventory::SCHEMA);
        let err = mutator
            .create(
                &tenant(),
                &payload(&[("name", "Coil"), ("category", "hvac"), ("quantity", "4")]),
            )
            .unwrap_err();
        assert!(matches!(err, MutationError::StoreUnavailable(_)));
        assert_eq!(store.insert_calls(), 1);
    }
}
