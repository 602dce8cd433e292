//! In-process store
//!
//! Holds records in insertion order behind a lock. Supports injecting
//! failures into chosen `insert` calls, into every read, or into every
//! call, which is how partial-import and store-outage paths are exercised.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::{check_stock, format_number, Selection, StockMovement, Store, StoreError, StoreQuery};
use crate::core::identity::{EntityId, TenantId};
use crate::core::record::{now, FieldValue, Fields, Record};
use crate::core::schema::ResourceSchema;
use crate::entities::{inventory, transaction};

#[derive(Default)]
struct State {
    /// Records per table, in insertion order
    tables: HashMap<&'static str, Vec<Record>>,
    /// Last issued sequence number per (table, tenant)
    sequences: HashMap<(&'static str, TenantId), u64>,
}

/// Store backed by in-process maps
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    insert_calls: Arc<AtomicUsize>,
    failing_inserts: Arc<Mutex<HashSet<usize>>>,
    unavailable: Arc<AtomicBool>,
    reads_failing: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `call`th insert (1-based, counted from creation) fail
    pub fn fail_insert_call(&self, call: usize) {
        if let Ok(mut failing) = self.failing_inserts.lock() {
            failing.insert(call);
        }
    }

    /// Make every call fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every read fail until switched back; writes still succeed
    pub fn fail_reads(&self, fail: bool) {
        self.reads_failing.store(fail, Ordering::SeqCst);
    }

    /// Number of insert calls received so far
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.check_available()?;
        if self.reads_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read timed out".to_string()));
        }
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.check_available()?;
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

impl State {
    fn table(&self, table: &str) -> &[Record] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn find_mut(
        &mut self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        id: &EntityId,
    ) -> Option<&mut Record> {
        self.tables
            .get_mut(schema.table)?
            .iter_mut()
            .find(|r| &r.id == id && &r.tenant == tenant)
    }

    /// Build records for `rows` without storing them
    fn stage(&self, schema: &ResourceSchema, tenant: &TenantId, rows: &[Fields]) -> Vec<Record> {
        let key = (schema.table, tenant.clone());
        let mut seq = self.sequences.get(&key).copied().unwrap_or(0);
        let timestamp = now();

        rows.iter()
            .map(|fields| {
                seq += 1;
                Record {
                    id: EntityId::new(schema.prefix),
                    number: format_number(schema.prefix, seq),
                    tenant: tenant.clone(),
                    created: timestamp,
                    updated: timestamp,
                    fields: fields.clone(),
                }
            })
            .collect()
    }

    fn commit(&mut self, schema: &ResourceSchema, tenant: &TenantId, staged: &[Record]) {
        let table = schema.table;
        let issued = staged.len() as u64;
        *self.sequences.entry((table, tenant.clone())).or_insert(0) += issued;
        self.tables
            .entry(table)
            .or_default()
            .extend(staged.iter().cloned());
    }
}

impl Store for MemoryStore {
    fn select(&self, query: &StoreQuery) -> Result<Selection, StoreError> {
        let state = self.read()?;
        let mut matched: Vec<&Record> = state
            .table(query.schema.table)
            .iter()
            .filter(|r| r.tenant == query.tenant && query.matches(r))
            .collect();
        matched.sort_by(|a, b| query.sort.compare(a, b));

        let total_count = matched.len() as u64;
        let records = matched
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(Selection {
            records,
            total_count,
        })
    }

    fn scan(&self, schema: &ResourceSchema, tenant: &TenantId) -> Result<Vec<Record>, StoreError> {
        let state = self.read()?;
        Ok(state
            .table(schema.table)
            .iter()
            .filter(|r| &r.tenant == tenant)
            .cloned()
            .collect())
    }

    fn get(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        id: &EntityId,
    ) -> Result<Option<Record>, StoreError> {
        let state = self.read()?;
        Ok(state
            .table(schema.table)
            .iter()
            .find(|r| &r.id == id && &r.tenant == tenant)
            .cloned())
    }

    fn find_by_number(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        number: &str,
    ) -> Result<Option<Record>, StoreError> {
        let state = self.read()?;
        Ok(state
            .table(schema.table)
            .iter()
            .find(|r| r.number.eq_ignore_ascii_case(number) && &r.tenant == tenant)
            .cloned())
    }

    fn insert(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        rows: &[Fields],
    ) -> Result<Vec<Record>, StoreError> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let injected = self
            .failing_inserts
            .lock()
            .map(|failing| failing.contains(&call))
            .unwrap_or(false);
        if injected {
            return Err(StoreError::Unavailable(format!(
                "injected failure on insert call {}",
                call
            )));
        }

        let mut state = self.write()?;
        let staged = state.stage(schema, tenant, rows);
        state.commit(schema, tenant, &staged);
        Ok(staged)
    }

    fn update(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        id: &EntityId,
        patch: &Fields,
    ) -> Result<Record, StoreError> {
        let mut state = self.write()?;
        let record = state
            .find_mut(schema, tenant, id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        for (field, value) in patch {
            record.fields.insert(field.clone(), value.clone());
        }
        record.updated = now();
        Ok(record.clone())
    }

    fn delete(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        id: &EntityId,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let table = state
            .tables
            .get_mut(schema.table)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let before = table.len();
        table.retain(|r| !(&r.id == id && &r.tenant == tenant));
        if table.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn adjust_stock(
        &self,
        tenant: &TenantId,
        item_id: &EntityId,
        delta: i64,
        txn: &Fields,
    ) -> Result<StockMovement, StoreError> {
        let mut state = self.write()?;

        let current = state
            .table(inventory::SCHEMA.table)
            .iter()
            .find(|r| &r.id == item_id && &r.tenant == tenant)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        let quantity = check_stock(&current, delta)?;

        let staged = state.stage(&transaction::SCHEMA, tenant, std::slice::from_ref(txn));

        let item = state
            .find_mut(&inventory::SCHEMA, tenant, item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        item.fields
            .insert("quantity".to_string(), FieldValue::Integer(quantity));
        item.updated = now();
        let item = item.clone();

        state.commit(&transaction::SCHEMA, tenant, &staged);
        let transaction = staged
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Corrupt("transaction was not staged".to_string()))?;

        Ok(StockMovement { item, transaction })
    }
}
