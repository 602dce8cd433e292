//! List view state
//!
//! A [`ListView`] owns the query state for one resource list together with
//! the page last fetched for it. Mutations made through the view re-fetch
//! the page on success and leave it untouched on failure. A saved mutation
//! whose re-fetch fails still succeeds; the page stays dropped until the
//! next `load`.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::engine::{ListQueryEngine, QueryError};
use crate::core::identity::{EntityId, EntityPrefix, TenantId};
use crate::core::mutator::{FormMutator, MutationError, Payload};
use crate::core::query::{FilterSpec, ListQuery, PageRequest, PageResult, SearchSpec, SortSpec};
use crate::core::record::Record;
use crate::core::store::Store;
use crate::entities::schema_for;

#[derive(Debug, Error, Diagnostic)]
pub enum ViewError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Mutation(#[from] MutationError),
}

/// Serializable snapshot of a view: what is listed and what is selected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub resource: EntityPrefix,
    pub tenant: TenantId,
    #[serde(default)]
    pub query: ListQuery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<EntityId>,
}

/// One resource list with its cached page
pub struct ListView<'a> {
    engine: ListQueryEngine<'a>,
    mutator: FormMutator<'a>,
    tenant: TenantId,
    query: ListQuery,
    selected: Option<EntityId>,
    cached: Option<PageResult>,
}

impl<'a> ListView<'a> {
    pub fn new(store: &'a dyn Store, resource: EntityPrefix, tenant: TenantId) -> Self {
        let schema = schema_for(resource);
        Self {
            engine: ListQueryEngine::new(store, schema),
            mutator: FormMutator::new(store, schema),
            tenant,
            query: ListQuery::default(),
            selected: None,
            cached: None,
        }
    }

    /// Restore a view from a saved state; the page is fetched lazily
    pub fn from_state(store: &'a dyn Store, state: ViewState) -> Self {
        let mut view = Self::new(store, state.resource, state.tenant);
        view.query = state.query;
        view.selected = state.selected;
        view
    }

    pub fn state(&self) -> ViewState {
        ViewState {
            resource: self.engine.schema().prefix,
            tenant: self.tenant.clone(),
            query: self.query.clone(),
            selected: self.selected.clone(),
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.engine = self.engine.with_max_page_size(max_page_size);
        self
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    /// The cached page, if one has been fetched since the last change
    pub fn page(&self) -> Option<&PageResult> {
        self.cached.as_ref()
    }

    /// Changing the filter returns to the first page
    pub fn set_filter(&mut self, filter: FilterSpec) {
        self.query.filter = filter;
        self.query.page.page = 1;
        self.invalidate();
    }

    pub fn set_search(&mut self, search: Option<SearchSpec>) {
        self.query.search = search;
        self.query.page.page = 1;
        self.invalidate();
    }

    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.query.sort = sort;
        self.invalidate();
    }

    pub fn go_to(&mut self, page: PageRequest) {
        self.query.page = page;
        self.invalidate();
    }

    pub fn select(&mut self, id: Option<EntityId>) {
        self.selected = id;
    }

    pub fn selected(&self) -> Option<&EntityId> {
        self.selected.as_ref()
    }

    /// Drop the cached page
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Fetch the current page, replacing the cache only on success
    pub fn refresh(&mut self) -> Result<&PageResult, ViewError> {
        let page = self.engine.run(&self.tenant, &self.query)?;
        let cached: &PageResult = self.cached.insert(page);
        Ok(cached)
    }

    /// Fetch the current page unless it is cached
    pub fn load(&mut self) -> Result<&PageResult, ViewError> {
        match self.cached.take() {
            Some(page) => {
                let cached: &PageResult = self.cached.insert(page);
                Ok(cached)
            }
            None => self.refresh(),
        }
    }

    /// Create or update a record, then re-fetch the page
    pub fn submit(&mut self, existing: Option<&EntityId>, payload: &Payload) -> Result<Record, ViewError> {
        let record = self.mutator.submit(&self.tenant, existing, payload)?;
        self.refresh_after_write();
        Ok(record)
    }

    /// Delete a record, then re-fetch the page
    pub fn delete(&mut self, id: &EntityId) -> Result<(), ViewError> {
        self.mutator.delete(&self.tenant, id)?;
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.refresh_after_write();
        Ok(())
    }

    /// The write is already saved, so a failed re-fetch only leaves the cache empty
    fn refresh_after_write(&mut self) {
        self.invalidate();
        if let Err(e) = self.refresh().map(|_| ()) {
            warn!(
                table = self.engine.schema().table,
                error = %e,
                "saved, but refreshing the list failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::Predicate;
    use crate::core::store::MemoryStore;

    fn tenant() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    fn payload(name: &str, quantity: &str) -> Payload {
        [("name", name), ("category", "filters"), ("quantity", quantity)]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_mutation_refreshes_cached_page() {
        let store = MemoryStore::new();
        let mut view = ListView::new(&store, EntityPrefix::Item, tenant());
        assert_eq!(view.refresh().unwrap().total_count, 0);

        let record = view.submit(None, &payload("Filter", "3")).unwrap();
        let page = view.page().unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.records[0].id, record.id);

        view.select(Some(record.id.clone()));
        view.delete(&record.id).unwrap();
        assert_eq!(view.page().unwrap().total_count, 0);
        assert!(view.selected().is_none());
    }

    #[test]
    fn test_failed_mutation_leaves_cache_unchanged() {
        let store = MemoryStore::new();
        let mut view = ListView::new(&store, EntityPrefix::Item, tenant());
        view.submit(None, &payload("Filter", "3")).unwrap();
        let before = view.page().cloned();

        assert!(matches!(
            view.submit(None, &payload("Filter", "-4")),
            Err(ViewError::Mutation(MutationError::ValidationFailed(_)))
        ));
        assert_eq!(view.page().cloned(), before);

        store.fail_insert_call(2);
        assert!(view.submit(None, &payload("Coil", "1")).is_err());
        assert_eq!(view.page().cloned(), before);
    }

    #[test]
    fn test_saved_write_succeeds_when_refresh_fails() {
        let store = MemoryStore::new();
        let mut view = ListView::new(&store, EntityPrefix::Item, tenant());
        view.refresh().unwrap();

        store.fail_reads(true);
        let record = view.submit(None, &payload("Filter", "3")).unwrap();
        assert!(view.page().is_none());
        assert!(view.load().is_err());

        store.fail_reads(false);
        let page = view.load().unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.records[0].id, record.id);

        store.fail_reads(true);
        view.delete(&record.id).unwrap();
        assert!(view.page().is_none());
        store.fail_reads(false);
        assert_eq!(view.load().unwrap().total_count, 0);
    }

    #[test]
    fn test_state_round_trips_and_resets_page_on_filter() {
        let store = MemoryStore::new();
        let mut view = ListView::new(&store, EntityPrefix::Item, tenant());
        view.go_to(PageRequest::new(3, 10));
        view.set_filter(FilterSpec::new().and(Predicate::eq("category", "filters")));
        assert_eq!(view.query().page.page, 1);

        let state = view.state();
        let json = serde_json::to_string(&state).unwrap();
        let restored: ViewState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);

        let mut restored_view = ListView::from_state(&store, restored);
        assert!(restored_view.page().is_none());
        assert_eq!(restored_view.load().unwrap().total_count, 0);
    }
}
