//! List query engine
//!
//! Resolves a [`ListQuery`] against a resource's field registry and runs it
//! through the store: tenant scope, then filters (AND), then search (OR),
//! then sort with an `id` tie-break, then the page window.

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::identity::{EntityId, TenantId};
use crate::core::query::{
    Comparison, Condition, FieldRef, FilterOp, FilterSpec, ListQuery, PageRequest, PageResult,
    Predicate, ResolvedSort, SearchSpec, SortSpec,
};
use crate::core::record::{FieldValue, Record};
use crate::core::schema::{FieldDef, FieldKind, ResourceSchema};
use crate::core::store::{Store, StoreError, StoreQuery, TextSearch};

/// Default upper bound on `page_size`
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Errors from list queries
#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("invalid page request: {0}")]
    #[diagnostic(code(fsd::invalid_page_request))]
    InvalidPageRequest(String),

    #[error("unsupported filter on '{field}': {reason}")]
    #[diagnostic(
        code(fsd::unsupported_filter),
        help("filters on computed fields can be applied to the fetched page with --refine")
    )]
    UnsupportedFilter { field: String, reason: String },

    #[error("invalid filter value for '{field}': {reason}")]
    #[diagnostic(code(fsd::invalid_filter_value))]
    InvalidFilterValue { field: String, reason: String },

    #[error("cannot sort by '{field}': {reason}")]
    #[diagnostic(code(fsd::unsupported_sort))]
    UnsupportedSort { field: String, reason: String },

    #[error("the record store is unavailable")]
    #[diagnostic(code(fsd::store_unavailable), help("check the store and try again"))]
    StoreUnavailable(#[source] StoreError),
}

/// Where a field's value comes from when evaluating a query
enum Resolved {
    Stored(&'static FieldDef),
    Audit(&'static str),
    Computed(FieldKind),
}

fn lookup(schema: &ResourceSchema, name: &str) -> Option<Resolved> {
    if let Some(def) = schema.field(name) {
        return Some(Resolved::Stored(def));
    }
    if let Some(audit) = ResourceSchema::audit_field(name) {
        return Some(Resolved::Audit(audit));
    }
    schema.computed_field(name).map(|c| Resolved::Computed(c.kind))
}

/// Parse a raw filter operand for a field of `kind` (`None` for audit fields,
/// which compare as text)
fn parse_operand(field: &str, kind: Option<FieldKind>, raw: &str) -> Result<FieldValue, QueryError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(QueryError::InvalidFilterValue {
            field: field.to_string(),
            reason: "value must not be empty".to_string(),
        });
    }
    match kind {
        None => Ok(FieldValue::Text(raw.to_string())),
        Some(kind) => FieldDef { kind, ..FieldDef::TEXT }
            .parse_value(raw)
            .map_err(|reason| QueryError::InvalidFilterValue {
                field: field.to_string(),
                reason,
            }),
    }
}

/// Turn a raw filter operation into a typed comparison
pub(crate) fn resolve_comparison(
    field: &str,
    kind: Option<FieldKind>,
    choices: &'static [&'static str],
    op: &FilterOp,
) -> Result<Comparison, QueryError> {
    // Choice fields compare against their canonical lowercase form
    let operand = |raw: &str| match kind {
        Some(k) if !choices.is_empty() => FieldDef {
            kind: k,
            choices,
            ..FieldDef::TEXT
        }
        .parse_value(raw)
        .map_err(|reason| QueryError::InvalidFilterValue {
            field: field.to_string(),
            reason,
        }),
        _ => parse_operand(field, kind, raw),
    };

    match op {
        FilterOp::Eq { value } => Ok(Comparison::Eq(operand(value)?)),
        FilterOp::Range { min, max } => {
            if min.is_none() && max.is_none() {
                return Err(QueryError::InvalidFilterValue {
                    field: field.to_string(),
                    reason: "a range needs at least one bound".to_string(),
                });
            }
            let min = min.as_deref().map(&operand).transpose()?;
            let max = max.as_deref().map(&operand).transpose()?;
            Ok(Comparison::Range { min, max })
        }
        FilterOp::Contains { value } => {
            if !matches!(kind, None | Some(FieldKind::Text) | Some(FieldKind::Date)) {
                return Err(QueryError::UnsupportedFilter {
                    field: field.to_string(),
                    reason: "substring matching needs a text or date field".to_string(),
                });
            }
            let needle = value.trim().to_lowercase();
            if needle.is_empty() {
                return Err(QueryError::InvalidFilterValue {
                    field: field.to_string(),
                    reason: "value must not be empty".to_string(),
                });
            }
            Ok(Comparison::Contains(needle))
        }
    }
}

/// Runs list queries for one resource
pub struct ListQueryEngine<'a> {
    store: &'a dyn Store,
    schema: &'static ResourceSchema,
    max_page_size: u32,
}

impl<'a> ListQueryEngine<'a> {
    pub fn new(store: &'a dyn Store, schema: &'static ResourceSchema) -> Self {
        Self {
            store,
            schema,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn schema(&self) -> &'static ResourceSchema {
        self.schema
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    /// Run a serializable list query
    pub fn run(&self, tenant: &TenantId, query: &ListQuery) -> Result<PageResult, QueryError> {
        self.query(
            tenant,
            &query.filter,
            query.search.as_ref(),
            query.sort.as_ref(),
            query.page,
        )
    }

    /// Fetch one page of matching records and the total match count
    pub fn query(
        &self,
        tenant: &TenantId,
        filter: &FilterSpec,
        search: Option<&SearchSpec>,
        sort: Option<&SortSpec>,
        page: PageRequest,
    ) -> Result<PageResult, QueryError> {
        self.check_page(page)?;
        let mut store_query = self.resolve(tenant, filter, search, sort)?;
        store_query.offset = page.offset();
        store_query.limit = u64::from(page.page_size);

        let selection = self.store.select(&store_query).map_err(|e| {
            warn!(
                table = self.schema.table,
                tenant = %tenant,
                error = %e,
                "list query failed"
            );
            QueryError::StoreUnavailable(e)
        })?;

        debug!(
            table = self.schema.table,
            tenant = %tenant,
            page = page.page,
            page_size = page.page_size,
            total = selection.total_count,
            "list query"
        );

        Ok(PageResult {
            records: selection.records,
            total_count: selection.total_count,
            page: page.page,
            page_size: page.page_size,
        })
    }

    /// Every matching record, fetched page by page at the maximum page size
    pub fn fetch_all(
        &self,
        tenant: &TenantId,
        filter: &FilterSpec,
        search: Option<&SearchSpec>,
        sort: Option<&SortSpec>,
    ) -> Result<Vec<Record>, QueryError> {
        let mut page = PageRequest::new(1, self.max_page_size.max(1));
        let mut records = Vec::new();
        loop {
            let result = self.query(tenant, filter, search, sort, page)?;
            let done = result.records.is_empty() || !result.has_next();
            records.extend(result.records);
            if done {
                return Ok(records);
            }
            page = page.next();
        }
    }

    /// Look up one record by ULID id or secondary number
    pub fn find(&self, tenant: &TenantId, reference: &str) -> Result<Option<Record>, QueryError> {
        let reference = reference.trim();
        let found = match EntityId::parse(reference) {
            Ok(id) if id.prefix() == self.schema.prefix => self.store.get(self.schema, tenant, &id),
            Ok(_) => Ok(None),
            Err(_) => self.store.find_by_number(self.schema, tenant, reference),
        };
        found.map_err(|e| {
            warn!(table = self.schema.table, error = %e, "record lookup failed");
            QueryError::StoreUnavailable(e)
        })
    }

    fn check_page(&self, page: PageRequest) -> Result<(), QueryError> {
        if page.page < 1 {
            return Err(QueryError::InvalidPageRequest(
                "page numbers start at 1".to_string(),
            ));
        }
        if page.page_size < 1 || page.page_size > self.max_page_size {
            return Err(QueryError::InvalidPageRequest(format!(
                "page size must be between 1 and {}, got {}",
                self.max_page_size, page.page_size
            )));
        }
        Ok(())
    }

    /// Resolve every part of a query against the registry. Any unknown or
    /// non-stored field fails the whole query.
    fn resolve(
        &self,
        tenant: &TenantId,
        filter: &FilterSpec,
        search: Option<&SearchSpec>,
        sort: Option<&SortSpec>,
    ) -> Result<StoreQuery, QueryError> {
        let conditions = filter
            .predicates
            .iter()
            .map(|p| self.resolve_predicate(p))
            .collect::<Result<Vec<_>, _>>()?;

        let search = match search {
            Some(spec) if !spec.is_blank() => Some(self.resolve_search(spec)?),
            _ => None,
        };

        let default_sort = SortSpec::default();
        let sort = self.resolve_sort(sort.unwrap_or(&default_sort))?;

        Ok(StoreQuery {
            schema: self.schema,
            tenant: tenant.clone(),
            conditions,
            search,
            sort,
            offset: 0,
            limit: 0,
        })
    }

    fn resolve_predicate(&self, predicate: &Predicate) -> Result<Condition, QueryError> {
        let name = predicate.field.trim();
        match lookup(self.schema, name) {
            Some(Resolved::Stored(def)) => Ok(Condition {
                field: FieldRef::Stored(def),
                comparison: resolve_comparison(def.name, Some(def.kind), def.choices, &predicate.op)?,
            }),
            Some(Resolved::Audit(audit)) => Ok(Condition {
                field: FieldRef::Audit(audit),
                comparison: resolve_comparison(audit, None, &[], &predicate.op)?,
            }),
            Some(Resolved::Computed(_)) => Err(QueryError::UnsupportedFilter {
                field: name.to_string(),
                reason: "computed fields are not stored".to_string(),
            }),
            None => Err(QueryError::UnsupportedFilter {
                field: name.to_string(),
                reason: format!("not a field of {}", self.schema.name),
            }),
        }
    }

    fn resolve_search(&self, spec: &SearchSpec) -> Result<TextSearch, QueryError> {
        let fields = if spec.fields.is_empty() {
            self.schema.search_fields()
        } else {
            spec.fields
                .iter()
                .map(|name| match lookup(self.schema, name) {
                    Some(Resolved::Stored(def)) if def.kind == FieldKind::Text => Ok(def.name),
                    Some(Resolved::Audit(audit)) => Ok(audit),
                    _ => Err(QueryError::UnsupportedFilter {
                        field: name.trim().to_string(),
                        reason: "search needs stored text fields".to_string(),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(TextSearch {
            needle: spec.term.trim().to_lowercase(),
            fields,
        })
    }

    fn resolve_sort(&self, sort: &SortSpec) -> Result<ResolvedSort, QueryError> {
        let name = sort.field.trim();
        let field = match lookup(self.schema, name) {
            Some(Resolved::Stored(def)) => FieldRef::Stored(def),
            Some(Resolved::Audit(audit)) => FieldRef::Audit(audit),
            Some(Resolved::Computed(_)) => {
                return Err(QueryError::UnsupportedSort {
                    field: name.to_string(),
                    reason: "computed fields are not stored".to_string(),
                })
            }
            None => {
                return Err(QueryError::UnsupportedSort {
                    field: name.to_string(),
                    reason: format!("not a field of {}", self.schema.name),
                })
            }
        };
        Ok(ResolvedSort {
            field,
            direction: sort.direction,
        })
    }
}
