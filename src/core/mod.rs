//! Core module - records, stores and the operations over them

pub mod config;
pub mod engine;
pub mod export;
pub mod identity;
pub mod import;
pub mod mutator;
pub mod project;
pub mod query;
pub mod record;
pub mod refine;
pub mod schema;
pub mod stock;
pub mod store;
pub mod summary;
pub mod view;

pub use config::Config;
pub use engine::{ListQueryEngine, QueryError};
pub use identity::{EntityId, EntityPrefix, IdParseError, TenantId};
pub use import::{BulkImporter, ImportError, ImportOutcome, ImportReport, ImportState};
pub use mutator::{FormMutator, MutationError, Payload};
pub use project::{Project, ProjectError};
pub use query::{FilterSpec, ListQuery, PageRequest, PageResult, Predicate, SearchSpec, SortSpec};
pub use record::{FieldValue, Fields, Record};
pub use refine::{ClientSideRefiner, Refinement};
pub use stock::{MovementNote, StockLedger};
pub use store::{MemoryStore, SqliteStore, Store, StoreError};
pub use view::{ListView, ViewError, ViewState};
