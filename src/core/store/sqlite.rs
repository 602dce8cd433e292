//! SQLite-backed store
//!
//! All resources share one `records` table keyed by `(tbl, tenant)`. Field
//! values live in a JSON `data` column and are filtered and sorted through
//! `json_extract`. Secondary numbers come from the `sequences` table and are
//! guarded by a UNIQUE constraint.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{check_stock, format_number, Selection, StockMovement, Store, StoreError, StoreQuery};
use crate::core::identity::{EntityId, TenantId};
use crate::core::query::{Comparison, FieldRef};
use crate::core::record::{format_timestamp, now, parse_timestamp, FieldValue, Fields, Record};
use crate::core::schema::ResourceSchema;
use crate::entities::{inventory, transaction};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

const RECORD_COLUMNS: &str = "id, number, tenant, created, updated, data";

/// How long a write waits for another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store backed by a SQLite database file
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL so readers are not blocked by an import in progress
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        Self::prepare(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, StoreError> {
        register_functions(&conn)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                tbl TEXT NOT NULL,
                tenant TEXT NOT NULL,
                number TEXT NOT NULL,
                created TEXT NOT NULL,
                updated TEXT NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (tbl, tenant, number)
            );
            CREATE INDEX IF NOT EXISTS idx_records_scope ON records(tbl, tenant);

            -- Last issued secondary number per resource and tenant
            CREATE TABLE IF NOT EXISTS sequences (
                tbl TEXT NOT NULL,
                tenant TEXT NOT NULL,
                last_value INTEGER NOT NULL,
                PRIMARY KEY (tbl, tenant)
            );
            "#,
        )?;

        let version: Option<i32> = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match version {
            None => {
                self.conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
                Ok(())
            }
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            // Records are not derived data, so a mismatch is never rebuilt
            Some(v) => Err(StoreError::Unavailable(format!(
                "store schema version {} is not supported (expected {})",
                v, SCHEMA_VERSION
            ))),
        }
    }
}

/// `fsd_lower(text)`: Unicode lowercase. SQLite's own `LOWER` folds ASCII only.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fsd_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

/// Row as read from the `records` table, before decoding
struct RawRecord {
    id: String,
    number: String,
    tenant: String,
    created: String,
    updated: String,
    data: String,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            number: row.get(1)?,
            tenant: row.get(2)?,
            created: row.get(3)?,
            updated: row.get(4)?,
            data: row.get(5)?,
        })
    }

    fn decode(self, schema: &ResourceSchema) -> Result<Record, StoreError> {
        let corrupt = |what: &str| StoreError::Corrupt(format!("{}: invalid {}", self.id, what));

        let id = EntityId::parse(&self.id).map_err(|_| corrupt("id"))?;
        let tenant = TenantId::parse(&self.tenant).map_err(|_| corrupt("tenant"))?;
        let created = parse_timestamp(&self.created).ok_or_else(|| corrupt("created"))?;
        let updated = parse_timestamp(&self.updated).ok_or_else(|| corrupt("updated"))?;
        let fields = match serde_json::from_str::<JsonValue>(&self.data) {
            Ok(JsonValue::Object(map)) => schema.decode(&map),
            _ => return Err(corrupt("data")),
        };

        Ok(Record {
            id,
            number: self.number,
            tenant,
            created,
            updated,
            fields,
        })
    }
}

/// SQL expression reading a field
fn column_expr(field: &FieldRef) -> String {
    match field {
        FieldRef::Audit(name) => (*name).to_string(),
        FieldRef::Stored(def) => format!("json_extract(data, '$.{}')", def.name),
    }
}

/// Bind a typed value the way `json_extract` returns it
fn sql_value(value: &FieldValue) -> Box<dyn ToSql> {
    match value {
        FieldValue::Null => Box::new(Option::<i64>::None),
        FieldValue::Bool(b) => Box::new(i64::from(*b)),
        FieldValue::Integer(i) => Box::new(*i),
        FieldValue::Number(n) => Box::new(*n),
        FieldValue::Text(_) | FieldValue::Date(_) => Box::new(value.to_text()),
    }
}

/// Substring test against an already lowercased needle; NULL never matches
fn contains_clause(expr: &str) -> String {
    format!("instr(fsd_lower(CAST({} AS TEXT)), ?) > 0", expr)
}

/// Build the WHERE clause and its parameters for a query
fn where_clause(query: &StoreQuery) -> (String, Vec<Box<dyn ToSql>>) {
    let mut sql = String::from("tbl = ? AND tenant = ?");
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![
        Box::new(query.schema.table.to_string()),
        Box::new(query.tenant.as_str().to_string()),
    ];

    for condition in &query.conditions {
        let expr = column_expr(&condition.field);
        match &condition.comparison {
            Comparison::Eq(value) => {
                sql.push_str(&format!(" AND {} = ?", expr));
                params_vec.push(sql_value(value));
            }
            Comparison::Range { min, max } => {
                if let Some(min) = min {
                    sql.push_str(&format!(" AND {} >= ?", expr));
                    params_vec.push(sql_value(min));
                }
                if let Some(max) = max {
                    sql.push_str(&format!(" AND {} <= ?", expr));
                    params_vec.push(sql_value(max));
                }
            }
            Comparison::Contains(needle) => {
                sql.push_str(&format!(" AND {}", contains_clause(&expr)));
                params_vec.push(Box::new(needle.clone()));
            }
        }
    }

    if let Some(ref search) = query.search {
        let clauses: Vec<String> = search
            .fields
            .iter()
            .map(|f| {
                let expr = match ResourceSchema::audit_field(f) {
                    Some(audit) => audit.to_string(),
                    None => format!("json_extract(data, '$.{}')", f),
                };
                contains_clause(&expr)
            })
            .collect();
        if clauses.is_empty() {
            sql.push_str(" AND 0");
        } else {
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
            for _ in &search.fields {
                params_vec.push(Box::new(search.needle.clone()));
            }
        }
    }

    (sql, params_vec)
}

fn load(
    conn: &Connection,
    schema: &ResourceSchema,
    tenant: &TenantId,
    column: &str,
    value: &str,
) -> Result<Option<Record>, StoreError> {
    let sql = format!(
        "SELECT {} FROM records WHERE tbl = ?1 AND tenant = ?2 AND {} = ?3",
        RECORD_COLUMNS, column
    );
    let raw = conn
        .query_row(&sql, params![schema.table, tenant.as_str(), value], |row| {
            RawRecord::from_row(row)
        })
        .optional()?;
    raw.map(|r| r.decode(schema)).transpose()
}

fn insert_rows(
    conn: &Connection,
    schema: &ResourceSchema,
    tenant: &TenantId,
    rows: &[Fields],
) -> Result<Vec<Record>, StoreError> {
    let last: u64 = conn
        .query_row(
            "SELECT last_value FROM sequences WHERE tbl = ?1 AND tenant = ?2",
            params![schema.table, tenant.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .map_or(0, |v| u64::try_from(v).unwrap_or(0));

    let timestamp = now();
    let mut stmt = conn.prepare(
        "INSERT INTO records (id, tbl, tenant, number, created, updated, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    let mut inserted = Vec::with_capacity(rows.len());
    let mut seq = last;
    for fields in rows {
        seq += 1;
        let record = Record {
            id: EntityId::new(schema.prefix),
            number: format_number(schema.prefix, seq),
            tenant: tenant.clone(),
            created: timestamp,
            updated: timestamp,
            fields: fields.clone(),
        };
        let data = JsonValue::Object(ResourceSchema::encode(&record.fields)).to_string();
        stmt.execute(params![
            record.id.to_string(),
            schema.table,
            tenant.as_str(),
            record.number,
            format_timestamp(&record.created),
            format_timestamp(&record.updated),
            data,
        ])?;
        inserted.push(record);
    }

    conn.execute(
        "INSERT INTO sequences (tbl, tenant, last_value) VALUES (?1, ?2, ?3)
         ON CONFLICT (tbl, tenant) DO UPDATE SET last_value = excluded.last_value",
        params![schema.table, tenant.as_str(), seq as i64],
    )?;

    Ok(inserted)
}

fn write_fields(conn: &Connection, record: &Record) -> Result<(), StoreError> {
    let data = JsonValue::Object(ResourceSchema::encode(&record.fields)).to_string();
    conn.execute(
        "UPDATE records SET data = ?1, updated = ?2 WHERE id = ?3",
        params![data, format_timestamp(&record.updated), record.id.to_string()],
    )?;
    Ok(())
}

impl Store for SqliteStore {
    fn select(&self, query: &StoreQuery) -> Result<Selection, StoreError> {
        let (where_sql, params_vec) = where_clause(query);
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        // Count and window read from one snapshot
        let tx = self.conn.unchecked_transaction()?;

        let total: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM records WHERE {}", where_sql),
            params_refs.as_slice(),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM records WHERE {} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            RECORD_COLUMNS,
            where_sql,
            column_expr(&query.sort.field),
            query.sort.direction.as_sql()
        );
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        let mut window_params = params_refs.clone();
        window_params.push(&limit);
        window_params.push(&offset);

        let raw: Vec<RawRecord> = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(window_params.as_slice(), RawRecord::from_row)?;
            rows.collect::<Result<_, _>>()?
        };
        tx.commit()?;

        let records = raw
            .into_iter()
            .map(|r| r.decode(query.schema))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            table = query.schema.table,
            tenant = %query.tenant,
            total,
            returned = records.len(),
            "select"
        );

        Ok(Selection {
            records,
            total_count: u64::try_from(total).unwrap_or(0),
        })
    }

    fn scan(&self, schema: &ResourceSchema, tenant: &TenantId) -> Result<Vec<Record>, StoreError> {
        let sql = format!(
            "SELECT {} FROM records WHERE tbl = ?1 AND tenant = ?2 ORDER BY number ASC",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params![schema.table, tenant.as_str()], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(|r| r.decode(schema)).collect()
    }

    fn get(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        id: &EntityId,
    ) -> Result<Option<Record>, StoreError> {
        load(&self.conn, schema, tenant, "id", &id.to_string())
    }

    fn find_by_number(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        number: &str,
    ) -> Result<Option<Record>, StoreError> {
        load(&self.conn, schema, tenant, "number", &number.trim().to_uppercase())
    }

    fn insert(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        rows: &[Fields],
    ) -> Result<Vec<Record>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let inserted = insert_rows(&tx, schema, tenant, rows)?;
        tx.commit()?;
        debug!(table = schema.table, tenant = %tenant, rows = inserted.len(), "insert");
        Ok(inserted)
    }

    fn update(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        id: &EntityId,
        patch: &Fields,
    ) -> Result<Record, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut record = load(&tx, schema, tenant, "id", &id.to_string())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        for (field, value) in patch {
            record.fields.insert(field.clone(), value.clone());
        }
        record.updated = now();
        write_fields(&tx, &record)?;
        tx.commit()?;
        Ok(record)
    }

    fn delete(
        &self,
        schema: &ResourceSchema,
        tenant: &TenantId,
        id: &EntityId,
    ) -> Result<(), StoreError> {
        let affected = self.conn.execute(
            "DELETE FROM records WHERE tbl = ?1 AND tenant = ?2 AND id = ?3",
            params![schema.table, tenant.as_str(), id.to_string()],
        )?;
        if affected == 0 {
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
        let tx = self.conn.unchecked_transaction()?;

        let mut item = load(&tx, &inventory::SCHEMA, tenant, "id", &item_id.to_string())?
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        let quantity = check_stock(&item, delta)?;
        item.fields
            .insert("quantity".to_string(), FieldValue::Integer(quantity));
        item.updated = now();
        write_fields(&tx, &item)?;

        let transaction = insert_rows(&tx, &transaction::SCHEMA, tenant, std::slice::from_ref(txn))?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Corrupt("transaction was not inserted".to_string()))?;

        tx.commit()?;
        Ok(StockMovement { item, transaction })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::{Condition, ResolvedSort, SortDirection};
    use crate::core::store::TextSearch;
    use crate::entities::inventory;
    use tempfile::tempdir;

    fn tenant() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    fn item(name: &str, category: &str, quantity: i64) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), FieldValue::Text(name.to_string()));
        fields.insert("category".to_string(), FieldValue::Text(category.to_string()));
        fields.insert("quantity".to_string(), FieldValue::Integer(quantity));
        fields.insert("unit_cost".to_string(), FieldValue::Number(2.5));
        fields
    }

    fn query(conditions: Vec<Condition>, sort_field: &'static str) -> StoreQuery {
        let schema = &inventory::SCHEMA;
        StoreQuery {
            schema,
            tenant: tenant(),
            conditions,
            search: None,
            sort: ResolvedSort {
                field: FieldRef::Stored(schema.field(sort_field).unwrap()),
                direction: SortDirection::Asc,
            },
            offset: 0,
            limit: 50,
        }
    }

    fn names(selection: &Selection) -> Vec<String> {
        selection
            .records
            .iter()
            .map(|r| r.value_of("name").to_text())
            .collect()
    }

    #[test]
    fn test_insert_and_get_round_trip_typed_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let inserted = store
            .insert(&inventory::SCHEMA, &tenant(), &[item("Coil", "hvac", 3)])
            .unwrap();
        let loaded = store
            .get(&inventory::SCHEMA, &tenant(), &inserted[0].id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, inserted[0]);
        assert_eq!(loaded.number, "ITEM-000001");
        assert_eq!(loaded.get("unit_cost"), Some(&FieldValue::Number(2.5)));
    }

    #[test]
    fn test_range_and_contains_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(
                &inventory::SCHEMA,
                &tenant(),
                &[
                    item("Air Filter", "filters", 2),
                    item("Capacitor", "electrical", 9),
                    item("Water Filter", "filters", 12),
                ],
            )
            .unwrap();

        let quantity = FieldRef::Stored(inventory::SCHEMA.field("quantity").unwrap());
        let name = FieldRef::Stored(inventory::SCHEMA.field("name").unwrap());
        let selection = store
            .select(&query(
                vec![
                    Condition {
                        field: quantity,
                        comparison: Comparison::Range {
                            min: Some(FieldValue::Integer(2)),
                            max: Some(FieldValue::Integer(10)),
                        },
                    },
                    Condition {
                        field: name,
                        comparison: Comparison::Contains("filter".to_string()),
                    },
                ],
                "quantity",
            ))
            .unwrap();
        assert_eq!(selection.total_count, 1);
        assert_eq!(names(&selection), vec!["Air Filter"]);
    }

    #[test]
    fn test_numeric_sort_is_not_lexicographic() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(
                &inventory::SCHEMA,
                &tenant(),
                &[item("a", "x", 10), item("b", "x", 9), item("c", "x", 100)],
            )
            .unwrap();
        let selection = store.select(&query(vec![], "quantity")).unwrap();
        assert_eq!(names(&selection), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(
                &inventory::SCHEMA,
                &tenant(),
                &[item("100% copper", "x", 1), item("1000 copper", "x", 1)],
            )
            .unwrap();
        let mut q = query(vec![], "name");
        q.search = Some(TextSearch {
            needle: "0%".to_string(),
            fields: inventory::SCHEMA.search_fields(),
        });
        let selection = store.select(&q).unwrap();
        assert_eq!(names(&selection), vec!["100% copper"]);
    }

    #[test]
    fn test_adjust_stock_is_atomic() {
        let store = SqliteStore::open_in_memory().unwrap();
        let inserted = store
            .insert(&inventory::SCHEMA, &tenant(), &[item("Coil", "hvac", 3)])
            .unwrap();
        let mut txn = Fields::new();
        txn.insert(
            "item_id".to_string(),
            FieldValue::Text(inserted[0].id.to_string()),
        );
        txn.insert("kind".to_string(), FieldValue::Text("out".to_string()));
        txn.insert("quantity".to_string(), FieldValue::Integer(-5));

        let err = store
            .adjust_stock(&tenant(), &inserted[0].id, -5, &txn)
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { on_hand: 3, .. }));
        assert!(store
            .scan(&transaction::SCHEMA, &tenant())
            .unwrap()
            .is_empty());

        txn.insert("quantity".to_string(), FieldValue::Integer(-2));
        let movement = store
            .adjust_stock(&tenant(), &inserted[0].id, -2, &txn)
            .unwrap();
        assert_eq!(movement.item.get("quantity"), Some(&FieldValue::Integer(1)));
        assert_eq!(movement.transaction.number, "TXN-000001");
    }

    #[test]
    fn test_reopen_keeps_records_and_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".fsd/store.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .insert(&inventory::SCHEMA, &tenant(), &[item("Coil", "hvac", 3)])
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let next = store
            .insert(&inventory::SCHEMA, &tenant(), &[item("Fan", "hvac", 1)])
            .unwrap();
        assert_eq!(next[0].number, "ITEM-000002");
        assert_eq!(store.scan(&inventory::SCHEMA, &tenant()).unwrap().len(), 2);
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(
                &inventory::SCHEMA,
                &tenant(),
                &[item("ÉCOLE filter", "x", 1), item("Zürich coil", "x", 1), item("Ecole pad", "x", 1)],
            )
            .unwrap();
        let mut q = query(vec![], "name");
        q.search = Some(TextSearch {
            needle: "école".to_string(),
            fields: inventory::SCHEMA.search_fields(),
        });
        assert_eq!(names(&store.select(&q).unwrap()), vec!["ÉCOLE filter"]);
    }

    #[test]
    fn test_open_sets_busy_timeout() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("store.db")).unwrap();
        let timeout: i64 = store
            .conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000);
    }
}
