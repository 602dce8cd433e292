//! CSV export of list results

use std::io::Write;

use csv::{QuoteStyle, WriterBuilder};
use miette::Diagnostic;
use thiserror::Error;

use crate::core::engine::{ListQueryEngine, QueryError};
use crate::core::identity::TenantId;
use crate::core::query::{FilterSpec, SearchSpec, SortSpec};
use crate::core::record::{format_timestamp, Record, AUDIT_FIELDS};
use crate::core::schema::ResourceSchema;

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error("failed to write CSV: {0}")]
    #[diagnostic(code(fsd::export::write))]
    Csv(#[from] csv::Error),

    #[error("failed to write CSV: {0}")]
    #[diagnostic(code(fsd::export::write))]
    Io(#[from] std::io::Error),
}

/// Header row: audit columns first, then every declared field
pub fn header(schema: &ResourceSchema) -> Vec<&'static str> {
    AUDIT_FIELDS
        .iter()
        .copied()
        .chain(schema.fields.iter().map(|f| f.name))
        .collect()
}

fn row(schema: &ResourceSchema, record: &Record) -> Vec<String> {
    let mut cells = vec![
        record.id.to_string(),
        record.number.clone(),
        format_timestamp(&record.created),
        format_timestamp(&record.updated),
    ];
    cells.extend(schema.fields.iter().map(|f| record.value_of(f.name).to_text()));
    cells
}

/// Write `records` as CSV with every cell quoted. Returns rows written.
pub fn write_csv<W: Write>(
    schema: &ResourceSchema,
    records: &[Record],
    writer: W,
) -> Result<usize, ExportError> {
    let mut csv = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(writer);
    csv.write_record(header(schema))?;
    for record in records {
        csv.write_record(row(schema, record))?;
    }
    csv.flush()?;
    Ok(records.len())
}

/// Export every record matching the query, ignoring pagination
pub fn export<W: Write>(
    engine: &ListQueryEngine<'_>,
    tenant: &TenantId,
    filter: &FilterSpec,
    search: Option<&SearchSpec>,
    sort: Option<&SortSpec>,
    writer: W,
) -> Result<usize, ExportError> {
    let records = engine.fetch_all(tenant, filter, search, sort)?;
    let written = write_csv(engine.schema(), &records, writer)?;
    tracing::info!(
        table = engine.schema().table,
        tenant = %tenant,
        rows = written,
        "exported"
    );
    Ok(written)
}
