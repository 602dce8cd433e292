//! Bulk CSV import
//!
//! An import runs in two steps. [`BulkImporter::parse`] turns CSV text into
//! validated rows and per-line rejections without touching the store.
//! [`BulkImporter::submit`] then inserts the accepted rows in fixed-size
//! batches, each batch one atomic store call. A failed batch fails only its
//! own rows; batches already committed stay committed.
//!
//! ```text
//! Idle -> Parsing -> ParseFailed
//!                 -> Reviewing -> Submitting -> Completed
//!                                            -> PartiallyCompleted
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use csv::{ReaderBuilder, Trim};
use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::identity::TenantId;
use crate::core::record::{Fields, Record};
use crate::core::schema::{ResourceSchema, ValidationMode};
use crate::core::store::Store;

/// Default number of rows per insert batch
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Lifecycle of one import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Idle,
    Parsing,
    ParseFailed,
    Reviewing,
    Submitting,
    Completed,
    PartiallyCompleted,
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImportState::Idle => "idle",
            ImportState::Parsing => "parsing",
            ImportState::ParseFailed => "parse failed",
            ImportState::Reviewing => "reviewing",
            ImportState::Submitting => "submitting",
            ImportState::Completed => "completed",
            ImportState::PartiallyCompleted => "partially completed",
        };
        f.write_str(s)
    }
}

/// The input could not be read as an import at all
#[derive(Debug, Error, Diagnostic)]
#[error("cannot import {resource}: {reason}")]
#[diagnostic(code(fsd::import::parse_failed))]
pub struct ParseFailure {
    pub resource: &'static str,
    pub reason: String,

    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    span: Option<SourceSpan>,

    #[help]
    help: Option<String>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ImportError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    ParseFailed(Box<ParseFailure>),

    #[error("cannot {action} while the import is {state}")]
    #[diagnostic(code(fsd::import::invalid_state))]
    InvalidState {
        action: &'static str,
        state: ImportState,
    },

    #[error("import incomplete: {committed} row(s) imported, {failed} row(s) not imported")]
    #[diagnostic(
        code(fsd::import::partial),
        help("imported rows were kept; fix the listed lines and import them again")
    )]
    PartialImportFailure { committed: usize, failed: usize },
}

/// A row that validated and is ready to insert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptedRow {
    /// 1-based line in the source file
    pub line: u64,
    pub fields: Fields,
}

/// A row that failed validation or a batch insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub line: u64,
    pub reason: String,
}

/// Result of parsing: ready for review, nothing written yet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedImport {
    pub accepted: Vec<AcceptedRow>,
    pub rejected: Vec<RejectedRow>,
    /// Header names that are not fields of the resource
    pub ignored_headers: Vec<String>,
}

impl ParsedImport {
    pub fn total_rows(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }
}

/// How one batch fared
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// 1-based batch number
    pub batch: usize,
    pub first_line: u64,
    pub last_line: u64,
    pub rows: usize,
    pub committed: bool,
}

/// Overall classification of a finished import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportOutcome {
    /// Every row was valid and every batch committed
    Success,
    /// Some rows were committed and some were not
    Partial,
    /// Rows were rejected or failed and none were committed
    Failure,
}

/// Result of submitting a parsed import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub state: ImportState,
    pub committed: Vec<Record>,
    /// Lines rejected during parsing
    pub rejected: Vec<RejectedRow>,
    /// Lines that validated but whose batch failed
    pub failed: Vec<RejectedRow>,
    pub batches: Vec<BatchOutcome>,
    pub ignored_headers: Vec<String>,
}

impl ImportReport {
    pub fn outcome(&self) -> ImportOutcome {
        if self.rejected.is_empty() && self.failed.is_empty() {
            ImportOutcome::Success
        } else if self.committed.is_empty() {
            ImportOutcome::Failure
        } else {
            ImportOutcome::Partial
        }
    }

    /// Rows that did not make it into the store, for either reason
    pub fn not_imported(&self) -> usize {
        self.rejected.len() + self.failed.len()
    }

    /// Error unless every row was imported
    pub fn ensure_complete(&self) -> Result<(), ImportError> {
        match self.outcome() {
            ImportOutcome::Success => Ok(()),
            _ => Err(ImportError::PartialImportFailure {
                committed: self.committed.len(),
                failed: self.not_imported(),
            }),
        }
    }
}

/// Progress after each batch: rows processed so far and rows to process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportProgress {
    pub completed_rows: usize,
    pub total_rows: usize,
}

/// Imports CSV rows into one resource
pub struct BulkImporter<'a> {
    store: &'a dyn Store,
    schema: &'static ResourceSchema,
    batch_size: usize,
    state: ImportState,
    source_name: String,
}

impl<'a> BulkImporter<'a> {
    pub fn new(store: &'a dyn Store, schema: &'static ResourceSchema) -> Self {
        Self {
            store,
            schema,
            batch_size: DEFAULT_BATCH_SIZE,
            state: ImportState::Idle,
            source_name: "input.csv".to_string(),
        }
    }

    /// Rows per insert batch (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// File name shown in parse diagnostics
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Parse and validate CSV text.
    ///
    /// The first non-blank line is the header. Header names are matched to
    /// fields case-insensitively; unknown headers are ignored and reported.
    /// Every data row is validated on its own, so one bad row never hides
    /// another.
    pub fn parse(&mut self, raw: &str) -> Result<ParsedImport, ImportError> {
        if !matches!(
            self.state,
            ImportState::Idle | ImportState::Reviewing | ImportState::ParseFailed
        ) {
            return Err(ImportError::InvalidState {
                action: "parse",
                state: self.state,
            });
        }
        self.state = ImportState::Parsing;

        match self.parse_rows(raw) {
            Ok(parsed) => {
                self.state = ImportState::Reviewing;
                debug!(
                    table = self.schema.table,
                    accepted = parsed.accepted.len(),
                    rejected = parsed.rejected.len(),
                    "import parsed"
                );
                Ok(parsed)
            }
            Err(failure) => {
                self.state = ImportState::ParseFailed;
                Err(ImportError::ParseFailed(Box::new(failure)))
            }
        }
    }

    fn failure(&self, raw: &str, line: Option<u64>, reason: String, help: Option<String>) -> ParseFailure {
        ParseFailure {
            resource: self.schema.name_plural,
            reason,
            src: NamedSource::new(&self.source_name, raw.to_string()),
            span: line.map(|l| line_span(raw, l)),
            help,
        }
    }

    fn parse_rows(&self, raw: &str) -> Result<ParsedImport, ParseFailure> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(raw.as_bytes());

        let mut header: Option<(u64, Vec<Option<&'static str>>)> = None;
        let mut ignored_headers = Vec::new();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for result in reader.records() {
            let record = result.map_err(|e| {
                let line = e.position().map(|p| p.line());
                self.failure(raw, line, format!("malformed CSV: {}", e), None)
            })?;
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            let line = record.position().map_or(0, |p| p.line());

            let Some((_, columns)) = header.as_ref() else {
                let (columns, ignored) = self.map_header(raw, line, &record)?;
                ignored_headers = ignored;
                header = Some((line, columns));
                continue;
            };

            let mut payload = BTreeMap::new();
            let mut extra = 0usize;
            for (i, cell) in record.iter().enumerate() {
                match columns.get(i) {
                    Some(Some(field)) => {
                        payload.insert(field.to_string(), cell.to_string());
                    }
                    Some(None) => {}
                    None if !cell.is_empty() => extra += 1,
                    None => {}
                }
            }
            // Short rows leave trailing columns empty
            for field in columns.iter().flatten() {
                payload.entry(field.to_string()).or_default();
            }

            if extra > 0 {
                rejected.push(RejectedRow {
                    line,
                    reason: format!(
                        "row has {} more value(s) than the header has columns",
                        extra
                    ),
                });
                continue;
            }

            match self.schema.validate(&payload, ValidationMode::Create) {
                Ok(fields) => accepted.push(AcceptedRow { line, fields }),
                Err(errors) => rejected.push(RejectedRow {
                    line,
                    reason: errors.reason(),
                }),
            }
        }

        if header.is_none() {
            return Err(self.failure(raw, None, "the input is empty".to_string(), None));
        }

        Ok(ParsedImport {
            accepted,
            rejected,
            ignored_headers,
        })
    }

    /// Map header cells to fields, rejecting duplicates and missing
    /// required columns
    fn map_header(
        &self,
        raw: &str,
        line: u64,
        record: &csv::StringRecord,
    ) -> Result<(Vec<Option<&'static str>>, Vec<String>), ParseFailure> {
        let mut seen: HashMap<&'static str, usize> = HashMap::new();
        let mut columns = Vec::with_capacity(record.len());
        let mut ignored = Vec::new();

        for (i, cell) in record.iter().enumerate() {
            let name = cell.trim().to_lowercase();
            match self.schema.field(&name) {
                Some(def) => {
                    if seen.insert(def.name, i).is_some() {
                        return Err(self.failure(
                            raw,
                            Some(line),
                            format!("column '{}' appears more than once", def.name),
                            None,
                        ));
                    }
                    columns.push(Some(def.name));
                }
                None => {
                    if !name.is_empty() {
                        ignored.push(cell.trim().to_string());
                    }
                    columns.push(None);
                }
            }
        }

        let missing: Vec<&str> = self
            .schema
            .required_fields()
            .filter(|def| !seen.contains_key(def.name))
            .map(|def| def.name)
            .collect();
        if !missing.is_empty() {
            return Err(self.failure(
                raw,
                Some(line),
                format!("missing required column(s): {}", missing.join(", ")),
                Some(format!(
                    "run `fsd {} template` for a header with every column",
                    cli_name(self.schema)
                )),
            ));
        }

        Ok((columns, ignored))
    }

    /// Insert accepted rows in batches, in file order.
    ///
    /// `progress` is called after every batch with a count that only grows.
    pub fn submit<F>(
        &mut self,
        tenant: &TenantId,
        parsed: &ParsedImport,
        mut progress: F,
    ) -> Result<ImportReport, ImportError>
    where
        F: FnMut(ImportProgress),
    {
        if self.state != ImportState::Reviewing {
            return Err(ImportError::InvalidState {
                action: "submit",
                state: self.state,
            });
        }
        self.state = ImportState::Submitting;

        let total_rows = parsed.accepted.len();
        let mut committed = Vec::with_capacity(total_rows);
        let mut failed = Vec::new();
        let mut batches = Vec::new();
        let mut completed_rows = 0;

        for (index, chunk) in parsed.accepted.chunks(self.batch_size).enumerate() {
            let batch = index + 1;
            let rows: Vec<Fields> = chunk.iter().map(|r| r.fields.clone()).collect();
            let first_line = chunk.first().map_or(0, |r| r.line);
            let last_line = chunk.last().map_or(0, |r| r.line);

            let ok = match self.store.insert(self.schema, tenant, &rows) {
                Ok(records) => {
                    committed.extend(records);
                    true
                }
                Err(e) => {
                    warn!(
                        table = self.schema.table,
                        tenant = %tenant,
                        batch,
                        rows = chunk.len(),
                        error = %e,
                        "import batch failed"
                    );
                    failed.extend(chunk.iter().map(|r| RejectedRow {
                        line: r.line,
                        reason: format!("batch {} was not saved: the record store is unavailable", batch),
                    }));
                    false
                }
            };

            batches.push(BatchOutcome {
                batch,
                first_line,
                last_line,
                rows: chunk.len(),
                committed: ok,
            });

            completed_rows += chunk.len();
            progress(ImportProgress {
                completed_rows,
                total_rows,
            });
        }

        self.state = if failed.is_empty() && parsed.rejected.is_empty() {
            ImportState::Completed
        } else {
            ImportState::PartiallyCompleted
        };

        info!(
            table = self.schema.table,
            tenant = %tenant,
            committed = committed.len(),
            rejected = parsed.rejected.len(),
            failed = failed.len(),
            "import finished"
        );

        Ok(ImportReport {
            state: self.state,
            committed,
            rejected: parsed.rejected.clone(),
            failed,
            batches,
            ignored_headers: parsed.ignored_headers.clone(),
        })
    }
}

/// Subcommand name for a resource
fn cli_name(schema: &ResourceSchema) -> String {
    schema.prefix.as_str().to_lowercase()
}

/// Byte span covering a 1-based line
fn line_span(source: &str, line: u64) -> SourceSpan {
    let mut offset = 0;
    for (i, text) in source.split_inclusive('\n').enumerate() {
        if (i as u64) + 1 == line {
            let len = text.trim_end_matches(['\r', '\n']).len();
            return SourceSpan::from(offset..offset + len.max(1));
        }
        offset += text.len();
    }
    SourceSpan::from(offset..offset)
}

/// CSV template for a resource: a header with every field and one example row
pub fn template(schema: &ResourceSchema) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(schema.fields.iter().map(|f| f.name))?;
    writer.write_record(schema.fields.iter().map(|f| f.example))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
