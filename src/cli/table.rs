//! Table formatting for record output
//!
//! Lists render as an aligned table on a terminal and as TSV, CSV, JSON,
//! YAML, Markdown or bare IDs when `--format` asks for one. Computed fields
//! (such as `days_until_due`) can be used as columns like stored fields.

use chrono::{DateTime, Local, NaiveDate, Utc};
use miette::{IntoDiagnostic, Result};
use serde_json::{Map, Value as JsonValue};
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::truncate_str;
use crate::cli::OutputFormat;
use crate::core::record::{FieldValue, Record};
use crate::core::schema::ResourceSchema;

/// Widest a text cell gets in the aligned table
const MAX_CELL_WIDTH: usize = 40;

/// Renders records of one resource
pub struct RecordTable<'a> {
    schema: &'static ResourceSchema,
    columns: Vec<&'a str>,
    today: NaiveDate,
}

impl<'a> RecordTable<'a> {
    /// Table over the resource's default list columns
    pub fn new(schema: &'static ResourceSchema, today: NaiveDate) -> Self {
        Self {
            schema,
            columns: schema.list_columns.to_vec(),
            today,
        }
    }

    pub fn with_columns(mut self, columns: &[&'a str]) -> Self {
        if !columns.is_empty() {
            self.columns = columns.to_vec();
        }
        self
    }

    fn value(&self, record: &Record, column: &str) -> FieldValue {
        match self.schema.computed_field(column) {
            Some(computed) => (computed.compute)(record, self.today),
            None => record.value_of(column),
        }
    }

    /// Cell text for human-facing tables: timestamps shortened to local time
    fn display(&self, record: &Record, column: &str) -> String {
        match column {
            "created" => local_time(&record.created),
            "updated" => local_time(&record.updated),
            _ => display_value(&self.value(record, column)),
        }
    }

    fn plain(&self, record: &Record, column: &str) -> String {
        self.value(record, column).to_text()
    }

    /// A record as a JSON object: audit fields, stored fields, then computed fields
    pub fn to_json(&self, record: &Record) -> JsonValue {
        let mut map = Map::new();
        map.insert("id".to_string(), JsonValue::String(record.id.to_string()));
        map.insert("number".to_string(), JsonValue::String(record.number.clone()));
        map.insert("tenant".to_string(), JsonValue::String(record.tenant.to_string()));
        map.insert("created".to_string(), JsonValue::String(record.value_of("created").to_text()));
        map.insert("updated".to_string(), JsonValue::String(record.value_of("updated").to_text()));
        for field in self.schema.fields {
            map.insert(field.name.to_string(), record.value_of(field.name).to_json());
        }
        for computed in self.schema.computed {
            map.insert(
                computed.name.to_string(),
                (computed.compute)(record, self.today).to_json(),
            );
        }
        JsonValue::Object(map)
    }

    /// Render a list in `format`
    pub fn render(&self, records: &[Record], format: OutputFormat) -> Result<String> {
        let out = match format {
            OutputFormat::Json => {
                let values: Vec<JsonValue> = records.iter().map(|r| self.to_json(r)).collect();
                serde_json::to_string_pretty(&values).into_diagnostic()?
            }
            OutputFormat::Yaml => {
                let values: Vec<JsonValue> = records.iter().map(|r| self.to_json(r)).collect();
                serde_yml::to_string(&values).into_diagnostic()?
            }
            OutputFormat::Id => records
                .iter()
                .map(|r| format!("{}\n", r.id))
                .collect(),
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(Vec::new());
                writer.write_record(&self.columns).into_diagnostic()?;
                for record in records {
                    writer
                        .write_record(self.columns.iter().map(|c| self.plain(record, c)))
                        .into_diagnostic()?;
                }
                let bytes = writer
                    .into_inner()
                    .map_err(|e| miette::miette!("failed to write CSV: {}", e.error()))?;
                String::from_utf8(bytes).into_diagnostic()?
            }
            OutputFormat::Tsv => {
                let mut out = self.columns.join("\t");
                out.push('\n');
                for record in records {
                    let cells: Vec<String> = self
                        .columns
                        .iter()
                        .map(|c| self.plain(record, c).replace(['\t', '\n'], " "))
                        .collect();
                    out.push_str(&cells.join("\t"));
                    out.push('\n');
                }
                out
            }
            OutputFormat::Md => self.table(records, true),
            OutputFormat::Auto => self.table(records, false),
        };
        Ok(out)
    }

    fn table(&self, records: &[Record], markdown: bool) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.columns.iter().map(|c| c.to_uppercase()));
        for record in records {
            builder.push_record(self.columns.iter().map(|c| {
                let cell = truncate_str(&self.display(record, c), MAX_CELL_WIDTH);
                if markdown {
                    cell.replace('|', "\\|")
                } else {
                    cell
                }
            }));
        }
        let mut table = builder.build();
        if markdown {
            table.with(Style::markdown());
        } else {
            table.with(Style::psql());
        }
        let mut out = table.to_string();
        out.push('\n');
        out
    }

    /// One record, YAML unless another format is asked for (for `show`)
    pub fn render_one(&self, record: &Record, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(&self.to_json(record)).into_diagnostic(),
            OutputFormat::Id => Ok(format!("{}\n", record.id)),
            OutputFormat::Csv | OutputFormat::Tsv | OutputFormat::Md => {
                self.render(std::slice::from_ref(record), format)
            }
            OutputFormat::Yaml | OutputFormat::Auto => {
                serde_yml::to_string(&self.to_json(record)).into_diagnostic()
            }
        }
    }
}

fn local_time(ts: &DateTime<Utc>) -> String {
    let local: DateTime<Local> = ts.with_timezone(&Local);
    local.format("%Y-%m-%d %H:%M").to_string()
}

fn display_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "-".to_string(),
        FieldValue::Number(n) => format!("{:.2}", n),
        other => other.to_text(),
    }
}
