//! Page-local refinement
//!
//! Filters and sorts records that were already fetched, for dimensions the
//! store cannot express (computed fields such as an invoice's
//! `days_until_due`). Results only ever cover the fetched page.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::engine::{resolve_comparison, QueryError};
use crate::core::query::{Comparison, Predicate, SearchSpec, SortDirection, SortSpec};
use crate::core::record::{FieldValue, Record};
use crate::core::schema::{ComputedField, FieldKind, ResourceSchema};

/// Secondary filter/search/sort over an in-memory page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refinement {
    #[serde(default)]
    pub filter: Vec<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
}

impl Refinement {
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
            && self.search.as_ref().map_or(true, |s| s.is_blank())
            && self.sort.is_none()
    }
}

#[derive(Clone, Copy)]
enum Source {
    Field(&'static str),
    Computed(&'static ComputedField),
}

const NO_CHOICES: &[&str] = &[];

/// A field resolved for evaluation
struct Target {
    source: Source,
    kind: Option<FieldKind>,
    choices: &'static [&'static str],
}

/// Applies refinements for one resource, evaluating computed fields as of
/// a fixed date
pub struct ClientSideRefiner {
    schema: &'static ResourceSchema,
    today: NaiveDate,
}

impl ClientSideRefiner {
    pub fn new(schema: &'static ResourceSchema, today: NaiveDate) -> Self {
        Self { schema, today }
    }

    fn value(&self, source: Source, record: &Record) -> FieldValue {
        match source {
            Source::Field(name) => record.value_of(name),
            Source::Computed(computed) => (computed.compute)(record, self.today),
        }
    }

    fn target(&self, name: &str) -> Option<Target> {
        let name = name.trim();
        if let Some(def) = self.schema.field(name) {
            return Some(Target {
                source: Source::Field(def.name),
                kind: Some(def.kind),
                choices: def.choices,
            });
        }
        if let Some(audit) = ResourceSchema::audit_field(name) {
            return Some(Target {
                source: Source::Field(audit),
                kind: None,
                choices: NO_CHOICES,
            });
        }
        self.schema.computed_field(name).map(|c| Target {
            source: Source::Computed(c),
            kind: Some(c.kind),
            choices: NO_CHOICES,
        })
    }

    fn unknown(&self, name: &str) -> QueryError {
        QueryError::UnsupportedFilter {
            field: name.trim().to_string(),
            reason: format!("not a field of {}", self.schema.name),
        }
    }

    /// Filter then stable-sort `records`.
    ///
    /// The output is always a subset of the input in an order that satisfies
    /// the sort pairwise; records comparing equal keep their relative order,
    /// so refining twice gives the same result as refining once.
    pub fn refine(&self, records: &[Record], refinement: &Refinement) -> Result<Vec<Record>, QueryError> {
        let conditions = refinement
            .filter
            .iter()
            .map(|p| {
                let target = self.target(&p.field).ok_or_else(|| self.unknown(&p.field))?;
                let comparison =
                    resolve_comparison(p.field.trim(), target.kind, target.choices, &p.op)?;
                Ok((target.source, comparison))
            })
            .collect::<Result<Vec<(Source, Comparison)>, QueryError>>()?;

        let search = match &refinement.search {
            Some(spec) if !spec.is_blank() => {
                let sources = if spec.fields.is_empty() {
                    self.schema
                        .search_fields()
                        .into_iter()
                        .map(Source::Field)
                        .collect()
                } else {
                    spec.fields
                        .iter()
                        .map(|f| self.target(f).map(|t| t.source).ok_or_else(|| self.unknown(f)))
                        .collect::<Result<Vec<_>, _>>()?
                };
                Some((spec.term.trim().to_lowercase(), sources))
            }
            _ => None,
        };

        let sort = match &refinement.sort {
            Some(spec) => {
                let target =
                    self.target(&spec.field)
                        .ok_or_else(|| QueryError::UnsupportedSort {
                            field: spec.field.trim().to_string(),
                            reason: format!("not a field of {}", self.schema.name),
                        })?;
                Some((target.source, spec.direction))
            }
            None => None,
        };

        let mut refined: Vec<Record> = records
            .iter()
            .filter(|record| {
                conditions
                    .iter()
                    .all(|(source, cmp)| cmp.test(&self.value(*source, record)))
            })
            .filter(|record| match &search {
                Some((needle, sources)) => sources
                    .iter()
                    .any(|s| self.value(*s, record).contains_ci(needle)),
                None => true,
            })
            .cloned()
            .collect();

        if let Some((source, direction)) = sort {
            self.stable_sort(&mut refined, source, direction);
        }

        Ok(refined)
    }

    fn stable_sort(&self, records: &mut [Record], source: Source, direction: SortDirection) {
        // slice::sort_by is stable
        records.sort_by(|a, b| {
            direction.apply(self.value(source, a).natural_cmp(&self.value(source, b)))
        });
    }
}
