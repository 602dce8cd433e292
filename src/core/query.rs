//! List query types: filters, search, sort, and pagination
//!
//! Queries are plain serializable data. Field names and raw values are kept
//! as strings here; the engine resolves them against a resource's field
//! registry into [`Condition`]s before anything reaches the store.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::core::record::{FieldValue, Record};
use crate::core::schema::FieldDef;

/// A comparison with raw (unparsed) operands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterOp {
    /// Exact match
    Eq { value: String },
    /// Inclusive range; either bound may be open
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<String>,
    },
    /// Case-insensitive substring
    Contains { value: String },
}

/// A single `(field, op, value)` filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    #[serde(flatten)]
    pub op: FilterOp,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq {
                value: value.into(),
            },
        }
    }

    pub fn range(field: impl Into<String>, min: Option<&str>, max: Option<&str>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Range {
                min: min.map(str::to_string),
                max: max.map(str::to_string),
            },
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Contains {
                value: value.into(),
            },
        }
    }
}

/// Two-character operators come first so `>=` is not read as `=`
const FILTER_OPERATORS: [&str; 4] = [">=", "<=", "~", "="];

/// Parse filter expressions: `field=value`, `field>=min`, `field<=max`,
/// `field=min..max`, `field~text`
impl FromStr for Predicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // The first operator in the expression wins; values may contain the others
        let found = s.char_indices().find_map(|(i, _)| {
            FILTER_OPERATORS
                .iter()
                .find(|op| s[i..].starts_with(**op))
                .map(|op| (*op, s[..i].trim().to_string(), s[i + op.len()..].trim().to_string()))
        });

        let predicate = match found {
            Some((">=", field, value)) => Predicate::range(field, Some(&value), None),
            Some(("<=", field, value)) => Predicate::range(field, None, Some(&value)),
            Some(("~", field, value)) => Predicate::contains(field, value),
            Some((_, field, value)) => match value.split_once("..") {
                Some((min, max)) => {
                    let bound = |b: &str| (!b.trim().is_empty()).then(|| b.trim().to_string());
                    Predicate {
                        field,
                        op: FilterOp::Range {
                            min: bound(min),
                            max: bound(max),
                        },
                    }
                }
                None => Predicate::eq(field, value),
            },
            None => {
                return Err(format!(
                    "invalid filter '{}' (expected field=value, field>=min, field<=max, field=min..max or field~text)",
                    s
                ));
            }
        };

        if predicate.field.is_empty() {
            return Err(format!("invalid filter '{}': missing field name", s));
        }
        Ok(predicate)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            FilterOp::Eq { value } => write!(f, "{}={}", self.field, value),
            FilterOp::Contains { value } => write!(f, "{}~{}", self.field, value),
            FilterOp::Range { min, max } => write!(
                f,
                "{}={}..{}",
                self.field,
                min.as_deref().unwrap_or(""),
                max.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Conjunction of predicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub predicates: Vec<Predicate>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate (builder style)
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Free-text search, OR-ed across searchable fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpec {
    pub term: String,
    /// Fields to search; empty means the resource's searchable fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl SearchSpec {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            fields: Vec::new(),
        }
    }

    /// Blank terms search nothing
    pub fn is_blank(&self) -> bool {
        self.term.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Apply the direction to an ascending ordering
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            other => Err(format!("invalid sort direction '{}' (use asc or desc)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl Default for SortSpec {
    /// Newest first
    fn default() -> Self {
        SortSpec::desc("created")
    }
}

/// Parse `field`, `-field` (descending) or `field:asc|desc`
impl FromStr for SortSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(field) = s.strip_prefix('-') {
            return Ok(SortSpec::desc(field.trim()));
        }
        match s.split_once(':') {
            Some((field, dir)) => Ok(SortSpec {
                field: field.trim().to_string(),
                direction: dir.parse()?,
            }),
            None if !s.is_empty() => Ok(SortSpec::asc(s)),
            None => Err("sort field must not be empty".to_string()),
        }
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// A 1-based page window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Index of the first record in the window
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..*self
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Records of one page window plus the total number of matches
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    pub records: Vec<Record>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}

impl PageResult {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(u64::from(self.page_size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Complete, serializable state of a list query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub filter: FilterSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub page: PageRequest,
}

// ============================================================================
// Resolved queries
// ============================================================================

/// A field a condition or sort can refer to
#[derive(Debug, Clone, Copy)]
pub enum FieldRef {
    /// Declared field, stored in the record's data
    Stored(&'static FieldDef),
    /// `id`, `number`, `created` or `updated`
    Audit(&'static str),
}

impl FieldRef {
    pub fn name(&self) -> &'static str {
        match self {
            FieldRef::Stored(def) => def.name,
            FieldRef::Audit(name) => name,
        }
    }

    pub fn value_in(&self, record: &Record) -> FieldValue {
        record.value_of(self.name())
    }
}

/// A comparison with typed operands
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(FieldValue),
    Range {
        min: Option<FieldValue>,
        max: Option<FieldValue>,
    },
    /// Lowercased needle
    Contains(String),
}

/// A predicate resolved against a field registry
#[derive(Debug, Clone)]
pub struct Condition {
    pub field: FieldRef,
    pub comparison: Comparison,
}

impl Comparison {
    /// Test a value; null values never match
    pub fn test(&self, value: &FieldValue) -> bool {
        if value.is_null() {
            return false;
        }
        match self {
            Comparison::Eq(expected) => value.natural_cmp(expected) == Ordering::Equal,
            Comparison::Range { min, max } => {
                min.as_ref()
                    .map_or(true, |m| value.natural_cmp(m) != Ordering::Less)
                    && max
                        .as_ref()
                        .map_or(true, |m| value.natural_cmp(m) != Ordering::Greater)
            }
            Comparison::Contains(needle) => value.contains_ci(needle),
        }
    }
}

impl Condition {
    pub fn matches(&self, record: &Record) -> bool {
        self.comparison.test(&self.field.value_in(record))
    }
}

/// A sort resolved against a field registry
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSort {
    pub field: FieldRef,
    pub direction: SortDirection,
}

impl ResolvedSort {
    /// Order two records, ties broken by ascending id
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let primary = self
            .direction
            .apply(self.field.value_in(a).natural_cmp(&self.field.value_in(b)));
        primary.then_with(|| a.id.to_string().cmp(&b.id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_expressions() {
        assert_eq!(
            "status=active".parse::<Predicate>().unwrap(),
            Predicate::eq("status", "active")
        );
        assert_eq!(
            "quantity >= 5".parse::<Predicate>().unwrap(),
            Predicate::range("quantity", Some("5"), None)
        );
        assert_eq!(
            "due_date<=2024-06-30".parse::<Predicate>().unwrap(),
            Predicate::range("due_date", None, Some("2024-06-30"))
        );
        assert_eq!(
            "total=100..500".parse::<Predicate>().unwrap(),
            Predicate::range("total", Some("100"), Some("500"))
        );
        assert_eq!(
            "year=..2015".parse::<Predicate>().unwrap(),
            Predicate::range("year", None, Some("2015"))
        );
        assert_eq!(
            "name~filter".parse::<Predicate>().unwrap(),
            Predicate::contains("name", "filter")
        );
    }

    #[test]
    fn test_parse_filter_splits_on_first_operator() {
        assert_eq!(
            "notes=see~page 2".parse::<Predicate>().unwrap(),
            Predicate::eq("notes", "see~page 2")
        );
        assert_eq!(
            "name~a=b".parse::<Predicate>().unwrap(),
            Predicate::contains("name", "a=b")
        );
        assert_eq!(
            "notes=x>=y".parse::<Predicate>().unwrap(),
            Predicate::eq("notes", "x>=y")
        );
    }

    #[test]
    fn test_parse_filter_rejects_garbage() {
        assert!("status".parse::<Predicate>().is_err());
        assert!("=active".parse::<Predicate>().is_err());
    }

    #[test]
    fn test_parse_sort() {
        assert_eq!("-created".parse::<SortSpec>().unwrap(), SortSpec::desc("created"));
        assert_eq!("name".parse::<SortSpec>().unwrap(), SortSpec::asc("name"));
        assert_eq!(
            "mileage:DESC".parse::<SortSpec>().unwrap(),
            SortSpec::desc("mileage")
        );
        assert!("name:sideways".parse::<SortSpec>().is_err());
    }

    #[test]
    fn test_page_offsets() {
        assert_eq!(PageRequest::new(1, 5).offset(), 0);
        assert_eq!(PageRequest::new(3, 5).offset(), 10);
        assert_eq!(PageRequest::new(3, 5).next(), PageRequest::new(4, 5));
    }

    #[test]
    fn test_total_pages() {
        let page = PageResult {
            records: vec![],
            total_count: 12,
            page: 1,
            page_size: 5,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
    }

    #[test]
    fn test_list_query_is_serializable_state() {
        let query = ListQuery {
            filter: FilterSpec::new()
                .and(Predicate::eq("status", "sent"))
                .and(Predicate::range("amount", Some("100"), None)),
            search: Some(SearchSpec::new("dental")),
            sort: Some(SortSpec::asc("due_date")),
            page: PageRequest::new(2, 10),
        };
        let yaml = serde_yml::to_string(&query).unwrap();
        let back: ListQuery = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(back, query);
    }
}
