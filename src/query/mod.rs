//! Structured query types: the envelope handed over by the intent
//! parser, plus the intent sum type.
//!
//! Every pipeline stage takes a query by reference and produces a new
//! value; nothing here is mutated in place after construction.

pub mod window;

pub use window::{CalendarGrain, TimeWindow, WindowBounds};

use serde::{Deserialize, Serialize};

use crate::sql::Literal;

/// Query intent. Each variant carries only the fields that make sense
/// for it, so illegal combinations are unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// One aggregate row, no grouping.
    Snapshot,
    /// Top-N by the metric.
    Ranking(SortSpec),
    /// Metric over time.
    Trend { time_dimension: Option<String> },
    /// Metric broken down side by side.
    Comparison,
    /// Root-cause workflow; handled by the orchestrator, not the
    /// single-query pipeline.
    Diagnostic,
}

/// Sort specification for ranking queries. All fields optional; the
/// planner fills in defaults (primary metric, DESC, limit 10).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    /// Renamed on the wire so flattening into the query envelope does
    /// not collide with the primary metric field.
    #[serde(rename = "sort_metric")]
    pub metric: Option<String>,
    #[serde(default)]
    pub direction: SortDirection,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// A literal filter value. Strings, numbers, and booleans only; never
/// raw SQL fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl FilterValue {
    pub fn to_literal(&self) -> Literal {
        match self {
            FilterValue::Str(s) => Literal::String(s.clone()),
            FilterValue::Int(n) => Literal::Int(*n),
            FilterValue::Float(f) => Literal::Float(*f),
            FilterValue::Bool(b) => Literal::Bool(*b),
        }
    }
}

/// Where a filter came from. Security filters are injected by the RLS
/// layer and always rendered last in the WHERE tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOrigin {
    #[default]
    User,
    Security,
}

/// An equality/membership filter on a dimension. One value renders as
/// `=`, several as `IN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueFilter {
    pub dimension: String,
    pub values: Vec<FilterValue>,
    #[serde(default)]
    pub origin: FilterOrigin,
}

impl ValueFilter {
    pub fn user(dimension: &str, values: Vec<FilterValue>) -> Self {
        Self {
            dimension: dimension.into(),
            values,
            origin: FilterOrigin::User,
        }
    }

    pub fn security(dimension: &str, values: Vec<FilterValue>) -> Self {
        Self {
            dimension: dimension.into(),
            values,
            origin: FilterOrigin::Security,
        }
    }
}

/// The structured representation of a business question, as produced by
/// the external intent parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    #[serde(flatten)]
    pub intent: Intent,
    pub metric: String,
    /// Ordered, unique, at most four. Order drives GROUP BY and ORDER BY.
    #[serde(default)]
    pub group_by: Vec<String>,
    pub window: TimeWindow,
    #[serde(default)]
    pub filters: Vec<ValueFilter>,
    /// The original question text. Audit only; never parsed again.
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub confidence: f64,
}

impl StructuredQuery {
    /// A minimal query, for tests and orchestrator-internal sub-queries.
    pub fn new(intent: Intent, metric: &str, window: TimeWindow) -> Self {
        Self {
            intent,
            metric: metric.into(),
            group_by: vec![],
            window,
            filters: vec![],
            question: String::new(),
            confidence: 1.0,
        }
    }

    pub fn with_group_by(mut self, dimensions: Vec<&str>) -> Self {
        self.group_by = dimensions.into_iter().map(String::from).collect();
        self
    }

    pub fn with_filter(mut self, filter: ValueFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Filters injected by the security layer.
    pub fn security_filters(&self) -> impl Iterator<Item = &ValueFilter> {
        self.filters
            .iter()
            .filter(|f| f.origin == FilterOrigin::Security)
    }
}
