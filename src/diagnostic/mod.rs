//! Root-cause diagnostics: result types, the executor boundary, and the
//! orchestrator that drives multi-query analysis.

pub mod executor;
pub mod orchestrator;

pub use executor::{ExecutionError, Executor, QueryResult};
pub use orchestrator::{DiagnosticConfig, Orchestrator};

use serde::Serialize;

/// Which way the metric moved between the prior and current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Flat,
}

/// What one candidate dimension contributed to the change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub dimension: String,
    /// The dimension value with the largest absolute delta.
    pub top_contributor: String,
    /// That contributor's metric value in the current window.
    pub value: f64,
    /// Current minus prior.
    pub delta: f64,
}

/// A suggested next step, in priority order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub message: String,
}

impl Recommendation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The outcome of a diagnostic run. Infallible by construction:
/// sub-query failures fold into `partial` instead of erroring out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticResult {
    pub direction: TrendDirection,
    /// Percent change vs the prior window. `None` when the prior total
    /// is zero.
    pub change_pct: Option<f64>,
    /// One per candidate dimension that fully executed, in candidate
    /// order.
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
    /// True when any sub-query failed or was abandoned at the deadline.
    pub partial: bool,
}
