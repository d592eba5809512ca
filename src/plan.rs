//! Query planning: intent-specific structural constraints.
//!
//! A table lookup, not a state machine. [`plan`] merges the constraints
//! into a new query; it never touches the SQL AST.

use crate::catalog::Catalog;
use crate::query::{Intent, SortSpec, StructuredQuery};
use crate::validate::{ValidationError, ValidationErrorKind};

/// Default LIMIT for ranking queries when the caller omitted one.
pub const DEFAULT_RANKING_LIMIT: u64 = 10;

/// Hard cap on ranking LIMITs, whatever the caller asked for.
pub const MAX_RANKING_LIMIT: u64 = 100;

/// What an intent demands of the query's grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupByRule {
    /// Grouping is stripped; exactly one aggregate row is expected.
    ForcedEmpty,
    /// At least one group-by dimension is required.
    AtLeastOne,
    /// A time dimension is injected when absent.
    TimeInjected,
}

/// The structural constraints an intent imposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralConstraints {
    pub group_by: GroupByRule,
    /// LIMIT applied when the caller omitted one.
    pub default_limit: Option<u64>,
    /// Upper bound on any caller-supplied LIMIT.
    pub limit_cap: Option<u64>,
}

/// The constraint table. Diagnostic has no entry here; it is the
/// orchestrator's, and [`plan`] rejects it.
pub fn constraints(intent: &Intent) -> Option<StructuralConstraints> {
    match intent {
        Intent::Snapshot => Some(StructuralConstraints {
            group_by: GroupByRule::ForcedEmpty,
            default_limit: None,
            limit_cap: None,
        }),
        Intent::Ranking(_) => Some(StructuralConstraints {
            group_by: GroupByRule::AtLeastOne,
            default_limit: Some(DEFAULT_RANKING_LIMIT),
            limit_cap: Some(MAX_RANKING_LIMIT),
        }),
        Intent::Trend { .. } => Some(StructuralConstraints {
            group_by: GroupByRule::TimeInjected,
            default_limit: None,
            limit_cap: None,
        }),
        Intent::Comparison => Some(StructuralConstraints {
            group_by: GroupByRule::AtLeastOne,
            default_limit: None,
            limit_cap: None,
        }),
        Intent::Diagnostic => None,
    }
}

/// Merge the intent's constraints into a new query. Runs after
/// validation and security filtering, before AST building.
pub fn plan(
    query: &StructuredQuery,
    catalog: &Catalog,
) -> Result<StructuredQuery, Vec<ValidationError>> {
    let Some(constraints) = constraints(&query.intent) else {
        return Err(vec![ValidationError::new(
            ValidationErrorKind::UnsupportedIntent,
            "diagnostic queries go through the orchestrator, not compile()",
        )]);
    };

    let mut planned = query.clone();

    match constraints.group_by {
        GroupByRule::ForcedEmpty => planned.group_by.clear(),
        GroupByRule::AtLeastOne => {
            if planned.group_by.is_empty() {
                return Err(vec![ValidationError::new(
                    ValidationErrorKind::MissingGroupBy,
                    format!(
                        "{} queries need a dimension to break down by",
                        kind_name(&query.intent)
                    ),
                )]);
            }
        }
        GroupByRule::TimeInjected => {
            let time_dim = match &query.intent {
                Intent::Trend {
                    time_dimension: Some(dim),
                } => dim.clone(),
                _ => catalog.time.default_trend_dimension.clone(),
            };
            if !planned.group_by.contains(&time_dim) {
                planned.group_by.insert(0, time_dim.clone());
            }
            planned.intent = Intent::Trend {
                time_dimension: Some(time_dim),
            };
        }
    }

    if let Intent::Ranking(sort) = &query.intent {
        let limit = sort
            .limit
            .unwrap_or(constraints.default_limit.unwrap_or(DEFAULT_RANKING_LIMIT));
        let cap = constraints.limit_cap.unwrap_or(u64::MAX);
        planned.intent = Intent::Ranking(SortSpec {
            metric: Some(
                sort.metric
                    .clone()
                    .unwrap_or_else(|| query.metric.clone()),
            ),
            direction: sort.direction,
            limit: Some(limit.min(cap)),
        });
    }

    Ok(planned)
}

fn kind_name(intent: &Intent) -> &'static str {
    match intent {
        Intent::Snapshot => "snapshot",
        Intent::Ranking(_) => "ranking",
        Intent::Trend { .. } => "trend",
        Intent::Comparison => "comparison",
        Intent::Diagnostic => "diagnostic",
    }
}
