//! Semantic validation of a structured query against a tenant catalog.
//!
//! Accumulates every applicable violation instead of stopping at the
//! first, so the caller can surface all of them at once. A non-empty
//! error set prevents every downstream stage from running.

use thiserror::Error;

use crate::catalog::Catalog;
use crate::query::{Intent, StructuredQuery};

/// Maximum number of simultaneous group-by dimensions.
pub const MAX_GROUP_BY: usize = 4;

/// Caller-supplied limits must fall in this range.
pub const LIMIT_RANGE: std::ops::RangeInclusive<u64> = 1..=10_000;

/// What kind of violation was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    UnknownMetric,
    UnknownDimension,
    DimensionNotAllowed,
    DuplicateDimension,
    TooManyDimensions,
    UnknownSortMetric,
    MissingGroupBy,
    InvalidWindow,
    UnknownFilterDimension,
    EmptyFilter,
    LimitOutOfRange,
    UnsupportedIntent,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationErrorKind::UnknownMetric => "unknown metric",
            ValidationErrorKind::UnknownDimension => "unknown dimension",
            ValidationErrorKind::DimensionNotAllowed => "dimension not allowed for metric",
            ValidationErrorKind::DuplicateDimension => "duplicate dimension",
            ValidationErrorKind::TooManyDimensions => "too many dimensions",
            ValidationErrorKind::UnknownSortMetric => "unknown sort metric",
            ValidationErrorKind::MissingGroupBy => "intent requires at least one group-by",
            ValidationErrorKind::InvalidWindow => "invalid time window",
            ValidationErrorKind::UnknownFilterDimension => "unknown filter dimension",
            ValidationErrorKind::EmptyFilter => "filter has no values",
            ValidationErrorKind::LimitOutOfRange => "limit out of range",
            ValidationErrorKind::UnsupportedIntent => "unsupported intent",
        };
        f.write_str(s)
    }
}

/// A single validation violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub detail: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Validate a structured query against the catalog, accumulating all
/// violations.
pub fn validate(query: &StructuredQuery, catalog: &Catalog) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let metric = catalog.metric(&query.metric);
    if metric.is_none() {
        errors.push(ValidationError::new(
            ValidationErrorKind::UnknownMetric,
            format!("'{}' is not defined for tenant '{}'", query.metric, catalog.tenant()),
        ));
    }

    let mut seen: Vec<&str> = Vec::with_capacity(query.group_by.len());
    for name in &query.group_by {
        let canonical = catalog.resolve(name);
        if seen.contains(&canonical) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateDimension,
                format!("'{name}' appears more than once in group_by"),
            ));
            continue;
        }
        seen.push(canonical);

        match catalog.dimension(name) {
            None => errors.push(ValidationError::new(
                ValidationErrorKind::UnknownDimension,
                format!("'{name}' is not defined for tenant '{}'", catalog.tenant()),
            )),
            Some(dim) => {
                if let Some(metric) = metric {
                    if !metric.allows_dimension(&dim.name) {
                        errors.push(ValidationError::new(
                            ValidationErrorKind::DimensionNotAllowed,
                            format!("metric '{}' cannot be grouped by '{name}'", metric.name),
                        ));
                    }
                }
            }
        }
    }

    if query.group_by.len() > MAX_GROUP_BY {
        errors.push(ValidationError::new(
            ValidationErrorKind::TooManyDimensions,
            format!(
                "{} group-by dimensions given, at most {MAX_GROUP_BY} allowed",
                query.group_by.len()
            ),
        ));
    }

    // The planner injects the trend time dimension into group_by after
    // validation, so it has to be checked here. Dimensions already in
    // group_by were checked by the loop above.
    if let Intent::Trend { time_dimension } = &query.intent {
        let dim = time_dimension
            .as_deref()
            .unwrap_or(&catalog.time.default_trend_dimension);
        if !seen.contains(&catalog.resolve(dim)) {
            match catalog.dimension(dim) {
                None => errors.push(ValidationError::new(
                    ValidationErrorKind::UnknownDimension,
                    format!("trend time dimension '{dim}' is not defined"),
                )),
                Some(resolved) => {
                    if let Some(metric) = metric {
                        if !metric.allows_dimension(&resolved.name) {
                            errors.push(ValidationError::new(
                                ValidationErrorKind::DimensionNotAllowed,
                                format!(
                                    "metric '{}' cannot trend over '{dim}'",
                                    metric.name
                                ),
                            ));
                        }
                    }
                }
            }
        }
    }

    if let Intent::Ranking(sort) = &query.intent {
        if let Some(sort_metric) = &sort.metric {
            let matches_primary = catalog.resolve(sort_metric) == catalog.resolve(&query.metric);
            if !matches_primary && catalog.metric(sort_metric).is_none() {
                errors.push(ValidationError::new(
                    ValidationErrorKind::UnknownSortMetric,
                    format!("'{sort_metric}' is neither the primary metric nor catalog-known"),
                ));
            }
        }
        if let Some(limit) = sort.limit {
            if !LIMIT_RANGE.contains(&limit) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::LimitOutOfRange,
                    format!(
                        "limit {limit} outside {}..={}",
                        LIMIT_RANGE.start(),
                        LIMIT_RANGE.end()
                    ),
                ));
            }
        }
    }

    if query.window.resolve().is_none() {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidWindow,
            format!("{:?} is not a recognized or well-formed window", query.window),
        ));
    }

    for filter in &query.filters {
        if catalog.dimension(&filter.dimension).is_none() {
            errors.push(ValidationError::new(
                ValidationErrorKind::UnknownFilterDimension,
                format!("filter dimension '{}' is not defined", filter.dimension),
            ));
        }
        if filter.values.is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::EmptyFilter,
                format!("filter on '{}' carries no values", filter.dimension),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
