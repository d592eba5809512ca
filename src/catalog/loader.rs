//! Catalog loading from TOML definition files.
//!
//! Everything that can reach rendered SQL is checked here: tenant name,
//! table/column identifiers, aggregation templates, and implicit filter
//! expressions. Unknown fields in the definition file are rejected
//! rather than ignored.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use super::{Aggregation, AggFunc, Catalog, Dimension, ImplicitFilter, Metric, TimeConfig, ValueFormat};
use crate::sql::Literal;

/// Errors raised while loading a catalog definition.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid tenant name '{0}': expected lowercase identifier")]
    InvalidTenant(String),

    #[error("invalid identifier '{value}' for {context}")]
    InvalidIdentifier { context: String, value: String },

    #[error("metric '{metric}': invalid aggregation template '{template}'")]
    InvalidAggregation { metric: String, template: String },

    #[error("metric '{metric}': invalid implicit filter '{filter}'")]
    InvalidFilter { metric: String, filter: String },

    #[error("metric '{metric}' references unknown dimension '{dimension}'")]
    UnknownDimension { metric: String, dimension: String },

    #[error("synonym '{term}' targets unknown catalog entry '{target}'")]
    UnknownSynonymTarget { term: String, target: String },
}

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

static TENANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

static AGG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(SUM|AVG|MIN|MAX|COUNT)\(\s*(DISTINCT\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*\)$")
        .expect("valid regex")
});

static FILTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Definition-file shapes (serde)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDef {
    tenant: String,
    time: TimeDef,
    #[serde(default)]
    synonyms: BTreeMap<String, String>,
    metrics: BTreeMap<String, MetricDef>,
    dimensions: BTreeMap<String, DimensionDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimeDef {
    column: String,
    default_trend_dimension: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetricDef {
    aggregation: String,
    table: String,
    #[serde(default)]
    format: ValueFormat,
    dimensions: Vec<String>,
    #[serde(default)]
    filters: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DimensionDef {
    table: String,
    join_key: String,
    #[serde(default)]
    level: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Catalog {
    /// Load a catalog definition from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Catalog, LoadError> {
        let content = std::fs::read_to_string(path)?;
        Catalog::from_toml_str(&content)
    }

    /// Load a catalog definition from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Catalog, LoadError> {
        let def: CatalogDef = toml::from_str(content)?;
        build_catalog(def)
    }
}

fn build_catalog(def: CatalogDef) -> Result<Catalog, LoadError> {
    if !TENANT_RE.is_match(&def.tenant) {
        return Err(LoadError::InvalidTenant(def.tenant));
    }
    let schema = format!("client_{}", def.tenant);

    check_ident("time column", &def.time.column)?;

    let mut dimensions = BTreeMap::new();
    for (name, dim) in def.dimensions {
        check_ident("dimension name", &name)?;
        check_ident("dimension table", &dim.table)?;
        check_ident("dimension join key", &dim.join_key)?;
        dimensions.insert(
            name.clone(),
            Dimension {
                name,
                table: dim.table,
                join_key: dim.join_key,
                level: dim.level,
            },
        );
    }

    let mut metrics = BTreeMap::new();
    for (name, met) in def.metrics {
        check_ident("metric name", &name)?;
        check_ident("metric table", &met.table)?;

        let aggregation = parse_aggregation(&name, &met.aggregation)?;

        let mut allowed = BTreeSet::new();
        for dim in met.dimensions {
            if !dimensions.contains_key(&dim) {
                return Err(LoadError::UnknownDimension {
                    metric: name,
                    dimension: dim,
                });
            }
            allowed.insert(dim);
        }

        let mut filters = Vec::with_capacity(met.filters.len());
        for filter in &met.filters {
            filters.push(parse_filter(&name, filter)?);
        }

        metrics.insert(
            name.clone(),
            Metric {
                name,
                aggregation,
                table: met.table,
                format: met.format,
                dimensions: allowed,
                filters,
            },
        );
    }

    if !dimensions.contains_key(&def.time.default_trend_dimension) {
        return Err(LoadError::UnknownDimension {
            metric: "time.default_trend_dimension".into(),
            dimension: def.time.default_trend_dimension,
        });
    }

    for (term, target) in &def.synonyms {
        if !metrics.contains_key(target) && !dimensions.contains_key(target) {
            return Err(LoadError::UnknownSynonymTarget {
                term: term.clone(),
                target: target.clone(),
            });
        }
    }

    Ok(Catalog {
        tenant: def.tenant,
        schema,
        time: TimeConfig {
            column: def.time.column,
            default_trend_dimension: def.time.default_trend_dimension,
        },
        metrics,
        dimensions,
        synonyms: def.synonyms,
    })
}

fn check_ident(context: &str, value: &str) -> Result<(), LoadError> {
    if IDENT_RE.is_match(value) {
        Ok(())
    } else {
        Err(LoadError::InvalidIdentifier {
            context: context.into(),
            value: value.into(),
        })
    }
}

fn parse_aggregation(metric: &str, template: &str) -> Result<Aggregation, LoadError> {
    let caps = AGG_RE
        .captures(template.trim())
        .ok_or_else(|| LoadError::InvalidAggregation {
            metric: metric.into(),
            template: template.into(),
        })?;

    let func = match caps[1].to_ascii_uppercase().as_str() {
        "SUM" => AggFunc::Sum,
        "AVG" => AggFunc::Avg,
        "MIN" => AggFunc::Min,
        "MAX" => AggFunc::Max,
        "COUNT" => AggFunc::Count,
        _ => unreachable!("regex alternation is exhaustive"),
    };

    Ok(Aggregation {
        func,
        column: caps[3].to_string(),
        distinct: caps.get(2).is_some(),
    })
}

/// Parse an implicit filter of the form `column = literal`, where the
/// literal is a single-quoted string, an integer, a float, or a boolean.
fn parse_filter(metric: &str, filter: &str) -> Result<ImplicitFilter, LoadError> {
    let invalid = || LoadError::InvalidFilter {
        metric: metric.into(),
        filter: filter.into(),
    };

    let caps = FILTER_RE.captures(filter.trim()).ok_or_else(invalid)?;
    let column = caps[1].to_string();
    let raw = caps[2].trim();

    let value = if let Some(inner) = raw
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
    {
        Literal::String(inner.to_string())
    } else if raw == "true" {
        Literal::Bool(true)
    } else if raw == "false" {
        Literal::Bool(false)
    } else if let Ok(n) = raw.parse::<i64>() {
        Literal::Int(n)
    } else if let Ok(f) = raw.parse::<f64>() {
        // "1e999" and "inf" parse to non-finite floats, which the token
        // layer refuses to render.
        if !f.is_finite() {
            return Err(invalid());
        }
        Literal::Float(f)
    } else {
        return Err(invalid());
    };

    Ok(ImplicitFilter { column, value })
}
