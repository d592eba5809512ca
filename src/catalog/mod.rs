//! Tenant catalog: typed metric and dimension definitions.
//!
//! One `Catalog` per tenant, loaded once and shared immutably. All
//! identifiers that can reach rendered SQL (tables, columns, join keys)
//! live here and are validated at load time, so the downstream builder
//! never has to re-check them.

pub mod loader;
pub mod registry;

pub use loader::LoadError;
pub use registry::CatalogRegistry;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::sql::Literal;

/// Aggregate function a metric can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggFunc {
    /// SQL function name.
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Count => "COUNT",
        }
    }
}

/// A metric's aggregation, parsed at load time from a template string
/// such as `SUM(net_value)` or `COUNT(DISTINCT invoice_no)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub func: AggFunc,
    pub column: String,
    pub distinct: bool,
}

/// How a metric's values should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    #[default]
    Number,
    Currency,
    Percent,
}

/// A fixed predicate a metric always applies to its fact rows,
/// e.g. `return_flag = false` on a sales metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplicitFilter {
    pub column: String,
    pub value: Literal,
}

/// A metric definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub aggregation: Aggregation,
    /// Fact table, unqualified. Schema qualification happens at AST build.
    pub table: String,
    pub format: ValueFormat,
    /// Dimensions this metric may be grouped by.
    pub dimensions: BTreeSet<String>,
    /// Implicit predicates ANDed into every query of this metric.
    pub filters: Vec<ImplicitFilter>,
}

impl Metric {
    /// Whether this metric may be grouped by the given dimension.
    pub fn allows_dimension(&self, dimension: &str) -> bool {
        self.dimensions.contains(dimension)
    }
}

/// A dimension definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    /// Source table. When this equals a metric's fact table the dimension
    /// is degenerate: the column lives on the fact table and no join is
    /// emitted.
    pub table: String,
    pub join_key: String,
    /// Owning hierarchy level (e.g. `geography`, `product`), informational.
    pub level: Option<String>,
}

impl Dimension {
    /// True when this dimension's column lives on the given fact table.
    pub fn is_degenerate_for(&self, fact_table: &str) -> bool {
        self.table == fact_table
    }
}

/// Time configuration for a tenant's facts.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeConfig {
    /// The date column on fact tables used for window predicates.
    pub column: String,
    /// Dimension the planner injects for Trend queries with no explicit
    /// time dimension.
    pub default_trend_dimension: String,
}

/// A tenant's catalog. Built by [`loader`], shared immutably through
/// [`registry::CatalogRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    tenant: String,
    schema: String,
    pub time: TimeConfig,
    metrics: BTreeMap<String, Metric>,
    dimensions: BTreeMap<String, Dimension>,
    /// Business-term aliases, e.g. `revenue` -> `secondary_sales_value`.
    synonyms: BTreeMap<String, String>,
}

impl Catalog {
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// The tenant schema prefix, `client_<tenant>`. Checked at load;
    /// never empty.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Resolve a business-term synonym to its canonical name, or return
    /// the name itself.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.synonyms.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Look up a metric by canonical name or synonym.
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(self.resolve(name))
    }

    /// Look up a dimension by canonical name or synonym.
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(self.resolve(name))
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.values()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agg_func_sql_name() {
        assert_eq!(AggFunc::Sum.sql_name(), "SUM");
        assert_eq!(AggFunc::Count.sql_name(), "COUNT");
    }

    #[test]
    fn test_degenerate_dimension() {
        let d = Dimension {
            name: "territory_code".into(),
            table: "fact_secondary_sales".into(),
            join_key: "territory_code".into(),
            level: Some("geography".into()),
        };
        assert!(d.is_degenerate_for("fact_secondary_sales"));
        assert!(!d.is_degenerate_for("fact_primary_sales"));
    }
}
