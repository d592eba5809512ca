//! AST building: resolve a validated, secured, planned query into a
//! typed SQL query.
//!
//! By the time a query reaches the builder the validator has guaranteed
//! every identifier resolves, so a [`BuildError`] here is an internal
//! defect. It is logged and propagated, never swallowed.

use thiserror::Error;

use crate::catalog::{Catalog, Dimension, Metric};
use crate::query::{FilterOrigin, Intent, SortDirection, StructuredQuery, ValueFilter};
use crate::sql::expr::{aggregate, col, table_col};
use crate::sql::{Expr, ExprExt, OrderByExpr, Query, SelectExpr, TableRef};

/// Alias of the fact table in every generated query.
const FACT_ALIAS: &str = "f";

/// Internal resolution failure. The validator should have made these
/// unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("metric '{0}' not resolvable at build time")]
    UnknownMetric(String),

    #[error("dimension '{0}' not resolvable at build time")]
    UnknownDimension(String),

    #[error("time window not resolvable at build time")]
    UnresolvedWindow,
}

/// Builds `sql::Query` values from structured queries against one
/// tenant's catalog.
pub struct AstBuilder<'a> {
    catalog: &'a Catalog,
}

impl<'a> AstBuilder<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Build the SQL AST for a planned query.
    pub fn build(&self, query: &StructuredQuery) -> Result<Query, BuildError> {
        match self.build_inner(query) {
            Ok(ast) => Ok(ast),
            Err(err) => {
                tracing::error!(
                    tenant = self.catalog.tenant(),
                    metric = %query.metric,
                    %err,
                    "AST build failed after validation; this is a defect"
                );
                Err(err)
            }
        }
    }

    fn build_inner(&self, query: &StructuredQuery) -> Result<Query, BuildError> {
        let metric = self
            .catalog
            .metric(&query.metric)
            .ok_or_else(|| BuildError::UnknownMetric(query.metric.clone()))?;

        let mut joins = JoinSet::new(self.catalog, &metric.table);

        // SELECT: group-by dimension columns, then the aggregate.
        let mut select: Vec<SelectExpr> = Vec::with_capacity(query.group_by.len() + 1);
        let mut group_cols: Vec<Expr> = Vec::with_capacity(query.group_by.len());
        for name in &query.group_by {
            let column = joins.dimension_column(name)?;
            group_cols.push(column.clone());
            select.push(SelectExpr::new(column));
        }
        select.push(
            aggregate(
                metric.aggregation.func.sql_name(),
                table_col(FACT_ALIAS, &metric.aggregation.column),
                metric.aggregation.distinct,
            )
            .alias(&metric.name),
        );

        // WHERE, in fixed order: metric implicit filters, user filters,
        // window predicate, security filters last.
        let mut predicates: Vec<Expr> = Vec::new();
        for implicit in &metric.filters {
            predicates.push(
                table_col(FACT_ALIAS, &implicit.column).eq(Expr::Literal(implicit.value.clone())),
            );
        }
        for filter in user_then_security(&query.filters) {
            predicates.push(self.filter_predicate(&mut joins, filter)?);
        }
        // Window slots in before the security filters.
        let window = query.window.resolve().ok_or(BuildError::UnresolvedWindow)?;
        let window_at = predicates.len()
            - query
                .filters
                .iter()
                .filter(|f| f.origin == FilterOrigin::Security)
                .count();
        predicates.insert(
            window_at,
            window.predicate(table_col(FACT_ALIAS, &self.catalog.time.column)),
        );

        let mut ast = Query::new().select(select).from(
            TableRef::new(&metric.table)
                .with_schema(self.catalog.schema())
                .with_alias(FACT_ALIAS),
        );
        for join in joins.into_joins() {
            ast.joins.push(join);
        }
        for predicate in predicates {
            ast = ast.filter(predicate);
        }
        ast = ast.group_by(group_cols);

        self.apply_ordering(ast, query, metric)
    }

    /// ORDER BY and LIMIT from the planned intent.
    fn apply_ordering(
        &self,
        ast: Query,
        query: &StructuredQuery,
        metric: &Metric,
    ) -> Result<Query, BuildError> {
        match &query.intent {
            Intent::Ranking(sort) => {
                let sort_name = sort
                    .metric
                    .as_deref()
                    .map(|m| self.catalog.resolve(m))
                    .unwrap_or(&metric.name);
                // The sort metric renders as its SELECT alias.
                let order = match sort.direction {
                    SortDirection::Asc => OrderByExpr::asc(col(sort_name)),
                    SortDirection::Desc => OrderByExpr::desc(col(sort_name)),
                };
                let mut ast = ast.order_by(vec![order]);
                if let Some(limit) = sort.limit {
                    ast = ast.limit(limit);
                }
                Ok(ast)
            }
            Intent::Trend {
                time_dimension: Some(dim),
            } => {
                let mut joins = JoinSet::new(self.catalog, &metric.table);
                let column = joins.dimension_column(dim)?;
                Ok(ast.order_by(vec![OrderByExpr::asc(column)]))
            }
            _ => Ok(ast),
        }
    }

    fn filter_predicate(
        &self,
        joins: &mut JoinSet<'a>,
        filter: &ValueFilter,
    ) -> Result<Expr, BuildError> {
        let column = joins.dimension_column(&filter.dimension)?;
        let mut values = filter.values.iter().map(|v| v.to_literal());
        Ok(if filter.values.len() == 1 {
            column.eq(Expr::Literal(values.next().expect("one value")))
        } else {
            column.in_list(values.collect())
        })
    }
}

/// Iterate filters with user-origin ones first, both groups in their
/// original order.
fn user_then_security(filters: &[ValueFilter]) -> impl Iterator<Item = &ValueFilter> {
    let (user, security): (Vec<_>, Vec<_>) = filters
        .iter()
        .partition(|f| f.origin == FilterOrigin::User);
    user.into_iter().chain(security)
}

/// Tracks the LEFT OUTER JOINs a query needs, one per distinct
/// non-degenerate dimension table.
struct JoinSet<'a> {
    catalog: &'a Catalog,
    fact_table: &'a str,
    joins: Vec<(String, crate::sql::Join)>,
}

impl<'a> JoinSet<'a> {
    fn new(catalog: &'a Catalog, fact_table: &'a str) -> Self {
        Self {
            catalog,
            fact_table,
            joins: Vec::new(),
        }
    }

    /// The column expression for a dimension, registering its join if
    /// one is needed and not yet present.
    fn dimension_column(&mut self, name: &str) -> Result<Expr, BuildError> {
        let dim = self
            .catalog
            .dimension(name)
            .ok_or_else(|| BuildError::UnknownDimension(name.to_string()))?;

        if dim.is_degenerate_for(self.fact_table) {
            return Ok(table_col(FACT_ALIAS, &dim.name));
        }

        let alias = table_alias(dim);
        if !self.joins.iter().any(|(a, _)| a == &alias) {
            let join = crate::sql::Join {
                join_type: crate::sql::JoinType::LeftOuter,
                table: TableRef::new(&dim.table)
                    .with_schema(self.catalog.schema())
                    .with_alias(&alias),
                on: table_col(FACT_ALIAS, &dim.join_key).eq(table_col(&alias, &dim.join_key)),
            };
            self.joins.push((alias.clone(), join));
        }
        Ok(table_col(&alias, &dim.name))
    }

    fn into_joins(self) -> Vec<crate::sql::Join> {
        self.joins.into_iter().map(|(_, j)| j).collect()
    }
}

/// Dimension tables are aliased by their name minus the `dim_` prefix.
fn table_alias(dim: &Dimension) -> String {
    dim.table
        .strip_prefix("dim_")
        .unwrap_or(&dim.table)
        .to_string()
}
