//! Query builder - construct SELECT statements with a fluent API.
//!
//! Rendering is deterministic: clauses are emitted in the fixed order
//! SELECT, FROM, JOIN*, WHERE, GROUP BY, ORDER BY, LIMIT, and the same
//! `Query` value always serializes to a byte-identical string.

use super::dialect::Dialect;
use super::expr::{Expr, ExprExt};
use super::token::{Token, TokenStream};

// =============================================================================
// Select Expression (expression with optional alias)
// =============================================================================

/// A SELECT list item: expression with optional alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectExpr {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = self.expr.to_tokens_for_dialect(dialect);
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

impl From<Expr> for SelectExpr {
    fn from(expr: Expr) -> Self {
        SelectExpr::new(expr)
    }
}

// =============================================================================
// Table Reference
// =============================================================================

/// A table reference with optional schema and alias.
///
/// Catalog-resolved tables always carry the tenant schema; an
/// unqualified `TableRef` only appears in tests.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: &str) -> Self {
        Self {
            schema: None,
            table: table.into(),
            alias: None,
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::QualifiedIdent {
            schema: self.schema.clone(),
            name: self.table.clone(),
        });
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Type of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    /// LEFT OUTER JOIN - the only join the AST builder emits, so that
    /// dimension rows missing from a dimension table never drop facts.
    LeftOuter,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: Expr,
}

impl Join {
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self.join_type {
            JoinType::Inner => {
                ts.push(Token::Inner);
            }
            JoinType::LeftOuter => {
                ts.push(Token::Left).space().push(Token::Outer);
            }
        }

        ts.space().push(Token::Join).space();
        ts.append(&self.table.to_tokens());
        ts.space().push(Token::On).space();
        ts.append(&self.on.to_tokens_for_dialect(dialect));

        ts
    }
}

// =============================================================================
// ORDER BY
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY expression.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: SortDir,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Desc,
        }
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = self.expr.to_tokens_for_dialect(dialect);
        ts.space().push(match self.dir {
            SortDir::Asc => Token::Asc,
            SortDir::Desc => Token::Desc,
        });
        ts
    }
}

// =============================================================================
// Query Builder
// =============================================================================

/// A SELECT query.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "Query has no effect until converted to SQL with to_sql()"]
pub struct Query {
    pub select: Vec<SelectExpr>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<u64>,
}

impl Query {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SELECT list.
    pub fn select(mut self, exprs: Vec<impl Into<SelectExpr>>) -> Self {
        self.select = exprs.into_iter().map(|e| e.into()).collect();
        self
    }

    /// Set the FROM table.
    pub fn from(mut self, table: TableRef) -> Self {
        self.from = Some(table);
        self
    }

    /// Add a LEFT OUTER JOIN.
    pub fn left_join(mut self, table: TableRef, on: Expr) -> Self {
        self.joins.push(Join {
            join_type: JoinType::LeftOuter,
            table,
            on,
        });
        self
    }

    /// Add a WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Set the GROUP BY clause.
    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    /// Set the ORDER BY clause.
    pub fn order_by(mut self, exprs: Vec<OrderByExpr>) -> Self {
        self.order_by = exprs;
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Convert to token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        // SELECT
        ts.push(Token::Select);
        for (i, select_expr) in self.select.iter().enumerate() {
            if i == 0 {
                ts.newline().indent(1);
            } else {
                ts.comma().newline().indent(1);
            }
            ts.append(&select_expr.to_tokens_for_dialect(dialect));
        }

        // FROM
        if let Some(from) = &self.from {
            ts.newline().push(Token::From).space();
            ts.append(&from.to_tokens());
        }

        // JOINs
        for join in &self.joins {
            ts.newline();
            ts.append(&join.to_tokens_for_dialect(dialect));
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            ts.newline().push(Token::Where).space();
            ts.append(&where_clause.to_tokens_for_dialect(dialect));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            ts.newline().push(Token::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens_for_dialect(dialect));
            }
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            ts.newline().push(Token::OrderBy).space();
            for (i, expr) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens_for_dialect(dialect));
            }
        }

        // LIMIT
        if let Some(limit) = self.limit {
            ts.newline().push(Token::Limit).space();
            ts.push(Token::LitInt(limit as i64));
        }

        ts
    }

    /// Generate SQL string for a specific dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens_for_dialect(dialect).serialize(dialect)
    }
}

impl std::fmt::Display for Query {
    /// Formats the query using the default dialect (DuckDB).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql(Dialect::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::expr::{col, lit_str, sum, table_col};

    fn ranking_query() -> Query {
        Query::new()
            .select(vec![
                SelectExpr::new(table_col("product", "brand_name")),
                sum(table_col("f", "net_value")).alias("secondary_sales_value"),
            ])
            .from(
                TableRef::new("fact_secondary_sales")
                    .with_schema("client_nestle")
                    .with_alias("f"),
            )
            .left_join(
                TableRef::new("dim_product")
                    .with_schema("client_nestle")
                    .with_alias("product"),
                table_col("f", "product_key").eq(table_col("product", "product_key")),
            )
            .group_by(vec![table_col("product", "brand_name")])
            .order_by(vec![OrderByExpr::desc(col("secondary_sales_value"))])
            .limit(5)
    }

    #[test]
    fn test_clause_order() {
        let sql = ranking_query().to_sql(Dialect::DuckDb);
        let select_pos = sql.find("SELECT").unwrap();
        let from_pos = sql.find("\nFROM").unwrap();
        let join_pos = sql.find("\nLEFT OUTER JOIN").unwrap();
        let group_pos = sql.find("\nGROUP BY").unwrap();
        let order_pos = sql.find("\nORDER BY").unwrap();
        let limit_pos = sql.find("\nLIMIT").unwrap();
        assert!(select_pos < from_pos);
        assert!(from_pos < join_pos);
        assert!(join_pos < group_pos);
        assert!(group_pos < order_pos);
        assert!(order_pos < limit_pos);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let q = ranking_query();
        assert_eq!(q.to_sql(Dialect::DuckDb), q.to_sql(Dialect::DuckDb));
        assert_eq!(
            q.clone().to_sql(Dialect::Postgres),
            q.to_sql(Dialect::Postgres)
        );
    }

    #[test]
    fn test_filter_folds_with_and() {
        let q = Query::new()
            .select(vec![SelectExpr::new(col("a"))])
            .from(TableRef::new("t"))
            .filter(col("a").eq(lit_str("x")))
            .filter(col("b").eq(lit_str("y")));
        let sql = q.to_sql(Dialect::DuckDb);
        assert!(sql.contains("WHERE \"a\" = 'x' AND \"b\" = 'y'"));
    }

    #[test]
    fn test_snapshot_shape_has_no_group_by() {
        let q = Query::new()
            .select(vec![sum(table_col("f", "net_value")).alias("total")])
            .from(TableRef::new("fact_sales").with_schema("client_acme").with_alias("f"));
        let sql = q.to_sql(Dialect::DuckDb);
        assert!(!sql.contains("GROUP BY"));
        assert!(!sql.contains("LIMIT"));
    }
}
