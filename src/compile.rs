//! The single-query pipeline: validate, secure, plan, build, render.

use thiserror::Error;

use crate::builder::{AstBuilder, BuildError};
use crate::catalog::Catalog;
use crate::plan;
use crate::query::StructuredQuery;
use crate::security::{self, AccessScope};
use crate::sql::{Dialect, Query};
use crate::validate::{validate, ValidationError};

/// Compilation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub dialect: Dialect,
}

/// A compiled statement: the rendered SQL plus the AST it came from.
/// Never stores execution results.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    pub query: Query,
    pub dialect: Dialect,
}

/// Compilation failure.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The query failed semantic validation; all violations included.
    #[error("query failed validation with {} error(s)", .0.len())]
    Invalid(Vec<ValidationError>),

    /// Internal resolution defect, already logged by the builder.
    #[error("internal build failure: {0}")]
    Build(#[from] BuildError),
}

/// Compile a structured query to SQL for one tenant.
///
/// Stages run in fixed order: validation (accumulating all errors),
/// row-level security injection, intent planning, AST building, and
/// deterministic rendering. Validation failure stops everything
/// downstream.
pub fn compile(
    query: &StructuredQuery,
    scope: &AccessScope,
    catalog: &Catalog,
    options: &CompileOptions,
) -> Result<CompiledSql, CompileError> {
    validate(query, catalog).map_err(CompileError::Invalid)?;

    let secured = security::apply(query, scope);
    let planned = plan::plan(&secured, catalog).map_err(CompileError::Invalid)?;
    let ast = AstBuilder::new(catalog).build(&planned)?;
    let sql = ast.to_sql(options.dialect);

    tracing::debug!(
        tenant = catalog.tenant(),
        metric = %query.metric,
        dialect = %options.dialect,
        "compiled query"
    );

    Ok(CompiledSql {
        sql,
        query: ast,
        dialect: options.dialect,
    })
}

// Re-exported here so callers matching on CompileError::Invalid can name
// the kinds without importing validate directly.
pub use crate::validate::ValidationErrorKind;
