//! prism: a semantic query compiler and diagnostic orchestrator for
//! multi-tenant star-schema warehouses.
//!
//! A structured business question comes in from the intent parser; what
//! leaves is schema-qualified, injection-proof SQL with row-level
//! security applied, or, for "why did X change" questions, a
//! multi-query root-cause diagnosis.
//!
//! The single-query pipeline runs validation, security filtering,
//! intent planning, AST building, and deterministic rendering, in that
//! order:
//!
//! ```no_run
//! use prism::catalog::Catalog;
//! use prism::compile::{compile, CompileOptions};
//! use prism::query::{Intent, SortSpec, StructuredQuery, TimeWindow};
//! use prism::security::AccessScope;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::from_file("catalogs/nestle.toml")?;
//! let query = StructuredQuery::new(
//!     Intent::Ranking(SortSpec::default()),
//!     "secondary_sales_value",
//!     TimeWindow::Named("last_4_weeks".into()),
//! )
//! .with_group_by(vec!["brand_name"]);
//!
//! let compiled = compile(
//!     &query,
//!     &AccessScope::national(),
//!     &catalog,
//!     &CompileOptions::default(),
//! )?;
//! println!("{}", compiled.sql);
//! # Ok(())
//! # }
//! ```
//!
//! Diagnostic questions go through [`diagnostic::Orchestrator`], which
//! wraps the same pipeline and drives it once per sub-query against an
//! injected [`diagnostic::Executor`].

pub mod builder;
pub mod catalog;
pub mod compile;
pub mod diagnostic;
pub mod plan;
pub mod query;
pub mod security;
pub mod sql;
pub mod validate;

/// Common imports for downstream callers.
pub mod prelude {
    pub use crate::catalog::{Catalog, CatalogRegistry};
    pub use crate::compile::{compile, CompileError, CompileOptions, CompiledSql};
    pub use crate::diagnostic::{
        DiagnosticConfig, DiagnosticResult, Executor, Orchestrator, QueryResult,
    };
    pub use crate::query::{
        FilterValue, Intent, SortDirection, SortSpec, StructuredQuery, TimeWindow, ValueFilter,
    };
    pub use crate::security::{AccessLevel, AccessScope, HierarchyLevel};
    pub use crate::sql::Dialect;
    pub use crate::validate::{validate, ValidationError, ValidationErrorKind};
}
