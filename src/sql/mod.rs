//! SQL generation: tokens, dialects, expression AST, and query builder.
//!
//! All SQL leaves the crate through this module. The token layer has no
//! raw-string passthrough, so every identifier is quoted and every
//! literal escaped regardless of where the value came from.

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

pub use dialect::{Dialect, SqlDialect};
pub use expr::{BinaryOperator, Expr, ExprExt, Literal};
pub use query::{Join, JoinType, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use token::{IntervalUnit, Token, TokenStream};
