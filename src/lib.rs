//! SQL <-> QueryIR translation, `@alias` question references and editor suggestions.

pub mod config;
pub mod models;
pub mod query_ir;
pub mod references;
pub mod services;
pub mod suggestions;

pub use config::SqlIrConfig;
pub use query_ir::{QueryIR, QueryIrError, ir_to_sql, sql_to_ir};
pub use references::{ComposedQuery, ResolvedReference, compose_cte};
