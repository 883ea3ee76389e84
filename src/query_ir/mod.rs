//! SQL <-> QueryIR translation.
//!
//! `parser` turns one SELECT into a `QueryIR` or a list of unsupported features;
//! `emitter` renders a `QueryIR` back to canonical SQL. The boundary functions in
//! this module wrap both into the JSON-shaped responses the editor consumes.

pub mod emitter;
pub mod errors;
pub mod ir;
pub mod parser;

pub use emitter::{GenerateOptions, emit_sql};
pub use errors::*;
pub use ir::*;
pub use parser::{ParseOptions, parse_sql_to_ir};

use serde::{Deserialize, Serialize};

use crate::models::enums::DatabaseType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlToIrResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ir: Option<QueryIR>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported_features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl SqlToIrResponse {
    fn from_result(result: Result<QueryIR, QueryIrError>) -> Self {
        match result {
            Ok(ir) => Self { success: true, ir: Some(ir), error: None, unsupported_features: Vec::new(), hint: None },
            Err(e) => {
                log::debug!("sql_to_ir failed: {}", e);
                Self {
                    success: false,
                    ir: None,
                    error: Some(e.summary()),
                    unsupported_features: e.unsupported_features(),
                    hint: e.hint(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrToSqlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IrToSqlResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self { success: false, sql: None, error: Some(error.into()) }
    }
}

/// Parse `sql` for the database named `database_name` (dialect guessed from the name;
/// unknown names use the generic dialect).
pub fn sql_to_ir(sql: &str, database_name: Option<&str>) -> SqlToIrResponse {
    let database_type = DatabaseType::from_name_or(database_name, DatabaseType::Generic);
    sql_to_ir_with(sql, &ParseOptions::for_database(database_type))
}

pub fn sql_to_ir_with(sql: &str, options: &ParseOptions) -> SqlToIrResponse {
    SqlToIrResponse::from_result(parse_sql_to_ir(sql, options))
}

pub fn ir_to_sql(ir: &QueryIR) -> IrToSqlResponse {
    ir_to_sql_with(ir, &GenerateOptions::default())
}

pub fn ir_to_sql_with(ir: &QueryIR, options: &GenerateOptions) -> IrToSqlResponse {
    match emit_sql(ir, options) {
        Ok(sql) => IrToSqlResponse { success: true, sql: Some(sql), error: None },
        Err(e) => {
            log::debug!("ir_to_sql failed: {}", e);
            IrToSqlResponse::failure(e.to_string())
        }
    }
}

/// Generate from an untyped JSON document. A document that does not have the
/// `QueryIR` shape (missing `select`, unknown aggregate, ...) is a failure response.
pub fn ir_value_to_sql(value: serde_json::Value, options: &GenerateOptions) -> IrToSqlResponse {
    match serde_json::from_value::<QueryIR>(value) {
        Ok(ir) => ir_to_sql_with(&ir, options),
        Err(e) => {
            log::debug!("malformed IR document: {}", e);
            IrToSqlResponse::failure(format!("malformed IR: {}", e))
        }
    }
}

pub fn ir_json_to_sql(json: &str, options: &GenerateOptions) -> IrToSqlResponse {
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(value) => ir_value_to_sql(value, options),
        Err(e) => IrToSqlResponse::failure(format!("invalid JSON: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_response_shape() {
        let resp = sql_to_ir("SELECT * FROM users WHERE age BETWEEN 20 AND 30", None);
        assert!(!resp.success);
        assert!(resp.ir.is_none());
        assert!(resp.unsupported_features.contains(&"BETWEEN (use >= and <= instead)".to_string()));
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("unsupportedFeatures").is_some());
        assert!(json.get("hint").is_some());
    }

    #[test]
    fn missing_from_is_failure_not_panic() {
        let resp = ir_json_to_sql(r#"{"version":1,"select":[{"type":"column","column":"a"}]}"#, &GenerateOptions::default());
        assert!(!resp.success);
        assert!(resp.sql.is_none());
        assert!(resp.error.is_some());
    }

    #[test]
    fn dialect_name_selects_parser() {
        let resp = sql_to_ir("SELECT `id` FROM `users`", Some("mysql"));
        assert!(resp.success, "{:?}", resp.error);
    }
}
