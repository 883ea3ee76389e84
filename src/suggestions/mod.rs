//! Read-only suggestion helpers for the question builder and SQL editor.
//!
//! Collaborator failures never escape: they are logged and turned into
//! `{success: false, error}` (tables/columns) or fewer candidates (mentions, completions).

pub mod cache;
pub mod completions;
pub mod mentions;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SqlIrConfig;
use crate::models::structs::{DatabaseSchema, TableInfo};
use crate::query_ir::QueryIR;
use crate::services::files::FilesApi;
use crate::services::schema::{SchemaProvider, ServiceError};

pub use cache::{CachedSchemaProvider, SuggestionCache, cache_key};
pub use completions::{CompletionContext, SqlCompletionsResponse, SqlSuggestion, SuggestionKind};
pub use mentions::{MentionItem, MentionKind, MentionsResponse};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSuggestion {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSuggestion {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSuggestionsResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<TableSuggestion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSuggestionsResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnSuggestion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Entry point for every suggestion operation. Cheap to clone.
#[derive(Clone)]
pub struct SuggestionService {
    schemas: Arc<dyn SchemaProvider>,
    files: Arc<dyn FilesApi>,
    default_schema: String,
    mention_limit: usize,
    completion_limit: usize,
}

impl SuggestionService {
    /// Schema lookups go through a `CachedSchemaProvider` sized from `config`.
    pub fn new<P>(schemas: P, files: Arc<dyn FilesApi>, config: &SqlIrConfig) -> Self
    where
        P: SchemaProvider + 'static,
    {
        let cached = CachedSchemaProvider::new(schemas, config.cache_capacity, config.cache_ttl());
        Self::with_provider(Arc::new(cached), files, config)
    }

    /// Use `schemas` as is, without a cache in front.
    pub fn with_provider(schemas: Arc<dyn SchemaProvider>, files: Arc<dyn FilesApi>, config: &SqlIrConfig) -> Self {
        Self {
            schemas,
            files,
            default_schema: config.default_schema.clone(),
            mention_limit: config.mention_limit,
            completion_limit: config.completion_limit,
        }
    }

    async fn load_schema(&self, database_name: &str) -> Result<DatabaseSchema, ServiceError> {
        self.schemas.schema(database_name).await.inspect_err(|e| {
            log::warn!("schema lookup for {} failed: {}", database_name, e);
        })
    }

    fn display_table(&self, schema: &str, table: &str) -> String {
        if schema == self.default_schema || schema.is_empty() {
            table.to_string()
        } else {
            format!("{}.{}", schema, table)
        }
    }

    pub async fn get_table_suggestions(
        &self,
        database_name: &str,
        current_ir: Option<&QueryIR>,
    ) -> TableSuggestionsResponse {
        if current_ir.is_some() {
            log::debug!("table suggestions for {} with IR context", database_name);
        }
        match self.load_schema(database_name).await {
            Ok(schema) => {
                let mut tables: Vec<TableSuggestion> = schema
                    .tables()
                    .map(|(s, t)| TableSuggestion {
                        name: t.table.clone(),
                        schema: (!s.is_empty()).then(|| s.to_string()),
                        display_name: self.display_table(s, &t.table),
                    })
                    .collect();
                tables.sort_by_cached_key(|t| t.display_name.to_lowercase());
                TableSuggestionsResponse { success: true, tables: Some(tables), error: None }
            }
            Err(e) => TableSuggestionsResponse { success: false, tables: None, error: Some(e.to_string()) },
        }
    }

    pub async fn get_column_suggestions(
        &self,
        database_name: &str,
        table: &str,
        schema: Option<&str>,
        current_ir: Option<&QueryIR>,
    ) -> ColumnSuggestionsResponse {
        if current_ir.is_some() {
            log::debug!("column suggestions for {}.{} with IR context", database_name, table);
        }
        let db = match self.load_schema(database_name).await {
            Ok(db) => db,
            Err(e) => {
                return ColumnSuggestionsResponse { success: false, columns: None, error: Some(e.to_string()) };
            }
        };
        let Some((_, info)) = db.find_table(schema, table) else {
            let name = match schema {
                Some(s) => format!("{}.{}", s, table),
                None => table.to_string(),
            };
            return ColumnSuggestionsResponse {
                success: false,
                columns: None,
                error: Some(ServiceError::TableNotFound(name).to_string()),
            };
        };
        ColumnSuggestionsResponse { success: true, columns: Some(column_suggestions(info)), error: None }
    }
}

fn column_suggestions(info: &TableInfo) -> Vec<ColumnSuggestion> {
    let mut columns: Vec<ColumnSuggestion> = info
        .columns
        .iter()
        .map(|c| ColumnSuggestion { name: c.name.clone(), data_type: c.data_type.clone(), display_name: c.name.clone() })
        .collect();
    columns.sort_by_cached_key(|c| c.display_name.to_lowercase());
    columns
}


#[cfg(test)]
mod tests {
    use super::test_support::service;

    #[tokio::test]
    async fn tables_sorted_and_schema_qualified() {
        let resp = service().get_table_suggestions("analytics", None).await;
        assert!(resp.success);
        let names: Vec<String> = resp.tables.unwrap().into_iter().map(|t| t.display_name).collect();
        assert_eq!(names, vec!["audit.Events", "orders", "users"]);
    }

    #[tokio::test]
    async fn missing_database_and_table() {
        let svc = service();
        let resp = svc.get_table_suggestions("nope", None).await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("nope not found"));

        let resp = svc.get_column_suggestions("analytics", "ghosts", None, None).await;
        assert_eq!(resp.error.as_deref(), Some("ghosts not found"));
    }

    #[tokio::test]
    async fn columns_sorted_case_insensitively() {
        let resp = service().get_column_suggestions("analytics", "USERS", Some("public"), None).await;
        let cols: Vec<String> = resp.columns.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(cols, vec!["Email", "id", "name"]);
    }
}
