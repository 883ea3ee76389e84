use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::structs::DatabaseSchema;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0} not found")]
    DatabaseNotFound(String),
    #[error("{0} not found")]
    TableNotFound(String),
    #[error("schema lookup failed: {0}")]
    Upstream(String),
}

/// Schema introspection for a named connection.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn schema(&self, database_name: &str) -> Result<DatabaseSchema, ServiceError>;
}

/// Fixed schemas keyed by connection name.
#[derive(Debug, Clone, Default)]
pub struct MemorySchemaProvider {
    databases: HashMap<String, DatabaseSchema>,
}

impl MemorySchemaProvider {
    pub fn with_database(mut self, name: impl Into<String>, schema: DatabaseSchema) -> Self {
        self.databases.insert(name.into(), schema);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: DatabaseSchema) {
        self.databases.insert(name.into(), schema);
    }
}

#[async_trait]
impl SchemaProvider for MemorySchemaProvider {
    async fn schema(&self, database_name: &str) -> Result<DatabaseSchema, ServiceError> {
        self.databases
            .get(database_name)
            .cloned()
            .ok_or_else(|| ServiceError::DatabaseNotFound(database_name.to_string()))
    }
}
