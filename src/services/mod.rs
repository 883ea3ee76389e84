//! Collaborators the core consumes: the file store and schema introspection.

pub mod files;
pub mod schema;

pub use files::{FilesApi, InMemoryFiles};
pub use schema::{MemorySchemaProvider, SchemaProvider, ServiceError};
