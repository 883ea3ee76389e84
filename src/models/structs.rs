use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::enums::FileType;

/// Acting user forwarded to the file store for permission scoping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveUser {
    pub user_id: i64,
    pub email: Option<String>,
    pub role: String,
    pub company_id: Option<i64>,
}

/// Listing entry returned by `FilesApi::get_files`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: i64,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Full document returned by `FilesApi::load_file`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub content: serde_json::Value,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub fn info(&self) -> FileInfo {
        FileInfo {
            id: self.id,
            name: self.name.clone(),
            path: self.path.clone(),
            file_type: self.file_type,
            updated_at: self.updated_at,
        }
    }
}

/// Stored content of a question document; unknown keys are ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionContent {
    #[serde(default)]
    pub query: String,
    #[serde(default, rename = "database_name", alias = "databaseName")]
    pub database_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileQuery {
    #[serde(rename = "type")]
    pub file_type: Option<FileType>,
    pub paths: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub schemas: Vec<SchemaInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub schema: String,
    pub tables: Vec<TableInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table: String,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: Option<String>,
}

impl DatabaseSchema {
    /// Iterate `(schema, table)` pairs in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableInfo)> {
        self.schemas
            .iter()
            .flat_map(|s| s.tables.iter().map(move |t| (s.schema.as_str(), t)))
    }

    /// Case-insensitive table lookup; an explicit schema narrows the search.
    pub fn find_table(&self, schema: Option<&str>, table: &str) -> Option<(&str, &TableInfo)> {
        self.tables().find(|(s, t)| {
            t.table.eq_ignore_ascii_case(table)
                && schema.is_none_or(|wanted| s.eq_ignore_ascii_case(wanted))
        })
    }
}
