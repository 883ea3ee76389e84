use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::models::enums::FileType;
use crate::models::structs::{EffectiveUser, FileInfo, FileQuery, FileRecord};
use crate::references::ReferenceError;

/// Document store. Permission checks live behind this trait; `user` is passed through.
#[async_trait]
pub trait FilesApi: Send + Sync {
    async fn load_file(&self, id: i64, user: &EffectiveUser) -> Result<FileRecord, ReferenceError>;

    async fn get_files(&self, query: &FileQuery, user: &EffectiveUser) -> Result<Vec<FileInfo>, ReferenceError>;
}

/// In-process store used by tests and the CLI. Files marked with `deny` are
/// visible only to the `admin` role.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFiles {
    files: HashMap<i64, FileRecord>,
    denied: HashSet<i64>,
}

impl InMemoryFiles {
    pub fn add_file(
        &mut self,
        id: i64,
        name: &str,
        path: &str,
        file_type: FileType,
        content: serde_json::Value,
    ) -> &mut Self {
        self.files.insert(
            id,
            FileRecord {
                id,
                name: name.to_string(),
                path: path.to_string(),
                file_type,
                content,
                updated_at: Some(chrono::Utc::now()),
            },
        );
        self
    }

    pub fn add_question(&mut self, id: i64, name: &str, path: &str, content: serde_json::Value) -> &mut Self {
        self.add_file(id, name, path, FileType::Question, content)
    }

    pub fn deny(&mut self, id: i64) -> &mut Self {
        self.denied.insert(id);
        self
    }

    fn visible(&self, id: i64, user: &EffectiveUser) -> bool {
        user.role == "admin" || !self.denied.contains(&id)
    }
}

#[async_trait]
impl FilesApi for InMemoryFiles {
    async fn load_file(&self, id: i64, user: &EffectiveUser) -> Result<FileRecord, ReferenceError> {
        let record = self.files.get(&id).ok_or(ReferenceError::NotFound(id))?;
        if !self.visible(id, user) {
            return Err(ReferenceError::AccessDenied(id));
        }
        Ok(record.clone())
    }

    async fn get_files(&self, query: &FileQuery, user: &EffectiveUser) -> Result<Vec<FileInfo>, ReferenceError> {
        let mut out: Vec<FileInfo> = self
            .files
            .values()
            .filter(|f| self.visible(f.id, user))
            .filter(|f| query.file_type.is_none_or(|t| t == f.file_type))
            .filter(|f| {
                query
                    .paths
                    .as_ref()
                    .is_none_or(|paths| paths.iter().any(|p| f.path.starts_with(p.as_str())))
            })
            .map(FileRecord::info)
            .collect();
        out.sort_by_key(|f| f.id);
        Ok(out)
    }
}
