//! `@alias` mentions of saved questions: extraction, resolution through the
//! file store, and composition into a single CTE-prefixed statement.

pub mod alias;
pub mod compose;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::models::enums::FileType;
use crate::models::structs::{EffectiveUser, QuestionContent};
use crate::services::files::FilesApi;

pub use alias::{ReferencePointer, alias_for, parse_alias, slug};
pub use compose::{ComposedQuery, MentionSpan, compose_cte, mention_spans, substitute_mentions};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("'{0}' is not a valid reference alias (expected name_id)")]
    InvalidAlias(String),
    #[error("question {0} not found")]
    NotFound(i64),
    #[error("access to question {0} denied")]
    AccessDenied(i64),
    #[error("file {0} is not a question")]
    NotAQuestion(i64),
    #[error("question {0} has no query")]
    MissingQuery(i64),
    #[error("file store error: {0}")]
    Storage(String),
}

/// One mention resolved to the referenced question's SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub id: i64,
    pub alias: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedReference {
    pub alias: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    /// In order of first mention.
    pub references: Vec<ResolvedReference>,
    pub skipped: Vec<SkippedReference>,
}

impl ResolutionOutcome {
    pub fn aliases(&self) -> Vec<String> {
        self.references.iter().map(|r| r.alias.clone()).collect()
    }
}

/// Distinct mention aliases in order of first appearance.
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for span in mention_spans(text) {
        if !out.iter().any(|a| a == span.alias) {
            out.push(span.alias.to_string());
        }
    }
    out
}

/// Resolve every mention in `text` through `files`.
///
/// Lookups run concurrently; failures are per alias and end up in `skipped`
/// instead of failing the whole request.
pub async fn resolve_references(
    text: &str,
    files: &dyn FilesApi,
    user: &EffectiveUser,
) -> ResolutionOutcome {
    let mut outcome = ResolutionOutcome::default();
    let mut pointers = Vec::new();
    for alias in extract_mentions(text) {
        match parse_alias(&alias) {
            Ok(p) => pointers.push(p),
            Err(e) => skip(&mut outcome, alias, &e),
        }
    }

    let lookups = pointers.iter().map(|p| load_question(files, p, user));
    let results = join_all(lookups).await;

    for (pointer, result) in pointers.into_iter().zip(results) {
        match result {
            Ok(query) => outcome.references.push(ResolvedReference {
                id: pointer.id,
                alias: pointer.alias,
                query,
            }),
            Err(e) => skip(&mut outcome, pointer.alias, &e),
        }
    }
    outcome
}

fn skip(outcome: &mut ResolutionOutcome, alias: String, err: &ReferenceError) {
    log::warn!("skipping reference @{}: {}", alias, err);
    outcome.skipped.push(SkippedReference { alias, reason: err.to_string() });
}

async fn load_question(
    files: &dyn FilesApi,
    pointer: &ReferencePointer,
    user: &EffectiveUser,
) -> Result<String, ReferenceError> {
    let record = files.load_file(pointer.id, user).await?;
    if record.file_type != FileType::Question {
        return Err(ReferenceError::NotAQuestion(pointer.id));
    }
    let content: QuestionContent = serde_json::from_value(record.content)
        .map_err(|e| ReferenceError::Storage(format!("question {}: {}", pointer.id, e)))?;
    let query = content.query.trim();
    if query.is_empty() {
        return Err(ReferenceError::MissingQuery(pointer.id));
    }
    Ok(query.to_string())
}

/// Resolve the mentions in `text` and compose them into one statement.
pub async fn resolve_and_compose(
    text: &str,
    files: &dyn FilesApi,
    user: &EffectiveUser,
) -> (ComposedQuery, ResolutionOutcome) {
    let outcome = resolve_references(text, files, user).await;
    let composed = compose_cte(text, &outcome.references);
    (composed, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::files::InMemoryFiles;
    use serde_json::json;

    fn user() -> EffectiveUser {
        EffectiveUser { user_id: 1, email: None, role: "viewer".into(), company_id: Some(1) }
    }

    fn store() -> InMemoryFiles {
        let mut files = InMemoryFiles::default();
        files.add_question(5, "Orders", "/org/orders", json!({"query": "SELECT * FROM raw_orders;"}));
        files.add_question(6, "Empty", "/org/empty", json!({"query": "  "}));
        files.add_question(7, "Secret", "/org/secret", json!({"query": "SELECT 1"}));
        files.add_file(8, "Board", "/org/board", FileType::Dashboard, json!({}));
        files.deny(7);
        files
    }

    #[test]
    fn extract_keeps_first_appearance_order() {
        assert_eq!(
            extract_mentions("SELECT * FROM @b_2 JOIN @a_1 ON 1=1 JOIN @b_2 x ON 1=1 WHERE v = @@sys"),
            vec!["b_2".to_string(), "a_1".to_string()]
        );
    }

    #[tokio::test]
    async fn resolves_and_skips_softly() {
        let files = store();
        let text = "SELECT * FROM @orders_5 JOIN @empty_6 ON 1=1 JOIN @secret_7 ON 1=1 \
                    JOIN @board_8 ON 1=1 JOIN @gone_99 ON 1=1 JOIN @nope ON 1=1";
        let out = resolve_references(text, &files, &user()).await;
        assert_eq!(
            out.references,
            vec![ResolvedReference { id: 5, alias: "orders_5".into(), query: "SELECT * FROM raw_orders;".into() }]
        );
        let skipped: Vec<&str> = out.skipped.iter().map(|s| s.alias.as_str()).collect();
        assert_eq!(skipped, vec!["nope", "empty_6", "secret_7", "board_8", "gone_99"]);
    }

    #[tokio::test]
    async fn compose_after_resolution() {
        let files = store();
        let (composed, outcome) = resolve_and_compose("SELECT * FROM @orders_5", &files, &user()).await;
        assert_eq!(outcome.aliases(), vec!["orders_5".to_string()]);
        assert_eq!(composed.sql, "WITH orders_5 AS (SELECT * FROM raw_orders)\nSELECT * FROM orders_5");
    }
}
