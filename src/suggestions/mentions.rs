use serde::{Deserialize, Serialize};

use super::SuggestionService;
use crate::models::enums::{FileType, MentionType};
use crate::models::structs::{EffectiveUser, FileQuery};
use crate::references::alias_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionKind {
    Question,
    Dashboard,
    Table,
}

/// A mention candidate. Questions insert `@alias` (composable as a CTE);
/// dashboards and tables insert the `@@` form, which is never composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionItem {
    #[serde(rename = "type")]
    pub kind: MentionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub display: String,
    pub insert: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionsResponse {
    pub suggestions: Vec<MentionItem>,
}

/// Lower is better; `None` means no match.
pub(crate) fn match_rank(candidate: &str, prefix: &str) -> Option<u8> {
    if prefix.is_empty() {
        return Some(1);
    }
    let c = candidate.to_lowercase();
    let p = prefix.to_lowercase();
    if c == p {
        Some(0)
    } else if c.starts_with(&p) {
        Some(1)
    } else if c
        .match_indices(&p)
        .any(|(i, _)| c[..i].ends_with(|ch: char| ch == '_' || ch == ' ' || ch == '.'))
    {
        Some(2)
    } else if c.contains(&p) {
        Some(3)
    } else {
        None
    }
}

impl SuggestionService {
    pub async fn get_mentions(
        &self,
        prefix: &str,
        mention_type: MentionType,
        database_name: Option<&str>,
        user: &EffectiveUser,
    ) -> MentionsResponse {
        let prefix = prefix.trim_start_matches('@');
        let mut ranked: Vec<(u8, MentionItem)> = Vec::new();

        match self.files.get_files(&FileQuery::default(), user).await {
            Ok(files) => {
                for f in files {
                    let kind = match f.file_type {
                        FileType::Question => MentionKind::Question,
                        FileType::Dashboard if mention_type == MentionType::All => MentionKind::Dashboard,
                        _ => continue,
                    };
                    let alias = alias_for(&f.name, f.id);
                    let Some(rank) = match_rank(&f.name, prefix).or_else(|| match_rank(&alias, prefix)) else {
                        continue;
                    };
                    let insert = match kind {
                        MentionKind::Question => format!("@{}", alias),
                        _ => format!("@@{}", alias),
                    };
                    ranked.push((
                        rank,
                        MentionItem { kind, id: Some(f.id), name: f.name.clone(), schema: None, display: f.name, insert },
                    ));
                }
            }
            Err(e) => log::warn!("listing files for mentions failed: {}", e),
        }

        if mention_type == MentionType::All
            && let Some(db) = database_name
            && let Ok(schema) = self.load_schema(db).await
        {
            for (s, t) in schema.tables() {
                let display = self.display_table(s, &t.table);
                let Some(rank) = match_rank(&t.table, prefix).or_else(|| match_rank(&display, prefix)) else {
                    continue;
                };
                ranked.push((
                    rank,
                    MentionItem {
                        kind: MentionKind::Table,
                        id: None,
                        name: t.table.clone(),
                        schema: (!s.is_empty()).then(|| s.to_string()),
                        insert: format!("@@{}", display),
                        display,
                    },
                ));
            }
        }

        ranked.sort_by(|(ra, a), (rb, b)| {
            ra.cmp(rb)
                .then_with(|| kind_order(a.kind).cmp(&kind_order(b.kind)))
                .then_with(|| a.display.to_lowercase().cmp(&b.display.to_lowercase()))
        });
        let suggestions = ranked.into_iter().map(|(_, item)| item).take(self.mention_limit).collect();
        MentionsResponse { suggestions }
    }
}

fn kind_order(kind: MentionKind) -> u8 {
    match kind {
        MentionKind::Question => 0,
        MentionKind::Table => 1,
        MentionKind::Dashboard => 2,
    }
}
