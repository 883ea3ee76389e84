//! Cursor-aware completions for the SQL editor.
//!
//! The text is composed with its resolved `@references` first, so clause
//! detection and table scoping see the same statement the database will.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::SuggestionService;
use super::mentions::match_rank;
use crate::models::enums::MentionType;
use crate::models::structs::{DatabaseSchema, EffectiveUser};
use crate::query_ir::{ParseOptions, SelectItem, parse_sql_to_ir};
use crate::references::{ResolvedReference, resolve_and_compose};

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "JOIN", "LEFT", "INNER", "ON", "AND", "OR", "NOT", "NULL", "IS",
    "AS", "DISTINCT", "GROUP", "BY", "HAVING", "ORDER", "ASC", "DESC", "LIMIT", "LIKE", "IN",
    "COUNT", "SUM", "AVG", "MIN", "MAX", "WITH", "TRUE", "FALSE",
];

static PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("parameter pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Table,
    Reference,
    Column,
    Question,
    Parameter,
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlSuggestion {
    pub label: String,
    pub insert_text: String,
    pub kind: SuggestionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlCompletionsResponse {
    pub suggestions: Vec<SqlSuggestion>,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionContext {
    pub database_name: Option<String>,
    pub user: EffectiveUser,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SqlContext {
    Select,
    Table,
    Condition,
    GroupBy,
    OrderBy,
    General,
}

impl SqlContext {
    fn wants_columns(self) -> bool {
        matches!(self, SqlContext::Select | SqlContext::Condition | SqlContext::GroupBy | SqlContext::OrderBy)
    }
}

/// Word under the cursor, including `@`, `:` and `.` so mention, parameter and
/// qualified-column prefixes stay whole. Returns the prefix and its start offset.
fn current_prefix(text: &str, cursor: usize) -> (&str, usize) {
    let cursor = clamp_to_boundary(text, cursor);
    let bytes = text.as_bytes();
    let mut start = cursor;
    while start > 0 {
        let c = bytes[start - 1];
        if c.is_ascii_alphanumeric() || matches!(c, b'_' | b':' | b'@' | b'$' | b'.') {
            start -= 1;
        } else {
            break;
        }
    }
    (&text[start..cursor], start)
}

fn clamp_to_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

fn find_statement_bounds(text: &str, cursor: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    let cursor = cursor.min(bytes.len());
    let start = bytes[..cursor].iter().rposition(|&b| b == b';').map_or(0, |p| p + 1);
    let end = bytes[cursor..].iter().position(|&b| b == b';').map_or(bytes.len(), |p| cursor + p);
    (start, end)
}

fn is_word_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn strip_wrapping_pair(s: &str) -> &str {
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        match (bytes[0], bytes[s.len() - 1]) {
            (b'"', b'"') | (b'`', b'`') | (b'[', b']') => return &s[1..s.len() - 1],
            _ => {}
        }
    }
    s
}

/// A table named after FROM/JOIN, with its alias if one follows.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TableHit {
    pos: usize,
    schema: Option<String>,
    name: String,
    alias: Option<String>,
}

fn skip_ws(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx += 1;
    }
    idx
}

fn parse_table_hit(sql: &str, idx: usize) -> Option<TableHit> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let start = skip_ws(bytes, idx);
    if start >= len || bytes[start] == b'(' {
        return None;
    }
    let mut idx = start;
    while idx < len && (is_word_char(bytes[idx]) || matches!(bytes[idx], b'.' | b'"' | b'`' | b'[' | b']' | b'@')) {
        idx += 1;
    }
    let token = sql[start..idx].trim_end_matches([',', ';']);
    let segments: Vec<&str> = token
        .split('.')
        .map(|seg| strip_wrapping_pair(seg.trim()))
        .filter(|seg| !seg.is_empty())
        .collect();
    let (schema, name) = match segments.as_slice() {
        [] => return None,
        [name] => (None, *name),
        [.., schema, name] => (Some((*schema).to_string()), *name),
    };

    // optional `AS alias` / bare alias
    let mut alias = None;
    let mut j = skip_ws(bytes, idx);
    let word_at = |from: usize| {
        let mut end = from;
        while end < len && is_word_char(bytes[end]) {
            end += 1;
        }
        (&sql[from..end], end)
    };
    let (word, end) = word_at(j);
    if word.eq_ignore_ascii_case("as") {
        j = skip_ws(bytes, end);
        let (w, _) = word_at(j);
        if !w.is_empty() {
            alias = Some(w.to_string());
        }
    } else if !word.is_empty() && !is_clause_word(word) {
        alias = Some(word.to_string());
    }

    Some(TableHit { pos: start, schema, name: name.to_string(), alias })
}

fn is_clause_word(word: &str) -> bool {
    matches!(
        word.to_ascii_uppercase().as_str(),
        "WHERE" | "JOIN" | "LEFT" | "RIGHT" | "INNER" | "OUTER" | "FULL" | "CROSS" | "ON" | "GROUP" | "ORDER"
            | "HAVING" | "LIMIT" | "OFFSET" | "UNION" | "USING" | "NATURAL" | "WINDOW"
    )
}

fn collect_table_hits(sql: &str) -> Vec<TableHit> {
    let lower = sql.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut hits = Vec::new();
    let mut i = 0;
    while i + 4 <= bytes.len() {
        let keyword = bytes[i..].starts_with(b"from") || bytes[i..].starts_with(b"join");
        if keyword
            && (i == 0 || !is_word_char(bytes[i - 1]))
            && (i + 4 >= bytes.len() || !is_word_char(bytes[i + 4]))
        {
            if let Some(hit) = parse_table_hit(sql, i + 4) {
                hits.push(hit);
            }
            i += 4;
            continue;
        }
        i += 1;
    }
    hits
}

/// Tables of the statement around `cursor`: those after the cursor first, then
/// those before it, nearest first.
fn tables_near_cursor(sql: &str, cursor: usize) -> Vec<TableHit> {
    let (stmt_start, stmt_end) = find_statement_bounds(sql, cursor);
    let cursor = cursor.min(sql.len());
    let hits = collect_table_hits(sql);

    let mut below: Vec<&TableHit> = hits.iter().filter(|h| h.pos >= cursor && h.pos < stmt_end).collect();
    below.sort_by_key(|h| h.pos);
    let mut above: Vec<&TableHit> = hits.iter().filter(|h| h.pos < cursor && h.pos >= stmt_start).collect();
    above.sort_by_key(|h| cursor - h.pos);

    let mut seen = HashSet::new();
    below
        .into_iter()
        .chain(above)
        .filter(|h| seen.insert((h.name.to_ascii_lowercase(), h.alias.clone())))
        .cloned()
        .collect()
}

fn detect_ctx(sql: &str, cursor: usize) -> SqlContext {
    let slice = &sql[..clamp_to_boundary(sql, cursor)];
    let mut last = SqlContext::General;
    let mut prev = String::new();
    for tok in slice.split(|c: char| !(c.is_alphanumeric() || c == '_')).filter(|t| !t.is_empty()) {
        let upper = tok.to_ascii_uppercase();
        match upper.as_str() {
            "SELECT" => last = SqlContext::Select,
            "FROM" | "JOIN" => last = SqlContext::Table,
            "WHERE" | "ON" | "HAVING" | "AND" | "OR" => last = SqlContext::Condition,
            "BY" if prev == "GROUP" => last = SqlContext::GroupBy,
            "BY" if prev == "ORDER" => last = SqlContext::OrderBy,
            "LIMIT" | "OFFSET" => last = SqlContext::General,
            _ => {}
        }
        prev = upper;
    }
    last
}

/// Named parameters already present, in order, skipping `::type` casts and the
/// token at `exclude_start`.
fn existing_parameters(sql: &str, exclude_start: usize) -> Vec<String> {
    let bytes = sql.as_bytes();
    let mut out: Vec<String> = Vec::new();
    for caps in PARAM_RE.captures_iter(sql) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else { continue };
        if whole.start() == exclude_start {
            continue;
        }
        if whole.start() > 0 && matches!(bytes[whole.start() - 1], b':' | b'\\') {
            continue;
        }
        if !out.iter().any(|p| p == name.as_str()) {
            out.push(name.as_str().to_string());
        }
    }
    out
}

/// Output columns of a referenced question, when its SQL fits the builder subset.
fn reference_columns(reference: &ResolvedReference) -> Vec<String> {
    let Ok(ir) = parse_sql_to_ir(&reference.query, &ParseOptions::default()) else {
        return Vec::new();
    };
    ir.select
        .iter()
        .filter_map(|item| match item {
            SelectItem::Column(c) if c.column != "*" => Some(c.alias.clone().unwrap_or_else(|| c.column.clone())),
            SelectItem::Aggregate(a) => a.alias.clone(),
            _ => None,
        })
        .collect()
}

struct Collector {
    seen: HashSet<(SuggestionKind, String)>,
    ranked: Vec<(u8, u8, SqlSuggestion)>,
}

impl Collector {
    fn new() -> Self {
        Self { seen: HashSet::new(), ranked: Vec::new() }
    }

    fn push(&mut self, prefix: &str, kind_rank: u8, suggestion: SqlSuggestion) {
        let Some(rank) = match_rank(&suggestion.label, prefix) else { return };
        // keywords only complete on a real prefix match
        if suggestion.kind == SuggestionKind::Keyword && rank > 1 {
            return;
        }
        if self.seen.insert((suggestion.kind, suggestion.label.to_lowercase())) {
            self.ranked.push((rank, kind_rank, suggestion));
        }
    }

    fn finish(mut self, limit: usize) -> Vec<SqlSuggestion> {
        self.ranked.sort_by(|(ra, ka, a), (rb, kb, b)| {
            ra.cmp(rb).then(ka.cmp(kb)).then_with(|| a.label.to_lowercase().cmp(&b.label.to_lowercase()))
        });
        self.ranked.into_iter().map(|(_, _, s)| s).take(limit).collect()
    }
}

fn suggestion(label: &str, kind: SuggestionKind, detail: Option<String>) -> SqlSuggestion {
    SqlSuggestion { label: label.to_string(), insert_text: label.to_string(), kind, detail }
}

fn add_keywords(out: &mut Collector, prefix: &str, kind_rank: u8) {
    for kw in SQL_KEYWORDS {
        out.push(prefix, kind_rank, suggestion(kw, SuggestionKind::Keyword, None));
    }
}

impl SuggestionService {
    pub async fn get_sql_completions(
        &self,
        query: &str,
        cursor_offset: usize,
        context: &CompletionContext,
    ) -> SqlCompletionsResponse {
        let (prefix, prefix_start) = current_prefix(query, cursor_offset);
        let mut out = Collector::new();

        if let Some(partial) = prefix.strip_prefix('@')
            && !partial.contains('.')
        {
            let mentions = self
                .get_mentions(partial, MentionType::Questions, None, &context.user)
                .await;
            for m in mentions.suggestions {
                out.push("", 0, SqlSuggestion {
                    label: m.display,
                    insert_text: m.insert,
                    kind: SuggestionKind::Question,
                    detail: m.id.map(|id| format!("question {}", id)),
                });
            }
            return SqlCompletionsResponse { suggestions: out.finish(self.completion_limit) };
        }

        if let Some(partial) = prefix.strip_prefix(':') {
            if !partial.starts_with(':') {
                for p in existing_parameters(query, prefix_start) {
                    out.push(partial, 0, SqlSuggestion {
                        label: p.clone(),
                        insert_text: format!(":{}", p),
                        kind: SuggestionKind::Parameter,
                        detail: Some("parameter".to_string()),
                    });
                }
            }
            return SqlCompletionsResponse { suggestions: out.finish(self.completion_limit) };
        }

        let (composed, outcome) = resolve_and_compose(query, self.files.as_ref(), &context.user).await;
        let cursor = composed.map_offset(cursor_offset);
        let sql = composed.sql.as_str();

        let schema = match &context.database_name {
            Some(db) => self.load_schema(db).await.ok(),
            None => None,
        };
        let references: HashMap<String, &ResolvedReference> =
            outcome.references.iter().map(|r| (r.alias.to_lowercase(), r)).collect();

        if let Some((qualifier, partial)) = prefix.rsplit_once('.') {
            let qualifier = qualifier.trim_start_matches('@');
            let in_scope = tables_near_cursor(sql, cursor);
            let target = in_scope
                .iter()
                .find(|h| h.alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(qualifier)))
                .or_else(|| in_scope.iter().find(|h| h.name.eq_ignore_ascii_case(qualifier)));
            let (table_schema, table_name) = match target {
                Some(h) => (h.schema.as_deref(), h.name.as_str()),
                // `schema.` or an unscoped table name
                None => (None, qualifier),
            };
            self.push_columns(&mut out, partial, schema.as_ref(), &references, table_schema, table_name);
            if target.is_none()
                && let Some(db) = &schema
            {
                for (s, t) in db.tables().filter(|(s, _)| s.eq_ignore_ascii_case(qualifier)) {
                    out.push(partial, 1, suggestion(&t.table, SuggestionKind::Table, Some(s.to_string())));
                }
            }
            return SqlCompletionsResponse { suggestions: out.finish(self.completion_limit) };
        }

        let ctx = detect_ctx(sql, cursor);
        match ctx {
            SqlContext::Table => {
                for r in &outcome.references {
                    out.push(prefix, 0, SqlSuggestion {
                        label: r.alias.clone(),
                        insert_text: format!("@{}", r.alias),
                        kind: SuggestionKind::Reference,
                        detail: Some(format!("question {}", r.id)),
                    });
                }
                if let Some(db) = &schema {
                    for (s, t) in db.tables() {
                        let display = self.display_table(s, &t.table);
                        out.push(prefix, 1, suggestion(&display, SuggestionKind::Table, None));
                    }
                }
                add_keywords(&mut out, prefix, 2);
            }
            c if c.wants_columns() => {
                for hit in tables_near_cursor(sql, cursor) {
                    self.push_columns(&mut out, prefix, schema.as_ref(), &references, hit.schema.as_deref(), &hit.name);
                }
                add_keywords(&mut out, prefix, 1);
            }
            _ => add_keywords(&mut out, prefix, 0),
        }

        SqlCompletionsResponse { suggestions: out.finish(self.completion_limit) }
    }

    fn push_columns(
        &self,
        out: &mut Collector,
        prefix: &str,
        schema: Option<&DatabaseSchema>,
        references: &HashMap<String, &ResolvedReference>,
        table_schema: Option<&str>,
        table: &str,
    ) {
        if table_schema.is_none()
            && let Some(r) = references.get(&table.to_lowercase())
        {
            for column in reference_columns(r) {
                out.push(prefix, 0, suggestion(&column, SuggestionKind::Column, Some(r.alias.clone())));
            }
            return;
        }
        let Some((_, info)) = schema.and_then(|db| db.find_table(table_schema, table)) else {
            return;
        };
        for c in &info.columns {
            let detail = match &c.data_type {
                Some(t) => format!("{} ({})", info.table, t),
                None => info.table.clone(),
            };
            out.push(prefix, 0, suggestion(&c.name, SuggestionKind::Column, Some(detail)));
        }
    }
}
