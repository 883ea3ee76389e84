//! Rewrites `@alias` mentions into a `WITH alias AS (...)` preamble and maps
//! editor offsets from the original text into the composed statement.
//!
//! Offsets are byte offsets into UTF-8 text.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ResolvedReference;

static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").expect("mention pattern"));

/// One `@alias` token in the source text; `start` is the byte offset of the `@`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MentionSpan<'t> {
    pub start: usize,
    pub end: usize,
    pub alias: &'t str,
}

/// Every `@alias` token in order. `@@name`, `word@name` and anything inside
/// quotes or comments are not mentions.
pub fn mention_spans(text: &str) -> Vec<MentionSpan<'_>> {
    let bytes = text.as_bytes();
    let skipped = quoted_ranges(text);
    MENTION_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let alias = caps.get(1)?;
            let start = whole.start();
            if start > 0 {
                let prev = bytes[start - 1];
                if prev == b'@' || prev.is_ascii_alphanumeric() || prev == b'_' {
                    return None;
                }
            }
            if skipped.iter().any(|&(from, to)| start >= from && start < to) {
                return None;
            }
            Some(MentionSpan { start, end: whole.end(), alias: alias.as_str() })
        })
        .collect()
}

/// Byte ranges of quoted strings and identifiers and of comments. An
/// unterminated quote or block comment runs to the end of the text.
fn quoted_ranges(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == q {
                        // a doubled quote escapes itself
                        if bytes.get(i + 1) == Some(&q) {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                out.push((start, i));
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..].iter().position(|&b| b == b'\n').map_or(bytes.len(), |p| i + p);
                out.push((start, i));
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = text[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
                out.push((start, i));
            }
            _ => i += 1,
        }
    }
    out
}

fn spans_for<'t>(text: &'t str, aliases: &HashSet<&str>) -> Vec<MentionSpan<'t>> {
    mention_spans(text).into_iter().filter(|s| aliases.contains(s.alias)).collect()
}

/// Replace `@alias` with `alias` for the given aliases only.
pub fn substitute_mentions(text: &str, aliases: &[String]) -> String {
    let wanted: HashSet<&str> = aliases.iter().map(String::as_str).collect();
    let removed: Vec<(usize, usize)> = spans_for(text, &wanted).iter().map(|s| (s.start, 1)).collect();
    remove_ranges(text, &removed)
}

/// `text` without the sorted, non-overlapping `(start, len)` ranges.
fn remove_ranges(text: &str, removed: &[(usize, usize)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for &(start, len) in removed {
        out.push_str(&text[last..start]);
        last = start + len;
    }
    out.push_str(&text[last..]);
    out
}

/// Result of composing a query with its references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedQuery {
    pub sql: String,
    /// Byte length of the text put in front of the original (0 when nothing was composed).
    pub preamble_len: usize,
    /// Original-text `(start, len)` ranges dropped from the body, ascending:
    /// each inlined mention's `@`, and a leading `WITH` merged into the preamble.
    removed: Vec<(usize, usize)>,
    original_len: usize,
}

impl ComposedQuery {
    /// Map a byte offset in the original text to the same position in `sql`.
    ///
    /// Removed bytes before `offset` shift it left; an offset inside a removed
    /// range lands where that range was. The preamble shifts everything right.
    /// Offsets past the end clamp to the end.
    pub fn map_offset(&self, offset: usize) -> usize {
        let offset = offset.min(self.original_len);
        let shift: usize = self
            .removed
            .iter()
            .take_while(|&&(start, _)| start < offset)
            .map(|&(start, len)| (offset - start).min(len))
            .sum();
        offset + self.preamble_len - shift
    }

    pub fn references_inlined(&self) -> bool {
        self.preamble_len > 0
    }
}

/// Prefix `sql` with one CTE per reference and strip the `@` from their mentions.
///
/// With no references the text is returned untouched. Duplicate aliases keep
/// their first query. When `sql` already opens with `WITH [RECURSIVE]` the
/// references join that list instead of starting a second one.
pub fn compose_cte(sql: &str, references: &[ResolvedReference]) -> ComposedQuery {
    if references.is_empty() {
        return ComposedQuery {
            sql: sql.to_string(),
            preamble_len: 0,
            removed: Vec::new(),
            original_len: sql.len(),
        };
    }

    let mut seen = HashSet::new();
    let ctes: Vec<String> = references
        .iter()
        .filter(|r| seen.insert(r.alias.as_str()))
        .map(|r| format!("{} AS ({})", r.alias, r.query.trim().trim_end_matches(';').trim_end()))
        .collect();

    let mut removed: Vec<(usize, usize)> = spans_for(sql, &seen).iter().map(|s| (s.start, 1)).collect();
    let preamble = match leading_with(sql) {
        Some(head) => {
            removed.push((head.start, head.end - head.start));
            removed.sort_unstable();
            let keyword = if head.recursive { "WITH RECURSIVE" } else { "WITH" };
            format!("{} {},\n", keyword, ctes.join(",\n"))
        }
        None => format!("WITH {}\n", ctes.join(",\n")),
    };

    let body = remove_ranges(sql, &removed);
    log::debug!(
        "composed {} reference(s), preamble {} bytes, {} range(s) removed",
        ctes.len(),
        preamble.len(),
        removed.len()
    );

    ComposedQuery {
        preamble_len: preamble.len(),
        sql: preamble + &body,
        removed,
        original_len: sql.len(),
    }
}

/// A leading `WITH` or `WITH RECURSIVE` keyword run, trailing whitespace included.
struct WithHead {
    start: usize,
    end: usize,
    recursive: bool,
}

fn leading_with(sql: &str) -> Option<WithHead> {
    let start = sql.len() - sql.trim_start().len();
    let after_with = keyword_prefix(&sql[start..], "WITH")?;
    let (rest, recursive) = match keyword_prefix(after_with, "RECURSIVE") {
        Some(after) => (after, true),
        None => (after_with, false),
    };
    Some(WithHead { start, end: sql.len() - rest.len(), recursive })
}

/// The text after `keyword` and its following whitespace, when `text` opens with it.
fn keyword_prefix<'t>(text: &'t str, keyword: &str) -> Option<&'t str> {
    let head = text.get(..keyword.len())?;
    let tail = &text[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && tail.starts_with(char::is_whitespace)).then(|| tail.trim_start())
}
