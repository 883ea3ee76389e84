//! `@name_id` naming convention for saved-question mentions.

use super::ReferenceError;

/// Parsed `@alias`: the slug part and the question id it points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePointer {
    pub alias: String,
    pub slug: String,
    pub id: i64,
}

/// Lowercase, ASCII alphanumerics kept, every other run collapsed to one `_`, trimmed.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Alias under which question `id` named `name` is mentioned.
pub fn alias_for(name: &str, id: i64) -> String {
    let s = slug(name);
    if s.is_empty() { format!("query_{}", id) } else { format!("{}_{}", s, id) }
}

/// Split `orders_by_day_42` into slug `orders_by_day` and id 42.
pub fn parse_alias(alias: &str) -> Result<ReferencePointer, ReferenceError> {
    let invalid = || ReferenceError::InvalidAlias(alias.to_string());
    let (slug_part, id_part) = alias.rsplit_once('_').ok_or_else(invalid)?;
    if slug_part.is_empty() || id_part.is_empty() || !id_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let id: i64 = id_part.parse().map_err(|_| invalid())?;
    Ok(ReferencePointer { alias: alias.to_string(), slug: slug_part.to_string(), id })
}
