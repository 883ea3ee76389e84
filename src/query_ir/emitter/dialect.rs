//! Per-database literal and identifier rendering for the generator.
//!
//! Everything structural is canonical; a dialect only decides how identifiers
//! that need quoting are quoted, how strings are escaped and how booleans look.

use sqlparser::keywords::{
    ALL_KEYWORDS, ALL_KEYWORDS_INDEX, Keyword, RESERVED_FOR_COLUMN_ALIAS, RESERVED_FOR_TABLE_ALIAS,
};

use crate::models::enums::{DatabaseType, IdentCase};

/// Keywords that start or join expressions and so cannot stand in for a bare column.
const EXPRESSION_KEYWORDS: &[Keyword] = &[
    Keyword::ALL,
    Keyword::AND,
    Keyword::ANY,
    Keyword::AS,
    Keyword::ASC,
    Keyword::BETWEEN,
    Keyword::BY,
    Keyword::CASE,
    Keyword::CAST,
    Keyword::DESC,
    Keyword::DISTINCT,
    Keyword::ELSE,
    Keyword::EXISTS,
    Keyword::FALSE,
    Keyword::IN,
    Keyword::INTERVAL,
    Keyword::IS,
    Keyword::LIKE,
    Keyword::NOT,
    Keyword::NULL,
    Keyword::OR,
    Keyword::THEN,
    Keyword::TRUE,
    Keyword::WHEN,
];

pub trait SqlDialect: Send + Sync {
    fn db_type(&self) -> DatabaseType;

    /// Wrap an identifier that cannot be emitted bare.
    fn quote_ident_always(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn ident_case(&self) -> IdentCase {
        self.db_type().ident_case()
    }

    /// Quote an identifier unless it reads back unchanged when bare: a plain
    /// `[A-Za-z_][A-Za-z0-9_$]*` word, not reserved, already in the folded case.
    /// `*`, `@reference` names and empty names are emitted verbatim.
    fn quote_ident(&self, ident: &str) -> String {
        let bare_safe = is_plain_ident(ident) && !is_reserved(ident) && self.ident_case().fold(ident) == ident;
        if ident.is_empty() || ident == "*" || is_reference_name(ident) || bare_safe {
            ident.to_string()
        } else {
            self.quote_ident_always(ident)
        }
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    fn emit_boolean(&self, value: bool) -> String {
        if value { "TRUE" } else { "FALSE" }.to_string()
    }
}

fn is_plain_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn is_reserved(ident: &str) -> bool {
    let upper = ident.to_ascii_uppercase();
    let Ok(idx) = ALL_KEYWORDS.binary_search(&upper.as_str()) else {
        return false;
    };
    let keyword = ALL_KEYWORDS_INDEX[idx];
    RESERVED_FOR_COLUMN_ALIAS.contains(&keyword)
        || RESERVED_FOR_TABLE_ALIAS.contains(&keyword)
        || EXPRESSION_KEYWORDS.contains(&keyword)
}

fn is_reference_name(ident: &str) -> bool {
    ident.strip_prefix('@').is_some_and(is_plain_ident)
}

/// ANSI rendering; also used for dialects that share its quoting.
pub struct AnsiDialect(DatabaseType);

impl SqlDialect for AnsiDialect {
    fn db_type(&self) -> DatabaseType {
        self.0
    }
}

pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn quote_ident_always(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
    }
}

pub struct BigQueryDialect;

impl SqlDialect for BigQueryDialect {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::BigQuery
    }

    fn quote_ident_always(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "\\`"))
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

pub struct MssqlDialect;

impl SqlDialect for MssqlDialect {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MsSQL
    }

    fn quote_ident_always(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn emit_boolean(&self, value: bool) -> String {
        if value { "1" } else { "0" }.to_string()
    }
}

pub fn get_dialect(db_type: DatabaseType) -> Box<dyn SqlDialect> {
    match db_type {
        DatabaseType::MySQL => Box::new(MySqlDialect),
        DatabaseType::BigQuery => Box::new(BigQueryDialect),
        DatabaseType::MsSQL => Box::new(MssqlDialect),
        other => Box::new(AnsiDialect(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        let pg = get_dialect(DatabaseType::PostgreSQL);
        assert_eq!(pg.quote_ident("users"), "users");
        assert_eq!(pg.quote_ident("order items"), "\"order items\"");
        assert_eq!(pg.quote_ident("@orders_5"), "@orders_5");
        assert_eq!(pg.quote_ident(""), "");
        let ms = get_dialect(DatabaseType::MsSQL);
        assert_eq!(ms.quote_ident("a]b"), "[a]]b]");
        assert_eq!(ms.emit_boolean(true), "1");
    }

    #[test]
    fn reserved_words_are_quoted() {
        let pg = get_dialect(DatabaseType::PostgreSQL);
        assert_eq!(pg.quote_ident("order"), "\"order\"");
        assert_eq!(pg.quote_ident("from"), "\"from\"");
        assert_eq!(pg.quote_ident("null"), "\"null\"");
        assert_eq!(pg.quote_ident("day"), "day");
        assert_eq!(get_dialect(DatabaseType::MsSQL).quote_ident("order"), "[order]");
        assert_eq!(get_dialect(DatabaseType::MySQL).quote_ident("group"), "`group`");
    }

    #[test]
    fn names_that_would_fold_are_quoted() {
        assert_eq!(get_dialect(DatabaseType::PostgreSQL).quote_ident("UserId"), "\"UserId\"");
        assert_eq!(get_dialect(DatabaseType::Generic).quote_ident("Users"), "\"Users\"");
        assert_eq!(get_dialect(DatabaseType::Snowflake).quote_ident("USERS"), "USERS");
        assert_eq!(get_dialect(DatabaseType::Snowflake).quote_ident("users"), "\"users\"");
        assert_eq!(get_dialect(DatabaseType::MySQL).quote_ident("UserId"), "UserId");
        assert_eq!(get_dialect(DatabaseType::MsSQL).quote_ident("UserId"), "UserId");
    }

    #[test]
    fn string_escaping() {
        assert_eq!(get_dialect(DatabaseType::Generic).quote_string("O'Brien"), "'O''Brien'");
        assert_eq!(get_dialect(DatabaseType::MySQL).quote_string(r"a\b"), r"'a\\b'");
    }
}
