use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug, Default)]
pub enum DatabaseType {
    #[default]
    Generic,
    PostgreSQL,
    MySQL,
    SQLite,
    MsSQL,
    DuckDB,
    BigQuery,
    Snowflake,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Generic => "generic",
            DatabaseType::PostgreSQL => "postgresql",
            DatabaseType::MySQL => "mysql",
            DatabaseType::SQLite => "sqlite",
            DatabaseType::MsSQL => "mssql",
            DatabaseType::DuckDB => "duckdb",
            DatabaseType::BigQuery => "bigquery",
            DatabaseType::Snowflake => "snowflake",
        }
    }

    /// Generic follows the PostgreSQL rule.
    pub fn ident_case(self) -> IdentCase {
        match self {
            DatabaseType::Generic | DatabaseType::PostgreSQL => IdentCase::Lower,
            DatabaseType::Snowflake => IdentCase::Upper,
            DatabaseType::MySQL
            | DatabaseType::SQLite
            | DatabaseType::MsSQL
            | DatabaseType::DuckDB
            | DatabaseType::BigQuery => IdentCase::Preserve,
        }
    }

    /// Resolve a caller supplied database/dialect name, falling back to `fallback` when unknown.
    pub fn from_name_or(name: Option<&str>, fallback: DatabaseType) -> DatabaseType {
        match name {
            Some(n) => n.parse().unwrap_or_else(|_| {
                log::debug!("Unknown database type '{}', using {}", n, fallback);
                fallback
            }),
            None => fallback,
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown database type: {0}")]
pub struct UnknownDatabaseType(pub String);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown mention type: {0}")]
pub struct UnknownMentionType(pub String);

/// How a database treats the case of unquoted identifiers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IdentCase {
    /// Folded to lower case (PostgreSQL).
    Lower,
    /// Folded to upper case (Snowflake).
    Upper,
    /// Kept as written and matched case-insensitively, so quoting never changes meaning.
    Preserve,
}

impl IdentCase {
    pub fn fold(self, ident: &str) -> String {
        match self {
            IdentCase::Lower => ident.to_lowercase(),
            IdentCase::Upper => ident.to_uppercase(),
            IdentCase::Preserve => ident.to_string(),
        }
    }
}

impl FromStr for DatabaseType {
    type Err = UnknownDatabaseType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "generic" | "ansi" => Ok(DatabaseType::Generic),
            "postgres" | "postgresql" | "pg" | "redshift" => Ok(DatabaseType::PostgreSQL),
            "mysql" | "mariadb" => Ok(DatabaseType::MySQL),
            "sqlite" | "sqlite3" => Ok(DatabaseType::SQLite),
            "mssql" | "sqlserver" | "tsql" => Ok(DatabaseType::MsSQL),
            "duckdb" => Ok(DatabaseType::DuckDB),
            "bigquery" | "bq" => Ok(DatabaseType::BigQuery),
            "snowflake" => Ok(DatabaseType::Snowflake),
            other => Err(UnknownDatabaseType(other.to_string())),
        }
    }
}

/// Kinds of documents kept by the file store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Question,
    Dashboard,
    Context,
    Connection,
    Folder,
}

/// Which candidates a mention lookup may return.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum MentionType {
    #[default]
    All,
    Questions,
}

impl FromStr for MentionType {
    type Err = UnknownMentionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(MentionType::All),
            "questions" | "questions-only" => Ok(MentionType::Questions),
            other => Err(UnknownMentionType(other.to_string())),
        }
    }
}
