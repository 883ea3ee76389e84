use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::models::enums::DatabaseType;

const CONFIG_FILE: &str = "config.json";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlIrConfig {
    pub default_database_type: DatabaseType,
    /// Tables in this schema are displayed without a schema prefix.
    pub default_schema: String,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub mention_limit: usize,
    pub completion_limit: usize,
    pub pretty_sql: bool,
}

impl Default for SqlIrConfig {
    fn default() -> Self {
        Self {
            default_database_type: DatabaseType::Generic,
            default_schema: "public".to_string(),
            cache_capacity: 64,
            cache_ttl_secs: 300,
            mention_limit: 20,
            completion_limit: 50,
            pretty_sql: false,
        }
    }
}

/// `<config dir>/sqlir`, falling back to the working directory.
pub fn config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("sqlir");
    path
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

impl SqlIrConfig {
    /// Defaults, then the JSON file (default location unless `path` is given), then `SQLIR_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let mut config = Self::from_file(&path)?.unwrap_or_default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// `Ok(None)` when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config file at {}, using defaults", path.display());
                return Ok(None);
            }
            Err(source) => return Err(ConfigError::Io { path: path.to_path_buf(), source }),
        };
        let config = serde_json::from_str(&content)
            .map_err(|source| ConfigError::Json { path: path.to_path_buf(), source })?;
        info!("Loaded config from {}", path.display());
        Ok(Some(config))
    }

    /// Apply `SQLIR_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SQLIR_DEFAULT_DATABASE") {
            self.default_database_type = v.parse().map_err(|_| invalid("SQLIR_DEFAULT_DATABASE", &v))?;
        }
        if let Some(v) = lookup("SQLIR_DEFAULT_SCHEMA") {
            self.default_schema = v;
        }
        if let Some(v) = lookup("SQLIR_CACHE_CAPACITY") {
            self.cache_capacity = parse_num("SQLIR_CACHE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("SQLIR_CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_num("SQLIR_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("SQLIR_MENTION_LIMIT") {
            self.mention_limit = parse_num("SQLIR_MENTION_LIMIT", &v)?;
        }
        if let Some(v) = lookup("SQLIR_COMPLETION_LIMIT") {
            self.completion_limit = parse_num("SQLIR_COMPLETION_LIMIT", &v)?;
        }
        if let Some(v) = lookup("SQLIR_PRETTY_SQL") {
            self.pretty_sql = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => return Err(invalid("SQLIR_PRETTY_SQL", &v)),
            };
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn env_overrides_apply_on_top_of_defaults() {
        let mut c = SqlIrConfig::default();
        c.apply_overrides(lookup(&[
            ("SQLIR_DEFAULT_DATABASE", "postgres"),
            ("SQLIR_MENTION_LIMIT", "5"),
            ("SQLIR_PRETTY_SQL", "yes"),
        ]))
        .unwrap();
        assert_eq!(c.default_database_type, DatabaseType::PostgreSQL);
        assert_eq!(c.mention_limit, 5);
        assert!(c.pretty_sql);
        assert_eq!(c.default_schema, "public");
    }

    #[test]
    fn bad_values_are_errors() {
        let mut c = SqlIrConfig::default();
        let err = c.apply_overrides(lookup(&[("SQLIR_CACHE_CAPACITY", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(c.apply_overrides(lookup(&[("SQLIR_DEFAULT_DATABASE", "oracle")])).is_err());
    }

    #[test]
    fn missing_file_is_none_and_partial_file_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("sqlir-config-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let _ = fs::remove_file(&path);
        assert!(SqlIrConfig::from_file(&path).unwrap().is_none());

        fs::write(&path, r#"{"default_schema": "analytics", "completion_limit": 10}"#).unwrap();
        let c = SqlIrConfig::from_file(&path).unwrap().unwrap();
        assert_eq!(c.default_schema, "analytics");
        assert_eq!(c.completion_limit, 10);
        assert_eq!(c.cache_capacity, 64);

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(SqlIrConfig::from_file(&path), Err(ConfigError::Json { .. })));
        let _ = fs::remove_dir_all(&dir);
    }
}
