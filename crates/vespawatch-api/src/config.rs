use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use thiserror::Error;
use vespawatch_core::config::SyncSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    pub sync: SyncSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "VESPAWATCH_API_BIND_ADDR", "127.0.0.1:8080");
        let db_path =
            PathBuf::from(value_or_default(&lookup, "VESPAWATCH_DB_PATH", "vespawatch.db"));
        let media_dir = PathBuf::from(value_or_default(&lookup, "VESPAWATCH_MEDIA_DIR", "media"));
        let sync = SyncSettings::from_lookup(&lookup)
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;

        Ok(Self {
            bind_addr,
            db_path,
            media_dir,
            sync,
        })
    }
}

fn value_or_default(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("vespawatch.db"));
        assert_eq!(config.media_dir, PathBuf::from("media"));
        assert_eq!(config.sync.push_time_zone_label, "Brussels");
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = AppConfig::from_lookup(|name| match name {
            "VESPAWATCH_API_BIND_ADDR" => Some("0.0.0.0:9000".to_string()),
            "VESPAWATCH_PROJECT_ID" => Some("77".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.sync.project_id, 77);
    }

    #[test]
    fn test_invalid_sync_settings_are_rejected() {
        let result = AppConfig::from_lookup(|name| match name {
            "VESPAWATCH_PROJECT_ID" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert!(result.is_err());
    }
}
