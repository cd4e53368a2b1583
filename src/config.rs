//! Runtime configuration: optional TOML file, then environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const ENV_CONFIG_FILE: &str = "MINERAL_SANDS_CONFIG";
pub const ENV_DATA_DIR: &str = "MINERAL_SANDS_DATA_DIR";
pub const ENV_LOG_FILE: &str = "MINERAL_SANDS_LOG_FILE";
pub const ENV_API_KEY: &str = "MINERAL_SANDS_API_KEY";
pub const ENV_FALLBACK_API_KEY: &str = "API_KEY";
pub const ENV_MODEL: &str = "MINERAL_SANDS_MODEL";
pub const ENV_BASE_URL: &str = "MINERAL_SANDS_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "MINERAL_SANDS_TIMEOUT_MS";

pub const DEFAULT_CONFIG_FILE_NAME: &str = "mineral_sands.toml";
pub const DEFAULT_LOG_FILE: &str = "mineral_sands.log";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryConfig {
    /// `None` leaves the dashboard usable; summaries then report the missing key.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Replacement dataset directory; bundled data when `None`.
    pub data_dir: Option<PathBuf>,
    pub log_file: PathBuf,
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("read config file failed ({path}): {message}")]
    ReadFile { path: String, message: String },
    #[error("parse config file failed ({path}): {message}")]
    ParseFile { path: String, message: String },
    #[error("invalid timeout value: {value}")]
    InvalidTimeout { value: String },
}

impl AppConfig {
    /// Config file named by `MINERAL_SANDS_CONFIG`, else `mineral_sands.toml` in
    /// the working directory if present, else the environment alone.
    pub fn from_default_sources() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(ENV_CONFIG_FILE) {
            return Self::from_config_file(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE_NAME);
        if default_path.exists() {
            return Self::from_config_file(default_path);
        }
        Self::from_env()
    }

    /// Keys in the file use the environment variable names and win over the
    /// environment.
    pub fn from_config_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::ReadFile {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let table: toml::Table = toml::from_str(&content).map_err(|err| ConfigError::ParseFile {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

        Self::from_env_with(|key| {
            table
                .get(key)
                .and_then(toml_value_to_string)
                .or_else(|| std::env::var(key).ok())
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_env_with<F>(mut getter: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = |key: &str| getter(key).filter(|v| !v.trim().is_empty());

        let timeout_ms = match get(ENV_TIMEOUT_MS) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout { value })?,
            None => DEFAULT_TIMEOUT_MS,
        };

        Ok(Self {
            data_dir: get(ENV_DATA_DIR).map(PathBuf::from),
            log_file: get(ENV_LOG_FILE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            summary: SummaryConfig {
                api_key: get(ENV_API_KEY).or_else(|| get(ENV_FALLBACK_API_KEY)),
                model: get(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: get(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                timeout_ms,
            },
        })
    }
}

fn toml_value_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(value) => Some(value.clone()),
        toml::Value::Integer(value) => Some(value.to_string()),
        toml::Value::Float(value) => Some(value.to_string()),
        toml::Value::Boolean(value) => Some(value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = AppConfig::from_env_with(|_| None).unwrap();
        assert_eq!(config.data_dir, None);
        assert_eq!(config.log_file, PathBuf::from(DEFAULT_LOG_FILE));
        assert_eq!(config.summary, SummaryConfig::default());
    }

    #[test]
    fn env_values_are_read() {
        let mut vars = BTreeMap::new();
        vars.insert(ENV_DATA_DIR, "/srv/minerals");
        vars.insert(ENV_API_KEY, "secret");
        vars.insert(ENV_MODEL, "gemini-test");
        vars.insert(ENV_TIMEOUT_MS, "1500");

        let config = AppConfig::from_env_with(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/minerals")));
        assert_eq!(config.summary.api_key.as_deref(), Some("secret"));
        assert_eq!(config.summary.model, "gemini-test");
        assert_eq!(config.summary.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.summary.timeout_ms, 1500);
    }

    #[test]
    fn plain_api_key_is_a_fallback() {
        let config = AppConfig::from_env_with(|key| (key == ENV_FALLBACK_API_KEY).then(|| "legacy".to_string())).unwrap();
        assert_eq!(config.summary.api_key.as_deref(), Some("legacy"));

        let config = AppConfig::from_env_with(|key| match key {
            ENV_API_KEY => Some("primary".to_string()),
            ENV_FALLBACK_API_KEY => Some("legacy".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.summary.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = AppConfig::from_env_with(|_| Some("  ".to_string())).unwrap();
        assert_eq!(config.summary.api_key, None);
        assert_eq!(config.summary.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = AppConfig::from_env_with(|key| (key == ENV_TIMEOUT_MS).then(|| "soon".to_string())).unwrap_err();
        assert_eq!(err, ConfigError::InvalidTimeout { value: "soon".into() });
    }

    #[test]
    fn config_file_values_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "MINERAL_SANDS_MODEL = \"gemini-file\"\nMINERAL_SANDS_TIMEOUT_MS = 2500\nMINERAL_SANDS_LOG_FILE = \"/tmp/ms.log\"\n",
        )
        .unwrap();

        let config = AppConfig::from_config_file(&path).unwrap();
        assert_eq!(config.summary.model, "gemini-file");
        assert_eq!(config.summary.timeout_ms, 2500);
        assert_eq!(config.log_file, PathBuf::from("/tmp/ms.log"));
    }

    #[test]
    fn malformed_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "MINERAL_SANDS_MODEL = ").unwrap();
        assert!(matches!(AppConfig::from_config_file(&path), Err(ConfigError::ParseFile { .. })));
        assert!(matches!(
            AppConfig::from_config_file(&dir.path().join("missing.toml")),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
