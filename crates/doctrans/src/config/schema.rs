use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Root of the upload, result, temp and queue directories.
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    pub translator: TranslatorConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Config {
    /// Builds a config with defaults for everything but the service URL and
    /// data directory.
    pub fn new(base_url: impl Into<String>, data_directory: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            data_directory: data_directory.into(),
            worker_count: default_worker_count(),
            translator: TranslatorConfig::new(base_url),
            queue: QueueConfig::default(),
            retention: RetentionConfig::default(),
        }
    }

    /// The data directory with a leading `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        let dir = self.data_directory.as_str();
        if dir == "~" || dir.starts_with("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(dir.trim_start_matches('~').trim_start_matches('/'));
            }
        }
        PathBuf::from(dir)
    }
}

fn default_data_directory() -> String {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("doctrans")
        .to_string_lossy()
        .to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl TranslatorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: None,
            timeout_secs: default_timeout_secs(),
            max_chunk_chars: default_max_chunk_chars(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_api_key_source(&self) -> bool {
        self.api_key.is_some() || self.api_key_file.is_some() || self.api_key_env_var.is_some()
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_chunk_chars() -> usize {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl QueueConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_retention_secs")]
    pub sweep_interval_secs: u64,
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_retention_secs() -> u64 {
    60 * 60
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_retention_secs(),
            sweep_interval_secs: default_retention_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let json = r#"{
            "version": "1.0",
            "translator": { "base_url": "http://localhost:5000" }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.retention.max_age(), Duration::from_secs(3600));
        assert_eq!(config.retention.sweep_interval(), Duration::from_secs(3600));
        assert_eq!(config.translator.timeout(), Duration::from_secs(30));
        assert_eq!(config.translator.max_chunk_chars, 5000);
        assert!(config.worker_count >= 1);
        assert!(config.data_directory.ends_with("doctrans"));
        assert!(!config.translator.has_api_key_source());
    }

    #[test]
    fn test_new_sets_url_and_directory() {
        let config = Config::new("http://translate:5000", "/srv/doctrans");
        assert_eq!(config.translator.base_url, "http://translate:5000");
        assert_eq!(config.data_path(), PathBuf::from("/srv/doctrans"));
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn test_data_path_expands_home() {
        let config = Config::new("http://translate:5000", "~/doctrans-data");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.data_path(), home.join("doctrans-data"));
        }
    }
}
