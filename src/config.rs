//! Configuration management with YAML support

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::{OrphanPolicy, StoreOptions, DEFAULT_PAGE_SIZE};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Store behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// What deleting a linked session or entry does to its links
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// History listing defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_list_count")]
    pub list_count: usize,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/chatlog/ai_chat_history.db".to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_list_count() -> usize {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            orphan_policy: OrphanPolicy::default(),
            page_size: default_page_size(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            list_count: default_list_count(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./chatlog.yaml (current directory)
    /// 3. <config dir>/chatlog/chatlog.yaml
    pub fn load(path: &str) -> Result<Self> {
        let mut search_paths = vec![
            PathBuf::from(shellexpand::tilde(path).to_string()),
            PathBuf::from("chatlog.yaml"),
        ];
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("chatlog").join("chatlog.yaml"));
        }

        for search_path in &search_paths {
            if search_path.exists() {
                let content = std::fs::read_to_string(search_path)
                    .with_context(|| format!("Failed to read {}", search_path.display()))?;
                let config: Config = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", search_path.display()))?;
                tracing::debug!(path = %search_path.display(), "loaded config");
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            orphan_policy: self.store.orphan_policy,
            page_size: self.store.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.orphan_policy, OrphanPolicy::Allow);
        assert_eq!(config.store.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.history.list_count, 5);
        assert!(config.database.path.ends_with("ai_chat_history.db"));
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
database:
  path: ~/.local/share/chatlog/test.db

store:
  orphan_policy: cascade
  page_size: 16
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.path, "~/.local/share/chatlog/test.db");
        assert_eq!(config.store.orphan_policy, OrphanPolicy::Cascade);
        assert_eq!(config.store.page_size, 16);
        assert_eq!(config.history.list_count, 5);

        let options = config.store_options();
        assert_eq!(options.orphan_policy, OrphanPolicy::Cascade);
        assert_eq!(options.page_size, 16);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let yaml = "store:\n  orphan_policy: sometimes\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "store:\n  orphan_policy: restrict\n").unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.store.orphan_policy, OrphanPolicy::Restrict);
    }
}
