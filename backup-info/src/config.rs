//! Configuration management for the metadata tools.
//!
//! Loads configuration from a TOML file. `RUST_LOG` overrides the log level.

use crate::server::ServerLookup;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root under which each server keeps `<name>/backup/<label>/`
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name used by every command
    pub name: String,

    /// Overrides `<base_dir>/<name>/backup`
    #[serde(default)]
    pub backup_root: Option<PathBuf>,
}

// Default values
fn default_base_dir() -> PathBuf {
    PathBuf::from("/var/lib/pgmoneta")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        for (i, server) in config.servers.iter().enumerate() {
            if server.name.is_empty() {
                anyhow::bail!("server #{} has an empty name", i + 1);
            }
            if config.servers[..i].iter().any(|s| s.name == server.name) {
                anyhow::bail!("server '{}' is defined twice", server.name);
            }
        }
        Ok(config)
    }

    fn server_backup_root(&self, server: &ServerConfig) -> PathBuf {
        server
            .backup_root
            .clone()
            .unwrap_or_else(|| self.store.base_dir.join(&server.name).join("backup"))
    }
}

impl ServerLookup for Config {
    fn backup_root(&self, server: &str) -> Option<PathBuf> {
        self.servers
            .iter()
            .find(|s| s.name == server)
            .map(|s| self.server_backup_root(s))
    }

    fn server_names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(
            r#"
            [store]
            base_dir = "/srv/moneta"

            [log]
            level = "debug"

            [[servers]]
            name = "primary"

            [[servers]]
            name = "replica"
            backup_root = "/mnt/replica-backups"
            "#,
        )
        .unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(
            config.backup_root("primary"),
            Some(PathBuf::from("/srv/moneta/primary/backup"))
        );
        assert_eq!(
            config.backup_root("replica"),
            Some(PathBuf::from("/mnt/replica-backups"))
        );
        assert_eq!(config.backup_root("other"), None);
        assert_eq!(config.server_names(), vec!["primary", "replica"]);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.store.base_dir, PathBuf::from("/var/lib/pgmoneta"));
        assert_eq!(config.log.level, "info");
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_duplicate_server_rejected() {
        let err = Config::from_toml("[[servers]]\nname = \"a\"\n[[servers]]\nname = \"a\"\n").unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }
}
