use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub log_level: String,
    pub store_config: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            store_config: std::env::var("BACKUP_INFO_CONFIG").ok().map(PathBuf::from),
        }
    }

    /// Server definitions for the metadata store; empty when no file is configured.
    pub fn load_store_config(&self) -> anyhow::Result<backup_info::Config> {
        match &self.store_config {
            Some(path) => backup_info::Config::from_file(path),
            None => {
                tracing::warn!("BACKUP_INFO_CONFIG is not set, no servers are defined");
                Ok(backup_info::Config::default())
            }
        }
    }
}
