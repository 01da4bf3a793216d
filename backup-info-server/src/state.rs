use crate::config::AppConfig;
use backup_info::InfoStore;

pub struct AppState {
    pub config: AppConfig,
    pub store: InfoStore,
}

impl AppState {
    pub fn new(config: AppConfig, store: InfoStore) -> Self {
        Self { config, store }
    }
}
