use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn},
    services::settings_service::SettingsCache,
    storage::ImageStore,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub images: ImageStore,
    pub settings: SettingsCache,
}

impl AppState {
    pub fn new(pool: DbPool, orm: OrmConn, config: AppConfig) -> Self {
        let images = ImageStore::new(config.storage_dir.clone(), config.public_base_url.clone());
        Self {
            pool,
            orm,
            config: Arc::new(config),
            images,
            settings: SettingsCache::default(),
        }
    }
}
