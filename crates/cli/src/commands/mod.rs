pub mod chat;
pub mod serve;
pub mod threads;

use std::sync::Arc;
use threadline_config::AppConfig;
use threadline_core::store::TranscriptStore;
use threadline_store::SqliteStore;

/// Open the configured transcript store, creating the database on demand.
pub(crate) async fn open_store(
    config: &AppConfig,
) -> Result<Arc<dyn TranscriptStore>, Box<dyn std::error::Error>> {
    let db_url = if config.store.path.starts_with("sqlite:") {
        config.store.path.clone()
    } else {
        if let Some(parent) = std::path::Path::new(&config.store.path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        format!("sqlite://{}", config.store.path)
    };
    Ok(Arc::new(SqliteStore::new(&db_url).await?))
}
