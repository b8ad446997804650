use anyhow::{Context as _, Result};
use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config,
    credentials::CredentialManager,
    scheduler::FetchScheduler,
    snapshot::SnapshotCache,
    store::{FileStore, KeyValueStore, MemoryStore},
    upstream::{NetatmoClient, StationApi},
};

/// Everything the process shares, built once at startup.
#[derive(Debug)]
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn KeyValueStore>,
    pub credentials: Arc<CredentialManager>,
    pub cache: SnapshotCache,
    pub scheduler: Arc<FetchScheduler>,
}

pub type SharedContext = Arc<AppContext>;

impl AppContext {
    pub fn new(config: Config, store: Arc<dyn KeyValueStore>, api: Arc<dyn StationApi>) -> SharedContext {
        let credentials = Arc::new(CredentialManager::new(
            store.clone(),
            api.clone(),
            config.initial_refresh_token.clone(),
        ));
        let cache = SnapshotCache::new(store.clone());
        let scheduler = Arc::new(FetchScheduler::new(
            credentials.clone(),
            api,
            cache.clone(),
            config.device_id.clone(),
            config.module_id.clone(),
        ));

        Arc::new(Self { config, store, credentials, cache, scheduler })
    }

    /// Wire the real Netatmo client and a durable (or in-memory) store.
    pub async fn from_config(config: Config, ephemeral: bool) -> Result<SharedContext> {
        let store: Arc<dyn KeyValueStore> = if ephemeral {
            info!("using in-memory store, state will not survive restart");
            Arc::new(MemoryStore::new())
        } else {
            let dir = config.resolved_store_dir()?;
            let store = FileStore::open(&dir)
                .await
                .with_context(|| format!("Failed to open store at {}", dir.display()))?;
            info!(dir = %store.dir().display(), "store opened");
            Arc::new(store)
        };

        let api: Arc<dyn StationApi> = Arc::new(NetatmoClient::from_config(&config));
        Ok(Self::new(config, store, api))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::WeatherSnapshot, scheduler::TickOutcome, testing::FakeStationApi};

    #[tokio::test]
    async fn components_share_one_store() {
        let config = Config {
            initial_refresh_token: Some("R0".into()),
            device_id: "dev".into(),
            module_id: "mod".into(),
            ..Config::default()
        };
        let api = Arc::new(FakeStationApi::accepting(&["R0"]));
        api.push_reading(Ok((21.5, 1013.0)));
        let ctx = AppContext::new(config, Arc::new(MemoryStore::new()), api);

        ctx.credentials.bootstrap().await.unwrap();
        let outcome = ctx.scheduler.tick().await;

        let snapshot = match outcome {
            TickOutcome::Published(snapshot) => snapshot,
            other => panic!("tick failed: {other:?}"),
        };
        let cached: Option<WeatherSnapshot> = ctx.cache.latest().await.unwrap();
        assert_eq!(cached, Some(snapshot));
    }

    #[tokio::test]
    async fn from_config_opens_file_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config { store_dir: Some(tmp.path().join("store")), ..Config::default() };

        let ctx = AppContext::from_config(config, false).await.unwrap();

        assert!(tmp.path().join("store").is_dir());
        assert_eq!(ctx.cache.latest().await.unwrap(), None);
    }
}
