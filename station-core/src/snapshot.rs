use std::sync::Arc;

use crate::{
    error::StoreError,
    model::WeatherSnapshot,
    store::{KeyValueStore, get_json, keys, set_json},
};

/// Latest reading, kept under the store's `weatherData` key.
///
/// No expiry: a value stays until the next successful fetch replaces it.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn latest(&self) -> Result<Option<WeatherSnapshot>, StoreError> {
        get_json(self.store.as_ref(), keys::WEATHER_DATA).await
    }

    /// Replace the cached reading. Only the fetch scheduler calls this.
    pub async fn publish(&self, snapshot: &WeatherSnapshot) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), keys::WEATHER_DATA, snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn empty_cache_has_no_snapshot() {
        let cache = SnapshotCache::new(Arc::new(MemoryStore::new()));
        assert_eq!(cache.latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn publish_supersedes_previous_value() {
        let cache = SnapshotCache::new(Arc::new(MemoryStore::new()));
        let first = WeatherSnapshot { temperature: 1.0, pressure: 1000.0, timestamp: 1 };
        let second = WeatherSnapshot { temperature: 2.0, pressure: 1001.0, timestamp: 2 };

        cache.publish(&first).await.unwrap();
        cache.publish(&second).await.unwrap();

        assert_eq!(cache.latest().await.unwrap(), Some(second));
    }
}
