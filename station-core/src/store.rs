use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt::Debug;

use crate::error::StoreError;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Keys making up the whole durable state of the process.
pub mod keys {
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const WEATHER_DATA: &str = "weatherData";
}

/// Persistent key-value store with atomic single-key operations.
#[async_trait]
pub trait KeyValueStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Read `key` and decode it into `T`.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

/// Encode `value` and write it under `key`.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.set(key, serde_json::to_value(value)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WeatherSnapshot;

    #[tokio::test]
    async fn typed_helpers_roundtrip_through_store() {
        let store = MemoryStore::new();
        let snapshot = WeatherSnapshot { temperature: 3.5, pressure: 998.0, timestamp: 7 };

        set_json(&store, keys::WEATHER_DATA, &snapshot).await.unwrap();
        let back: Option<WeatherSnapshot> = get_json(&store, keys::WEATHER_DATA).await.unwrap();

        assert_eq!(back, Some(snapshot));
    }

    #[tokio::test]
    async fn get_json_reports_type_mismatch() {
        let store = MemoryStore::new();
        store.set(keys::WEATHER_DATA, Value::from("not a snapshot")).await.unwrap();

        let err = get_json::<WeatherSnapshot>(&store, keys::WEATHER_DATA).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
