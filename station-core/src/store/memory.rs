use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreError;

use super::KeyValueStore;

/// In-process store. State is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_overwrites_and_delete_removes() {
        let store = MemoryStore::new();

        store.set("refreshToken", Value::from("R0")).await.unwrap();
        store.set("refreshToken", Value::from("R1")).await.unwrap();
        assert_eq!(store.get("refreshToken").await.unwrap(), Some(Value::from("R1")));

        store.delete("refreshToken").await.unwrap();
        assert_eq!(store.get("refreshToken").await.unwrap(), None);

        // deleting again is a no-op
        store.delete("refreshToken").await.unwrap();
    }
}
