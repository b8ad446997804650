//! Test doubles shared across unit tests.
//!
//! `FakeStationApi` models the upstream rotation rule: a refresh token works
//! exactly once, and each successful exchange issues the next `A<n>`/`R<n>`
//! pair. `FailingStore` is a memory store whose writes to one key fail.

use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashSet, sync::Mutex, time::Duration};

use crate::{
    error::{StoreError, UpstreamError},
    model::{TokenPair, WeatherSnapshot},
    store::{KeyValueStore, MemoryStore},
    upstream::StationApi,
};

#[derive(Debug, Default)]
struct FakeState {
    valid: HashSet<String>,
    issued: u32,
    exchanges: Vec<String>,
    fetches: Vec<String>,
    readings: Vec<Result<(f64, f64), UpstreamError>>,
}

#[derive(Debug, Default)]
pub struct FakeStationApi {
    state: Mutex<FakeState>,
    exchange_delay: Option<Duration>,
    reject_status: Option<u16>,
}

impl FakeStationApi {
    /// Upstream that currently accepts the given refresh tokens.
    pub fn accepting(tokens: &[&str]) -> Self {
        let api = Self::default();
        api.state.lock().unwrap().valid = tokens.iter().map(|t| t.to_string()).collect();
        api
    }

    pub fn with_exchange_delay(mut self, delay: Duration) -> Self {
        self.exchange_delay = Some(delay);
        self
    }

    /// Status returned for unknown refresh tokens. Defaults to 400.
    pub fn rejecting_with(mut self, status: u16) -> Self {
        self.reject_status = Some(status);
        self
    }

    /// Queue the next fetch results, consumed in order. Once drained every
    /// fetch returns the last queued value.
    pub fn push_reading(&self, reading: Result<(f64, f64), UpstreamError>) {
        self.state.lock().unwrap().readings.push(reading);
    }

    /// Invalidate every outstanding refresh token.
    pub fn revoke_all(&self) {
        self.state.lock().unwrap().valid.clear();
    }

    pub fn exchanges(&self) -> Vec<String> {
        self.state.lock().unwrap().exchanges.clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.state.lock().unwrap().fetches.clone()
    }
}

#[async_trait]
impl StationApi for FakeStationApi {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, UpstreamError> {
        self.state.lock().unwrap().exchanges.push(refresh_token.to_string());

        if let Some(delay) = self.exchange_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if !state.valid.remove(refresh_token) {
            return Err(UpstreamError::Auth {
                status: self.reject_status.unwrap_or(400),
                body: r#"{"error":"invalid_grant"}"#.to_string(),
            });
        }

        state.issued += 1;
        let pair = TokenPair {
            access_token: format!("A{}", state.issued),
            refresh_token: format!("R{}", state.issued),
        };
        state.valid.insert(pair.refresh_token.clone());
        Ok(pair)
    }

    async fn fetch_snapshot(
        &self,
        access_token: &str,
        _device_id: &str,
        _module_id: &str,
    ) -> Result<WeatherSnapshot, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.fetches.push(access_token.to_string());

        let reading = if state.readings.len() > 1 {
            state.readings.remove(0)
        } else {
            state.readings.first().cloned().unwrap_or(Ok((0.0, 0.0)))
        };

        reading.map(|(temperature, pressure)| WeatherSnapshot::now(temperature, pressure))
    }
}

#[derive(Debug)]
pub struct FailingStore {
    inner: MemoryStore,
    failing_key: &'static str,
}

impl FailingStore {
    pub fn failing_set(key: &'static str) -> Self {
        Self { inner: MemoryStore::new(), failing_key: key }
    }

    /// Write around the failure, for setting up state.
    pub async fn seed(&self, key: &str, value: &str) {
        self.inner.set(key, Value::from(value)).await.unwrap();
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if key == self.failing_key {
            return Err(StoreError::Io(format!("disk full writing {key}")));
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}
