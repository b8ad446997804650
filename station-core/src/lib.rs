//! Core library for the `station` relay.
//!
//! This crate defines:
//! - Configuration loading (TOML file + environment)
//! - A small durable key-value store
//! - The Netatmo client and the credential lifecycle around its single-use refresh tokens
//! - The scheduled fetch loop and the snapshot cache it feeds
//! - The local HTTP read endpoint
//!
//! It is used by `station-cli`, but can also be embedded in other binaries.

pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod http;
pub mod model;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod upstream;

#[cfg(test)]
mod testing;

pub use config::{Config, Environment};
pub use context::{AppContext, SharedContext};
pub use credentials::CredentialManager;
pub use error::{CredentialError, StoreError, TickError, UpstreamError};
pub use model::{TokenPair, WeatherSnapshot};
pub use scheduler::{FetchScheduler, TickOutcome, TickState};
pub use snapshot::SnapshotCache;
pub use store::KeyValueStore;
pub use upstream::{NetatmoClient, StationApi};
