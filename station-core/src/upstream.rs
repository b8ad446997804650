use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::UpstreamError,
    model::{TokenPair, WeatherSnapshot},
};

pub mod netatmo;

pub use netatmo::NetatmoClient;

/// Request/response access to the station API. Implementations never retry.
#[async_trait]
pub trait StationApi: Send + Sync + Debug {
    /// Trade a refresh token for a new pair. The old refresh token is
    /// invalidated upstream as soon as this succeeds.
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, UpstreamError>;

    /// Read the current temperature (from the module) and pressure (from the device).
    async fn fetch_snapshot(
        &self,
        access_token: &str,
        device_id: &str,
        module_id: &str,
    ) -> Result<WeatherSnapshot, UpstreamError>;
}
