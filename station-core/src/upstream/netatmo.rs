use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    config::Config,
    error::{UpstreamError, truncate_body},
    model::{TokenPair, WeatherSnapshot},
};

use super::StationApi;

pub const DEFAULT_BASE_URL: &str = "https://api.netatmo.com";

#[derive(Debug, Clone)]
pub struct NetatmoClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    http: Client,
}

impl NetatmoClient {
    pub fn new(base_url: &str, client_id: String, client_secret: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            http: Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.api_base_url, config.client_id.clone(), config.client_secret.clone())
    }
}

#[derive(Debug, Deserialize)]
struct NaTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NaDashboard {
    #[serde(rename = "Temperature")]
    temperature: Option<f64>,
    #[serde(rename = "Pressure")]
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NaModule {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    dashboard_data: Option<NaDashboard>,
}

#[derive(Debug, Deserialize)]
struct NaDevice {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    dashboard_data: Option<NaDashboard>,
    #[serde(default)]
    modules: Vec<NaModule>,
}

#[derive(Debug, Default, Deserialize)]
struct NaStationsBody {
    #[serde(default)]
    devices: Vec<NaDevice>,
}

#[derive(Debug, Deserialize)]
struct NaStationsResponse {
    #[serde(default)]
    body: NaStationsBody,
}

/// Pick `(temperature, pressure)` out of a station listing.
///
/// Anything missing reads as 0 so the cache always gets a recognizable value.
fn read_measurements(resp: &NaStationsResponse, device_id: &str, module_id: &str) -> (f64, f64) {
    let device = resp.body.devices.iter().find(|d| d.id == device_id);

    let pressure = device
        .and_then(|d| d.dashboard_data.as_ref())
        .and_then(|dash| dash.pressure)
        .unwrap_or(0.0);

    let temperature = device
        .and_then(|d| d.modules.iter().find(|m| m.id == module_id))
        .and_then(|m| m.dashboard_data.as_ref())
        .and_then(|dash| dash.temperature)
        .unwrap_or(0.0);

    if device.is_none() {
        tracing::warn!(device_id, "configured device not present in station data");
    }

    (temperature, pressure)
}

#[async_trait]
impl StationApi for NetatmoClient {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, UpstreamError> {
        let url = format!("{}/oauth2/token", self.base_url);

        let res = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(UpstreamError::Auth { status: status.as_u16(), body: truncate_body(&body) });
        }

        let parsed: NaTokenResponse = serde_json::from_str(&body).map_err(|e| {
            UpstreamError::MalformedResponse(format!("token response is not valid JSON: {e}"))
        })?;

        match (parsed.access_token, parsed.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Ok(TokenPair { access_token, refresh_token }),
            _ => Err(UpstreamError::MalformedResponse(
                "token response lacks access_token or refresh_token".to_string(),
            )),
        }
    }

    async fn fetch_snapshot(
        &self,
        access_token: &str,
        device_id: &str,
        module_id: &str,
    ) -> Result<WeatherSnapshot, UpstreamError> {
        let url = format!("{}/api/getstationsdata", self.base_url);

        let res = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("device_id", device_id),
                ("get_favorites", "false"),
            ])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(UpstreamError::Fetch { status: status.as_u16() });
        }

        let body = res.text().await?;
        let parsed: NaStationsResponse = serde_json::from_str(&body).map_err(|e| {
            UpstreamError::MalformedResponse(format!("station data is not valid JSON: {e}"))
        })?;

        let (temperature, pressure) = read_measurements(&parsed, device_id, module_id);
        Ok(WeatherSnapshot::now(temperature, pressure))
    }
}
