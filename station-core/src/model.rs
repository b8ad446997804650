use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Access/refresh token pair issued by the upstream token endpoint.
///
/// The refresh token is single-use: exchanging it invalidates it upstream.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// One reading of the monitored station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub pressure: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl WeatherSnapshot {
    /// Build a snapshot stamped with the current time.
    pub fn now(temperature: f64, pressure: f64) -> Self {
        Self {
            temperature,
            pressure,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}
