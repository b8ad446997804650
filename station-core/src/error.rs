//! Error types shared by the store, upstream client, credential manager and scheduler.
//!
//! All of them are `Clone` so a single token exchange outcome can be handed to
//! every caller that waited on it.

use thiserror::Error;

/// Failures talking to the Netatmo API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("token endpoint rejected the refresh token with status {status}: {body}")]
    Auth { status: u16, body: String },

    #[error("station data request failed with status {status}")]
    Fetch { status: u16 },

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Transport(e.to_string())
    }
}

/// Failures of the durable key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(String),

    #[error("store serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// No refresh token in the store and none configured.
    #[error(
        "No refresh token available.\n\
         Hint: set NETATMO_REFRESH_TOKEN or run `station configure`."
    )]
    NoCredentials,

    /// The refresh token was rejected and no usable fallback remains.
    #[error("refresh token rejected, manual re-provisioning required: {0}")]
    InvalidCredentials(UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single fetch tick did not publish a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickError {
    #[error("credential rotation failed: {0}")]
    Credentials(#[from] CredentialError),

    #[error("station fetch failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("could not persist snapshot: {0}")]
    Store(#[from] StoreError),
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
