//! Refresh/access token lifecycle.
//!
//! The upstream invalidates a refresh token the moment it is exchanged, so two
//! exchanges of the same token break the chain until someone re-provisions it.
//! Every exchange therefore goes through one async mutex. A caller that queued
//! behind an exchange which finished after it arrived takes that exchange's
//! outcome instead of starting its own.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    error::{CredentialError, StoreError, UpstreamError},
    model::TokenPair,
    store::{KeyValueStore, get_json, keys, set_json},
    upstream::StationApi,
};

type Outcome = Result<TokenPair, CredentialError>;

#[derive(Debug, Default)]
struct Rotation {
    last: Option<Outcome>,
}

#[derive(Debug)]
pub struct CredentialManager {
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn StationApi>,
    initial_refresh_token: Option<String>,
    rotation: Mutex<Rotation>,
    /// Number of finished exchanges. Only written while `rotation` is held.
    completed: AtomicU64,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn StationApi>,
        initial_refresh_token: Option<String>,
    ) -> Self {
        Self {
            store,
            api,
            initial_refresh_token,
            rotation: Mutex::new(Rotation::default()),
            completed: AtomicU64::new(0),
        }
    }

    /// Startup handshake: make sure a refresh token exists and prove it works.
    ///
    /// If the stored token is rejected and the configured one differs, the
    /// configured one gets exactly one attempt. An unreadable stored token is
    /// discarded and the configured one is used in its place. When nothing
    /// works both token keys are deleted so the next start fails fast until
    /// re-provisioned.
    pub async fn bootstrap(&self) -> Result<TokenPair, CredentialError> {
        let mut rotation = self.rotation.lock().await;

        let stored = match get_json::<String>(self.store.as_ref(), keys::REFRESH_TOKEN).await {
            Ok(stored) => stored,
            Err(StoreError::Serialization(e)) => {
                // a torn write; the token it held can't be recovered
                warn!(error = %e, "stored refresh token is unreadable, discarding stored credentials");
                self.clear_tokens().await?;
                None
            }
            Err(e) => return Err(e.into()),
        };
        let first = match stored {
            Some(token) => token,
            None => {
                let seed = self
                    .initial_refresh_token
                    .clone()
                    .ok_or(CredentialError::NoCredentials)?;
                info!("seeding refresh token from configuration");
                set_json(self.store.as_ref(), keys::REFRESH_TOKEN, &seed).await?;
                seed
            }
        };

        let exchanged = match self.api.exchange(&first).await {
            Ok(pair) => Ok(pair),
            Err(e) => self.exchange_fallback(&first, e).await,
        };

        let outcome = match exchanged {
            Ok(pair) => self.persist(pair).await,
            Err(e) => {
                error!(error = %e, "bootstrap exchange failed, clearing stored credentials");
                self.clear_tokens().await?;
                Err(CredentialError::InvalidCredentials(e))
            }
        };

        self.finish(&mut rotation, outcome)
    }

    async fn exchange_fallback(
        &self,
        tried: &str,
        first_err: UpstreamError,
    ) -> Result<TokenPair, UpstreamError> {
        match self.initial_refresh_token.as_deref() {
            Some(configured) if configured != tried => {
                warn!(error = %first_err, "stored refresh token rejected, trying configured token");
                self.api.exchange(configured).await
            }
            _ => Err(first_err),
        }
    }

    /// The stored access token if there is one, otherwise a fresh one.
    ///
    /// A present access token is trusted as-is; it is replaced on the next
    /// rotation.
    pub async fn get_valid_access_token(&self) -> Result<String, CredentialError> {
        if let Some(token) = get_json::<String>(self.store.as_ref(), keys::ACCESS_TOKEN).await? {
            return Ok(token);
        }

        let seen = self.completed.load(Ordering::Acquire);
        let mut rotation = self.rotation.lock().await;
        if let Some(shared) = self.shared_outcome(&rotation, seen) {
            return shared.map(|pair| pair.access_token);
        }

        // bootstrap or a rotation may have landed while we queued
        if let Some(token) = get_json::<String>(self.store.as_ref(), keys::ACCESS_TOKEN).await? {
            return Ok(token);
        }

        let outcome = self.exchange_stored().await;
        self.finish(&mut rotation, outcome).map(|pair| pair.access_token)
    }

    /// Exchange the stored refresh token for a new pair, unconditionally.
    pub async fn rotate(&self) -> Result<TokenPair, CredentialError> {
        let seen = self.completed.load(Ordering::Acquire);
        let mut rotation = self.rotation.lock().await;
        if let Some(shared) = self.shared_outcome(&rotation, seen) {
            return shared;
        }

        let outcome = self.exchange_stored().await;
        self.finish(&mut rotation, outcome)
    }

    /// Drop both tokens from the store. The next start has to re-seed.
    pub async fn reset(&self) -> Result<(), CredentialError> {
        let _rotation = self.rotation.lock().await;
        self.clear_tokens().await?;
        info!("stored credentials cleared");
        Ok(())
    }

    fn shared_outcome(&self, rotation: &Rotation, seen: u64) -> Option<Outcome> {
        if self.completed.load(Ordering::Acquire) == seen {
            return None;
        }
        rotation.last.clone()
    }

    async fn exchange_stored(&self) -> Outcome {
        let refresh: String = get_json(self.store.as_ref(), keys::REFRESH_TOKEN)
            .await?
            .ok_or(CredentialError::NoCredentials)?;

        match self.api.exchange(&refresh).await {
            Ok(pair) => self.persist(pair).await,
            Err(e) => {
                warn!(error = %e, "refresh token exchange failed");
                Err(CredentialError::InvalidCredentials(e))
            }
        }
    }

    /// Write the new pair before anyone gets to use it.
    async fn persist(&self, pair: TokenPair) -> Outcome {
        let written = async {
            set_json(self.store.as_ref(), keys::REFRESH_TOKEN, &pair.refresh_token).await?;
            set_json(self.store.as_ref(), keys::ACCESS_TOKEN, &pair.access_token).await
        }
        .await;

        if let Err(e) = written {
            // the old refresh token is already spent upstream
            error!(error = %e, "rotated tokens could not be persisted");
            // never leave the previous access token next to a newer refresh token
            if let Err(cleanup) = self.store.delete(keys::ACCESS_TOKEN).await {
                error!(error = %cleanup, "stale access token could not be removed");
            }
            return Err(e.into());
        }

        info!("credentials rotated");
        Ok(pair)
    }

    async fn clear_tokens(&self) -> Result<(), CredentialError> {
        self.store.delete(keys::REFRESH_TOKEN).await?;
        self.store.delete(keys::ACCESS_TOKEN).await?;
        Ok(())
    }

    fn finish(&self, rotation: &mut Rotation, outcome: Outcome) -> Outcome {
        rotation.last = Some(outcome.clone());
        self.completed.fetch_add(1, Ordering::Release);
        outcome
    }
}
