//! Recurring fetch cycle: rotate credentials, read the station, publish.
//!
//! Each tick is independent. A failure is logged and the tick ends without
//! touching the cached snapshot; the next tick starts from scratch.

use serde::Serialize;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    credentials::CredentialManager,
    error::TickError,
    model::WeatherSnapshot,
    snapshot::SnapshotCache,
    upstream::StationApi,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TickState {
    Idle,
    Fetching,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Published(WeatherSnapshot),
    Failed(TickError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub last_tick: TickState,
    pub ticks_ok: u64,
    pub ticks_failed: u64,
}

#[derive(Debug)]
pub struct FetchScheduler {
    credentials: Arc<CredentialManager>,
    api: Arc<dyn StationApi>,
    cache: SnapshotCache,
    device_id: String,
    module_id: String,
    state: watch::Sender<TickState>,
    ticks_ok: AtomicU64,
    ticks_failed: AtomicU64,
}

impl FetchScheduler {
    pub fn new(
        credentials: Arc<CredentialManager>,
        api: Arc<dyn StationApi>,
        cache: SnapshotCache,
        device_id: String,
        module_id: String,
    ) -> Self {
        let (state, _) = watch::channel(TickState::Idle);
        Self {
            credentials,
            api,
            cache,
            device_id,
            module_id,
            state,
            ticks_ok: AtomicU64::new(0),
            ticks_failed: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> TickState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TickState> {
        self.state.subscribe()
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            last_tick: self.state(),
            ticks_ok: self.ticks_ok.load(Ordering::Relaxed),
            ticks_failed: self.ticks_failed.load(Ordering::Relaxed),
        }
    }

    /// Run exactly one fetch cycle. Never panics on upstream failure.
    pub async fn tick(&self) -> TickOutcome {
        self.state.send_replace(TickState::Fetching);

        match self.cycle().await {
            Ok(snapshot) => {
                self.ticks_ok.fetch_add(1, Ordering::Relaxed);
                self.state.send_replace(TickState::Done);
                info!(
                    temperature = snapshot.temperature,
                    pressure = snapshot.pressure,
                    "snapshot published"
                );
                TickOutcome::Published(snapshot)
            }
            Err(e) => {
                self.ticks_failed.fetch_add(1, Ordering::Relaxed);
                self.state.send_replace(TickState::Failed);
                warn!(error = %e, "fetch tick failed, keeping previous snapshot");
                TickOutcome::Failed(e)
            }
        }
    }

    async fn cycle(&self) -> Result<WeatherSnapshot, TickError> {
        let pair = self.credentials.rotate().await?;
        let snapshot = self
            .api
            .fetch_snapshot(&pair.access_token, &self.device_id, &self.module_id)
            .await?;
        self.cache.publish(&snapshot).await?;
        Ok(snapshot)
    }

    /// Tick now and then every `period` until `shutdown` turns true.
    ///
    /// Ticks are spawned, so a stalled tick can still be running when the
    /// next one starts. Credential exchanges stay serialized; the cache keeps
    /// whichever snapshot was written last. All ticks report into the same
    /// [`TickState`], so a slow older tick that fails after a newer one
    /// finished leaves the state (and `/health`) at `failed`.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = period.as_secs(), "fetch scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!("fetch tick");
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.tick().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("fetch scheduler stopped");
    }
}
