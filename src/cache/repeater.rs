// Background refresh of recently requested addresses.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::{AddressCache, CacheError};
use crate::config::Config;
use crate::db::address::addresses_requested_since;

#[derive(Debug, Clone, Copy)]
pub struct RepeaterSettings {
    pub interval: Duration,
    /// Only addresses requested within this window are refreshed.
    pub freshness_window: Duration,
    /// A cycle touching this many addresses is followed immediately by the next.
    pub busy_threshold: usize,
}

impl RepeaterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.repeater_interval,
            freshness_window: config.freshness_window,
            busy_threshold: config.repeater_busy_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle held the lock.
    Skipped,
    Completed { refreshed: usize, failed: usize },
}

pub struct Repeater {
    cache: AddressCache,
    settings: RepeaterSettings,
    running: Mutex<()>,
}

impl Repeater {
    pub fn new(cache: AddressCache, settings: RepeaterSettings) -> Self {
        Self {
            cache,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Run one cycle now unless one is already in flight.
    pub async fn trigger(&self) -> Result<CycleOutcome, CacheError> {
        let Ok(_guard) = self.running.try_lock() else {
            info!("Repeater cycle already running, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        self.run_cycle().await
    }

    async fn run_cycle(&self) -> Result<CycleOutcome, CacheError> {
        let since = Utc::now().timestamp() - self.settings.freshness_window.as_secs() as i64;
        let addresses = addresses_requested_since(self.cache.pool(), since).await?;

        debug!("Repeater cycle over {} addresses", addresses.len());

        let mut refreshed = 0;
        let mut failed = 0;
        for address in &addresses {
            match self.cache.refresh(address).await {
                Ok(_) => refreshed += 1,
                Err(e) => {
                    error!("Background refresh of {} failed: {}", address, e);
                    failed += 1;
                }
            }
        }

        Ok(CycleOutcome::Completed { refreshed, failed })
    }

    /// Spawn the repeater loop; it stops once `shutdown` is cancelled.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Starting background repeater (interval {:?}, freshness window {:?})",
                self.settings.interval, self.settings.freshness_window
            );

            loop {
                let busy = match self.trigger().await {
                    Ok(CycleOutcome::Completed { refreshed, failed }) => {
                        if refreshed + failed > 0 {
                            info!("Repeater cycle done: {} refreshed, {} failed", refreshed, failed);
                        }
                        self.settings.busy_threshold > 0 && refreshed + failed >= self.settings.busy_threshold
                    }
                    Ok(CycleOutcome::Skipped) => false,
                    Err(e) => {
                        error!("Repeater cycle failed: {}", e);
                        false
                    }
                };

                if shutdown.is_cancelled() {
                    break;
                }
                if busy {
                    continue;
                }

                tokio::select! {
                    _ = sleep(self.settings.interval) => {}
                    _ = shutdown.cancelled() => break,
                }
            }

            info!("Background repeater stopped");
        })
    }
}
