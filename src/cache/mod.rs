//! Read-through cache of per-address transaction history.
//!
//! [`AddressCache::fetch`] serves pages from SQLite and only goes upstream
//! when the requested window is empty. The [`Repeater`] keeps recently
//! requested addresses fresh in the background.

pub mod error;
pub mod merge;
pub mod reader;
pub mod refresh;
pub mod repeater;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::address::touch_address;
use crate::models::{CachedTransaction, TransactionPage};
use crate::options::FetchOptions;
use crate::upstream::TransactionSource;

pub use error::CacheError;
pub use refresh::RefreshReport;
pub use repeater::{CycleOutcome, Repeater, RepeaterSettings};

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    /// How long a cache-miss fetch waits for its refresh.
    pub fetch_timeout: Duration,
    /// Age after which an unconfirmed document the provider no longer knows
    /// is dropped. Zero keeps them forever.
    pub unconfirmed_ttl: Duration,
}

impl CacheSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch_timeout: config.fetch_timeout,
            unconfirmed_ttl: config.unconfirmed_ttl,
        }
    }
}

#[derive(Clone)]
pub struct AddressCache {
    pool: SqlitePool,
    source: Arc<dyn TransactionSource>,
    settings: CacheSettings,
}

impl AddressCache {
    pub fn new(pool: SqlitePool, source: Arc<dyn TransactionSource>, settings: CacheSettings) -> Self {
        Self { pool, source, settings }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn read(&self, address: &str, options: FetchOptions) -> Result<TransactionPage, CacheError> {
        Ok(reader::read(&self.pool, address, options).await?)
    }

    pub async fn merge(&self, address: &str, transactions: Vec<CachedTransaction>) -> Result<usize, CacheError> {
        Ok(merge::merge(&self.pool, address, transactions).await?)
    }

    pub async fn refresh(&self, address: &str) -> Result<RefreshReport, CacheError> {
        refresh::refresh(&self.pool, self.source.as_ref(), address, self.settings.unconfirmed_ttl).await
    }

    /// Serve a page of `address`'s history, refreshing from upstream on a miss.
    ///
    /// A miss waits for the refresh at most `fetch_timeout`; a slower refresh
    /// keeps running and the caller gets whatever has been merged so far.
    pub async fn fetch(&self, address: &str, raw_options: &Value) -> Result<TransactionPage, CacheError> {
        let options = FetchOptions::normalize(raw_options);

        touch_address(&self.pool, address, Utc::now().timestamp()).await?;

        let page = self.read(address, options).await?;
        if !page.transactions.is_empty() {
            debug!("Cache hit for {} ({} transactions)", address, page.transactions.len());
            return Ok(page);
        }

        debug!("Cache miss for {}, refreshing from upstream", address);

        let cache = self.clone();
        let owned = address.to_string();
        let refresh = tokio::spawn(async move {
            let result = cache.refresh(&owned).await;
            if let Err(e) = &result {
                warn!("Refresh of {} failed: {}", owned, e);
            }
            result
        });

        tokio::select! {
            joined = refresh => match joined {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(CacheError::RefreshAborted(e.to_string())),
            },
            _ = tokio::time::sleep(self.settings.fetch_timeout) => {
                info!(
                    "Refresh of {} still running after {:?}, answering from cache",
                    address, self.settings.fetch_timeout
                );
            }
        }

        self.read(address, options).await
    }
}
