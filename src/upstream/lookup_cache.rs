//! In-memory cache of upstream transaction lookups using Moka

use std::time::Duration;
use moka::future::Cache;
use crate::models::CachedTransaction;
use tracing::debug;

/// Remembers confirmed transactions fetched by id.
///
/// Confirmed data no longer changes, so a transaction shared by several
/// watched addresses is downloaded once per TTL. Unconfirmed records are
/// never cached; reconciliation must always see the provider's latest view.
#[derive(Clone)]
pub struct LookupCache {
    cache: Cache<String, CachedTransaction>,
}

impl LookupCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, txid: &str) -> Option<CachedTransaction> {
        let result = self.cache.get(txid).await;
        if result.is_some() {
            debug!("Lookup cache hit for {}", txid);
        } else {
            debug!("Lookup cache miss for {}", txid);
        }
        result
    }

    pub async fn remember(&self, transaction: &CachedTransaction) {
        if transaction.is_confirmed() {
            self.cache
                .insert(transaction.txid.clone(), transaction.clone())
                .await;
        }
    }
}
