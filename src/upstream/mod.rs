//! Upstream providers of per-address transaction history.
//!
//! Every provider exposes the same two calls: a page of an address's
//! transactions for a cursor, and a single transaction by id. The active
//! provider is chosen once at startup by [`connect`].

pub mod blockcypher;
pub mod indexer;
pub mod lookup_cache;
pub mod sochain;

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::models::CachedTransaction;

pub use blockcypher::BlockcypherSource;
pub use indexer::IndexerSource;
pub use lookup_cache::LookupCache;
pub use sochain::SochainSource;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Indexer process error: {0}")]
    Process(#[from] std::io::Error),

    #[error("Upstream rejected request: {0}")]
    Rejected(String),

    #[error("Malformed upstream response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// The provider answered, but with data we cannot use.
    pub fn is_malformed(&self) -> bool {
        match self {
            UpstreamError::Decode(_) => true,
            UpstreamError::Http(e) => e.is_decode(),
            _ => false,
        }
    }
}

/// Where the next upstream page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePosition {
    Start,
    /// Opaque 1-based page number.
    Page(u32),
    /// Everything strictly below this height.
    BelowHeight(i64),
    Exhausted,
}

/// Provider cursor plus the carry set seeded into the first request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamCursor {
    pub position: PagePosition,
    /// Txids the cache holds as unconfirmed; resolved and prepended to the
    /// first page so an incomplete upstream mempool listing cannot drop them.
    pub carry: Vec<String>,
}

impl UpstreamCursor {
    pub fn start() -> Self {
        Self::seeded(Vec::new())
    }

    pub fn seeded(carry: Vec<String>) -> Self {
        Self {
            position: PagePosition::Start,
            carry,
        }
    }

    pub fn at(position: PagePosition) -> Self {
        Self {
            position,
            carry: Vec::new(),
        }
    }

    pub fn exhausted() -> Self {
        Self::at(PagePosition::Exhausted)
    }

    pub fn is_exhausted(&self) -> bool {
        self.position == PagePosition::Exhausted
    }
}

impl Default for UpstreamCursor {
    fn default() -> Self {
        Self::start()
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamPage {
    pub transactions: Vec<CachedTransaction>,
    pub next: UpstreamCursor,
}

/// How a refresh drives the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Authoritative and incremental on its own: one resync call per refresh.
    Indexer,
    /// Paged block-explorer API: paging loop plus reconciliation.
    Explorer,
}

#[async_trait]
pub trait TransactionSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> SourceKind;

    /// Fetch the page of `address`'s history that `cursor` points at.
    async fn transactions(&self, address: &str, cursor: UpstreamCursor) -> Result<UpstreamPage, UpstreamError>;

    /// Fetch one transaction, `Ok(None)` when the provider does not know it.
    async fn transaction(&self, txid: &str) -> Result<Option<CachedTransaction>, UpstreamError>;
}

/// Build the provider selected by `LOOKUP_MODE`.
pub fn connect(config: &Config) -> Result<Arc<dyn TransactionSource>, ConfigError> {
    let source: Arc<dyn TransactionSource> = match config.lookup_mode.as_str() {
        "indexer" | "utxo" => Arc::new(IndexerSource::new(config)?),
        "sochain" => Arc::new(SochainSource::new(config)?),
        "blockcypher" => Arc::new(BlockcypherSource::new(config)?),
        other => return Err(ConfigError::UnknownLookupMode(other.to_string())),
    };

    info!("Using {} as upstream transaction provider", source.name());
    Ok(source)
}

/// Optional request throttle shared by the HTTP providers.
pub(crate) struct Throttle(Option<DefaultDirectRateLimiter>);

impl Throttle {
    pub(crate) fn new(per_second: Option<u32>) -> Self {
        Self(
            per_second
                .and_then(NonZeroU32::new)
                .map(|rate| RateLimiter::direct(Quota::per_second(rate))),
        )
    }

    pub(crate) async fn ready(&self) {
        if let Some(limiter) = &self.0 {
            limiter.until_ready().await;
        }
    }
}

const DETAIL_CONCURRENCY: usize = 4;

/// Resolve txids one by one through `source`, keeping listing order.
///
/// Unknown ids and undecodable records are skipped; transport failures abort.
pub(crate) async fn resolve_all<S>(source: &S, txids: &[String]) -> Result<Vec<CachedTransaction>, UpstreamError>
where
    S: TransactionSource + ?Sized,
{
    let results: Vec<_> = stream::iter(txids.to_vec())
        .map(|txid| async move {
            let result = source.transaction(&txid).await;
            (txid, result)
        })
        .buffered(DETAIL_CONCURRENCY)
        .collect()
        .await;

    let mut resolved = Vec::with_capacity(results.len());
    for (txid, result) in results {
        match result {
            Ok(Some(transaction)) => resolved.push(transaction),
            Ok(None) => warn!("{} does not know transaction {}", source.name(), txid),
            Err(e) if e.is_malformed() => warn!("Skipping transaction {}: {}", txid, e),
            Err(e) => return Err(e),
        }
    }

    Ok(resolved)
}

/// First few hundred characters of an upstream body, for error messages.
pub(crate) fn snippet(body: &str) -> String {
    body.trim().chars().take(200).collect()
}
