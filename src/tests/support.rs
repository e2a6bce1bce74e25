//! Shared fixtures: an in-memory store and a scripted upstream provider.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::cache::{AddressCache, CacheSettings};
use crate::db::migration::run_migrations;
use crate::models::{CachedTransaction, ScriptPubKey, TxInput, TxOutput};
use crate::upstream::{
    PagePosition, SourceKind, TransactionSource, UpstreamCursor, UpstreamError, UpstreamPage,
};

pub const ADDRESS: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

/// Fresh schema in a private in-memory database.
///
/// One connection only: every `sqlite::memory:` connection is its own database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

/// Transaction with a witness, raw hex and ordinal annotations.
pub fn tx(txid: &str, blockheight: Option<i64>) -> CachedTransaction {
    CachedTransaction {
        address: String::new(),
        txid: txid.to_string(),
        hash: txid.to_string(),
        blockheight,
        timestamp: 1_700_000_000 + blockheight.unwrap_or(0),
        vin: vec![TxInput {
            txid: Some(format!("{}-prev", txid)),
            vout: Some(0),
            txinwitness: Some(vec!["3044".to_string(), "02ab".to_string()]),
            ..TxInput::default()
        }],
        vout: vec![TxOutput {
            value: 0.0001,
            n: 0,
            script_pub_key: ScriptPubKey {
                asm: String::new(),
                hex: "5120aa".to_string(),
                script_type: Some("witness_v1_taproot".to_string()),
                address: Some(ADDRESS.to_string()),
            },
            ordinals: Some(vec![json!({ "number": 1, "rarity": "common" })]),
            inscriptions: Some(vec![json!({ "id": format!("{}i0", txid) })]),
        }],
        hex: Some("0200".to_string()),
        protocol: None,
    }
}

pub fn txids(transactions: &[CachedTransaction]) -> Vec<&str> {
    transactions.iter().map(|tx| tx.txid.as_str()).collect()
}

pub fn settings(fetch_timeout: Duration) -> CacheSettings {
    CacheSettings {
        fetch_timeout,
        unconfirmed_ttl: Duration::from_secs(14 * 24 * 60 * 60),
    }
}

pub fn address_cache(pool: &SqlitePool, source: Arc<ScriptedSource>, fetch_timeout: Duration) -> AddressCache {
    AddressCache::new(pool.clone(), source, settings(fetch_timeout))
}

/// How the scripted provider answers a lookup by id.
#[derive(Clone)]
pub enum Lookup {
    Found(CachedTransaction),
    Missing,
    Malformed,
    Unavailable,
}

/// Provider answering from a queue of prepared pages.
///
/// Once the queue is drained every listing is an empty, exhausted page.
pub struct ScriptedSource {
    kind: SourceKind,
    delay: Duration,
    failing: bool,
    pages: Mutex<VecDeque<UpstreamPage>>,
    lookups: Mutex<HashMap<String, Lookup>>,
    listings: Mutex<Vec<(String, UpstreamCursor)>>,
    lookup_calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn explorer() -> Self {
        Self::of_kind(SourceKind::Explorer)
    }

    pub fn indexer() -> Self {
        Self::of_kind(SourceKind::Indexer)
    }

    fn of_kind(kind: SourceKind) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
            failing: false,
            pages: Mutex::new(VecDeque::new()),
            lookups: Mutex::new(HashMap::new()),
            listings: Mutex::new(Vec::new()),
            lookup_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn page(self, transactions: Vec<CachedTransaction>, next: PagePosition) -> Self {
        self.pages.lock().unwrap().push_back(UpstreamPage {
            transactions,
            next: UpstreamCursor::at(next),
        });
        self
    }

    pub fn lookup(self, txid: &str, answer: Lookup) -> Self {
        self.lookups.lock().unwrap().insert(txid.to_string(), answer);
        self
    }

    /// Every listing call sleeps this long first.
    pub fn delayed(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    /// Every listing call fails as if the provider were down.
    pub fn failing(self) -> Self {
        Self { failing: true, ..self }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn listings(&self) -> Vec<(String, UpstreamCursor)> {
        self.listings.lock().unwrap().clone()
    }

    pub fn listing_calls(&self) -> usize {
        self.listings.lock().unwrap().len()
    }

    pub fn lookup_calls(&self) -> Vec<String> {
        self.lookup_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn transactions(&self, address: &str, cursor: UpstreamCursor) -> Result<UpstreamPage, UpstreamError> {
        self.listings.lock().unwrap().push((address.to_string(), cursor));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing {
            return Err(UpstreamError::Rejected("provider down".to_string()));
        }

        let next = self.pages.lock().unwrap().pop_front();
        Ok(next.unwrap_or(UpstreamPage {
            transactions: Vec::new(),
            next: UpstreamCursor::exhausted(),
        }))
    }

    async fn transaction(&self, txid: &str) -> Result<Option<CachedTransaction>, UpstreamError> {
        self.lookup_calls.lock().unwrap().push(txid.to_string());

        let answer = self.lookups.lock().unwrap().get(txid).cloned();
        match answer.unwrap_or(Lookup::Missing) {
            Lookup::Found(transaction) => Ok(Some(transaction)),
            Lookup::Missing => Ok(None),
            Lookup::Malformed => Err(UpstreamError::Decode(format!("garbage for {}", txid))),
            Lookup::Unavailable => Err(UpstreamError::Rejected("rate limited".to_string())),
        }
    }
}
