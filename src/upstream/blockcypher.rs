// BlockCypher API. The address endpoint pages by block height: `before=h`
// returns transactions strictly below `h`, newest first.

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::models::{CachedTransaction, ScriptPubKey, TxInput, TxOutput};
use crate::upstream::{
    resolve_all, snippet, LookupCache, PagePosition, SourceKind, Throttle, TransactionSource,
    UpstreamCursor, UpstreamError, UpstreamPage,
};

const PAGE_LIMIT: u32 = 50;
const SATS_PER_COIN: f64 = 100_000_000.0;

const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("mainnet", "Bitcoin", "/btc/main"),
    ("testnet", "Bitcoin", "/btc/test3"),
    ("mainnet", "Litecoin", "/ltc/main"),
];

pub struct BlockcypherSource {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    throttle: Throttle,
    lookups: LookupCache,
}

#[derive(Deserialize)]
struct AddressFull {
    #[serde(default)]
    txs: Vec<BlockcypherTx>,
    #[serde(default, rename = "hasMore")]
    has_more: bool,
}

#[derive(Deserialize)]
struct BlockcypherTx {
    hash: String,
    #[serde(default = "unconfirmed_height")]
    block_height: i64,
    #[serde(default)]
    confirmed: Option<String>,
    #[serde(default)]
    received: Option<String>,
    #[serde(default)]
    inputs: Vec<BlockcypherInput>,
    #[serde(default)]
    outputs: Vec<BlockcypherOutput>,
    #[serde(default)]
    hex: Option<String>,
}

fn unconfirmed_height() -> i64 {
    -1
}

#[derive(Deserialize)]
struct BlockcypherInput {
    #[serde(default)]
    prev_hash: Option<String>,
    #[serde(default)]
    output_index: Option<i64>,
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    witness: Option<Vec<String>>,
    #[serde(default)]
    sequence: Option<u64>,
}

#[derive(Deserialize)]
struct BlockcypherOutput {
    #[serde(default)]
    value: u64,
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    addresses: Option<Vec<String>>,
    #[serde(default)]
    script_type: Option<String>,
}

impl BlockcypherSource {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let path = ENDPOINTS
            .iter()
            .find(|(network, coin, _)| *network == config.blockcypher_network && *coin == config.blockcypher_coin)
            .map(|(_, _, path)| *path)
            .ok_or_else(|| ConfigError::UnsupportedNetwork {
                provider: "blockcypher",
                network: config.blockcypher_network.clone(),
                coin: config.blockcypher_coin.clone(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.rpc_timeout())
            .build()?;

        let endpoint = format!("{}{}", config.blockcypher_url.trim_end_matches('/'), path);
        info!("Initializing BlockCypher client at {}", endpoint);

        Ok(Self {
            client,
            endpoint,
            token: config.blockcypher_token.clone(),
            throttle: Throttle::new(config.rpc_rate_limit),
            lookups: LookupCache::new(config.cache_max_capacity, config.cache_ttl),
        })
    }

    /// `Ok(None)` on HTTP 404.
    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, UpstreamError> {
        self.throttle.ready().await;

        let url = format!("{}/{}", self.endpoint, path.trim_start_matches('/'));
        debug!("Retrieving blockcypher {} {:?}", url, query);

        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Rejected(format!("BlockCypher {}: {}", status, snippet(&body))));
        }

        response.json().await.map(Some).map_err(UpstreamError::from)
    }
}

fn unix_time(timestamp: Option<&str>) -> Option<i64> {
    timestamp
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp())
}

impl From<BlockcypherTx> for CachedTransaction {
    fn from(tx: BlockcypherTx) -> Self {
        let blockheight = Some(tx.block_height).filter(|height| *height >= 0);
        let timestamp = unix_time(tx.confirmed.as_deref())
            .or_else(|| unix_time(tx.received.as_deref()))
            .unwrap_or_default();

        let vin = tx
            .inputs
            .into_iter()
            .map(|input| TxInput {
                txid: input.prev_hash,
                vout: input
                    .output_index
                    .and_then(|index| u32::try_from(index).ok()),
                txinwitness: input.witness.filter(|w| !w.is_empty()),
                sequence: input.sequence,
                ..TxInput::default()
            })
            .collect();

        let vout = tx
            .outputs
            .into_iter()
            .enumerate()
            .map(|(n, output)| TxOutput {
                value: output.value as f64 / SATS_PER_COIN,
                n: n as u32,
                script_pub_key: ScriptPubKey {
                    asm: String::new(),
                    hex: output.script.unwrap_or_default(),
                    script_type: output.script_type,
                    address: output.addresses.and_then(|a| a.into_iter().next()),
                },
                ordinals: None,
                inscriptions: None,
            })
            .collect();

        CachedTransaction {
            address: String::new(),
            txid: tx.hash.clone(),
            hash: tx.hash,
            blockheight,
            timestamp,
            vin,
            vout,
            hex: tx.hex,
            protocol: None,
        }
    }
}

/// Split a listing so no block height straddles two pages.
///
/// When more history exists, transactions at the page's lowest height are
/// held back and the next cursor re-enters at that height. A page made of a
/// single height cannot be split and is returned whole. A page holding only
/// mempool entries continues with the newest confirmed block.
fn split_page(
    mut transactions: Vec<CachedTransaction>,
    has_more: bool,
) -> (Vec<CachedTransaction>, PagePosition) {
    if !has_more {
        return (transactions, PagePosition::Exhausted);
    }

    let Some(lowest) = transactions.iter().filter_map(|tx| tx.blockheight).min() else {
        return (transactions, PagePosition::BelowHeight(i64::MAX));
    };

    let confirmed_above = transactions
        .iter()
        .any(|tx| tx.blockheight.is_some_and(|h| h > lowest));
    if !confirmed_above {
        warn!(
            "Page holds only height {}, transactions past the page limit at that height are skipped",
            lowest
        );
        return (transactions, PagePosition::BelowHeight(lowest));
    }

    transactions.retain(|tx| tx.blockheight.map_or(true, |h| h > lowest));
    (transactions, PagePosition::BelowHeight(lowest + 1))
}

#[async_trait]
impl TransactionSource for BlockcypherSource {
    fn name(&self) -> &'static str {
        "blockcypher"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Explorer
    }

    async fn transactions(&self, address: &str, cursor: UpstreamCursor) -> Result<UpstreamPage, UpstreamError> {
        let mut query = vec![
            ("limit", PAGE_LIMIT.to_string()),
            ("includeHex", "true".to_string()),
        ];
        let requested = cursor.position.clone();
        match requested {
            PagePosition::Start => {}
            PagePosition::BelowHeight(height) => query.push(("before", height.to_string())),
            PagePosition::Page(_) | PagePosition::Exhausted => {
                return Ok(UpstreamPage {
                    transactions: Vec::new(),
                    next: UpstreamCursor::exhausted(),
                })
            }
        }

        let listing: AddressFull = self
            .get(&format!("addrs/{}/full", address), &query)
            .await?
            .unwrap_or(AddressFull {
                txs: Vec::new(),
                has_more: false,
            });

        let listed: Vec<CachedTransaction> = listing.txs.into_iter().map(CachedTransaction::from).collect();
        for transaction in &listed {
            self.lookups.remember(transaction).await;
        }

        let (mut transactions, mut position) = split_page(listed, listing.has_more);
        if position == requested {
            warn!("BlockCypher listing of {} did not advance past {:?}", address, requested);
            position = PagePosition::Exhausted;
        }

        // Carried txids the listing did not mention are resolved one by one
        let missing: Vec<String> = cursor
            .carry
            .into_iter()
            .filter(|txid| !transactions.iter().any(|tx| &tx.txid == txid))
            .collect();
        if !missing.is_empty() {
            let mut carried = resolve_all(self, &missing).await?;
            carried.append(&mut transactions);
            transactions = carried;
        }

        Ok(UpstreamPage {
            transactions,
            next: UpstreamCursor::at(position),
        })
    }

    async fn transaction(&self, txid: &str) -> Result<Option<CachedTransaction>, UpstreamError> {
        if let Some(cached) = self.lookups.get(txid).await {
            return Ok(Some(cached));
        }

        let found: Option<BlockcypherTx> = self
            .get(&format!("txs/{}", txid), &[("includeHex", "true".to_string())])
            .await?;

        let Some(found) = found else {
            return Ok(None);
        };

        let transaction = CachedTransaction::from(found);
        self.lookups.remember(&transaction).await;

        Ok(Some(transaction))
    }
}
