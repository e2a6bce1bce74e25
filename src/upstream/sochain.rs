// SoChain block explorer API. Listings are paged by an opaque page number;
// every listed hash is resolved to a full transaction separately.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{Config, ConfigError};
use crate::models::{CachedTransaction, ScriptPubKey, TxInput, TxOutput};
use crate::upstream::{
    resolve_all, snippet, LookupCache, PagePosition, SourceKind, Throttle, TransactionSource,
    UpstreamCursor, UpstreamError, UpstreamPage,
};

const SUPPORTED: &[(&str, &str)] = &[
    ("BTC", "Bitcoin"),
    ("BTCTEST", "Bitcoin"),
    ("LTC", "Litecoin"),
    ("LTCTEST", "Litecoin"),
];

pub struct SochainSource {
    client: reqwest::Client,
    endpoint: String,
    network: String,
    token: Option<String>,
    throttle: Throttle,
    lookups: LookupCache,
}

#[derive(Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    transactions: Vec<Listed>,
}

#[derive(Deserialize)]
struct Listed {
    #[serde(default)]
    hash: Option<String>,
}

#[derive(Deserialize)]
struct SochainTransaction {
    hash: String,
    #[serde(default, alias = "block_no")]
    block: Option<i64>,
    #[serde(default)]
    confirmations: Option<i64>,
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    inputs: Vec<SochainInput>,
    #[serde(default)]
    outputs: Vec<SochainOutput>,
    #[serde(default, alias = "tx_hex")]
    raw_tx: Option<String>,
}

#[derive(Deserialize)]
struct SochainInput {
    #[serde(default)]
    from_output: Option<Outpoint>,
    #[serde(default)]
    witness: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct Outpoint {
    txid: String,
    output_no: u32,
}

#[derive(Deserialize)]
struct SochainOutput {
    #[serde(default, alias = "output_no")]
    index: u32,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    address: Option<String>,
    #[serde(default, rename = "type")]
    script_type: Option<String>,
    #[serde(default)]
    script: Option<String>,
}

impl SochainSource {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let supported = SUPPORTED
            .iter()
            .any(|(network, coin)| *network == config.sochain_network && *coin == config.sochain_coin);
        if !supported {
            return Err(ConfigError::UnsupportedNetwork {
                provider: "sochain",
                network: config.sochain_network.clone(),
                coin: config.sochain_coin.clone(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.rpc_timeout())
            .build()?;

        info!("Initializing SoChain client for {} at {}", config.sochain_network, config.sochain_url);

        Ok(Self {
            client,
            endpoint: config.sochain_url.trim_end_matches('/').to_string(),
            network: config.sochain_network.clone(),
            token: config.sochain_token.clone(),
            throttle: Throttle::new(config.rpc_rate_limit),
            lookups: LookupCache::new(config.cache_max_capacity, config.cache_ttl),
        })
    }

    /// `Ok(None)` on HTTP 404.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, UpstreamError> {
        self.throttle.ready().await;

        let url = format!("{}/{}", self.endpoint, path.trim_start_matches('/'));
        debug!("Retrieving sochain {}", url);

        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.header("API-KEY", token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await?;

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::Decode(format!("{}: {}", e, snippet(&body))))?;

        if envelope.status == "fail" {
            let message = envelope.data["error_message"]
                .as_str()
                .unwrap_or("request failed")
                .to_string();
            return Err(UpstreamError::Rejected(format!("SoChain: {}", message)));
        }

        serde_json::from_value(envelope.data)
            .map(Some)
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

fn output_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.parse().unwrap_or_default(),
        _ => 0.0,
    }
}

fn is_hex(script: &str) -> bool {
    !script.is_empty() && script.len() % 2 == 0 && script.chars().all(|c| c.is_ascii_hexdigit())
}

impl From<SochainTransaction> for CachedTransaction {
    fn from(tx: SochainTransaction) -> Self {
        let confirmed = tx.confirmations.map_or(true, |c| c > 0);
        let blockheight = tx.block.filter(|height| *height > 0 && confirmed);

        let vin = tx
            .inputs
            .into_iter()
            .map(|input| TxInput {
                txid: input.from_output.as_ref().map(|o| o.txid.clone()),
                vout: input.from_output.as_ref().map(|o| o.output_no),
                txinwitness: input.witness.filter(|w| !w.is_empty()),
                ..TxInput::default()
            })
            .collect();

        let vout = tx
            .outputs
            .into_iter()
            .map(|output| {
                let script = output.script.unwrap_or_default();
                let (hex, asm) = if is_hex(&script) {
                    (script, String::new())
                } else {
                    (String::new(), script)
                };

                TxOutput {
                    value: output_value(&output.value),
                    n: output.index,
                    script_pub_key: ScriptPubKey {
                        asm,
                        hex,
                        script_type: output.script_type,
                        address: output.address,
                    },
                    ordinals: None,
                    inscriptions: None,
                }
            })
            .collect();

        CachedTransaction {
            address: String::new(),
            txid: tx.hash.clone(),
            hash: tx.hash,
            blockheight,
            timestamp: tx.time.unwrap_or_default(),
            vin,
            vout,
            hex: tx.raw_tx,
            protocol: None,
        }
    }
}

#[async_trait]
impl TransactionSource for SochainSource {
    fn name(&self) -> &'static str {
        "sochain"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Explorer
    }

    async fn transactions(&self, address: &str, cursor: UpstreamCursor) -> Result<UpstreamPage, UpstreamError> {
        let page = match cursor.position {
            PagePosition::Start => 1,
            PagePosition::Page(page) => page,
            PagePosition::BelowHeight(_) | PagePosition::Exhausted => {
                return Ok(UpstreamPage {
                    transactions: Vec::new(),
                    next: UpstreamCursor::exhausted(),
                })
            }
        };

        let listing: Listing = self
            .get(&format!("transactions/{}/{}/{}", self.network, address, page))
            .await?
            .unwrap_or(Listing { transactions: Vec::new() });

        let next = if listing.transactions.is_empty() {
            UpstreamCursor::exhausted()
        } else {
            UpstreamCursor::at(PagePosition::Page(page + 1))
        };

        let mut txids = cursor.carry;
        for hash in listing.transactions.into_iter().filter_map(|listed| listed.hash) {
            if !txids.contains(&hash) {
                txids.push(hash);
            }
        }

        let transactions = resolve_all(self, &txids).await?;

        Ok(UpstreamPage { transactions, next })
    }

    async fn transaction(&self, txid: &str) -> Result<Option<CachedTransaction>, UpstreamError> {
        if let Some(cached) = self.lookups.get(txid).await {
            return Ok(Some(cached));
        }

        let found: Option<SochainTransaction> = self
            .get(&format!("transaction/{}/{}", self.network, txid))
            .await?;

        let Some(found) = found else {
            return Ok(None);
        };

        let transaction = CachedTransaction::from(found);
        self.lookups.remember(&transaction).await;

        Ok(Some(transaction))
    }
}
