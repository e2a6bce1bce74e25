// Cached transaction documents and the watch entry.
// The JSON shape follows bitcoind's verbose transaction so indexer output
// deserializes directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub address: String,
    pub last_requested: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTransaction {
    /// Owning address, stamped by the merge engine.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    pub txid: String,
    #[serde(default)]
    pub hash: String,
    /// `None` while the transaction is unconfirmed.
    #[serde(default, alias = "block_height")]
    pub blockheight: Option<i64>,
    #[serde(default, alias = "time")]
    pub timestamp: i64,
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TxInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinbase: Option<String>,
    #[serde(default, rename = "scriptSig", skip_serializing_if = "Option::is_none")]
    pub script_sig: Option<ScriptSig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txinwitness: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptSig {
    #[serde(default)]
    pub asm: String,
    #[serde(default)]
    pub hex: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TxOutput {
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub n: u32,
    #[serde(default, rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinals: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inscriptions: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub asm: String,
    #[serde(default)]
    pub hex: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub script_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl CachedTransaction {
    pub fn is_confirmed(&self) -> bool {
        self.blockheight.is_some()
    }
}

// Response shape of a cache fetch
#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<CachedTransaction>,
    pub options: crate::options::PageOptions,
}
