// Process configuration, read once at startup from the environment (.env
// supported). Every setting has a default so a bare `cargo run` works
// against a local indexer checkout.

use dotenv::dotenv;
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown lookup mode: {0}")]
    UnknownLookupMode(String),

    #[error("Unsupported {provider} network/coin: {network}/{coin}")]
    UnsupportedNetwork {
        provider: &'static str,
        network: String,
        coin: String,
    },

    #[error("Indexer directory does not exist: {0}")]
    MissingIndexerDirectory(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub lookup_mode: String,
    pub indexer_dir: String,
    pub indexer_program: String,
    pub indexer_args: Vec<String>,
    pub sochain_url: String,
    pub sochain_network: String,
    pub sochain_coin: String,
    pub sochain_token: Option<String>,
    pub blockcypher_url: String,
    pub blockcypher_network: String,
    pub blockcypher_coin: String,
    pub blockcypher_token: Option<String>,
    pub rpc_timeout_secs: u64,
    pub rpc_rate_limit: Option<u32>,
    pub fetch_timeout: Duration,
    pub repeater_interval: Duration,
    pub freshness_window: Duration,
    pub repeater_busy_threshold: usize,
    pub unconfirmed_ttl: Duration,
    pub cache_ttl: Duration,
    pub cache_max_capacity: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:cache.db".to_string());
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);
        let lookup_mode = env::var("LOOKUP_MODE")
            .or_else(|_| env::var("LOOKUPMODE"))
            .unwrap_or_else(|_| "indexer".to_string())
            .to_lowercase();

        let indexer_dir = env::var("INDEXER_DIR")
            .or_else(|_| env::var("DIRECTORYPATH"))
            .unwrap_or_else(|_| ".".to_string());
        let indexer_program = env::var("INDEXER_PROGRAM").unwrap_or_else(|_| "node".to_string());
        let indexer_args = env::var("INDEXER_ARGS")
            .unwrap_or_else(|_| "bin/index.js".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let sochain_url = env::var("SOCHAIN_URL").unwrap_or_else(|_| "https://chain.so/api/v3".to_string());
        let sochain_network = env::var("SOCHAIN_NETWORK").unwrap_or_else(|_| "BTC".to_string());
        let sochain_coin = env::var("SOCHAIN_COIN").unwrap_or_else(|_| "Bitcoin".to_string());
        let sochain_token = env::var("SOCHAIN_TOKEN").ok().filter(|t| !t.is_empty());

        let blockcypher_url = env::var("BLOCKCYPHER_URL")
            .unwrap_or_else(|_| "https://api.blockcypher.com/v1".to_string());
        let blockcypher_network = env::var("BLOCKCYPHER_NETWORK").unwrap_or_else(|_| "mainnet".to_string());
        let blockcypher_coin = env::var("BLOCKCYPHER_COIN").unwrap_or_else(|_| "Bitcoin".to_string());
        let blockcypher_token = env::var("BLOCKCYPHER_TOKEN").ok().filter(|t| !t.is_empty());

        let rpc_timeout_secs = env::var("RPC_TIMEOUT_SECS")
            .map(|v| v.parse().unwrap_or(30))
            .unwrap_or(30);
        let rpc_rate_limit = env::var("RPC_RATE_LIMIT")
            .map(|v| v.parse().ok())
            .unwrap_or(None);

        let fetch_timeout = env_secs("FETCH_TIMEOUT_SECS", 95);
        let repeater_interval = env_secs("REPEATER_INTERVAL_SECS", 300);
        let freshness_window = env_secs("FRESHNESS_WINDOW_SECS", 7 * 24 * 60 * 60);
        let repeater_busy_threshold = env::var("REPEATER_BUSY_THRESHOLD")
            .map(|v| v.parse().unwrap_or(50))
            .unwrap_or(50);
        let unconfirmed_ttl = env_secs("UNCONFIRMED_TTL_SECS", 14 * 24 * 60 * 60);

        let cache_ttl = env_secs("CACHE_TTL", 3600);
        let cache_max_capacity = env::var("CACHE_MAX_CAPACITY")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .unwrap_or(10000);

        Self {
            database_url,
            server_host,
            server_port,
            lookup_mode,
            indexer_dir,
            indexer_program,
            indexer_args,
            sochain_url,
            sochain_network,
            sochain_coin,
            sochain_token,
            blockcypher_url,
            blockcypher_network,
            blockcypher_coin,
            blockcypher_token,
            rpc_timeout_secs,
            rpc_rate_limit,
            fetch_timeout,
            repeater_interval,
            freshness_window,
            repeater_busy_threshold,
            unconfirmed_ttl,
            cache_ttl,
            cache_max_capacity,
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(default))
}
