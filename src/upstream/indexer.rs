// Local ordinals-aware indexer, driven through its command line.
//
// `<program> <args..> transactions <address>` prints the address's full
// history as JSON, `<program> <args..> transaction <txid>` one transaction
// (or `null`). The indexer keeps its own incremental state, so one call is a
// complete resync.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::config::{Config, ConfigError};
use crate::models::CachedTransaction;
use crate::upstream::{snippet, SourceKind, TransactionSource, UpstreamCursor, UpstreamError, UpstreamPage};

pub struct IndexerSource {
    program: String,
    args: Vec<String>,
    dir: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Wrapped { txs: Vec<CachedTransaction> },
    Bare(Vec<CachedTransaction>),
}

impl IndexerSource {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let dir = PathBuf::from(&config.indexer_dir);
        if !dir.is_dir() {
            return Err(ConfigError::MissingIndexerDirectory(config.indexer_dir.clone()));
        }

        Ok(Self::with_command(&config.indexer_program, config.indexer_args.clone(), &dir))
    }

    pub fn with_command(program: &str, args: Vec<String>, dir: &Path) -> Self {
        Self {
            program: program.to_string(),
            args,
            dir: dir.to_path_buf(),
        }
    }

    async fn run(&self, command: &[&str]) -> Result<String, UpstreamError> {
        debug!("Running indexer {} {:?} {:?}", self.program, self.args, command);

        let output = Command::new(&self.program)
            .args(&self.args)
            .args(command)
            .current_dir(&self.dir)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(UpstreamError::Rejected(format!(
                "indexer exited with {}: {}",
                output.status,
                snippet(&stderr)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_listing(stdout: &str) -> Result<Vec<CachedTransaction>, UpstreamError> {
    match serde_json::from_str::<Listing>(stdout) {
        Ok(Listing::Wrapped { txs }) | Ok(Listing::Bare(txs)) => Ok(txs),
        Err(e) => Err(UpstreamError::Decode(format!("{}: {}", e, snippet(stdout)))),
    }
}

fn parse_transaction(stdout: &str) -> Result<Option<CachedTransaction>, UpstreamError> {
    let value: Value = serde_json::from_str(stdout)
        .map_err(|e| UpstreamError::Decode(format!("{}: {}", e, snippet(stdout))))?;

    if value.is_null() {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| UpstreamError::Decode(e.to_string()))
}

#[async_trait]
impl TransactionSource for IndexerSource {
    fn name(&self) -> &'static str {
        "indexer"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Indexer
    }

    async fn transactions(&self, address: &str, _cursor: UpstreamCursor) -> Result<UpstreamPage, UpstreamError> {
        let stdout = self.run(&["transactions", address]).await?;
        let transactions = parse_listing(&stdout)?;

        debug!("Indexer returned {} transactions for {}", transactions.len(), address);

        Ok(UpstreamPage {
            transactions,
            next: UpstreamCursor::exhausted(),
        })
    }

    async fn transaction(&self, txid: &str) -> Result<Option<CachedTransaction>, UpstreamError> {
        let stdout = self.run(&["transaction", txid]).await?;
        parse_transaction(&stdout)
    }
}
