// Brings an address's cached history up to date with the upstream provider.

use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::cache::error::CacheError;
use crate::cache::merge::merge;
use crate::db::transaction::{delete_transaction, transaction_exists, unconfirmed_transactions};
use crate::upstream::{SourceKind, TransactionSource, UpstreamCursor};

/// What one refresh did, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub pages: usize,
    pub merged: usize,
    pub reconciled: usize,
    pub evicted: usize,
}

pub async fn refresh(
    pool: &SqlitePool,
    source: &dyn TransactionSource,
    address: &str,
    unconfirmed_ttl: Duration,
) -> Result<RefreshReport, CacheError> {
    let mut report = RefreshReport::default();

    match source.kind() {
        SourceKind::Indexer => {
            let page = source.transactions(address, UpstreamCursor::start()).await?;
            report.pages = 1;
            report.merged = merge(pool, address, page.transactions).await?;
        }
        SourceKind::Explorer => {
            page_through(pool, source, address, &mut report).await?;
            reconcile(pool, source, address, unconfirmed_ttl, &mut report).await?;
        }
    }

    info!(
        "Refreshed {} from {}: {} pages, {} merged, {} reconciled, {} evicted",
        address,
        source.name(),
        report.pages,
        report.merged,
        report.reconciled,
        report.evicted
    );

    Ok(report)
}

/// Walk upstream pages newest first until the provider runs out or a page
/// reaches history the cache already holds.
async fn page_through(
    pool: &SqlitePool,
    source: &dyn TransactionSource,
    address: &str,
    report: &mut RefreshReport,
) -> Result<(), CacheError> {
    let carry: Vec<String> = unconfirmed_transactions(pool, address)
        .await?
        .into_iter()
        .map(|pending| pending.txid)
        .collect();

    let mut cursor = UpstreamCursor::seeded(carry.clone());

    loop {
        let page = source.transactions(address, cursor).await?;
        report.pages += 1;

        // Checked before merging, or the page would always look known
        let mut reached_known = None;
        for transaction in &page.transactions {
            if carry.contains(&transaction.txid) {
                continue;
            }
            if transaction_exists(pool, address, &transaction.txid).await? {
                reached_known = Some(transaction.txid.clone());
                break;
            }
        }

        report.merged += merge(pool, address, page.transactions).await?;

        if let Some(txid) = reached_known {
            debug!("Reached cached transaction {} of {}, stopping", txid, address);
            return Ok(());
        }
        if page.next.is_exhausted() {
            return Ok(());
        }

        debug!("Fetching next page of {} at {:?}", address, page.next.position);
        cursor = page.next;
    }
}

/// Re-fetch every still-unconfirmed document by id.
async fn reconcile(
    pool: &SqlitePool,
    source: &dyn TransactionSource,
    address: &str,
    unconfirmed_ttl: Duration,
    report: &mut RefreshReport,
) -> Result<(), CacheError> {
    let now = Utc::now().timestamp();
    let ttl = unconfirmed_ttl.as_secs() as i64;

    for pending in unconfirmed_transactions(pool, address).await? {
        match source.transaction(&pending.txid).await {
            Ok(Some(transaction)) => {
                merge(pool, address, vec![transaction]).await?;
                report.reconciled += 1;
            }
            Ok(None) if ttl > 0 && pending.updated_at < now - ttl => {
                if delete_transaction(pool, address, &pending.txid).await? {
                    info!("Evicted vanished unconfirmed transaction {} of {}", pending.txid, address);
                    report.evicted += 1;
                }
            }
            Ok(None) => {
                debug!("{} no longer knows {}, keeping it for now", source.name(), pending.txid);
            }
            Err(e) if e.is_malformed() => {
                warn!("Skipping reconciliation of {}: {}", pending.txid, e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
