use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::cache::merge::merge;
use crate::cache::refresh::{refresh, RefreshReport};
use crate::cache::CacheError;
use crate::db::transaction::{count_transactions, get_transaction, upsert_transactions};
use crate::models::CachedTransaction;
use crate::tests::support::{address_cache, memory_pool, tx, Lookup, ScriptedSource, ADDRESS};
use crate::upstream::{PagePosition, UpstreamCursor};

const TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Store an unconfirmed document as if it was last merged `age` ago.
async fn stale_unconfirmed(pool: &SqlitePool, txid: &str, age: Duration) {
    let mut transaction: CachedTransaction = tx(txid, None);
    transaction.address = ADDRESS.to_string();
    let written_at = Utc::now().timestamp() - age.as_secs() as i64;
    upsert_transactions(pool, &[transaction], written_at).await.unwrap();
}

#[tokio::test]
async fn pages_until_upstream_is_exhausted() {
    let pool = memory_pool().await;
    let source = ScriptedSource::explorer()
        .page(vec![tx("a", Some(30)), tx("b", Some(29))], PagePosition::Page(2))
        .page(vec![tx("c", Some(20))], PagePosition::Page(3))
        .page(vec![tx("d", Some(10))], PagePosition::Exhausted);

    let report = refresh(&pool, &source, ADDRESS, TTL).await.unwrap();

    assert_eq!(
        report,
        RefreshReport {
            pages: 3,
            merged: 4,
            reconciled: 0,
            evicted: 0
        }
    );
    assert_eq!(count_transactions(&pool, ADDRESS).await.unwrap(), 4);

    let positions: Vec<PagePosition> = source.listings().into_iter().map(|(_, c)| c.position).collect();
    assert_eq!(positions, vec![PagePosition::Start, PagePosition::Page(2), PagePosition::Page(3)]);
}

#[tokio::test]
async fn stops_at_already_cached_history() {
    let pool = memory_pool().await;
    merge(&pool, ADDRESS, vec![tx("old", Some(5))]).await.unwrap();

    let source = ScriptedSource::explorer()
        .page(vec![tx("new", Some(7)), tx("old", Some(5))], PagePosition::Page(2))
        .page(vec![tx("older", Some(3))], PagePosition::Exhausted);

    let report = refresh(&pool, &source, ADDRESS, TTL).await.unwrap();

    assert_eq!(report.pages, 1, "Second page must not be requested");
    assert_eq!(source.listing_calls(), 1);
    assert!(get_transaction(&pool, ADDRESS, "new").await.unwrap().is_some());
    assert!(get_transaction(&pool, ADDRESS, "older").await.unwrap().is_none());
}

#[tokio::test]
async fn carry_set_seeds_first_request_and_does_not_stop_paging() {
    let pool = memory_pool().await;
    merge(&pool, ADDRESS, vec![tx("m", None)]).await.unwrap();

    let source = ScriptedSource::explorer()
        .page(vec![tx("m", Some(8))], PagePosition::Page(2))
        .page(vec![tx("n", Some(7))], PagePosition::Exhausted);

    let report = refresh(&pool, &source, ADDRESS, TTL).await.unwrap();

    let listings = source.listings();
    assert_eq!(listings[0].0, ADDRESS);
    assert_eq!(listings[0].1, UpstreamCursor::seeded(vec!["m".to_string()]));
    assert!(listings[1].1.carry.is_empty(), "Carry only rides on the first request");

    assert_eq!(report.pages, 2);
    let m = get_transaction(&pool, ADDRESS, "m").await.unwrap().unwrap();
    assert_eq!(m.blockheight, Some(8));
    assert!(source.lookup_calls().is_empty(), "Nothing left unconfirmed to reconcile");
}

#[tokio::test]
async fn reconciliation_confirms_pending_transactions() {
    let pool = memory_pool().await;
    merge(&pool, ADDRESS, vec![tx("p", None)]).await.unwrap();

    let source = ScriptedSource::explorer().lookup("p", Lookup::Found(tx("p", Some(12))));

    let report = refresh(&pool, &source, ADDRESS, TTL).await.unwrap();

    assert_eq!(report.reconciled, 1);
    assert_eq!(source.lookup_calls(), vec!["p".to_string()]);
    let p = get_transaction(&pool, ADDRESS, "p").await.unwrap().unwrap();
    assert_eq!(p.blockheight, Some(12));
}

#[tokio::test]
async fn vanished_unconfirmed_transactions_expire() {
    let pool = memory_pool().await;
    stale_unconfirmed(&pool, "gone", Duration::from_secs(30 * 24 * 60 * 60)).await;
    stale_unconfirmed(&pool, "recent", Duration::from_secs(60)).await;

    let source = ScriptedSource::explorer();

    let report = refresh(&pool, &source, ADDRESS, TTL).await.unwrap();

    assert_eq!(report.evicted, 1);
    assert!(get_transaction(&pool, ADDRESS, "gone").await.unwrap().is_none());
    assert!(get_transaction(&pool, ADDRESS, "recent").await.unwrap().is_some());
}

#[tokio::test]
async fn zero_ttl_keeps_vanished_transactions() {
    let pool = memory_pool().await;
    stale_unconfirmed(&pool, "gone", Duration::from_secs(365 * 24 * 60 * 60)).await;

    let source = ScriptedSource::explorer();

    let report = refresh(&pool, &source, ADDRESS, Duration::ZERO).await.unwrap();

    assert_eq!(report.evicted, 0);
    assert!(get_transaction(&pool, ADDRESS, "gone").await.unwrap().is_some());
}

#[tokio::test]
async fn malformed_lookup_is_skipped() {
    let pool = memory_pool().await;
    merge(&pool, ADDRESS, vec![tx("q", None), tx("r", None)]).await.unwrap();

    let source = ScriptedSource::explorer()
        .lookup("q", Lookup::Malformed)
        .lookup("r", Lookup::Found(tx("r", Some(40))));

    let report = refresh(&pool, &source, ADDRESS, TTL).await.unwrap();

    assert_eq!(report.reconciled, 1);
    let q = get_transaction(&pool, ADDRESS, "q").await.unwrap().unwrap();
    assert_eq!(q.blockheight, None);
    let r = get_transaction(&pool, ADDRESS, "r").await.unwrap().unwrap();
    assert_eq!(r.blockheight, Some(40));
}

#[tokio::test]
async fn unavailable_lookup_aborts_the_refresh() {
    let pool = memory_pool().await;
    merge(&pool, ADDRESS, vec![tx("q", None)]).await.unwrap();

    let source = ScriptedSource::explorer().lookup("q", Lookup::Unavailable);

    let err = refresh(&pool, &source, ADDRESS, TTL).await.unwrap_err();
    assert!(matches!(err, CacheError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn listing_failure_is_unavailable() {
    let pool = memory_pool().await;
    let source = ScriptedSource::explorer()
        .page(vec![tx("a", Some(1))], PagePosition::Exhausted)
        .failing();

    let err = refresh(&pool, &source, ADDRESS, TTL).await.unwrap_err();

    assert!(matches!(err, CacheError::UpstreamUnavailable(_)));
    assert_eq!(count_transactions(&pool, ADDRESS).await.unwrap(), 0);
}

#[tokio::test]
async fn indexer_is_a_single_resync_call() {
    let pool = memory_pool().await;
    merge(&pool, ADDRESS, vec![tx("m", None)]).await.unwrap();

    let source = ScriptedSource::indexer()
        .page(vec![tx("a", Some(3)), tx("b", Some(2))], PagePosition::Page(2))
        .page(vec![tx("c", Some(1))], PagePosition::Exhausted);

    let report = refresh(&pool, &source, ADDRESS, TTL).await.unwrap();

    assert_eq!(report.pages, 1);
    assert_eq!(report.merged, 2);
    assert_eq!(source.listing_calls(), 1);
    assert!(source.lookup_calls().is_empty(), "Indexer refresh does not reconcile");
    assert!(get_transaction(&pool, ADDRESS, "c").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_refreshes_store_each_transaction_once() {
    let pool = memory_pool().await;
    merge(&pool, ADDRESS, vec![tx("m", None)]).await.unwrap();

    let source = ScriptedSource::explorer()
        .page(vec![tx("a", Some(12)), tx("b", Some(11))], PagePosition::Page(2))
        .page(vec![tx("b", Some(11)), tx("c", Some(10))], PagePosition::Exhausted)
        .page(vec![tx("a", Some(12)), tx("b", Some(11))], PagePosition::Exhausted)
        .lookup("m", Lookup::Found(tx("m", Some(13))))
        .shared();
    let cache = address_cache(&pool, source.clone(), Duration::from_secs(5));

    let (first, second) = tokio::join!(cache.refresh(ADDRESS), cache.refresh(ADDRESS));
    first.unwrap();
    second.unwrap();

    assert_eq!(count_transactions(&pool, ADDRESS).await.unwrap(), 4);

    let duplicated: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM (SELECT txid FROM address_transactions
         WHERE address = ? GROUP BY txid HAVING COUNT(*) > 1)",
    )
    .bind(ADDRESS)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(duplicated, 0);

    let m = get_transaction(&pool, ADDRESS, "m").await.unwrap().unwrap();
    assert_eq!(m.blockheight, Some(13));
    let b = get_transaction(&pool, ADDRESS, "b").await.unwrap().unwrap();
    assert_eq!(b.blockheight, Some(11));
    assert_eq!(b.address, ADDRESS);
}
