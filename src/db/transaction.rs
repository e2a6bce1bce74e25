use futures::stream::{BoxStream, StreamExt};
use sqlx::types::Json;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};
use crate::models::CachedTransaction;

/// Height filter for a cache scan. `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightRange {
    pub before: Option<i64>,
    pub after: Option<i64>,
}

/// Bookkeeping view of an unconfirmed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub txid: String,
    pub timestamp: i64,
    pub updated_at: i64,
}

/// Insert or fully replace documents keyed by `(address, txid)`.
///
/// Every column is overwritten from the incoming record, so repeated or
/// concurrent writes of the same transaction converge on one row.
pub async fn upsert_transactions(
    pool: &Pool<Sqlite>,
    transactions: &[CachedTransaction],
    now: i64,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for transaction in transactions {
        sqlx::query(
            r#"
            INSERT INTO address_transactions
            (address, txid, blockheight, timestamp, protocol, document, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(address, txid) DO UPDATE SET
                blockheight = excluded.blockheight,
                timestamp = excluded.timestamp,
                protocol = excluded.protocol,
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&transaction.address)
        .bind(&transaction.txid)
        .bind(transaction.blockheight)
        .bind(transaction.timestamp)
        .bind(&transaction.protocol)
        .bind(Json(transaction))
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(())
}

const SCAN_ALL: &str = r#"SELECT document FROM address_transactions
    WHERE address = ?
    ORDER BY blockheight IS NULL DESC, blockheight DESC, txid ASC"#;

const SCAN_BEFORE: &str = r#"SELECT document FROM address_transactions
    WHERE address = ? AND blockheight <= ?
    ORDER BY blockheight DESC, txid ASC"#;

const SCAN_AFTER: &str = r#"SELECT document FROM address_transactions
    WHERE address = ? AND blockheight >= ?
    ORDER BY blockheight ASC, txid ASC"#;

const SCAN_WINDOW: &str = r#"SELECT document FROM address_transactions
    WHERE address = ? AND blockheight <= ? AND blockheight >= ?
    ORDER BY blockheight DESC, txid ASC"#;

/// Stream an address's documents in pagination order.
///
/// Descending unless only `after` is set. Unconfirmed documents lead the
/// unbounded scan and are excluded by any bound.
pub fn scan_transactions<'a>(
    pool: &'a Pool<Sqlite>,
    address: &'a str,
    range: HeightRange,
) -> BoxStream<'a, Result<CachedTransaction, sqlx::Error>> {
    let query = match (range.before, range.after) {
        (None, None) => sqlx::query(SCAN_ALL).bind(address),
        (Some(before), None) => sqlx::query(SCAN_BEFORE).bind(address).bind(before),
        (None, Some(after)) => sqlx::query(SCAN_AFTER).bind(address).bind(after),
        (Some(before), Some(after)) => sqlx::query(SCAN_WINDOW).bind(address).bind(before).bind(after),
    };

    query
        .fetch(pool)
        .map(|row| row.and_then(|row| decode_document(&row)))
        .boxed()
}

/// Highest stored height `<= height`.
pub async fn nearest_height_at_or_before(
    pool: &Pool<Sqlite>,
    address: &str,
    height: i64,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT MAX(blockheight) FROM address_transactions WHERE address = ? AND blockheight <= ?",
    )
    .bind(address)
    .bind(height)
    .fetch_one(pool)
    .await
}

/// Lowest stored height `>= height`.
pub async fn nearest_height_at_or_after(
    pool: &Pool<Sqlite>,
    address: &str,
    height: i64,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT MIN(blockheight) FROM address_transactions WHERE address = ? AND blockheight >= ?",
    )
    .bind(address)
    .bind(height)
    .fetch_one(pool)
    .await
}

pub async fn transaction_exists(pool: &Pool<Sqlite>, address: &str, txid: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM address_transactions WHERE address = ? AND txid = ?")
        .bind(address)
        .bind(txid)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

#[cfg(test)]
pub async fn get_transaction(
    pool: &Pool<Sqlite>,
    address: &str,
    txid: &str,
) -> Result<Option<CachedTransaction>, sqlx::Error> {
    let row = sqlx::query("SELECT document FROM address_transactions WHERE address = ? AND txid = ?")
        .bind(address)
        .bind(txid)
        .fetch_optional(pool)
        .await?;

    row.map(|row| decode_document(&row)).transpose()
}

/// Unconfirmed documents of an address, most recent first.
pub async fn unconfirmed_transactions(
    pool: &Pool<Sqlite>,
    address: &str,
) -> Result<Vec<PendingTransaction>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT txid, timestamp, updated_at FROM address_transactions
           WHERE address = ? AND blockheight IS NULL
           ORDER BY timestamp DESC, txid ASC"#,
    )
    .bind(address)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(PendingTransaction {
                txid: row.try_get("txid")?,
                timestamp: row.try_get("timestamp")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .collect()
}

pub async fn delete_transaction(pool: &Pool<Sqlite>, address: &str, txid: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM address_transactions WHERE address = ? AND txid = ?")
        .bind(address)
        .bind(txid)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
pub async fn count_transactions(pool: &Pool<Sqlite>, address: &str) -> Result<i64, sqlx::Error> {
    let count = sqlx::query("SELECT COUNT(*) FROM address_transactions WHERE address = ?")
        .bind(address)
        .fetch_one(pool)
        .await?
        .try_get::<i64, _>(0)?;

    Ok(count)
}

fn decode_document(row: &SqliteRow) -> Result<CachedTransaction, sqlx::Error> {
    let Json(transaction) = row.try_get::<Json<CachedTransaction>, _>("document")?;
    Ok(transaction)
}
