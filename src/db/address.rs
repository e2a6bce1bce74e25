// Watch entries: every address a client has asked for, with the time of
// its latest request. Entries are never removed.

use sqlx::{Pool, Row, Sqlite};
#[cfg(test)]
use crate::models::WatchEntry;

pub async fn touch_address(pool: &Pool<Sqlite>, address: &str, now: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO address_watch (address, last_requested) VALUES (?, ?)
         ON CONFLICT(address) DO UPDATE SET last_requested = excluded.last_requested"
    )
    .bind(address)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub async fn get_watch_entry(pool: &Pool<Sqlite>, address: &str) -> Result<Option<WatchEntry>, sqlx::Error> {
    let row = sqlx::query("SELECT address, last_requested FROM address_watch WHERE address = ?")
        .bind(address)
        .fetch_optional(pool)
        .await?;

    row.map(|row| {
        Ok(WatchEntry {
            address: row.try_get("address")?,
            last_requested: row.try_get("last_requested")?,
        })
    })
    .transpose()
}

/// Addresses requested at or after `since`, least recently requested first.
pub async fn addresses_requested_since(pool: &Pool<Sqlite>, since: i64) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT address FROM address_watch
         WHERE last_requested >= ?
         ORDER BY last_requested ASC"
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|row| row.try_get("address")).collect()
}
