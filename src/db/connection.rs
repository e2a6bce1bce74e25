// SQLite connection pool for the transaction cache.

use backon::{ExponentialBuilder, Retryable};
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite, SqlitePool};
use std::time::Duration;
use tracing::warn;

use crate::db::migration::run_migrations;

pub async fn establish_connection(database_url: &str) -> Result<Pool<Sqlite>, sqlx::Error> {
    // Create database if it doesn't exist
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        Sqlite::create_database(database_url).await?;
    }

    // The file can be briefly locked by another process at startup
    let pool = (|| async { SqlitePool::connect(database_url).await })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(200))
                .with_max_times(5),
        )
        .notify(|err: &sqlx::Error, after: Duration| {
            warn!("Database connection failed: {}, retrying in {:?}", err, after);
        })
        .await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

    run_migrations(&pool).await?;

    Ok(pool)
}
