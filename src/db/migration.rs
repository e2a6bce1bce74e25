use sqlx::SqlitePool;
use tracing::info;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");

    // One document per (address, txid); blockheight NULL while unconfirmed
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS address_transactions (
            address TEXT NOT NULL,
            txid TEXT NOT NULL,
            blockheight INTEGER,
            timestamp INTEGER NOT NULL DEFAULT 0,
            protocol TEXT,
            document TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (address, txid)
        )"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_address_transactions_height_asc
         ON address_transactions(address, blockheight ASC)"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_address_transactions_height_desc
         ON address_transactions(address, blockheight DESC)"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS address_watch (
            address TEXT PRIMARY KEY,
            last_requested INTEGER NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_address_watch_last_requested
         ON address_watch(last_requested)"
    )
    .execute(pool)
    .await?;

    info!("Database migrations completed successfully");
    Ok(())
}
