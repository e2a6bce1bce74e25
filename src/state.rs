use crate::cache::AddressCache;
use sqlx::SqlitePool;

pub struct AppState {
    pub db_pool: SqlitePool,
    pub cache: AddressCache,
}
