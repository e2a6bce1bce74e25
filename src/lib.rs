pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod options;
pub mod state;
pub mod upstream;
pub mod validation;

#[cfg(test)]
pub mod tests;

pub use api::error::ApiError;
pub use api::response::ApiResponse;
pub use api::route::create_router;
pub use cache::{AddressCache, CacheError, Repeater};
pub use db::connection;
pub use models::CachedTransaction;
pub use options::{Bound, FetchOptions};
pub use validation::validate_address;
