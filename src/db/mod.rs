pub mod address;
pub mod connection;
pub mod migration;
pub mod transaction;
