//! PostgreSQL stores for Datamask.

pub mod postgres;

pub use postgres::{PgStore, connect_pool};
