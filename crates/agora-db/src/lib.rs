//! Data layer for the Agora simulation (`PostgreSQL`).
//!
//! The simulation never waits on the database. Facts are queued in memory
//! and flushed periodically as one [`SyncBatch`]; this crate writes such a
//! batch atomically and idempotently.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration, migrations
//! - [`sync_store`] -- Transactional batch writes of sync records
//! - [`error`] -- Shared error types
//!
//! [`SyncBatch`]: agora_types::SyncBatch

pub mod error;
pub mod postgres;
pub mod sync_store;

pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use sync_store::SyncStore;
