//! SQLite backends for the aide credential pool and fact store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The two stores are independent files
//! with independent schemas; only the fact store carries the
//! quarantine-and-recreate corruption recovery.

mod credentials;
mod encode;
mod facts;
mod recovery;
mod schema;

pub mod error;

pub use credentials::SqliteCredentialPool;
pub use error::{Error, Result};
pub use facts::SqliteFactStore;

#[cfg(test)]
mod tests;
