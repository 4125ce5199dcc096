//! Error type for `aide-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] aide_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The database file failed `PRAGMA integrity_check`. Handled internally
  /// by quarantine-and-recreate; callers never observe it.
  #[error("store failed integrity check")]
  Corrupted,

  /// Filesystem failure while quarantining or recreating a store file.
  #[error("store recovery failed: {0}")]
  Recovery(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
