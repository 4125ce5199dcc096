//! Quarantine-and-recreate recovery for a corrupted store file.
//!
//! Availability wins over preserving corrupted history: the damaged file is
//! copied to a backup path (overwriting any earlier backup), removed, and a
//! fresh store is initialised in its place. Callers continue against the
//! empty store; the data loss is logged, never surfaced.

use std::path::{Path, PathBuf};

use chrono::Utc;

/// Run `PRAGMA integrity_check` and report whether SQLite considers the
/// database sound.
pub fn integrity_ok(conn: &rusqlite::Connection) -> bool {
  conn
    .query_row("PRAGMA integrity_check", [], |row| row.get::<_, String>(0))
    .map(|verdict| verdict == "ok")
    .unwrap_or(false)
}

/// Move a damaged store file out of the way.
///
/// Returns the path the fresh store should be created at: the original path
/// when the damaged file could be deleted, otherwise a timestamp-suffixed
/// sibling so a fresh store can still be initialised.
pub fn quarantine(path: &Path) -> std::io::Result<PathBuf> {
  let backup = backup_path(path);

  if path.exists() {
    std::fs::copy(path, &backup)?;
    tracing::warn!(
      store  = %path.display(),
      backup = %backup.display(),
      "store failed integrity check; quarantined"
    );

    if let Err(e) = std::fs::remove_file(path) {
      let fallback = fallback_path(path);
      tracing::warn!(
        error    = %e,
        fallback = %fallback.display(),
        "could not delete damaged store; recreating at fallback path"
      );
      return Ok(fallback);
    }
  }

  Ok(path.to_path_buf())
}

/// `<path>.corrupt` — a single backup slot, overwritten on each recovery.
pub fn backup_path(path: &Path) -> PathBuf {
  PathBuf::from(format!("{}.corrupt", path.display()))
}

fn fallback_path(path: &Path) -> PathBuf {
  PathBuf::from(format!(
    "{}.{}",
    path.display(),
    Utc::now().format("%Y%m%d%H%M%S")
  ))
}
