//! [`SqliteCredentialPool`] — the SQLite implementation of
//! [`CredentialPool`].
//!
//! Every mutation runs inside one `conn.call` closure; the dedicated
//! connection thread serialises them, so a duplicate check and its insert
//! can never interleave with a concurrent selection.

use std::path::Path;

use aide_core::{
  credential::{ActiveCredential, CredentialSummary, ImportSlot},
  store::CredentialPool,
};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result,
  encode::{RawCredential, encode_dt},
  schema::CREDENTIALS_SCHEMA,
};

// ─── Pool ────────────────────────────────────────────────────────────────────

/// An aide credential pool backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteCredentialPool {
  conn: tokio_rusqlite::Connection,
}

impl SqliteCredentialPool {
  /// Open (or create) a pool at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let pool = Self { conn };
    pool.init_schema().await?;
    Ok(pool)
  }

  /// Open an in-memory pool — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let pool = Self { conn };
    pool.init_schema().await?;
    Ok(pool)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(CREDENTIALS_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Reactivate expired cooldowns, then read rows for `service` in selection
  /// order. `active_only` restricts to selectable rows.
  async fn refreshed_rows(
    &self,
    service: &str,
    active_only: bool,
  ) -> Result<Vec<(i64, RawCredential)>> {
    let service = service.to_owned();
    let now_str = encode_dt(Utc::now());

    let rows = self
      .conn
      .call(move |conn| {
        refresh_expired(conn, &service, &now_str)?;

        // `id` breaks (priority, usage) ties so the order is stable.
        let sql = if active_only {
          "SELECT id, secret, status, cooldown_until, usage_count, priority
           FROM credentials
           WHERE service = ?1 AND status = 'active'
           ORDER BY priority ASC, usage_count ASC, id ASC"
        } else {
          "SELECT id, secret, status, cooldown_until, usage_count, priority
           FROM credentials
           WHERE service = ?1
           ORDER BY priority ASC, usage_count ASC, id ASC"
        };

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map(rusqlite::params![service], |row| {
            Ok((
              row.get::<_, i64>(0)?,
              RawCredential {
                secret:         row.get(1)?,
                status:         row.get(2)?,
                cooldown_until: row.get(3)?,
                usage_count:    row.get(4)?,
                priority:       row.get(5)?,
              },
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }
}

/// The lazy cooldown-refresh pass: every rate-limited row whose
/// `cooldown_until` has passed becomes active again. Runs inside the caller's
/// `conn.call` so it precedes the read it protects.
fn refresh_expired(
  conn: &rusqlite::Connection,
  service: &str,
  now_str: &str,
) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE credentials
     SET status = 'active', cooldown_until = NULL
     WHERE service = ?1
       AND status = 'rate_limited'
       AND cooldown_until IS NOT NULL
       AND cooldown_until <= ?2",
    rusqlite::params![service, now_str],
  )
}

// ─── CredentialPool impl ─────────────────────────────────────────────────────

impl CredentialPool for SqliteCredentialPool {
  type Error = Error;

  async fn add(&self, service: &str, secret: &str, priority: i64) -> Result<bool> {
    let service = service.to_owned();
    let secret  = secret.to_owned();
    let now_str = encode_dt(Utc::now());

    let inserted = self
      .conn
      .call(move |conn| {
        let exists: bool = conn
          .query_row(
            "SELECT 1 FROM credentials WHERE secret = ?1",
            rusqlite::params![secret],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if exists {
          return Ok(false);
        }

        conn.execute(
          "INSERT INTO credentials (service, secret, priority, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![service, secret, priority, now_str],
        )?;
        Ok(true)
      })
      .await?;

    Ok(inserted)
  }

  async fn remove_by_priority(&self, priority: i64) -> Result<bool> {
    let deleted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "DELETE FROM credentials WHERE priority = ?1",
          rusqlite::params![priority],
        )?;
        Ok(n)
      })
      .await?;

    Ok(deleted > 0)
  }

  async fn list_status(&self, service: &str) -> Result<Vec<CredentialSummary>> {
    self
      .refreshed_rows(service, false)
      .await?
      .into_iter()
      .map(|(_, raw)| raw.into_summary())
      .collect()
  }

  async fn reveal_active(&self, service: &str) -> Result<Vec<ActiveCredential>> {
    Ok(
      self
        .refreshed_rows(service, true)
        .await?
        .into_iter()
        .map(|(id, raw)| ActiveCredential {
          id,
          secret: raw.secret,
          priority: raw.priority,
        })
        .collect(),
    )
  }

  async fn refresh_cooldowns(&self, service: &str) -> Result<usize> {
    let service = service.to_owned();
    let now_str = encode_dt(Utc::now());

    let refreshed = self
      .conn
      .call(move |conn| Ok(refresh_expired(conn, &service, &now_str)?))
      .await?;

    Ok(refreshed)
  }

  async fn record_use(&self, id: i64) -> Result<()> {
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE credentials
           SET usage_count = usage_count + 1, last_used = ?2
           WHERE id = ?1",
          rusqlite::params![id, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn mark_rate_limited(&self, id: i64, until: DateTime<Utc>) -> Result<()> {
    let until_str = encode_dt(until);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE credentials
           SET status = 'rate_limited', cooldown_until = ?2
           WHERE id = ?1 AND status != 'invalid'",
          rusqlite::params![id, until_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn mark_invalid(&self, id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE credentials
           SET status = 'invalid', cooldown_until = NULL
           WHERE id = ?1",
          rusqlite::params![id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn import_keys(&self, service: &str, slots: &[ImportSlot]) -> Result<usize> {
    let service_owned = service.to_owned();
    let slots   = slots.to_vec();
    let now_str = encode_dt(Utc::now());

    let imported = self
      .conn
      .call(move |conn| {
        let mut imported = 0usize;
        for slot in &slots {
          let exists: bool = conn
            .query_row(
              "SELECT 1 FROM credentials WHERE secret = ?1",
              rusqlite::params![slot.secret],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
          if exists {
            continue;
          }
          conn.execute(
            "INSERT INTO credentials (service, secret, priority, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![service_owned, slot.secret, slot.slot, now_str],
          )?;
          imported += 1;
        }
        Ok(imported)
      })
      .await?;

    if imported > 0 {
      tracing::info!(service, imported, "imported credentials");
    }
    Ok(imported)
  }
}
