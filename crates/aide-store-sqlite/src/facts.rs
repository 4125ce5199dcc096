//! [`SqliteFactStore`] — the SQLite implementation of [`FactStore`], with
//! quarantine-and-recreate corruption recovery.
//!
//! Storage failures never escape to callers: a failing operation rebuilds
//! the store and reports an empty result (reads) or retries once (writes).
//! The connection lives behind an `RwLock` so recovery can swap it.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use aide_core::{
  fact::{CategorySummary, Fact, NewFact},
  store::FactStore,
};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use tokio::sync::RwLock;

use crate::{
  Error, Result,
  encode::{RawFact, encode_dt},
  recovery,
  schema::FACTS_SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Location {
  Disk(PathBuf),
  Memory,
}

struct Inner {
  conn:     tokio_rusqlite::Connection,
  location: Location,
}

/// An aide fact store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteFactStore {
  inner: Arc<RwLock<Inner>>,
}

impl SqliteFactStore {
  /// Open (or create) a store at `path`.
  ///
  /// An integrity check runs on every open; a store that fails it is
  /// quarantined and replaced with a fresh empty one. This never raises for
  /// corruption — only for filesystem failures during recovery itself.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let mut active = path.as_ref().to_path_buf();

    let conn = match open_checked(&active).await {
      Ok(conn) => conn,
      Err(e) => {
        tracing::warn!(
          store = %active.display(),
          error = %e,
          "fact store unusable at open; rebuilding empty"
        );
        active = recovery::quarantine(&active)?;
        open_checked(&active).await?
      }
    };

    Ok(Self {
      inner: Arc::new(RwLock::new(Inner {
        conn,
        location: Location::Disk(active),
      })),
    })
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    init_schema(&conn).await?;
    Ok(Self {
      inner: Arc::new(RwLock::new(Inner { conn, location: Location::Memory })),
    })
  }

  /// Quarantine the current backing file (if any) and swap in a fresh store.
  async fn recover(&self) -> Result<()> {
    let mut guard = self.inner.write().await;

    let fresh = match &guard.location {
      Location::Memory => {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        init_schema(&conn).await?;
        Inner { conn, location: Location::Memory }
      }
      Location::Disk(path) => {
        let active = recovery::quarantine(path)?;
        let conn = open_checked(&active).await?;
        Inner { conn, location: Location::Disk(active) }
      }
    };

    *guard = fresh;
    Ok(())
  }

  /// Rebuild after a failed operation. The original failure is logged and
  /// absorbed per the recreate-and-continue policy.
  async fn absorb(&self, context: &'static str, e: Error) -> Result<()> {
    tracing::warn!(error = %e, context, "fact store operation failed; rebuilding store");
    self.recover().await
  }

  async fn call<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, tokio_rusqlite::Error>
      + Send
      + 'static,
    R: Send + 'static,
  {
    let guard = self.inner.read().await;
    Ok(guard.conn.call(f).await?)
  }

  // ── Fallible inner operations ─────────────────────────────────────────────

  async fn try_add_fact(&self, input: &NewFact) -> Result<Fact> {
    let now = input.valid_from.unwrap_or_else(Utc::now);

    let subject   = input.subject.clone();
    let attribute = input.attribute.clone();
    let value     = input.value.clone();
    let category  = input.category.clone();
    let source    = input.source.clone();
    let confidence = input.confidence;
    let now_str   = encode_dt(now);
    let metadata_str = input
      .metadata
      .as_ref()
      .map(serde_json::to_string)
      .transpose()?;

    let id = self
      .call(move |conn| {
        // Close-current and insert-new must commit together so readers
        // never observe zero or two current rows for the pair.
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE facts SET valid_until = ?3
           WHERE subject = ?1 AND attribute = ?2 AND valid_until IS NULL",
          rusqlite::params![subject, attribute, now_str],
        )?;
        tx.execute(
          "INSERT INTO facts
             (subject, attribute, value, category, confidence, source,
              valid_from, valid_until, metadata)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)",
          rusqlite::params![
            subject,
            attribute,
            value,
            category,
            confidence,
            source,
            now_str,
            metadata_str,
          ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
      })
      .await?;

    Ok(Fact {
      id,
      subject:     input.subject.clone(),
      attribute:   input.attribute.clone(),
      value:       input.value.clone(),
      category:    input.category.clone(),
      confidence:  input.confidence,
      source:      input.source.clone(),
      valid_from:  now,
      valid_until: None,
      metadata:    input.metadata.clone(),
    })
  }

  async fn query_one(
    &self,
    sql: &'static str,
    subject: &str,
    attribute: &str,
    at: Option<DateTime<Utc>>,
  ) -> Result<Option<Fact>> {
    let subject   = subject.to_owned();
    let attribute = attribute.to_owned();
    let at_str    = at.map(encode_dt);

    let raw: Option<RawFact> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let row = if let Some(at_str) = at_str {
          stmt
            .query_row(rusqlite::params![subject, attribute, at_str], read_raw_fact)
            .optional()?
        } else {
          stmt
            .query_row(rusqlite::params![subject, attribute], read_raw_fact)
            .optional()?
        };
        Ok(row)
      })
      .await?;

    raw.map(RawFact::into_fact).transpose()
  }

  async fn try_history(&self, subject: &str, attribute: &str) -> Result<Vec<Fact>> {
    let subject   = subject.to_owned();
    let attribute = attribute.to_owned();

    let raws: Vec<RawFact> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, subject, attribute, value, category, confidence, source,
                  valid_from, valid_until, metadata
           FROM facts
           WHERE subject = ?1 AND attribute = ?2
           ORDER BY valid_from DESC, id DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![subject, attribute], read_raw_fact)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFact::into_fact).collect()
  }

  async fn try_summary(
    &self,
    subject: &str,
  ) -> Result<BTreeMap<String, CategorySummary>> {
    let subject = subject.to_owned();

    let rows: Vec<(String, i64, f64)> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT category, COUNT(*), AVG(confidence)
           FROM facts
           WHERE subject = ?1 AND valid_until IS NULL
           GROUP BY category",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![subject], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|(category, count, average_confidence)| {
          (category, CategorySummary { count, average_confidence })
        })
        .collect(),
    )
  }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn read_raw_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawFact> {
  Ok(RawFact {
    id:          row.get(0)?,
    subject:     row.get(1)?,
    attribute:   row.get(2)?,
    value:       row.get(3)?,
    category:    row.get(4)?,
    confidence:  row.get(5)?,
    source:      row.get(6)?,
    valid_from:  row.get(7)?,
    valid_until: row.get(8)?,
    metadata:    row.get(9)?,
  })
}

async fn open_checked(path: &Path) -> Result<tokio_rusqlite::Connection> {
  let conn = tokio_rusqlite::Connection::open(path).await?;

  let sound = conn.call(|conn| Ok(recovery::integrity_ok(conn))).await?;
  if !sound {
    return Err(Error::Corrupted);
  }

  init_schema(&conn).await?;
  Ok(conn)
}

async fn init_schema(conn: &tokio_rusqlite::Connection) -> Result<()> {
  conn
    .call(|conn| {
      conn.execute_batch(FACTS_SCHEMA)?;
      Ok(())
    })
    .await?;
  Ok(())
}

// ─── FactStore impl ──────────────────────────────────────────────────────────

const CURRENT_SQL: &str =
  "SELECT id, subject, attribute, value, category, confidence, source,
          valid_from, valid_until, metadata
   FROM facts
   WHERE subject = ?1 AND attribute = ?2 AND valid_until IS NULL
   ORDER BY valid_from DESC LIMIT 1";

const AT_TIME_SQL: &str =
  "SELECT id, subject, attribute, value, category, confidence, source,
          valid_from, valid_until, metadata
   FROM facts
   WHERE subject = ?1 AND attribute = ?2
     AND valid_from <= ?3
     AND (valid_until > ?3 OR valid_until IS NULL)
   ORDER BY valid_from DESC LIMIT 1";

impl FactStore for SqliteFactStore {
  type Error = Error;

  async fn add_fact(&self, input: NewFact) -> Result<Fact> {
    match self.try_add_fact(&input).await {
      Ok(fact) => Ok(fact),
      Err(e) => {
        // One retry against the rebuilt store; a second failure is a real
        // filesystem problem and does propagate.
        self.absorb("add_fact", e).await?;
        self.try_add_fact(&input).await
      }
    }
  }

  async fn current_fact(&self, subject: &str, attribute: &str) -> Result<Option<Fact>> {
    match self.query_one(CURRENT_SQL, subject, attribute, None).await {
      Ok(fact) => Ok(fact),
      Err(e) => {
        self.absorb("current_fact", e).await?;
        Ok(None)
      }
    }
  }

  async fn fact_history(&self, subject: &str, attribute: &str) -> Result<Vec<Fact>> {
    match self.try_history(subject, attribute).await {
      Ok(facts) => Ok(facts),
      Err(e) => {
        self.absorb("fact_history", e).await?;
        Ok(Vec::new())
      }
    }
  }

  async fn fact_at(
    &self,
    subject: &str,
    attribute: &str,
    at: DateTime<Utc>,
  ) -> Result<Option<Fact>> {
    match self.query_one(AT_TIME_SQL, subject, attribute, Some(at)).await {
      Ok(fact) => Ok(fact),
      Err(e) => {
        self.absorb("fact_at", e).await?;
        Ok(None)
      }
    }
  }

  async fn memory_summary(
    &self,
    subject: &str,
  ) -> Result<BTreeMap<String, CategorySummary>> {
    match self.try_summary(subject).await {
      Ok(summary) => Ok(summary),
      Err(e) => {
        self.absorb("memory_summary", e).await?;
        Ok(BTreeMap::new())
      }
    }
  }
}
