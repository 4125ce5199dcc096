//! The `CredentialPool` and `FactStore` traits.
//!
//! The traits are implemented by storage backends (e.g. `aide-store-sqlite`).
//! Higher layers (`aide-engine`, `aide-recall`, `aide-cli`) depend on these
//! abstractions, not on any concrete backend.

use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, Utc};

use crate::{
  credential::{ActiveCredential, CredentialSummary, ImportSlot},
  fact::{CategorySummary, Fact, NewFact},
};

// ─── Credential pool ─────────────────────────────────────────────────────────

/// Durable storage and atomic state transitions for the credentials of a
/// named service.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait CredentialPool: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert a new credential. Returns `false` (and leaves the pool
  /// untouched) if `secret` already exists anywhere in the pool.
  fn add<'a>(
    &'a self,
    service: &'a str,
    secret: &'a str,
    priority: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Delete every credential at `priority`. Returns `true` iff at least one
  /// row was deleted.
  fn remove_by_priority(
    &self,
    priority: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Masked summaries ordered by priority asc, usage_count asc. Runs the
  /// cooldown-refresh pass before reading.
  fn list_status<'a>(
    &'a self,
    service: &'a str,
  ) -> impl Future<Output = Result<Vec<CredentialSummary>, Self::Error>> + Send + 'a;

  /// Unmasked secrets of the currently-active credentials, same order as
  /// [`list_status`](Self::list_status). For internal use by the rotation
  /// engine only; never log or display the result.
  fn reveal_active<'a>(
    &'a self,
    service: &'a str,
  ) -> impl Future<Output = Result<Vec<ActiveCredential>, Self::Error>> + Send + 'a;

  /// Reactivate every rate-limited credential of `service` whose cooldown
  /// has expired. Returns the number of rows reactivated. Must run before
  /// any selection-affecting read.
  fn refresh_cooldowns<'a>(
    &'a self,
    service: &'a str,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Record a successful selection: bump `usage_count`, stamp `last_used`.
  fn record_use(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Put a credential on cooldown until `until`.
  fn mark_rate_limited(
    &self,
    id: i64,
    until: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Permanently exclude a credential. Terminal — nothing reactivates it.
  fn mark_invalid(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Bulk-import numbered slots (e.g. from environment variables), skipping
  /// secrets already present. Returns the number of credentials inserted.
  fn import_keys<'a>(
    &'a self,
    service: &'a str,
    slots: &'a [ImportSlot],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;
}

// ─── Fact store ──────────────────────────────────────────────────────────────

/// Durable, temporally-versioned key-value storage.
///
/// Writes are append-only: a new value closes the current row and inserts a
/// fresh one in a single transaction, so readers never observe zero or two
/// current rows for a pair.
pub trait FactStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Record a new value for (subject, attribute), superseding any current
  /// one. Returns the stored fact.
  fn add_fact(
    &self,
    input: NewFact,
  ) -> impl Future<Output = Result<Fact, Self::Error>> + Send + '_;

  /// The current value, or `None` if the pair has never been recorded.
  fn current_fact<'a>(
    &'a self,
    subject: &'a str,
    attribute: &'a str,
  ) -> impl Future<Output = Result<Option<Fact>, Self::Error>> + Send + 'a;

  /// Complete history for the pair, newest first.
  fn fact_history<'a>(
    &'a self,
    subject: &'a str,
    attribute: &'a str,
  ) -> impl Future<Output = Result<Vec<Fact>, Self::Error>> + Send + 'a;

  /// The value that was current at `at`:
  /// `valid_from <= at AND (valid_until > at OR valid_until IS NULL)`.
  fn fact_at<'a>(
    &'a self,
    subject: &'a str,
    attribute: &'a str,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Fact>, Self::Error>> + Send + 'a;

  /// Per-category count and average confidence over the subject's current
  /// facts only.
  fn memory_summary<'a>(
    &'a self,
    subject: &'a str,
  ) -> impl Future<Output = Result<BTreeMap<String, CategorySummary>, Self::Error>> + Send + 'a;
}
