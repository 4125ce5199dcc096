//! Runtime configuration for the `aide` binary.
//!
//! An optional `config.toml` file, overridden by `AIDE_*` environment
//! variables, deserialised into [`AppConfig`] with serde defaults.

use std::path::PathBuf;

use aide_core::credential::ImportSlot;
use serde::Deserialize;

/// Highest numbered `AIDE_API_KEY_<n>` slot scanned during bulk import.
pub const MAX_IMPORT_SLOTS: i64 = 8;

// ─── AppConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Credential pool database path.
  #[serde(default = "default_credentials_db")]
  pub credentials_db: PathBuf,

  /// Fact store database path.
  #[serde(default = "default_facts_db")]
  pub facts_db: PathBuf,

  /// Directory session transcripts are saved into.
  #[serde(default = "default_session_dir")]
  pub session_dir: PathBuf,

  /// Credential pool service tag the engine draws from.
  #[serde(default = "default_service")]
  pub service: String,

  /// Model identifier sent with every completion request.
  #[serde(default = "default_model")]
  pub model: String,

  /// Base URL of the OpenAI-compatible API.
  #[serde(default = "default_base_url")]
  pub base_url: String,

  /// Minimum spacing between dispatches, in seconds.
  #[serde(default = "default_min_request_interval_secs")]
  pub min_request_interval_secs: u64,

  /// Full-pool retry sweeps before a request gives up.
  #[serde(default = "default_retry_sweeps")]
  pub retry_sweeps: u32,

  /// Ceiling on any single wait for a credential cooldown, in seconds.
  #[serde(default = "default_max_exhaustion_wait_secs")]
  pub max_exhaustion_wait_secs: u64,

  /// Seconds between transcript autosaves.
  #[serde(default = "default_autosave_interval_secs")]
  pub autosave_interval_secs: u64,
}

impl Default for AppConfig {
  fn default() -> Self {
    // Round-trips through an empty config source so the serde defaults are
    // the single source of truth.
    serde_json::from_value(serde_json::json!({}))
      .expect("empty AppConfig deserialises")
  }
}

fn default_credentials_db() -> PathBuf { PathBuf::from("data/credentials.db") }
fn default_facts_db() -> PathBuf { PathBuf::from("data/memory.db") }
fn default_session_dir() -> PathBuf { PathBuf::from("data/sessions") }
fn default_service() -> String { "openai".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_base_url() -> String { "https://api.openai.com".to_string() }
fn default_min_request_interval_secs() -> u64 { 3 }
fn default_retry_sweeps() -> u32 { 3 }
fn default_max_exhaustion_wait_secs() -> u64 { 120 }
fn default_autosave_interval_secs() -> u64 { 300 }

// ─── Environment key import ──────────────────────────────────────────────────

/// Collect credential secrets from the environment for bulk import:
/// a comma-separated `AIDE_API_KEYS` list, a single `AIDE_API_KEY`, and
/// numbered `AIDE_API_KEY_1` … `AIDE_API_KEY_8` slots whose number becomes
/// the imported priority. Duplicates within the collected set are dropped;
/// the pool drops secrets it already holds.
pub fn keys_from_env() -> Vec<ImportSlot> {
  let mut slots: Vec<ImportSlot> = Vec::new();
  let mut push = |slot: i64, secret: String| {
    let secret = secret.trim().to_string();
    if !secret.is_empty() && !slots.iter().any(|s| s.secret == secret) {
      slots.push(ImportSlot { slot, secret });
    }
  };

  if let Ok(multi) = std::env::var("AIDE_API_KEYS") {
    for (i, part) in multi.split(',').enumerate() {
      push(i as i64 + 1, part.to_string());
    }
  }

  if let Ok(single) = std::env::var("AIDE_API_KEY") {
    push(1, single);
  }

  for n in 1..=MAX_IMPORT_SLOTS {
    if let Ok(value) = std::env::var(format!("AIDE_API_KEY_{n}")) {
      push(n, value);
    }
  }

  slots
}
