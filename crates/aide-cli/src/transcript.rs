//! Session transcript logging.
//!
//! Exchanges append to an in-memory buffer guarded by a mutex; saves take a
//! snapshot under the same lock and serialise outside it, so a save in
//! progress can never observe a half-appended entry. A background task
//! autosaves on an interval; the final save happens at shutdown.

use std::{
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
  time::Duration,
};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// ─── Entries ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
  User,
  Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
  pub timestamp: DateTime<Utc>,
  pub speaker:   Speaker,
  pub text:      String,
  pub words:     usize,
}

#[derive(Serialize)]
struct SessionMetadata {
  session_id:         Uuid,
  started_at:         DateTime<Utc>,
  saved_at:           DateTime<Utc>,
  total_messages:     usize,
  user_messages:      usize,
  assistant_messages: usize,
  user_words:         usize,
  assistant_words:    usize,
  autosave:           bool,
}

#[derive(Serialize)]
struct SessionFile {
  metadata: SessionMetadata,
  messages: Vec<TranscriptEntry>,
}

// ─── Log ─────────────────────────────────────────────────────────────────────

/// One conversation session's transcript. Each save rewrites the session's
/// own file (`session_<uuid>.json`), so autosaves converge on the final
/// transcript instead of scattering partial copies.
pub struct TranscriptLog {
  session_id: Uuid,
  started_at: DateTime<Utc>,
  path:       PathBuf,
  entries:    Mutex<Vec<TranscriptEntry>>,
}

impl TranscriptLog {
  pub fn new(dir: impl AsRef<Path>) -> Self {
    let session_id = Uuid::new_v4();
    Self {
      session_id,
      started_at: Utc::now(),
      path: dir.as_ref().join(format!("session_{session_id}.json")),
      entries: Mutex::new(Vec::new()),
    }
  }

  pub fn record(&self, speaker: Speaker, text: &str) {
    let entry = TranscriptEntry {
      timestamp: Utc::now(),
      speaker,
      text: text.to_string(),
      words: text.split_whitespace().count(),
    };
    self
      .entries
      .lock()
      .expect("transcript mutex poisoned")
      .push(entry);
  }

  /// Write the session file. Returns the path written, or `None` when the
  /// session has no entries yet.
  pub fn save(&self, autosave: bool) -> anyhow::Result<Option<PathBuf>> {
    // Snapshot under the lock, serialise and write outside it.
    let messages = self
      .entries
      .lock()
      .expect("transcript mutex poisoned")
      .clone();
    if messages.is_empty() {
      return Ok(None);
    }

    let count = |speaker: Speaker| {
      messages.iter().filter(|m| m.speaker == speaker).count()
    };
    let words = |speaker: Speaker| {
      messages
        .iter()
        .filter(|m| m.speaker == speaker)
        .map(|m| m.words)
        .sum()
    };

    let file = SessionFile {
      metadata: SessionMetadata {
        session_id:         self.session_id,
        started_at:         self.started_at,
        saved_at:           Utc::now(),
        total_messages:     messages.len(),
        user_messages:      count(Speaker::User),
        assistant_messages: count(Speaker::Assistant),
        user_words:         words(Speaker::User),
        assistant_words:    words(Speaker::Assistant),
        autosave,
      },
      messages,
    };

    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(&self.path, json)
      .with_context(|| format!("writing transcript {}", self.path.display()))?;

    tracing::debug!(path = %self.path.display(), autosave, "transcript saved");
    Ok(Some(self.path.clone()))
  }

  /// Spawn the periodic autosave task. Abort the returned handle at
  /// shutdown; the final explicit save supersedes whatever it wrote last.
  pub fn spawn_autosave(
    self: &Arc<Self>,
    every: Duration,
  ) -> tokio::task::JoinHandle<()> {
    let log = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      // The first tick fires immediately; skip it.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        if let Err(e) = log.save(true) {
          tracing::warn!(error = %e, "transcript autosave failed");
        }
      }
    })
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
