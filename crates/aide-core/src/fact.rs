//! Fact types — the fundamental unit of the aide long-term memory.
//!
//! A fact is one historical value of a (subject, attribute) pair. Facts are
//! never updated in place: superseding a value closes the current row
//! (`valid_until` set) and inserts a new open one. At any moment at most one
//! row per pair has `valid_until = None` — the "current" value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default classification tag for facts recorded without one.
pub const DEFAULT_CATEGORY: &str = "personal";

/// Default provenance tag for facts typed in by the user.
pub const DEFAULT_SOURCE: &str = "user_input";

/// Default confidence. Informational only — nothing reads it for decisions.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

// ─── Fact ────────────────────────────────────────────────────────────────────

/// One historical value of a (subject, attribute) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
  pub id:          i64,
  /// Entity the fact is about (e.g. "user").
  pub subject:     String,
  /// Named property, free-form (e.g. "favorite_color").
  pub attribute:   String,
  pub value:       String,
  pub category:    String,
  /// In [0, 1] by convention; recorded but never enforced.
  pub confidence:  f64,
  pub source:      String,
  /// When this value became current.
  pub valid_from:  DateTime<Utc>,
  /// When this value was superseded; `None` while still current.
  pub valid_until: Option<DateTime<Utc>>,
  pub metadata:    Option<serde_json::Value>,
}

impl Fact {
  pub fn is_current(&self) -> bool { self.valid_until.is_none() }
}

// ─── NewFact ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::FactStore::add_fact`].
/// `valid_from` defaults to the store's clock when `None`.
#[derive(Debug, Clone)]
pub struct NewFact {
  pub subject:    String,
  pub attribute:  String,
  pub value:      String,
  pub category:   String,
  pub confidence: f64,
  pub source:     String,
  pub valid_from: Option<DateTime<Utc>>,
  pub metadata:   Option<serde_json::Value>,
}

impl NewFact {
  /// Convenience constructor with all optional fields set to their defaults.
  pub fn new(
    subject: impl Into<String>,
    attribute: impl Into<String>,
    value: impl Into<String>,
  ) -> Self {
    Self {
      subject:    subject.into(),
      attribute:  attribute.into(),
      value:      value.into(),
      category:   DEFAULT_CATEGORY.to_string(),
      confidence: DEFAULT_CONFIDENCE,
      source:     DEFAULT_SOURCE.to_string(),
      valid_from: None,
      metadata:   None,
    }
  }

  pub fn with_valid_from(mut self, at: DateTime<Utc>) -> Self {
    self.valid_from = Some(at);
    self
  }

  pub fn with_category(mut self, category: impl Into<String>) -> Self {
    self.category = category.into();
    self
  }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Per-category aggregate over a subject's *current* facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
  pub count:              i64,
  pub average_confidence: f64,
}
