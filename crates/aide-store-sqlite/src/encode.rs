//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings (lexicographic order matches
//! chronological order at a fixed UTC offset, so SQL `<=` comparisons work).
//! Fact metadata is stored as compact JSON.

use aide_core::{
  credential::{CredentialStatus, CredentialSummary, mask_secret},
  fact::Fact,
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `credentials` row.
pub struct RawCredential {
  pub secret:         String,
  pub status:         String,
  pub cooldown_until: Option<String>,
  pub usage_count:    i64,
  pub priority:       i64,
}

impl RawCredential {
  pub fn into_summary(self) -> Result<CredentialSummary> {
    Ok(CredentialSummary {
      masked_secret:  mask_secret(&self.secret),
      status:         CredentialStatus::parse(&self.status).map_err(Error::Core)?,
      cooldown_until: decode_opt_dt(self.cooldown_until.as_deref())?,
      usage_count:    self.usage_count,
      priority:       self.priority,
    })
  }
}

/// Raw strings read directly from a `facts` row.
pub struct RawFact {
  pub id:          i64,
  pub subject:     String,
  pub attribute:   String,
  pub value:       String,
  pub category:    String,
  pub confidence:  f64,
  pub source:      String,
  pub valid_from:  String,
  pub valid_until: Option<String>,
  pub metadata:    Option<String>,
}

impl RawFact {
  pub fn into_fact(self) -> Result<Fact> {
    Ok(Fact {
      id:          self.id,
      subject:     self.subject,
      attribute:   self.attribute,
      value:       self.value,
      category:    self.category,
      confidence:  self.confidence,
      source:      self.source,
      valid_from:  decode_dt(&self.valid_from)?,
      valid_until: decode_opt_dt(self.valid_until.as_deref())?,
      metadata:    self
        .metadata
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
    })
  }
}
