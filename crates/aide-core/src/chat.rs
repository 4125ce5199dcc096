//! Chat request types and the remote text-generation seam.
//!
//! The remote exchange is an opaque collaborator: aide sends an ordered list
//! of role-tagged messages and receives either generated text or a failure
//! classified into the [`BackendFailure`] taxonomy the rotation engine acts
//! on.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
  System,
  User,
  Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role:    ChatRole,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: ChatRole::System, content: content.into() }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self { role: ChatRole::User, content: content.into() }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self { role: ChatRole::Assistant, content: content.into() }
  }
}

/// One logical request to the remote text-generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
  pub model:       String,
  pub messages:    Vec<ChatMessage>,
  pub max_tokens:  Option<u32>,
  pub temperature: Option<f32>,
}

impl ChatRequest {
  pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
    Self {
      model: model.into(),
      messages,
      max_tokens: None,
      temperature: None,
    }
  }
}

// ─── Failure taxonomy ────────────────────────────────────────────────────────

/// A classified failure from one dispatch attempt. The engine decides per
/// variant whether to cool the credential down, exclude it permanently, or
/// give up on the request outright.
#[derive(Debug, Clone, Error)]
pub enum BackendFailure {
  /// The service refused the request for rate reasons. `retry_after` is the
  /// cooldown the service suggested, when it sent one.
  #[error("rate limited")]
  RateLimited { retry_after: Option<Duration> },

  /// Connectivity problem, timeout, or server-side error — worth retrying
  /// with another credential after a short cooldown.
  #[error("transient failure: {0}")]
  Transient(String),

  /// The credential itself was rejected. Permanent exclusion.
  #[error("invalid credential: {0}")]
  InvalidCredential(String),

  /// Client error not tied to the credential. Retrying with a different
  /// credential cannot fix a malformed request.
  #[error("malformed request: {0}")]
  MalformedRequest(String),

  /// Anything unclassified; treated conservatively as transient.
  #[error("unexpected failure: {0}")]
  Other(String),
}

// ─── Backend trait ───────────────────────────────────────────────────────────

/// Abstraction over the remote text-generation call.
///
/// Implementations own the wire format and the per-call timeout; the engine
/// owns credential selection and retry.
pub trait ChatBackend: Send + Sync {
  /// Issue one completion attempt with the given credential secret.
  fn complete<'a>(
    &'a self,
    secret: &'a str,
    request: &'a ChatRequest,
  ) -> impl Future<Output = Result<String, BackendFailure>> + Send + 'a;
}
