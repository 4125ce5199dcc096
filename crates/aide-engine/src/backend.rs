//! OpenAI-compatible chat-completion backend.
//!
//! Speaks `/v1/chat/completions` against OpenAI or any compatible service.
//! Responses are reduced to the first choice's message content; HTTP
//! failures are classified into the [`BackendFailure`] taxonomy the rotation
//! engine acts on.

use std::time::Duration;

use aide_core::chat::{BackendFailure, ChatBackend, ChatRequest};
use reqwest::{Client, StatusCode};

/// Default per-call timeout; exceeding it classifies as transient.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Chat-completion driver for an OpenAI-compatible HTTP API.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct OpenAiBackend {
  client:   Client,
  base_url: String,
}

impl OpenAiBackend {
  /// Build a backend for `base_url` (e.g. `https://api.openai.com`).
  pub fn new(base_url: impl Into<String>) -> Result<Self, BackendFailure> {
    Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
  }

  pub fn with_timeout(
    base_url: impl Into<String>,
    timeout: Duration,
  ) -> Result<Self, BackendFailure> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| BackendFailure::Other(format!("failed to build HTTP client: {e}")))?;
    Ok(Self { client, base_url: base_url.into() })
  }

  fn api_url(&self) -> String {
    format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
  }

  fn body(request: &ChatRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
      "model": request.model,
      "messages": request.messages,
      "stream": false,
    });
    if let Some(max_tokens) = request.max_tokens {
      body["max_tokens"] = serde_json::Value::from(max_tokens);
    }
    if let Some(temperature) = request.temperature {
      body["temperature"] = serde_json::Value::from(temperature);
    }
    body
  }
}

impl ChatBackend for OpenAiBackend {
  async fn complete(
    &self,
    secret: &str,
    request: &ChatRequest,
  ) -> Result<String, BackendFailure> {
    let response = self
      .client
      .post(self.api_url())
      .bearer_auth(secret)
      .json(&Self::body(request))
      .send()
      .await
      .map_err(classify_send_error)?;

    let status = response.status();
    if !status.is_success() {
      let retry_after = parse_retry_after(response.headers());
      let detail = response.text().await.unwrap_or_default();
      return Err(classify_status(status, retry_after, detail));
    }

    let payload: serde_json::Value = response
      .json()
      .await
      .map_err(|e| BackendFailure::Transient(format!("unreadable response body: {e}")))?;

    payload["choices"][0]["message"]["content"]
      .as_str()
      .map(str::to_owned)
      .ok_or_else(|| {
        BackendFailure::Other("response carried no message content".to_string())
      })
  }
}

// ─── Classification ──────────────────────────────────────────────────────────

fn classify_send_error(e: reqwest::Error) -> BackendFailure {
  // Timeouts and connectivity problems are worth retrying with another
  // credential; anything else from the client layer is unclassified.
  if e.is_timeout() || e.is_connect() || e.is_request() {
    BackendFailure::Transient(e.to_string())
  } else {
    BackendFailure::Other(e.to_string())
  }
}

fn classify_status(
  status: StatusCode,
  retry_after: Option<Duration>,
  detail: String,
) -> BackendFailure {
  let detail = truncate(&detail, 200);
  match status {
    StatusCode::TOO_MANY_REQUESTS => BackendFailure::RateLimited { retry_after },
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
      BackendFailure::InvalidCredential(format!("{status}: {detail}"))
    }
    StatusCode::BAD_REQUEST
    | StatusCode::NOT_FOUND
    | StatusCode::PAYLOAD_TOO_LARGE
    | StatusCode::UNPROCESSABLE_ENTITY => {
      BackendFailure::MalformedRequest(format!("{status}: {detail}"))
    }
    StatusCode::REQUEST_TIMEOUT => {
      BackendFailure::Transient(format!("{status}: {detail}"))
    }
    s if s.is_server_error() => BackendFailure::Transient(format!("{s}: {detail}")),
    s => BackendFailure::Other(format!("{s}: {detail}")),
  }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
  headers
    .get(reqwest::header::RETRY_AFTER)?
    .to_str()
    .ok()?
    .trim()
    .parse::<u64>()
    .ok()
    .map(Duration::from_secs)
}

fn truncate(s: &str, max: usize) -> String {
  if s.len() <= max {
    s.to_string()
  } else {
    let mut end = max;
    while !s.is_char_boundary(end) {
      end -= 1;
    }
    format!("{}…", &s[..end])
  }
}
