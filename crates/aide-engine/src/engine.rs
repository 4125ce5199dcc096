//! [`RotationEngine`] — resilient dispatch across a pool of credentials.
//!
//! One logical request becomes a bounded retry loop: throttle, select the
//! next usable credential, dispatch, classify the outcome, rotate. The
//! durable pool stays the source of truth; the engine keeps a light
//! in-memory snapshot for the hot path and writes rate-limit and invalid
//! classifications back through the pool.

use std::time::Duration;

use aide_core::{
  chat::{BackendFailure, ChatBackend, ChatRequest},
  store::CredentialPool,
};
use chrono::Utc;
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
  /// Every credential is invalid, cooling down beyond the configured
  /// ceiling, or the retry budget ran out.
  #[error("all credentials for {service} are exhausted")]
  AllCredentialsExhausted {
    service:      String,
    /// The last classified failure seen before giving up, if any.
    last_failure: Option<String>,
  },

  /// Client error not tied to the credential; surfaced immediately because
  /// rotation cannot fix it.
  #[error("request rejected by provider: {0}")]
  MalformedRequest(String),

  #[error("credential pool error: {0}")]
  Pool(#[source] Box<dyn std::error::Error + Send + Sync>),
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Credential pool service tag this engine draws from.
  pub service:              String,
  /// Minimum spacing between any two dispatches, regardless of credential.
  pub min_request_interval: Duration,
  /// Cooldown applied on a rate-limit signal without a server-supplied one.
  pub default_cooldown:     Duration,
  /// Cooldown applied on transient/connectivity failures.
  pub transient_cooldown:   Duration,
  /// How many times the engine may find the whole pool unselectable and
  /// wait for a cooldown before giving up.
  pub retry_sweeps:         u32,
  /// Hard ceiling on any single exhaustion wait; a soonest cooldown further
  /// out than this fails the request instead of blocking toward it.
  pub max_exhaustion_wait:  Duration,
  /// Slack added after a cooldown expiry before rescanning.
  pub exhaustion_buffer:    Duration,
}

impl EngineConfig {
  pub fn for_service(service: impl Into<String>) -> Self {
    Self {
      service:              service.into(),
      min_request_interval: Duration::from_secs(3),
      default_cooldown:     Duration::from_secs(60),
      transient_cooldown:   Duration::from_secs(10),
      retry_sweeps:         3,
      max_exhaustion_wait:  Duration::from_secs(120),
      exhaustion_buffer:    Duration::from_millis(500),
    }
  }
}

// ─── In-memory snapshot ──────────────────────────────────────────────────────

struct Slot {
  id:             i64,
  secret:         String,
  cooldown_until: Option<Instant>,
  bad:            bool,
}

impl Slot {
  fn selectable(&self, now: Instant) -> bool {
    !self.bad && self.cooldown_until.is_none_or(|until| until <= now)
  }
}

struct EngineState {
  slots:         Vec<Slot>,
  cursor:        usize,
  last_dispatch: Option<Instant>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Selects, uses, and reclassifies credentials across repeated remote-call
/// attempts. One instance serves one service.
pub struct RotationEngine<P, B> {
  pool:    P,
  backend: B,
  config:  EngineConfig,
  state:   Mutex<EngineState>,
}

impl<P, B> RotationEngine<P, B>
where
  P: CredentialPool,
  B: ChatBackend,
{
  pub fn new(pool: P, backend: B, config: EngineConfig) -> Self {
    Self {
      pool,
      backend,
      config,
      state: Mutex::new(EngineState {
        slots:         Vec::new(),
        cursor:        0,
        last_dispatch: None,
      }),
    }
  }

  /// Run one logical request to completion: throttle, select, dispatch,
  /// classify, rotate — bounded by the configured retry budget.
  pub async fn complete(&self, request: &ChatRequest) -> Result<String, EngineError> {
    let mut state = self.state.lock().await;
    self.reload_snapshot(&mut state).await?;

    let mut last_failure: Option<String> = None;
    let mut sweeps = 0u32;

    loop {
      let now = Instant::now();
      let Some(pos) = next_selectable(&state, now) else {
        // Whole pool unselectable: wait for the soonest cooldown among
        // non-bad credentials, within the retry budget and wait ceiling.
        sweeps += 1;
        if sweeps > self.config.retry_sweeps {
          return Err(self.exhausted(last_failure));
        }

        let soonest = state
          .slots
          .iter()
          .filter(|slot| !slot.bad)
          .filter_map(|slot| slot.cooldown_until)
          .min();
        let Some(soonest) = soonest else {
          // No non-bad credential exists at all.
          return Err(self.exhausted(last_failure));
        };

        let wait =
          soonest.saturating_duration_since(now) + self.config.exhaustion_buffer;
        if wait > self.config.max_exhaustion_wait {
          tracing::warn!(
            service   = %self.config.service,
            wait_secs = wait.as_secs(),
            "soonest cooldown exceeds wait ceiling; giving up"
          );
          return Err(self.exhausted(last_failure));
        }

        tracing::info!(
          service   = %self.config.service,
          wait_secs = wait.as_secs(),
          "all credentials cooling down; waiting for soonest cooldown"
        );
        tokio::time::sleep(wait).await;
        continue;
      };

      state.cursor = pos;
      self.throttle(&mut state).await;

      let id     = state.slots[pos].id;
      let secret = state.slots[pos].secret.clone();
      tracing::debug!(credential = id, "dispatching completion request");

      match self.backend.complete(&secret, request).await {
        Ok(text) => {
          self.pool.record_use(id).await.map_err(box_pool_err)?;
          return Ok(text);
        }

        Err(BackendFailure::MalformedRequest(msg)) => {
          // Not the credential's fault; no rotation, no cooldown.
          return Err(EngineError::MalformedRequest(msg));
        }

        Err(BackendFailure::RateLimited { retry_after }) => {
          let cooldown = retry_after.unwrap_or(self.config.default_cooldown);
          state.slots[pos].cooldown_until = Some(Instant::now() + cooldown);
          last_failure = Some("rate limited".to_string());
          tracing::warn!(
            credential    = id,
            cooldown_secs = cooldown.as_secs(),
            "credential rate limited; rotating"
          );
          self
            .pool
            .mark_rate_limited(id, Utc::now() + to_chrono(cooldown))
            .await
            .map_err(box_pool_err)?;
        }

        Err(BackendFailure::InvalidCredential(msg)) => {
          state.slots[pos].bad = true;
          last_failure = Some(msg.clone());
          tracing::warn!(credential = id, %msg, "credential rejected; excluding permanently");
          self.pool.mark_invalid(id).await.map_err(box_pool_err)?;
        }

        Err(failure @ (BackendFailure::Transient(_) | BackendFailure::Other(_))) => {
          // Unexpected failures are treated conservatively as transient.
          state.slots[pos].cooldown_until =
            Some(Instant::now() + self.config.transient_cooldown);
          last_failure = Some(failure.to_string());
          tracing::warn!(credential = id, failure = %failure, "transient failure; rotating");
        }
      }

      state.cursor = (pos + 1) % state.slots.len();
    }
  }

  /// Block until the configured minimum interval since the last dispatch has
  /// elapsed, then stamp the dispatch time. Global to the engine instance —
  /// it protects the remote service from bursts, not individual credentials.
  async fn throttle(&self, state: &mut EngineState) {
    if let Some(last) = state.last_dispatch {
      let since = Instant::now().saturating_duration_since(last);
      if since < self.config.min_request_interval {
        tokio::time::sleep(self.config.min_request_interval - since).await;
      }
    }
    state.last_dispatch = Some(Instant::now());
  }

  /// Rebuild the slot snapshot from the durable pool, preserving in-flight
  /// cooldown and bad marks for secrets that are still present. The pool's
  /// (priority, usage) ordering puts the preferred credential at index 0, so
  /// the cursor resets to the head.
  async fn reload_snapshot(&self, state: &mut EngineState) -> Result<(), EngineError> {
    self
      .pool
      .refresh_cooldowns(&self.config.service)
      .await
      .map_err(box_pool_err)?;
    let active = self
      .pool
      .reveal_active(&self.config.service)
      .await
      .map_err(box_pool_err)?;

    let mut slots = Vec::with_capacity(active.len());
    for cred in active {
      let prior = state.slots.iter().find(|slot| slot.secret == cred.secret);
      slots.push(Slot {
        id:             cred.id,
        cooldown_until: prior.and_then(|slot| slot.cooldown_until),
        bad:            prior.is_some_and(|slot| slot.bad),
        secret:         cred.secret,
      });
    }

    state.slots = slots;
    state.cursor = 0;
    Ok(())
  }

  fn exhausted(&self, last_failure: Option<String>) -> EngineError {
    EngineError::AllCredentialsExhausted {
      service: self.config.service.clone(),
      last_failure,
    }
  }
}

/// Scan from the cursor, wrapping around, for the first selectable slot.
fn next_selectable(state: &EngineState, now: Instant) -> Option<usize> {
  let n = state.slots.len();
  (0..n)
    .map(|offset| (state.cursor + offset) % n)
    .find(|&idx| state.slots[idx].selectable(now))
}

fn to_chrono(d: Duration) -> chrono::Duration {
  chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(60))
}

fn box_pool_err<E>(e: E) -> EngineError
where
  E: std::error::Error + Send + Sync + 'static,
{
  EngineError::Pool(Box::new(e))
}
