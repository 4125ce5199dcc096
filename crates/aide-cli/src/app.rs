//! The conversation loop's brain: route an utterance, run the matching
//! handler, and always come back with a short natural-language reply.
//!
//! No operation failure terminates the process; fatal conditions render as
//! messages and the loop continues.

use std::{collections::VecDeque, sync::Arc};

use aide_core::{
  chat::{ChatMessage, ChatRequest},
  credential::CredentialSummary,
  store::{CredentialPool, FactStore},
};
use aide_engine::{EngineError, OpenAiBackend, RotationEngine};
use aide_store_sqlite::{SqliteCredentialPool, SqliteFactStore};

use crate::{
  commands::{Command, Route, route},
  transcript::{Speaker, TranscriptLog},
};

// ─── Short-term history ──────────────────────────────────────────────────────

/// How many exchanges the rolling context window keeps.
const HISTORY_CAP: usize = 10;

/// How many recent exchanges are replayed to the LLM as context.
const CONTEXT_EXCHANGES: usize = 3;

#[derive(Debug, Clone)]
struct Exchange {
  user:      String,
  assistant: String,
}

/// Bounded deque of the most recent exchanges.
#[derive(Debug, Default)]
struct ShortTermHistory {
  entries: VecDeque<Exchange>,
}

impl ShortTermHistory {
  fn push(&mut self, user: &str, assistant: &str) {
    if self.entries.len() == HISTORY_CAP {
      self.entries.pop_front();
    }
    self.entries.push_back(Exchange {
      user:      user.to_string(),
      assistant: assistant.to_string(),
    });
  }

  fn recent(&self, n: usize) -> impl Iterator<Item = &Exchange> {
    let skip = self.entries.len().saturating_sub(n);
    self.entries.iter().skip(skip)
  }
}

// ─── App ─────────────────────────────────────────────────────────────────────

pub struct App {
  pool:       SqliteCredentialPool,
  facts:      SqliteFactStore,
  engine:     RotationEngine<SqliteCredentialPool, OpenAiBackend>,
  transcript: Arc<TranscriptLog>,
  history:    ShortTermHistory,
  service:    String,
  model:      String,
}

/// What the loop should do after a turn.
pub enum Turn {
  Reply(String),
  Quit,
}

impl App {
  pub fn new(
    pool: SqliteCredentialPool,
    facts: SqliteFactStore,
    engine: RotationEngine<SqliteCredentialPool, OpenAiBackend>,
    transcript: Arc<TranscriptLog>,
    service: String,
    model: String,
  ) -> Self {
    Self {
      pool,
      facts,
      engine,
      transcript,
      history: ShortTermHistory::default(),
      service,
      model,
    }
  }

  /// Process one utterance. Every path but `quit` produces a reply.
  pub async fn handle(&mut self, input: &str) -> Turn {
    let reply = match route(input) {
      Route::Command(Command::Quit) => return Turn::Quit,
      Route::Command(command) => self.run_command(command).await,
      Route::Invalid(message) => message,
      Route::Passthrough => match aide_recall::respond(&self.facts, input).await {
        Some(reply) => reply,
        None => self.chat(input).await,
      },
    };

    self.transcript.record(Speaker::User, input);
    self.transcript.record(Speaker::Assistant, &reply);
    self.history.push(input, &reply);

    Turn::Reply(reply)
  }

  // ── Command handlers ──────────────────────────────────────────────────────

  async fn run_command(&self, command: Command) -> String {
    match command {
      Command::Quit => unreachable!("quit is handled by the caller"),

      Command::AddKey { service, secret, priority } => {
        match self.pool.add(&service, &secret, priority).await {
          Ok(true) => {
            format!("Added a {service} API key at priority {priority}.")
          }
          Ok(false) => "That API key is already in the pool.".to_string(),
          Err(e) => store_trouble("adding the key", e),
        }
      }

      Command::RemoveKey { priority } => {
        match self.pool.remove_by_priority(priority).await {
          Ok(true) => format!("Removed the API keys at priority {priority}."),
          Ok(false) => format!("No API key found at priority {priority}."),
          Err(e) => store_trouble("removing the key", e),
        }
      }

      Command::ListKeys => match self.pool.list_status(&self.service).await {
        Ok(summaries) if summaries.is_empty() => {
          "No API keys configured. Add one with: add api key <secret>".to_string()
        }
        Ok(summaries) => format_key_listing(&summaries),
        Err(e) => store_trouble("listing keys", e),
      },

      Command::MemorySummary => {
        match self.facts.memory_summary(aide_recall::SUBJECT).await {
          Ok(summary) if summary.is_empty() => {
            "I haven't stored any facts yet.".to_string()
          }
          Ok(summary) => summary
            .iter()
            .map(|(category, s)| {
              format!(
                "{category}: {} fact{} (avg confidence {:.2})",
                s.count,
                if s.count == 1 { "" } else { "s" },
                s.average_confidence,
              )
            })
            .collect::<Vec<_>>()
            .join("\n"),
          Err(e) => store_trouble("summarising memory", e),
        }
      }
    }
  }

  // ── LLM fall-through ──────────────────────────────────────────────────────

  async fn chat(&self, input: &str) -> String {
    let mut messages = Vec::new();
    for exchange in self.history.recent(CONTEXT_EXCHANGES) {
      messages.push(ChatMessage::user(&exchange.user));
      messages.push(ChatMessage::assistant(&exchange.assistant));
    }
    messages.push(ChatMessage::user(input));

    let request = ChatRequest::new(&self.model, messages);
    match self.engine.complete(&request).await {
      Ok(text) => text,
      Err(EngineError::AllCredentialsExhausted { service, .. }) => format!(
        "Every {service} credential is exhausted or cooling down right now — \
         please try again in a minute, or add another key."
      ),
      Err(EngineError::MalformedRequest(detail)) => {
        tracing::warn!(%detail, "provider rejected request");
        "The provider rejected that request as malformed, so retrying won't \
         help. Try rephrasing."
          .to_string()
      }
      Err(EngineError::Pool(e)) => {
        tracing::error!(error = %e, "credential pool failure during chat");
        "Apologies — the credential store hit an error. Please try again."
          .to_string()
      }
    }
  }
}

fn store_trouble(doing: &str, e: impl std::error::Error) -> String {
  tracing::error!(error = %e, "credential pool failure while {doing}");
  format!("Apologies — something went wrong while {doing}. Please try again.")
}

fn format_key_listing(summaries: &[CredentialSummary]) -> String {
  let mut lines = vec!["Configured API keys:".to_string()];
  for s in summaries {
    let status = match s.cooldown_until {
      Some(until) => format!("{} until {}", s.status.as_str(), until.format("%H:%M:%S")),
      None => s.status.as_str().to_string(),
    };
    lines.push(format!(
      "  priority {}: {} — {status}, used {} time{}",
      s.priority,
      s.masked_secret,
      s.usage_count,
      if s.usage_count == 1 { "" } else { "s" },
    ));
  }
  lines.join("\n")
}
