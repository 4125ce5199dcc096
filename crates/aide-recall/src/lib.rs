//! Natural-language front-end for the aide fact store.
//!
//! A small fixed set of templates maps free text onto fact-store calls. The
//! table is evaluated in declaration order — the first matching pattern wins
//! — so precedence is explicit and testable. Anything that matches no
//! pattern yields `None`, the sentinel the caller treats as "fall through to
//! the LLM".

use std::sync::LazyLock;

use aide_core::{fact::NewFact, store::FactStore};
use chrono::NaiveDate;
use regex::Regex;

/// The subject every conversational fact is recorded against.
pub const SUBJECT: &str = "user";

// ─── Command grammar ─────────────────────────────────────────────────────────

/// A recognised memory operation, extracted from free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryCommand {
  Store { attribute: String, value: String },
  Recall { attribute: String },
  /// Point-in-time recall; the date is kept raw so the executor can answer
  /// with a descriptive message when it does not parse.
  RecallBefore { attribute: String, date_raw: String },
}

type Extractor = fn(&regex::Captures<'_>) -> MemoryCommand;

static PATTERNS: LazyLock<Vec<(Regex, Extractor)>> = LazyLock::new(|| {
  vec![
    (
      Regex::new(r"remember that (.+?) is (.+)").unwrap(),
      store_pair as Extractor,
    ),
    (
      Regex::new(r"store that (.+?) = (.+)").unwrap(),
      store_pair,
    ),
    (
      Regex::new(r"my (.+?) is (.+)").unwrap(),
      store_pair,
    ),
    (
      Regex::new(r"i (?:like|love) (.+)").unwrap(),
      store_preference,
    ),
    (
      Regex::new(r"what was my (.+?) before (.+)").unwrap(),
      recall_before,
    ),
    (
      Regex::new(r"what is my (.+)").unwrap(),
      recall_current,
    ),
  ]
});

fn store_pair(caps: &regex::Captures<'_>) -> MemoryCommand {
  MemoryCommand::Store {
    attribute: caps[1].trim().to_string(),
    value:     clean(&caps[2]),
  }
}

fn store_preference(caps: &regex::Captures<'_>) -> MemoryCommand {
  MemoryCommand::Store {
    attribute: "preference".to_string(),
    value:     clean(&caps[1]),
  }
}

fn recall_before(caps: &regex::Captures<'_>) -> MemoryCommand {
  MemoryCommand::RecallBefore {
    attribute: caps[1].trim().to_string(),
    date_raw:  clean(&caps[2]),
  }
}

fn recall_current(caps: &regex::Captures<'_>) -> MemoryCommand {
  MemoryCommand::Recall { attribute: clean(&caps[1]) }
}

fn clean(s: &str) -> String {
  s.trim().trim_end_matches(['?', '.', '!']).trim().to_string()
}

/// Match `input` against the pattern table. First match wins; `None` means
/// no memory template applies.
pub fn parse(input: &str) -> Option<MemoryCommand> {
  let text = input.trim().to_lowercase();
  PATTERNS
    .iter()
    .find_map(|(re, extract)| re.captures(&text).map(|caps| extract(&caps)))
}

// ─── Executor ────────────────────────────────────────────────────────────────

/// Parse `input` and run the resulting command against `store`.
///
/// Returns `None` when no memory template matched. Store failures never
/// escape: they are logged and reported as a short apology, per the
/// fact store's absorb-and-continue contract.
pub async fn respond<S: FactStore>(store: &S, input: &str) -> Option<String> {
  let command = parse(input)?;
  Some(execute(store, command).await)
}

async fn execute<S: FactStore>(store: &S, command: MemoryCommand) -> String {
  match command {
    MemoryCommand::Store { attribute, value } => {
      match store
        .add_fact(NewFact::new(SUBJECT, &attribute, &value))
        .await
      {
        Ok(_) => format!("I'll remember that your {attribute} is {value}."),
        Err(e) => {
          tracing::warn!(error = %e, %attribute, "failed to store fact");
          "Apologies — I couldn't store that just now.".to_string()
        }
      }
    }

    MemoryCommand::Recall { attribute } => {
      match store.current_fact(SUBJECT, &attribute).await {
        Ok(Some(fact)) => format!("Your {attribute} is {}.", fact.value),
        Ok(None) => {
          format!("I don't have anything stored about your {attribute} yet.")
        }
        Err(e) => {
          tracing::warn!(error = %e, %attribute, "failed to recall fact");
          "Apologies — I couldn't look that up just now.".to_string()
        }
      }
    }

    MemoryCommand::RecallBefore { attribute, date_raw } => {
      let Ok(date) = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d") else {
        return format!(
          "I couldn't read {date_raw:?} as a date. Use the YYYY-MM-DD form, \
           like 2025-07-21."
        );
      };
      let at = date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc();

      match store.fact_at(SUBJECT, &attribute, at).await {
        Ok(Some(fact)) => {
          format!("Before {date_raw}, your {attribute} was {}.", fact.value)
        }
        Ok(None) => {
          format!("I have no record of your {attribute} before {date_raw}.")
        }
        Err(e) => {
          tracing::warn!(error = %e, %attribute, "failed point-in-time recall");
          "Apologies — I couldn't look that up just now.".to_string()
        }
      }
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use aide_store_sqlite::SqliteFactStore;
  use chrono::{Duration, Utc};

  use super::*;

  // ── Parsing ───────────────────────────────────────────────────────────────

  #[test]
  fn my_x_is_y_stores_pair() {
    assert_eq!(
      parse("My favorite color is blue"),
      Some(MemoryCommand::Store {
        attribute: "favorite color".into(),
        value:     "blue".into(),
      })
    );
  }

  #[test]
  fn like_and_love_store_a_preference() {
    for input in ["I like hiking", "i love thunderstorms!"] {
      let Some(MemoryCommand::Store { attribute, .. }) = parse(input) else {
        panic!("no match for {input:?}");
      };
      assert_eq!(attribute, "preference");
    }
  }

  #[test]
  fn explicit_remember_and_store_forms() {
    assert_eq!(
      parse("remember that the wifi password is hunter2"),
      Some(MemoryCommand::Store {
        attribute: "the wifi password".into(),
        value:     "hunter2".into(),
      })
    );
    assert_eq!(
      parse("store that birthday = 1990-04-01"),
      Some(MemoryCommand::Store {
        attribute: "birthday".into(),
        value:     "1990-04-01".into(),
      })
    );
  }

  #[test]
  fn what_is_my_recalls_current() {
    assert_eq!(
      parse("What is my favorite color?"),
      Some(MemoryCommand::Recall { attribute: "favorite color".into() })
    );
  }

  #[test]
  fn what_was_my_before_recalls_point_in_time() {
    assert_eq!(
      parse("What was my favorite color before 2025-07-21?"),
      Some(MemoryCommand::RecallBefore {
        attribute: "favorite color".into(),
        date_raw:  "2025-07-21".into(),
      })
    );
  }

  #[test]
  fn before_form_takes_precedence_over_plain_recall() {
    // "what was my ... before ..." must not fall into the "what is my" arm.
    assert!(matches!(
      parse("what was my city before 2024-01-01"),
      Some(MemoryCommand::RecallBefore { .. })
    ));
  }

  #[test]
  fn unrelated_text_is_not_understood() {
    assert_eq!(parse("tell me a joke about compilers"), None);
    assert_eq!(parse("what time is it"), None);
  }

  // ── Execution ─────────────────────────────────────────────────────────────

  async fn store() -> SqliteFactStore {
    SqliteFactStore::open_in_memory().await.unwrap()
  }

  #[tokio::test]
  async fn store_then_recall_roundtrip() {
    let s = store().await;

    let stored = respond(&s, "my favorite color is blue").await.unwrap();
    assert!(stored.contains("favorite color"), "reply: {stored}");
    assert!(stored.contains("blue"));

    let recalled = respond(&s, "what is my favorite color?").await.unwrap();
    assert_eq!(recalled, "Your favorite color is blue.");
  }

  #[tokio::test]
  async fn recall_of_unknown_attribute_is_graceful() {
    let s = store().await;
    let reply = respond(&s, "what is my shoe size").await.unwrap();
    assert!(reply.contains("don't have anything"), "reply: {reply}");
  }

  #[tokio::test]
  async fn point_in_time_recall_uses_history() {
    let s = store().await;
    let long_ago = Utc::now() - Duration::days(400);
    s.add_fact(
      NewFact::new(SUBJECT, "favorite color", "green").with_valid_from(long_ago),
    )
    .await
    .unwrap();
    respond(&s, "my favorite color is blue").await.unwrap();

    let cutoff = (Utc::now() - Duration::days(30)).format("%Y-%m-%d");
    let reply = respond(&s, &format!("what was my favorite color before {cutoff}"))
      .await
      .unwrap();
    assert!(reply.contains("green"), "reply: {reply}");
  }

  #[tokio::test]
  async fn bad_date_yields_descriptive_message() {
    let s = store().await;
    let reply = respond(&s, "what was my favorite color before last tuesday")
      .await
      .unwrap();
    assert!(reply.contains("YYYY-MM-DD"), "reply: {reply}");
  }

  #[tokio::test]
  async fn unmatched_input_falls_through() {
    let s = store().await;
    assert!(respond(&s, "summarize the news for me").await.is_none());
  }
}
