//! Command routing for the conversation loop.
//!
//! The router is a priority-ordered list of matchers evaluated in a fixed
//! order; the first that recognises the input wins. Anything unrecognised is
//! a [`Route::Passthrough`] — memory patterns and the LLM get it next.
//! Malformed arguments (e.g. a non-integer priority) are rejected here, at
//! the boundary, with a usage message; they never reach the pool.

// ─── Routed commands ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Quit,
  AddKey { service: String, secret: String, priority: i64 },
  RemoveKey { priority: i64 },
  ListKeys,
  MemorySummary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
  Command(Command),
  /// A recognised command with unusable arguments; the message goes
  /// straight back to the user.
  Invalid(String),
  /// Not a command at all.
  Passthrough,
}

/// Services the `add api key` grammar recognises without an explicit tag.
const KNOWN_SERVICES: &[&str] = &["openai", "anthropic", "deepseek", "newsapi"];

type Matcher = fn(&str) -> Option<Route>;

/// Evaluated top to bottom; first `Some` wins.
const ROUTES: &[Matcher] = &[
  match_quit,
  match_add_key,
  match_remove_key,
  match_list_keys,
  match_memory_summary,
];

pub fn route(input: &str) -> Route {
  let trimmed = input.trim();
  ROUTES
    .iter()
    .find_map(|matcher| matcher(trimmed))
    .unwrap_or(Route::Passthrough)
}

// ─── Matchers ────────────────────────────────────────────────────────────────

fn match_quit(input: &str) -> Option<Route> {
  matches!(input.to_lowercase().as_str(), "quit" | "exit" | "shutdown")
    .then_some(Route::Command(Command::Quit))
}

fn match_add_key(input: &str) -> Option<Route> {
  let rest = strip_prefix_ci(input, "add api key")?;
  Some(parse_add_key(rest))
}

fn match_remove_key(input: &str) -> Option<Route> {
  let rest = strip_prefix_ci(input, "remove api key")?;
  let token = rest.trim();
  if token.is_empty() {
    return Some(Route::Invalid(
      "Which priority should I remove? Usage: remove api key <priority>".to_string(),
    ));
  }
  match token.parse::<i64>() {
    Ok(priority) => Some(Route::Command(Command::RemoveKey { priority })),
    Err(_) => Some(Route::Invalid(
      "The priority must be an integer. Usage: remove api key <priority>".to_string(),
    )),
  }
}

fn match_list_keys(input: &str) -> Option<Route> {
  input
    .eq_ignore_ascii_case("list api keys")
    .then_some(Route::Command(Command::ListKeys))
}

fn match_memory_summary(input: &str) -> Option<Route> {
  input
    .eq_ignore_ascii_case("memory summary")
    .then_some(Route::Command(Command::MemorySummary))
}

/// Case-insensitive prefix strip that only fires on a word boundary, so
/// "add api keyring" is not mistaken for the command.
fn strip_prefix_ci<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
  let head = input.get(..prefix.len())?;
  if !head.eq_ignore_ascii_case(prefix) {
    return None;
  }
  let rest = &input[prefix.len()..];
  if rest.is_empty() || rest.starts_with(' ') {
    Some(rest)
  } else {
    None
  }
}

// ─── add api key grammar ─────────────────────────────────────────────────────

/// Accepts, after the `add api key` prefix:
///   `<service> <secret> priority <n>`
///   `<secret> priority <n>`        (service defaults to openai)
///   `<service> <secret>`           (priority defaults to 1)
///   `<secret>`
///
/// Tokens keep their original case so the secret survives intact; only the
/// service tag is matched case-insensitively.
fn parse_add_key(rest: &str) -> Route {
  const USAGE: &str = "Usage: add api key <service?> <secret> priority <n?>";

  let tokens: Vec<&str> = rest.split_whitespace().collect();
  if tokens.is_empty() {
    return Route::Invalid(format!("No API key provided. {USAGE}"));
  }

  let first_lower = tokens[0].to_lowercase();
  let (service, secret, remainder) =
    if KNOWN_SERVICES.contains(&first_lower.as_str()) && tokens.len() >= 2 {
      (first_lower, tokens[1], &tokens[2..])
    } else {
      ("openai".to_string(), tokens[0], &tokens[1..])
    };

  let mut priority = 1i64;
  if let Some(idx) = remainder
    .iter()
    .position(|t| t.eq_ignore_ascii_case("priority"))
  {
    let Some(value) = remainder.get(idx + 1) else {
      return Route::Invalid(format!("Priority value not provided. {USAGE}"));
    };
    match value.parse::<i64>() {
      Ok(p) => priority = p,
      Err(_) => {
        return Route::Invalid(format!(
          "Invalid priority value — it must be an integer. {USAGE}"
        ));
      }
    }
  }

  Route::Command(Command::AddKey {
    service,
    secret: secret.to_string(),
    priority,
  })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quit_aliases_route_to_quit() {
    for input in ["quit", "exit", "Shutdown"] {
      assert_eq!(route(input), Route::Command(Command::Quit));
    }
  }

  #[test]
  fn add_key_minimal_form_defaults_service_and_priority() {
    assert_eq!(
      route("add api key sk-SecretValue123"),
      Route::Command(Command::AddKey {
        service:  "openai".into(),
        secret:   "sk-SecretValue123".into(),
        priority: 1,
      })
    );
  }

  #[test]
  fn add_key_full_form() {
    assert_eq!(
      route("add api key anthropic sk-ant-XYZ priority 2"),
      Route::Command(Command::AddKey {
        service:  "anthropic".into(),
        secret:   "sk-ant-XYZ".into(),
        priority: 2,
      })
    );
  }

  #[test]
  fn add_key_preserves_secret_case() {
    let Route::Command(Command::AddKey { secret, .. }) =
      route("Add API Key sk-MiXeDcAsE")
    else {
      panic!("expected AddKey");
    };
    assert_eq!(secret, "sk-MiXeDcAsE");
  }

  #[test]
  fn add_key_rejects_non_integer_priority() {
    assert!(matches!(
      route("add api key sk-abc priority high"),
      Route::Invalid(msg) if msg.contains("integer")
    ));
  }

  #[test]
  fn add_key_rejects_missing_priority_value() {
    assert!(matches!(
      route("add api key sk-abc priority"),
      Route::Invalid(_)
    ));
  }

  #[test]
  fn add_key_rejects_empty_arguments() {
    assert!(matches!(route("add api key"), Route::Invalid(_)));
  }

  #[test]
  fn remove_key_parses_priority() {
    assert_eq!(
      route("remove api key 3"),
      Route::Command(Command::RemoveKey { priority: 3 })
    );
    assert!(matches!(route("remove api key three"), Route::Invalid(_)));
  }

  #[test]
  fn list_and_summary_commands() {
    assert_eq!(route("list api keys"), Route::Command(Command::ListKeys));
    assert_eq!(route("memory summary"), Route::Command(Command::MemorySummary));
  }

  #[test]
  fn chatty_text_passes_through() {
    assert_eq!(route("what is my favorite color"), Route::Passthrough);
    assert_eq!(route("add api keyring to my shopping list"), Route::Passthrough);
    assert_eq!(route("tell me about rust lifetimes"), Route::Passthrough);
  }
}
