//! `aide` — a line-oriented personal assistant over a credential-rotating
//! LLM engine and a versioned long-term memory.
//!
//! Reads `config.toml` (or the path given with `--config`), overlays `AIDE_*`
//! environment variables, opens the two stores, imports any environment
//! credentials, and runs the conversation loop until `quit` or EOF.

mod app;
mod commands;
mod settings;
mod transcript;

use std::{io::Write as _, sync::Arc, time::Duration};

use anyhow::Context as _;
use aide_core::store::CredentialPool as _;
use aide_engine::{EngineConfig, OpenAiBackend, RotationEngine};
use aide_store_sqlite::{SqliteCredentialPool, SqliteFactStore};
use clap::Parser;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use app::{App, Turn};
use settings::AppConfig;
use transcript::TranscriptLog;

#[derive(Parser)]
#[command(author, version, about = "aide personal assistant")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration: file first, environment overrides on top.
  let sources = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("AIDE"))
    .build()
    .context("failed to read configuration")?;
  let cfg: AppConfig = sources
    .try_deserialize()
    .context("failed to deserialise AppConfig")?;

  // Ensure storage directories exist before the stores open files in them.
  for path in [&cfg.credentials_db, &cfg.facts_db] {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .with_context(|| format!("creating {}", parent.display()))?;
    }
  }
  std::fs::create_dir_all(&cfg.session_dir)
    .with_context(|| format!("creating {}", cfg.session_dir.display()))?;

  // Open the durable stores. Both are explicitly constructed here and
  // injected below — nothing holds a global instance.
  let pool = SqliteCredentialPool::open(&cfg.credentials_db)
    .await
    .with_context(|| {
      format!("opening credential pool at {}", cfg.credentials_db.display())
    })?;
  let facts = SqliteFactStore::open(&cfg.facts_db)
    .await
    .with_context(|| format!("opening fact store at {}", cfg.facts_db.display()))?;

  // Bulk-import credentials from the environment, skipping known secrets.
  let env_slots = settings::keys_from_env();
  if !env_slots.is_empty() {
    let imported = pool
      .import_keys(&cfg.service, &env_slots)
      .await
      .context("importing credentials from environment")?;
    if imported == 0 {
      tracing::debug!("no new credentials in environment");
    }
  }

  // Build the rotation engine.
  let backend = OpenAiBackend::new(&cfg.base_url)
    .map_err(|e| anyhow::anyhow!("building chat backend: {e}"))?;
  let mut engine_cfg = EngineConfig::for_service(&cfg.service);
  engine_cfg.min_request_interval = Duration::from_secs(cfg.min_request_interval_secs);
  engine_cfg.retry_sweeps = cfg.retry_sweeps;
  engine_cfg.max_exhaustion_wait = Duration::from_secs(cfg.max_exhaustion_wait_secs);
  let engine = RotationEngine::new(pool.clone(), backend, engine_cfg);

  // Transcript logging with periodic autosave.
  let transcript = Arc::new(TranscriptLog::new(&cfg.session_dir));
  let autosave = transcript
    .spawn_autosave(Duration::from_secs(cfg.autosave_interval_secs));

  let mut app = App::new(
    pool,
    facts,
    engine,
    Arc::clone(&transcript),
    cfg.service.clone(),
    cfg.model.clone(),
  );

  // The conversation loop: one request in flight at a time.
  println!("aide: Systems ready. How may I assist you?");
  let mut lines = BufReader::new(tokio::io::stdin()).lines();

  loop {
    print!("you> ");
    std::io::stdout().flush().ok();

    let Some(line) = lines.next_line().await.context("reading input")? else {
      break; // EOF
    };
    let input = line.trim();
    if input.is_empty() {
      continue;
    }

    match app.handle(input).await {
      Turn::Reply(reply) => println!("aide: {reply}"),
      Turn::Quit => break,
    }
  }

  // Shut down: stop the autosave task, then write the final transcript.
  autosave.abort();
  if let Err(e) = transcript.save(false) {
    tracing::warn!(error = %e, "failed to save final transcript");
  }
  println!("aide: Shutting down. Goodbye.");

  Ok(())
}
