//! Integration tests for the SQLite stores against in-memory databases,
//! plus on-disk corruption-recovery cases under a temp directory.

use aide_core::{
  credential::{CredentialStatus, ImportSlot},
  fact::NewFact,
  store::{CredentialPool, FactStore},
};
use chrono::{Duration, Utc};

use crate::{SqliteCredentialPool, SqliteFactStore};

async fn pool() -> SqliteCredentialPool {
  SqliteCredentialPool::open_in_memory()
    .await
    .expect("in-memory pool")
}

async fn store() -> SqliteFactStore {
  SqliteFactStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Credential uniqueness ───────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_secret_is_rejected() {
  let p = pool().await;

  assert!(p.add("openai", "sk-alpha-0001", 1).await.unwrap());
  assert!(!p.add("openai", "sk-alpha-0001", 2).await.unwrap());

  let all = p.list_status("openai").await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0].priority, 1);
}

#[tokio::test]
async fn duplicate_secret_rejected_across_services() {
  let p = pool().await;

  assert!(p.add("openai", "sk-shared", 1).await.unwrap());
  assert!(!p.add("anthropic", "sk-shared", 1).await.unwrap());
}

// ─── Selection order ─────────────────────────────────────────────────────────

#[tokio::test]
async fn selection_prefers_low_priority_then_low_usage() {
  let p = pool().await;
  p.add("openai", "sk-pri3", 3).await.unwrap();
  p.add("openai", "sk-pri1", 1).await.unwrap();
  p.add("openai", "sk-pri2", 2).await.unwrap();

  let active = p.reveal_active("openai").await.unwrap();
  assert_eq!(active[0].secret, "sk-pri1");
  assert_eq!(active[1].secret, "sk-pri2");
  assert_eq!(active[2].secret, "sk-pri3");
}

#[tokio::test]
async fn usage_count_breaks_priority_ties() {
  let p = pool().await;
  p.add("openai", "sk-first", 1).await.unwrap();
  p.add("openai", "sk-second", 1).await.unwrap();

  let active = p.reveal_active("openai").await.unwrap();
  let first_id = active[0].id;
  assert_eq!(active[0].secret, "sk-first");

  // After two uses of the first credential, its peer is preferred.
  p.record_use(first_id).await.unwrap();
  p.record_use(first_id).await.unwrap();

  let active = p.reveal_active("openai").await.unwrap();
  assert_eq!(active[0].secret, "sk-second");
}

// ─── Cooldown lifecycle ──────────────────────────────────────────────────────

#[tokio::test]
async fn expired_cooldown_reactivates_lazily() {
  let p = pool().await;
  p.add("openai", "sk-cooled", 1).await.unwrap();
  let id = p.reveal_active("openai").await.unwrap()[0].id;

  // Cooldown already in the past: the next selection-affecting read must
  // see the credential active again.
  p.mark_rate_limited(id, Utc::now() - Duration::seconds(1))
    .await
    .unwrap();

  let active = p.reveal_active("openai").await.unwrap();
  assert_eq!(active.len(), 1);

  let all = p.list_status("openai").await.unwrap();
  assert_eq!(all[0].status, CredentialStatus::Active);
  assert!(all[0].cooldown_until.is_none());
}

#[tokio::test]
async fn live_cooldown_excludes_from_active_set() {
  let p = pool().await;
  p.add("openai", "sk-hot", 1).await.unwrap();
  let id = p.reveal_active("openai").await.unwrap()[0].id;

  p.mark_rate_limited(id, Utc::now() + Duration::seconds(60))
    .await
    .unwrap();

  assert!(p.reveal_active("openai").await.unwrap().is_empty());
  let all = p.list_status("openai").await.unwrap();
  assert_eq!(all[0].status, CredentialStatus::RateLimited);
  assert!(all[0].cooldown_until.is_some());
}

#[tokio::test]
async fn refresh_cooldowns_reports_reactivated_count() {
  let p = pool().await;
  p.add("openai", "sk-a", 1).await.unwrap();
  p.add("openai", "sk-b", 2).await.unwrap();

  let ids: Vec<i64> = p
    .reveal_active("openai")
    .await
    .unwrap()
    .iter()
    .map(|c| c.id)
    .collect();
  for id in &ids {
    p.mark_rate_limited(*id, Utc::now() - Duration::seconds(5))
      .await
      .unwrap();
  }

  assert_eq!(p.refresh_cooldowns("openai").await.unwrap(), 2);
  assert_eq!(p.refresh_cooldowns("openai").await.unwrap(), 0);
}

// ─── Invalid is terminal ─────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_credential_never_reactivates() {
  let p = pool().await;
  p.add("openai", "sk-dead", 1).await.unwrap();
  let id = p.reveal_active("openai").await.unwrap()[0].id;

  p.mark_invalid(id).await.unwrap();
  assert!(p.reveal_active("openai").await.unwrap().is_empty());

  // Neither the refresh pass nor a later rate-limit mark resurrects it.
  p.refresh_cooldowns("openai").await.unwrap();
  p.mark_rate_limited(id, Utc::now() - Duration::seconds(1))
    .await
    .unwrap();
  assert!(p.reveal_active("openai").await.unwrap().is_empty());

  let all = p.list_status("openai").await.unwrap();
  assert_eq!(all[0].status, CredentialStatus::Invalid);
}

// ─── Removal / masking / import ──────────────────────────────────────────────

#[tokio::test]
async fn remove_by_priority_deletes_all_matching() {
  let p = pool().await;
  p.add("openai", "sk-keep", 1).await.unwrap();
  p.add("openai", "sk-drop-a", 2).await.unwrap();
  p.add("openai", "sk-drop-b", 2).await.unwrap();

  assert!(p.remove_by_priority(2).await.unwrap());
  assert!(!p.remove_by_priority(2).await.unwrap());

  let all = p.list_status("openai").await.unwrap();
  assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn list_status_masks_secrets() {
  let p = pool().await;
  p.add("openai", "sk-abcdef1234567890wxyz", 1).await.unwrap();

  let all = p.list_status("openai").await.unwrap();
  assert_eq!(all[0].masked_secret, "sk-abcde…wxyz");
  assert!(!all[0].masked_secret.contains("1234567890"));
}

#[tokio::test]
async fn import_skips_existing_secrets() {
  let p = pool().await;
  p.add("openai", "sk-already", 1).await.unwrap();

  let slots = vec![
    ImportSlot { slot: 1, secret: "sk-already".into() },
    ImportSlot { slot: 2, secret: "sk-fresh-a".into() },
    ImportSlot { slot: 3, secret: "sk-fresh-b".into() },
  ];
  assert_eq!(p.import_keys("openai", &slots).await.unwrap(), 2);
  // Re-running the same import is a no-op.
  assert_eq!(p.import_keys("openai", &slots).await.unwrap(), 0);

  let all = p.list_status("openai").await.unwrap();
  assert_eq!(all.len(), 3);
  assert_eq!(all[2].priority, 3);
}

// ─── Fact versioning ─────────────────────────────────────────────────────────

#[tokio::test]
async fn single_current_row_per_pair() {
  let s = store().await;

  for value in ["blue", "green", "red"] {
    s.add_fact(NewFact::new("user", "favorite_color", value))
      .await
      .unwrap();
  }

  let history = s.fact_history("user", "favorite_color").await.unwrap();
  assert_eq!(history.len(), 3);
  assert_eq!(history.iter().filter(|f| f.is_current()).count(), 1);

  let current = s.current_fact("user", "favorite_color").await.unwrap().unwrap();
  assert_eq!(current.value, "red");
}

#[tokio::test]
async fn history_is_newest_first() {
  let s = store().await;
  let t0 = Utc::now() - Duration::days(2);
  let t1 = Utc::now() - Duration::days(1);

  s.add_fact(NewFact::new("user", "city", "Lisbon").with_valid_from(t0))
    .await
    .unwrap();
  s.add_fact(NewFact::new("user", "city", "Porto").with_valid_from(t1))
    .await
    .unwrap();

  let history = s.fact_history("user", "city").await.unwrap();
  assert_eq!(history[0].value, "Porto");
  assert_eq!(history[1].value, "Lisbon");
  // The superseded row was closed at its successor's valid_from.
  assert_eq!(history[1].valid_until, Some(t1));
}

#[tokio::test]
async fn point_in_time_query_matches_interval() {
  let s = store().await;
  let t1 = Utc::now() - Duration::days(10);
  let t2 = Utc::now() - Duration::days(5);

  s.add_fact(NewFact::new("user", "color", "blue").with_valid_from(t1))
    .await
    .unwrap();
  s.add_fact(NewFact::new("user", "color", "red").with_valid_from(t2))
    .await
    .unwrap();

  // Before t1: nothing.
  let before = s
    .fact_at("user", "color", t1 - Duration::seconds(1))
    .await
    .unwrap();
  assert!(before.is_none());

  // [t1, t2): blue — including t1 itself.
  let at_t1 = s.fact_at("user", "color", t1).await.unwrap().unwrap();
  assert_eq!(at_t1.value, "blue");
  let mid = s
    .fact_at("user", "color", t2 - Duration::seconds(1))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(mid.value, "blue");

  // At t2 the boundary belongs to the new value: exactly one row matches.
  let at_t2 = s.fact_at("user", "color", t2).await.unwrap().unwrap();
  assert_eq!(at_t2.value, "red");
  let now = s.fact_at("user", "color", Utc::now()).await.unwrap().unwrap();
  assert_eq!(now.value, "red");
}

#[tokio::test]
async fn unknown_pair_reads_empty() {
  let s = store().await;
  assert!(s.current_fact("user", "shoe_size").await.unwrap().is_none());
  assert!(s.fact_history("user", "shoe_size").await.unwrap().is_empty());
  assert!(
    s.fact_at("user", "shoe_size", Utc::now())
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn memory_summary_covers_current_facts_only() {
  let s = store().await;

  s.add_fact(NewFact::new("user", "favorite_color", "blue"))
    .await
    .unwrap();
  // Supersede: the old row must drop out of the summary.
  s.add_fact(NewFact::new("user", "favorite_color", "red"))
    .await
    .unwrap();
  s.add_fact(NewFact::new("user", "employer", "Initech").with_category("work"))
    .await
    .unwrap();

  let summary = s.memory_summary("user").await.unwrap();
  assert_eq!(summary.len(), 2);
  assert_eq!(summary["personal"].count, 1);
  assert_eq!(summary["work"].count, 1);
  assert!((summary["personal"].average_confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn metadata_roundtrips_as_json() {
  let s = store().await;

  let mut input = NewFact::new("user", "timezone", "Europe/Lisbon");
  input.metadata = Some(serde_json::json!({"via": "settings", "utc_offset": 1}));
  s.add_fact(input).await.unwrap();

  let fact = s.current_fact("user", "timezone").await.unwrap().unwrap();
  assert_eq!(fact.metadata.unwrap()["via"], "settings");
}

// ─── Corruption recovery ─────────────────────────────────────────────────────

#[tokio::test]
async fn corrupt_file_is_quarantined_on_open() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("memory.db");

  // Not a SQLite database at all.
  std::fs::write(&path, b"definitely not a database").unwrap();

  let s = SqliteFactStore::open(&path).await.expect("open must not raise");

  // The damaged file was preserved at the backup path.
  let backup = dir.path().join("memory.db.corrupt");
  assert!(backup.exists());
  assert_eq!(
    std::fs::read(&backup).unwrap(),
    b"definitely not a database"
  );

  // The fresh store is fully usable.
  s.add_fact(NewFact::new("user", "favorite_color", "blue"))
    .await
    .unwrap();
  let fact = s.current_fact("user", "favorite_color").await.unwrap().unwrap();
  assert_eq!(fact.value, "blue");
}

#[tokio::test]
async fn recovery_backup_overwrites_previous() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("memory.db");

  std::fs::write(&path, b"first corruption").unwrap();
  SqliteFactStore::open(&path).await.unwrap();

  std::fs::write(&path, b"second corruption").unwrap();
  SqliteFactStore::open(&path).await.unwrap();

  let backup = dir.path().join("memory.db.corrupt");
  assert_eq!(std::fs::read(&backup).unwrap(), b"second corruption");
}

#[tokio::test]
async fn healthy_file_survives_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("memory.db");

  {
    let s = SqliteFactStore::open(&path).await.unwrap();
    s.add_fact(NewFact::new("user", "favorite_color", "blue"))
      .await
      .unwrap();
  }

  let s = SqliteFactStore::open(&path).await.unwrap();
  let fact = s.current_fact("user", "favorite_color").await.unwrap().unwrap();
  assert_eq!(fact.value, "blue");
  assert!(!dir.path().join("memory.db.corrupt").exists());
}
