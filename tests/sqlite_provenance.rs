//! Provenance persisted in a real SQLite file
//!
//! Exercises the engine over `SqliteStore` on disk: records must survive a
//! reopen, and the time-window queries must agree with the in-memory store.

use chrono::{Duration, TimeZone, Utc};
use provmark::{
    ClientInfo, EmbedContext, ManualClock, MemoryStore, ProvenanceOutcome, ProvenanceStore, Secret, SqliteStore,
    WatermarkConfig, WatermarkEngine, WizardSnapshot,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const BODY: &str = "<html><head></head><body><p>We collect personal data to process orders.</p></body></html>";

fn config() -> WatermarkConfig {
    WatermarkConfig {
        secret: Secret::new("sqlite-secret"),
        ..Default::default()
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 11, 5, 9, 30, 0).unwrap()))
}

fn context(owner: Option<&str>, answers: serde_json::Value) -> EmbedContext {
    EmbedContext::new(owner.map(str::to_string), WizardSnapshot::new(answers))
        .with_client(ClientInfo::new("198.51.100.23", "curl/8.5"))
}

#[test]
fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("provmark.db");

    let fingerprint = {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let engine = WatermarkEngine::new(config(), store, clock());
        let artifact = engine.watermark(BODY, &context(Some("user-1"), json!({"a": 1})));
        assert!(matches!(artifact.provenance, ProvenanceOutcome::Recorded(_)));
        artifact.fingerprint
    };
    assert!(path.exists());

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let record = store.find_tracking_record(&fingerprint).unwrap().unwrap();
    assert_eq!(record.owner.as_deref(), Some("user-1"));
    assert_eq!(record.client_address, "198.51.100.23");
    assert_eq!(record.client_agent, "curl/8.5");
}

#[test]
fn test_engine_open_uses_configured_path() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.database_path = Some(dir.path().join("open.db"));

    let engine = WatermarkEngine::open(config).unwrap();
    let artifact = engine.watermark(BODY, &context(Some("user-2"), json!({})));
    assert!(engine.verifier().verify(&artifact.content).authentic);
    assert!(dir.path().join("open.db").exists());
}

#[test]
fn test_statistics_global_and_per_owner() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = WatermarkEngine::new(config(), store, clock());
    engine.watermark(BODY, &context(Some("alice"), json!({"v": 1})));
    engine.watermark(BODY, &context(Some("alice"), json!({"v": 2})));
    engine.watermark(BODY, &context(Some("bob"), json!({"v": 1})));
    engine.watermark(BODY, &context(None, json!({"v": 1})));

    let global = engine.verifier().statistics(None).unwrap();
    assert_eq!(global.total_documents, 4);
    assert_eq!(global.unique_fingerprints, 4);
    assert_eq!(global.total_owners, Some(2));

    let alice = engine.verifier().statistics(Some("alice")).unwrap();
    assert_eq!(alice.total_documents, 2);
    assert_eq!(alice.total_owners, None);
}

#[test]
fn test_window_queries_match_memory_store() {
    let sqlite: Arc<dyn ProvenanceStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let memory: Arc<dyn ProvenanceStore> = Arc::new(MemoryStore::new());

    for store in [sqlite, memory] {
        let clock = clock();
        let engine = WatermarkEngine::new(config(), store.clone(), clock.clone());
        let ctx = context(Some("carol"), json!({"plan": "basic"}));
        engine.watermark(BODY, &ctx);
        let hash = ctx.snapshot.content_hash();

        clock.advance(Duration::seconds(299));
        assert!(engine.verifier().is_duplicate("carol", &hash, None));
        clock.advance(Duration::seconds(1));
        // Exactly at the window edge no longer counts
        assert!(!engine.verifier().is_duplicate("carol", &hash, None));
    }
}

#[test]
fn test_recent_listings_newest_first() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let clock = clock();
    let engine = WatermarkEngine::new(config(), store, clock.clone());

    let first = engine.watermark(BODY, &context(Some("dave"), json!({"n": 1})));
    clock.advance(Duration::minutes(5));
    let second = engine.watermark(BODY, &context(Some("dave"), json!({"n": 2})));

    let recent = engine.verifier().recent_documents(10).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].fingerprint, second.fingerprint);
    assert_eq!(recent[1].fingerprint, first.fingerprint);

    engine
        .crawler()
        .record(&first.fingerprint, "https://mirror.example/p", &first.content)
        .unwrap();
    let sightings = engine.crawler().recent(5).unwrap();
    assert_eq!(sightings[0].fingerprint, first.fingerprint);
}

#[test]
fn test_tokens_persist_and_expire() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("tokens.db")).unwrap());
    let clock = clock();
    let engine = WatermarkEngine::new(config(), store, clock.clone());

    let artifact = engine.watermark(BODY, &context(Some("erin"), json!({})));
    let token = engine.tokens().issue(&artifact.fingerprint, "erin.example").unwrap();
    assert!(engine.tokens().check(&token.token).unwrap().is_valid());

    clock.advance(Duration::days(30));
    assert!(!engine.tokens().check(&token.token).unwrap().is_valid());
}
