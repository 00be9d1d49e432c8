//! Provenance store
//!
//! The watermarking core never talks to a database directly. It is handed
//! an implementation of [`ProvenanceStore`] at construction and treats every
//! call as one atomic operation. Two implementations ship with the crate:
//!
//! - [`memory::MemoryStore`]: process-local, used by tests and one-shot runs
//! - [`sqlite::SqliteStore`]: durable, backed by a single SQLite file

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Records ───────────────────────────────────────────────────────

/// Provenance of one generated document. Insert-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub fingerprint: Fingerprint,
    /// Owning user, if the document was generated by a known account
    pub owner: Option<String>,
    /// SHA-256 of the canonical answer snapshot
    pub snapshot_hash: String,
    pub client_address: String,
    pub client_agent: String,
    /// Free-form caller metadata
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Assertion that a fingerprint may be hosted on a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationToken {
    pub fingerprint: Fingerprint,
    pub domain: String,
    /// `sha256(fingerprint ∥ domain ∥ secret)` as lowercase hex
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// An external sighting of fingerprinted content. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerDetectionRecord {
    pub fingerprint: Fingerprint,
    pub detected_url: String,
    /// SHA-256 of the observed content
    pub content_hash: String,
    pub detected_at: DateTime<Utc>,
}

/// Aggregate counts over the tracking table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkStats {
    pub total_documents: u64,
    pub unique_fingerprints: u64,
    /// Distinct owners; only reported for the global view
    pub total_owners: Option<u64>,
}

/// Start of a lookback window ending at `now`. Windows reaching past the
/// representable range start at the earliest representable instant.
pub(crate) fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Row identifier assigned by the store.
pub type RecordId = i64;

// ─── Errors ────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Provenance store unavailable: {0}")]
    Unavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

// ─── Interface ─────────────────────────────────────────────────────

/// Narrow persistence interface required by the watermarking core.
pub trait ProvenanceStore: Send + Sync {
    fn insert_tracking_record(&self, record: &TrackingRecord) -> StoreResult<RecordId>;

    fn find_tracking_record(&self, fingerprint: &Fingerprint) -> StoreResult<Option<TrackingRecord>>;

    fn insert_verification_token(&self, token: &VerificationToken) -> StoreResult<RecordId>;

    /// Most recently issued token with this value.
    fn find_verification_token(&self, value: &str) -> StoreResult<Option<VerificationToken>>;

    fn insert_crawler_detection(&self, record: &CrawlerDetectionRecord) -> StoreResult<RecordId>;

    /// Records for `(owner, snapshot_hash)` created strictly after `now - window`.
    fn count_recent(
        &self,
        owner: &str,
        snapshot_hash: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Global statistics, or those of a single owner.
    fn statistics(&self, owner: Option<&str>) -> StoreResult<WatermarkStats>;

    /// Newest tracking records first.
    fn recent_tracking_records(&self, limit: usize) -> StoreResult<Vec<TrackingRecord>>;

    /// Newest crawler detections first.
    fn recent_crawler_detections(&self, limit: usize) -> StoreResult<Vec<CrawlerDetectionRecord>>;
}
