//! SQLite-backed provenance store
//!
//! Three insert-only tables: `watermark_tracking`, `verification_tokens`
//! and `crawler_detections`. Timestamps are stored as Unix milliseconds so
//! window queries stay plain integer comparisons.

use super::{
    CrawlerDetectionRecord, ProvenanceStore, RecordId, StoreError, StoreResult, TrackingRecord,
    VerificationToken, WatermarkStats,
};
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS watermark_tracking (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL,
    owner TEXT,
    snapshot_hash TEXT NOT NULL,
    client_address TEXT NOT NULL,
    client_agent TEXT NOT NULL,
    metadata TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tracking_fingerprint ON watermark_tracking(fingerprint);
CREATE INDEX IF NOT EXISTS idx_tracking_owner_hash ON watermark_tracking(owner, snapshot_hash, created_at);

CREATE TABLE IF NOT EXISTS verification_tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL,
    domain TEXT NOT NULL,
    token TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tokens_token ON verification_tokens(token);

CREATE TABLE IF NOT EXISTS crawler_detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL,
    detected_url TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    detected_at INTEGER NOT NULL
);
";

/// Durable store over one SQLite connection.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let db = Connection::open(path)?;
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(db)?;
        info!(path = %path.display(), "Provenance store opened");
        Ok(store)
    }

    /// A private database that disappears with the store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> StoreResult<Self> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", ms)))
}

fn parse_fingerprint(raw: &str) -> StoreResult<Fingerprint> {
    Fingerprint::parse(raw).map_err(|_| StoreError::Corrupt(format!("bad fingerprint '{}'", raw)))
}

type TrackingRow = (String, Option<String>, String, String, String, String, i64);

const TRACKING_COLUMNS: &str =
    "fingerprint, owner, snapshot_hash, client_address, client_agent, metadata, created_at";

fn tracking_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackingRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn tracking_from_row(row: TrackingRow) -> StoreResult<TrackingRecord> {
    let (fingerprint, owner, snapshot_hash, client_address, client_agent, metadata, created_at) = row;
    Ok(TrackingRecord {
        fingerprint: parse_fingerprint(&fingerprint)?,
        owner,
        snapshot_hash,
        client_address,
        client_agent,
        metadata: serde_json::from_str(&metadata)?,
        created_at: from_millis(created_at)?,
    })
}

type TokenRow = (String, String, String, i64, i64);

fn token_from_row(row: TokenRow) -> StoreResult<VerificationToken> {
    let (fingerprint, domain, token, created_at, expires_at) = row;
    Ok(VerificationToken {
        fingerprint: parse_fingerprint(&fingerprint)?,
        domain,
        token,
        created_at: from_millis(created_at)?,
        expires_at: from_millis(expires_at)?,
    })
}

impl ProvenanceStore for SqliteStore {
    fn insert_tracking_record(&self, record: &TrackingRecord) -> StoreResult<RecordId> {
        let metadata = serde_json::to_string(&record.metadata)?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO watermark_tracking
                (fingerprint, owner, snapshot_hash, client_address, client_agent, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.fingerprint.as_str(),
                record.owner,
                record.snapshot_hash,
                record.client_address,
                record.client_agent,
                metadata,
                to_millis(record.created_at),
            ],
        )?;
        let id = db.last_insert_rowid();
        debug!(id, fingerprint = record.fingerprint.short(), "Inserted tracking record");
        Ok(id)
    }

    fn find_tracking_record(&self, fingerprint: &Fingerprint) -> StoreResult<Option<TrackingRecord>> {
        let db = self.conn()?;
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {} FROM watermark_tracking WHERE fingerprint = ?1 ORDER BY id LIMIT 1",
            TRACKING_COLUMNS
        ))?;
        let row = stmt
            .query_row([fingerprint.as_str()], tracking_row)
            .optional()?;
        row.map(tracking_from_row).transpose()
    }

    fn insert_verification_token(&self, token: &VerificationToken) -> StoreResult<RecordId> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO verification_tokens (fingerprint, domain, token, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token.fingerprint.as_str(),
                token.domain,
                token.token,
                to_millis(token.created_at),
                to_millis(token.expires_at),
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    fn find_verification_token(&self, value: &str) -> StoreResult<Option<VerificationToken>> {
        let db = self.conn()?;
        let mut stmt = db.prepare_cached(
            "SELECT fingerprint, domain, token, created_at, expires_at
             FROM verification_tokens WHERE token = ?1 ORDER BY id DESC LIMIT 1",
        )?;
        let row = stmt
            .query_row([value], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
            .optional()?;
        row.map(token_from_row).transpose()
    }

    fn insert_crawler_detection(&self, record: &CrawlerDetectionRecord) -> StoreResult<RecordId> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO crawler_detections (fingerprint, detected_url, content_hash, detected_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.fingerprint.as_str(),
                record.detected_url,
                record.content_hash,
                to_millis(record.detected_at),
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    fn count_recent(
        &self,
        owner: &str,
        snapshot_hash: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let since = to_millis(super::window_start(now, window));
        let db = self.conn()?;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM watermark_tracking
             WHERE owner = ?1 AND snapshot_hash = ?2 AND created_at > ?3",
            params![owner, snapshot_hash, since],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn statistics(&self, owner: Option<&str>) -> StoreResult<WatermarkStats> {
        let db = self.conn()?;
        let stats = match owner {
            Some(owner) => db.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT fingerprint)
                 FROM watermark_tracking WHERE owner = ?1",
                [owner],
                |row| {
                    Ok(WatermarkStats {
                        total_documents: row.get::<_, i64>(0)?.max(0) as u64,
                        unique_fingerprints: row.get::<_, i64>(1)?.max(0) as u64,
                        total_owners: None,
                    })
                },
            )?,
            None => db.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT fingerprint), COUNT(DISTINCT owner)
                 FROM watermark_tracking",
                [],
                |row| {
                    Ok(WatermarkStats {
                        total_documents: row.get::<_, i64>(0)?.max(0) as u64,
                        unique_fingerprints: row.get::<_, i64>(1)?.max(0) as u64,
                        total_owners: Some(row.get::<_, i64>(2)?.max(0) as u64),
                    })
                },
            )?,
        };
        Ok(stats)
    }

    fn recent_tracking_records(&self, limit: usize) -> StoreResult<Vec<TrackingRecord>> {
        let db = self.conn()?;
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {} FROM watermark_tracking ORDER BY created_at DESC, id DESC LIMIT ?1",
            TRACKING_COLUMNS
        ))?;
        let rows = stmt
            .query_map([limit as i64], tracking_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(tracking_from_row).collect()
    }

    fn recent_crawler_detections(&self, limit: usize) -> StoreResult<Vec<CrawlerDetectionRecord>> {
        let db = self.conn()?;
        let mut stmt = db.prepare_cached(
            "SELECT fingerprint, detected_url, content_hash, detected_at
             FROM crawler_detections ORDER BY detected_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(fingerprint, detected_url, content_hash, detected_at)| {
                Ok(CrawlerDetectionRecord {
                    fingerprint: parse_fingerprint(&fingerprint)?,
                    detected_url,
                    content_hash,
                    detected_at: from_millis(detected_at)?,
                })
            })
            .collect()
    }
}
