//! In-memory provenance store

use super::{
    CrawlerDetectionRecord, ProvenanceStore, RecordId, StoreError, StoreResult, TrackingRecord,
    VerificationToken, WatermarkStats,
};
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    tracking: Vec<TrackingRecord>,
    tokens: Vec<VerificationToken>,
    detections: Vec<CrawlerDetectionRecord>,
}

/// Process-local store. Can be switched offline to simulate an unreachable
/// backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    offline: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut flag) = self.offline.lock() {
            *flag = offline;
        }
    }

    pub fn tracking_len(&self) -> usize {
        self.tables.lock().map(|t| t.tracking.len()).unwrap_or(0)
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        if *self.offline.lock().map_err(|_| StoreError::Poisoned)? {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn next_id(len: usize) -> RecordId {
    len as RecordId
}

impl ProvenanceStore for MemoryStore {
    fn insert_tracking_record(&self, record: &TrackingRecord) -> StoreResult<RecordId> {
        let mut tables = self.tables()?;
        tables.tracking.push(record.clone());
        Ok(next_id(tables.tracking.len()))
    }

    fn find_tracking_record(&self, fingerprint: &Fingerprint) -> StoreResult<Option<TrackingRecord>> {
        let tables = self.tables()?;
        Ok(tables
            .tracking
            .iter()
            .find(|r| &r.fingerprint == fingerprint)
            .cloned())
    }

    fn insert_verification_token(&self, token: &VerificationToken) -> StoreResult<RecordId> {
        let mut tables = self.tables()?;
        tables.tokens.push(token.clone());
        Ok(next_id(tables.tokens.len()))
    }

    fn find_verification_token(&self, value: &str) -> StoreResult<Option<VerificationToken>> {
        let tables = self.tables()?;
        Ok(tables.tokens.iter().rev().find(|t| t.token == value).cloned())
    }

    fn insert_crawler_detection(&self, record: &CrawlerDetectionRecord) -> StoreResult<RecordId> {
        let mut tables = self.tables()?;
        tables.detections.push(record.clone());
        Ok(next_id(tables.detections.len()))
    }

    fn count_recent(
        &self,
        owner: &str,
        snapshot_hash: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let since = super::window_start(now, window);
        let tables = self.tables()?;
        Ok(tables
            .tracking
            .iter()
            .filter(|r| {
                r.owner.as_deref() == Some(owner)
                    && r.snapshot_hash == snapshot_hash
                    && r.created_at > since
            })
            .count() as u64)
    }

    fn statistics(&self, owner: Option<&str>) -> StoreResult<WatermarkStats> {
        let tables = self.tables()?;
        let rows: Vec<&TrackingRecord> = tables
            .tracking
            .iter()
            .filter(|r| owner.is_none() || r.owner.as_deref() == owner)
            .collect();

        let unique: HashSet<&Fingerprint> = rows.iter().map(|r| &r.fingerprint).collect();
        let total_owners = match owner {
            Some(_) => None,
            None => {
                let owners: HashSet<&str> = rows.iter().filter_map(|r| r.owner.as_deref()).collect();
                Some(owners.len() as u64)
            }
        };

        Ok(WatermarkStats {
            total_documents: rows.len() as u64,
            unique_fingerprints: unique.len() as u64,
            total_owners,
        })
    }

    fn recent_tracking_records(&self, limit: usize) -> StoreResult<Vec<TrackingRecord>> {
        let tables = self.tables()?;
        let mut rows = tables.tracking.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    fn recent_crawler_detections(&self, limit: usize) -> StoreResult<Vec<CrawlerDetectionRecord>> {
        let tables = self.tables()?;
        let mut rows = tables.detections.clone();
        rows.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        rows.truncate(limit);
        Ok(rows)
    }
}
