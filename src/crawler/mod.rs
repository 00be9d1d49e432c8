//! Crawler detection log
//!
//! An external monitor that finds fingerprinted content on the web reports
//! each sighting here. Only the content hash is kept, not the content.

use crate::clock::Clock;
use crate::fingerprint::Fingerprint;
use crate::store::{CrawlerDetectionRecord, ProvenanceStore, RecordId};
use crate::{ProvmarkError, ProvmarkResult};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Default number of detections returned for reporting.
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// Append-only log of external sightings.
pub struct CrawlerDetectionLog {
    store: Arc<dyn ProvenanceStore>,
    clock: Arc<dyn Clock>,
}

impl CrawlerDetectionLog {
    pub fn new(store: Arc<dyn ProvenanceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record that content carrying `fingerprint` was observed at `url`.
    pub fn record(
        &self,
        fingerprint: &Fingerprint,
        url: &str,
        observed_content: &str,
    ) -> ProvmarkResult<(RecordId, CrawlerDetectionRecord)> {
        let parsed = url::Url::parse(url.trim())
            .map_err(|e| ProvmarkError::InvalidInput(format!("invalid detection url '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProvmarkError::InvalidInput(format!(
                "detection url must be http(s), got '{}'",
                parsed.scheme()
            )));
        }

        let record = CrawlerDetectionRecord {
            fingerprint: fingerprint.clone(),
            detected_url: parsed.to_string(),
            content_hash: hex::encode(Sha256::digest(observed_content.as_bytes())),
            detected_at: self.clock.now(),
        };
        let id = self.store.insert_crawler_detection(&record)?;
        tracing::warn!(
            fingerprint = fingerprint.short(),
            url = %record.detected_url,
            "Fingerprinted content sighted externally"
        );
        Ok((id, record))
    }

    /// Newest detections first.
    pub fn recent(&self, limit: usize) -> ProvmarkResult<Vec<CrawlerDetectionRecord>> {
        Ok(self.store.recent_crawler_detections(limit)?)
    }
}
