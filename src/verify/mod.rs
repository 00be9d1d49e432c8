//! Verification engine
//!
//! Recovers a fingerprint from arbitrary content and decides whether it
//! belongs to a document this system issued.
//!
//! Extraction order:
//! 1. the visible `<!-- gdprwiz-fp: … -->` marker (or a bare pasted literal)
//! 2. the zero-width channel, decoded with [`crate::stego`]
//!
//! Every failure path produces a value, never an error: a missing marker, a
//! malformed literal, an unknown fingerprint and an unreachable store each
//! map to `authentic = false` with a distinct [`VerificationReason`].

pub mod similarity;
pub mod tokens;

pub use similarity::{RankedCandidate, SimilarityDetector, TheftReport};
pub use tokens::{TokenIssuer, TokenStatus};

use crate::clock::Clock;
use crate::fingerprint::{is_fingerprint_literal, Fingerprint};
use crate::store::{ProvenanceStore, TrackingRecord, WatermarkStats};
use crate::{stego, ProvmarkResult};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default number of tracking records returned for reporting.
pub const DEFAULT_RECENT_DOCUMENTS: usize = 50;

static VISIBLE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!-- gdprwiz-fp: ([a-f0-9]{64}) -->").unwrap());

// ─── Extraction ────────────────────────────────────────────────────

/// Where a fingerprint was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    VisibleMarker,
    /// The whole input was a fingerprint literal
    PastedLiteral,
    ZeroWidth,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VisibleMarker => write!(f, "visible marker"),
            Self::PastedLiteral => write!(f, "pasted literal"),
            Self::ZeroWidth => write!(f, "zero-width channel"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found { fingerprint: Fingerprint, channel: Channel },
    /// A channel was present but did not carry a valid literal
    Malformed(String),
    NotFound,
}

impl Extraction {
    pub fn fingerprint(self) -> Option<Fingerprint> {
        match self {
            Self::Found { fingerprint, .. } => Some(fingerprint),
            _ => None,
        }
    }
}

/// Recover the fingerprint embedded in `content`.
pub fn extract_fingerprint(content: &str) -> Extraction {
    if let Some(caps) = VISIBLE_MARKER.captures(content) {
        if let Ok(fingerprint) = Fingerprint::parse(&caps[1]) {
            return Extraction::Found {
                fingerprint,
                channel: Channel::VisibleMarker,
            };
        }
    }

    let trimmed = content.trim();
    if is_fingerprint_literal(trimmed) {
        if let Ok(fingerprint) = Fingerprint::parse(trimmed) {
            return Extraction::Found {
                fingerprint,
                channel: Channel::PastedLiteral,
            };
        }
    }

    match stego::decode_fingerprint(content) {
        Some(Ok(fingerprint)) => Extraction::Found {
            fingerprint,
            channel: Channel::ZeroWidth,
        },
        Some(Err(raw)) => Extraction::Malformed(raw),
        None => Extraction::NotFound,
    }
}

// ─── Verdicts ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationReason {
    NoFingerprint,
    MalformedFingerprint,
    FingerprintNotFound,
    StoreUnavailable,
}

impl std::fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFingerprint => write!(f, "no fingerprint found"),
            Self::MalformedFingerprint => write!(f, "malformed fingerprint"),
            Self::FingerprintNotFound => write!(f, "fingerprint not found"),
            Self::StoreUnavailable => write!(f, "provenance store unavailable"),
        }
    }
}

/// Authenticity verdict for one piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub authentic: bool,
    pub fingerprint: Option<Fingerprint>,
    pub channel: Option<Channel>,
    pub record: Option<TrackingRecord>,
    pub reason: Option<VerificationReason>,
}

impl Verification {
    fn rejected(reason: VerificationReason, fingerprint: Option<Fingerprint>, channel: Option<Channel>) -> Self {
        Self {
            authentic: false,
            fingerprint,
            channel,
            record: None,
            reason: Some(reason),
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.record.as_ref().and_then(|r| r.owner.as_deref())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.record.as_ref().map(|r| r.created_at)
    }

    pub fn client_address(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.client_address.as_str())
    }
}

impl std::fmt::Display for Verification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.record, &self.reason) {
            (Some(record), _) => write!(
                f,
                "AUTHENTIC: {} issued {} to {} from {}",
                record.fingerprint.short(),
                record.created_at.to_rfc3339(),
                record.owner.as_deref().unwrap_or("anonymous"),
                record.client_address
            ),
            (None, Some(reason)) => write!(f, "NOT AUTHENTIC: {}", reason),
            (None, None) => write!(f, "NOT AUTHENTIC"),
        }
    }
}

// ─── Engine ────────────────────────────────────────────────────────

/// Extraction, provenance lookup, theft and duplicate detection.
pub struct VerificationEngine {
    store: Arc<dyn ProvenanceStore>,
    clock: Arc<dyn Clock>,
    detector: SimilarityDetector,
    duplicate_window: Duration,
}

impl VerificationEngine {
    pub fn new(
        store: Arc<dyn ProvenanceStore>,
        clock: Arc<dyn Clock>,
        detector: SimilarityDetector,
        duplicate_window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            detector,
            duplicate_window,
        }
    }

    pub fn extract(&self, content: &str) -> Extraction {
        extract_fingerprint(content)
    }

    /// Decide whether `content` is a document this system issued.
    pub fn verify(&self, content: &str) -> Verification {
        match self.extract(content) {
            Extraction::Found { fingerprint, channel } => self.lookup(fingerprint, Some(channel)),
            Extraction::Malformed(raw) => {
                tracing::debug!(len = raw.len(), "Recovered channel is not a fingerprint");
                Verification::rejected(VerificationReason::MalformedFingerprint, None, None)
            }
            Extraction::NotFound => Verification::rejected(VerificationReason::NoFingerprint, None, None),
        }
    }

    /// Verify a fingerprint literal directly. Malformed input never reaches
    /// the store.
    pub fn verify_fingerprint(&self, literal: &str) -> Verification {
        match Fingerprint::parse(literal.trim()) {
            Ok(fingerprint) => self.lookup(fingerprint, None),
            Err(_) => Verification::rejected(VerificationReason::MalformedFingerprint, None, None),
        }
    }

    fn lookup(&self, fingerprint: Fingerprint, channel: Option<Channel>) -> Verification {
        match self.store.find_tracking_record(&fingerprint) {
            Ok(Some(record)) => {
                tracing::info!(fingerprint = fingerprint.short(), "Document verified");
                Verification {
                    authentic: true,
                    fingerprint: Some(fingerprint),
                    channel,
                    record: Some(record),
                    reason: None,
                }
            }
            Ok(None) => {
                tracing::info!(fingerprint = fingerprint.short(), "Fingerprint not on record");
                Verification::rejected(VerificationReason::FingerprintNotFound, Some(fingerprint), channel)
            }
            Err(e) => {
                tracing::warn!("Provenance lookup failed: {}", e);
                Verification::rejected(VerificationReason::StoreUnavailable, Some(fingerprint), channel)
            }
        }
    }

    /// Compare an original against a suspect copy.
    pub fn similarity(&self, original: &str, suspect: &str) -> TheftReport {
        let report = self.detector.compare(original, suspect);
        if report.is_theft {
            tracing::info!("Theft candidate: {}", report);
        }
        report
    }

    /// Score many suspects against one original, most similar first.
    pub fn rank_candidates(&self, original: &str, suspects: &[(String, String)]) -> Vec<RankedCandidate> {
        self.detector.rank_candidates(original, suspects)
    }

    /// Whether `owner` generated a document from the same answers within
    /// `window` (the configured window when `None`). A store failure counts
    /// as "not a duplicate" so generation is never blocked by it.
    pub fn is_duplicate(&self, owner: &str, snapshot_hash: &str, window: Option<Duration>) -> bool {
        let window = window.unwrap_or(self.duplicate_window);
        match self
            .store
            .count_recent(owner, snapshot_hash, window, self.clock.now())
        {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!("Duplicate check skipped: {}", e);
                false
            }
        }
    }

    pub fn statistics(&self, owner: Option<&str>) -> ProvmarkResult<WatermarkStats> {
        Ok(self.store.statistics(owner)?)
    }

    pub fn recent_documents(&self, limit: usize) -> ProvmarkResult<Vec<TrackingRecord>> {
        Ok(self.store.recent_tracking_records(limit)?)
    }
}
