//! # provmark: Document Watermarking & Provenance Engine
//!
//! Every generated privacy-policy document gets a fingerprint that is unique
//! to its generation event. The fingerprint is embedded through independent,
//! differently-observable channels and recorded with its provenance, so any
//! copy found later can be traced back to the event that issued it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       WatermarkEngine                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ Fingerprint  │─►│ LayerEmbedder│─►│ WatermarkedArtifact│  │
//! │  │ Generator    │  │ 1 marker     │  └────────────────────┘  │
//! │  └──────────────┘  │ 2 lexical    │                          │
//! │                    │ 3 zero-width │◄── stego codec           │
//! │                    │ 4 styling    │                          │
//! │                    └──────┬───────┘                          │
//! │                           │ tracking record (best-effort)    │
//! │  ┌────────────────────────▼───────────────────────────────┐  │
//! │  │            ProvenanceStore (memory | SQLite)            │  │
//! │  └───────▲──────────────────▲────────────────────▲────────┘  │
//! │  ┌───────┴────────┐  ┌──────┴───────┐  ┌─────────┴────────┐  │
//! │  │ Verification   │  │ Domain       │  │ Crawler          │  │
//! │  │ Engine         │  │ Tokens       │  │ Detection Log    │  │
//! │  └────────────────┘  └──────────────┘  └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The watermark is meant to catch casual scraping and redistribution; it
//! is not designed to resist an adversary who knows the scheme.

pub mod client;
pub mod clock;
pub mod config;
pub mod crawler;
pub mod embed;
pub mod engine;
pub mod fingerprint;
pub mod stego;
pub mod store;
pub mod verify;

// Re-exports for convenience
pub use client::ClientInfo;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Secret, WatermarkConfig};
pub use crawler::CrawlerDetectionLog;
pub use embed::{EmbedContext, LayerEmbedder, ProvenanceOutcome, WatermarkedArtifact};
pub use engine::WatermarkEngine;
pub use fingerprint::{Fingerprint, FingerprintGenerator, WizardSnapshot};
pub use store::{
    CrawlerDetectionRecord, MemoryStore, ProvenanceStore, SqliteStore, StoreError, TrackingRecord,
    VerificationToken, WatermarkStats,
};
pub use verify::{
    extract_fingerprint, Extraction, SimilarityDetector, TheftReport, TokenIssuer, TokenStatus,
    Verification, VerificationEngine, VerificationReason,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvmarkError {
    #[error("Malformed fingerprint: {0}")]
    MalformedFingerprint(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type ProvmarkResult<T> = Result<T, ProvmarkError>;
