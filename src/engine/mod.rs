//! # Watermark Engine
//!
//! Builds every component from one [`WatermarkConfig`], one store and one
//! clock.

use crate::clock::{Clock, SystemClock};
use crate::config::WatermarkConfig;
use crate::crawler::CrawlerDetectionLog;
use crate::embed::{EmbedContext, EmbedOptions, LayerEmbedder, WatermarkedArtifact};
use crate::fingerprint::{FingerprintGenerator, WizardSnapshot};
use crate::store::{ProvenanceStore, SqliteStore};
use crate::verify::{SimilarityDetector, TokenIssuer, VerificationEngine};
use crate::ProvmarkResult;
use std::sync::Arc;

/// All watermarking components sharing one store and clock.
pub struct WatermarkEngine {
    config: WatermarkConfig,
    generator: FingerprintGenerator,
    embedder: LayerEmbedder,
    verifier: VerificationEngine,
    tokens: TokenIssuer,
    crawler: CrawlerDetectionLog,
}

impl WatermarkEngine {
    pub fn new(config: WatermarkConfig, store: Arc<dyn ProvenanceStore>, clock: Arc<dyn Clock>) -> Self {
        let generator = FingerprintGenerator::new(config.secret.clone(), clock.clone());
        let embedder = LayerEmbedder::new(store.clone(), clock.clone(), EmbedOptions::from(&config));
        let verifier = VerificationEngine::new(
            store.clone(),
            clock.clone(),
            SimilarityDetector::new(config.theft_threshold),
            config.duplicate_window(),
        );
        let tokens = TokenIssuer::new(
            store.clone(),
            clock.clone(),
            config.secret.clone(),
            config.token_validity(),
        );
        let crawler = CrawlerDetectionLog::new(store, clock);

        Self {
            config,
            generator,
            embedder,
            verifier,
            tokens,
            crawler,
        }
    }

    /// Engine over the configured SQLite database (or an in-memory one when
    /// no path is configured) and the system clock.
    pub fn open(config: WatermarkConfig) -> ProvmarkResult<Self> {
        let store: Arc<dyn ProvenanceStore> = match &config.database_path {
            Some(path) => Arc::new(SqliteStore::open(path)?),
            None => {
                tracing::warn!("No database_path configured, provenance is kept in memory only");
                Arc::new(SqliteStore::open_in_memory()?)
            }
        };
        Ok(Self::new(config, store, Arc::new(SystemClock)))
    }

    /// Mint a fingerprint for the context's answers and watermark `body`.
    pub fn watermark(&self, body: &str, context: &EmbedContext) -> WatermarkedArtifact {
        let fingerprint = self.generator.generate(&context.snapshot);
        self.embedder.embed(body, &fingerprint, Some(context))
    }

    /// Watermark without recording provenance.
    pub fn watermark_untracked(&self, body: &str, snapshot: &WizardSnapshot) -> WatermarkedArtifact {
        let fingerprint = self.generator.generate(snapshot);
        self.embedder.embed(body, &fingerprint, None)
    }

    pub fn config(&self) -> &WatermarkConfig {
        &self.config
    }

    pub fn generator(&self) -> &FingerprintGenerator {
        &self.generator
    }

    pub fn embedder(&self) -> &LayerEmbedder {
        &self.embedder
    }

    pub fn verifier(&self) -> &VerificationEngine {
        &self.verifier
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn crawler(&self) -> &CrawlerDetectionLog {
        &self.crawler
    }
}
