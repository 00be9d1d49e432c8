//! Layered watermark embedding
//!
//! ```text
//!  body ──► [1] visible marker ──► [2] lexical substitution
//!        ──► [3] zero-width channel ──► [4] encoded styling ──► artifact
//!                                                  │
//!                                     [5] tracking record (best-effort)
//! ```
//!
//! Layers 1–4 are pure text transformations. Layer 5 writes one
//! [`TrackingRecord`] when a context is supplied; a store failure is logged
//! and the artifact is still returned, so watermarking never blocks delivery.

pub mod layers;

use crate::client::ClientInfo;
use crate::clock::Clock;
use crate::config::WatermarkConfig;
use crate::fingerprint::{Fingerprint, WizardSnapshot};
use crate::store::{ProvenanceStore, RecordId, TrackingRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Who generated the document, from which answers, and from where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedContext {
    pub owner: Option<String>,
    pub snapshot: WizardSnapshot,
    #[serde(default)]
    pub client: ClientInfo,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl EmbedContext {
    pub fn new(owner: Option<String>, snapshot: WizardSnapshot) -> Self {
        Self {
            owner,
            snapshot,
            client: ClientInfo::default(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// What happened to the provenance write for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ProvenanceOutcome {
    Recorded(RecordId),
    /// No context was supplied, or watermarking is disabled
    Skipped,
    /// The store rejected the write; the artifact is still valid
    Failed(String),
}

/// A document body after all enabled layers have been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkedArtifact {
    pub fingerprint: Fingerprint,
    pub content: String,
    pub provenance: ProvenanceOutcome,
}

impl WatermarkedArtifact {
    pub fn into_content(self) -> String {
        self.content
    }
}

/// Which layers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedOptions {
    pub enabled: bool,
    pub zero_width: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            zero_width: true,
        }
    }
}

impl From<&WatermarkConfig> for EmbedOptions {
    fn from(config: &WatermarkConfig) -> Self {
        Self {
            enabled: config.watermark_enabled,
            zero_width: config.zero_width_enabled,
        }
    }
}

/// Applies the watermark layers and records provenance.
pub struct LayerEmbedder {
    store: Arc<dyn ProvenanceStore>,
    clock: Arc<dyn Clock>,
    options: EmbedOptions,
}

impl LayerEmbedder {
    pub fn new(store: Arc<dyn ProvenanceStore>, clock: Arc<dyn Clock>, options: EmbedOptions) -> Self {
        Self {
            store,
            clock,
            options,
        }
    }

    /// Watermark `body` with `fingerprint`.
    pub fn embed(
        &self,
        body: &str,
        fingerprint: &Fingerprint,
        context: Option<&EmbedContext>,
    ) -> WatermarkedArtifact {
        if !self.options.enabled {
            tracing::debug!("Watermarking disabled, returning body unchanged");
            return WatermarkedArtifact {
                fingerprint: fingerprint.clone(),
                content: body.to_string(),
                provenance: ProvenanceOutcome::Skipped,
            };
        }

        let content = self.apply_layers(body, fingerprint);

        let provenance = match context {
            Some(ctx) => self.track(fingerprint, ctx),
            None => ProvenanceOutcome::Skipped,
        };

        tracing::info!(
            fingerprint = fingerprint.short(),
            bytes = content.len(),
            tracked = matches!(provenance, ProvenanceOutcome::Recorded(_)),
            "Watermark embedded"
        );

        WatermarkedArtifact {
            fingerprint: fingerprint.clone(),
            content,
            provenance,
        }
    }

    /// Layers 1–4 only; no side effects.
    pub fn apply_layers(&self, body: &str, fingerprint: &Fingerprint) -> String {
        let text = layers::add_visible_marker(body, fingerprint);

        let (text, substituted) = layers::substitute_words(&text, fingerprint);
        tracing::debug!(substituted, "Lexical layer applied");

        let text = if self.options.zero_width {
            layers::add_invisible_channel(&text, fingerprint)
        } else {
            text
        };

        match layers::inject_style(&text, fingerprint) {
            Some(styled) => styled,
            None => {
                tracing::debug!("No </head> in body, styling layer skipped");
                text
            }
        }
    }

    fn track(&self, fingerprint: &Fingerprint, ctx: &EmbedContext) -> ProvenanceOutcome {
        let record = TrackingRecord {
            fingerprint: fingerprint.clone(),
            owner: ctx.owner.clone(),
            snapshot_hash: ctx.snapshot.content_hash(),
            client_address: ctx.client.address.clone(),
            client_agent: ctx.client.agent.clone(),
            metadata: ctx.metadata.clone(),
            created_at: self.clock.now(),
        };

        match self.store.insert_tracking_record(&record) {
            Ok(id) => ProvenanceOutcome::Recorded(id),
            Err(e) => {
                tracing::warn!(
                    fingerprint = fingerprint.short(),
                    "Provenance not recorded: {}",
                    e
                );
                ProvenanceOutcome::Failed(e.to_string())
            }
        }
    }
}
