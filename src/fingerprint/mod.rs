//! Document fingerprints
//!
//! A fingerprint identifies one document-generation event, not one piece of
//! content: the canonical answer snapshot is hashed together with the
//! generation time, a per-call nonce and the server secret. Two generations
//! from byte-identical answers therefore get distinct identities.

use crate::clock::Clock;
use crate::config::Secret;
use crate::{ProvmarkError, ProvmarkResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Length of the hex literal of a fingerprint.
pub const FINGERPRINT_LEN: usize = 64;

// ─── Fingerprint ───────────────────────────────────────────────────

/// A 256-bit document fingerprint, always 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Validate a fingerprint literal. Uppercase hex is rejected.
    pub fn parse(literal: &str) -> ProvmarkResult<Self> {
        if is_fingerprint_literal(literal) {
            Ok(Self(literal.to_string()))
        } else {
            Err(ProvmarkError::MalformedFingerprint(truncate(literal, 80)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading 32 bits (first 8 hex characters) as an integer.
    pub fn leading_u32(&self) -> u32 {
        self.u32_at(0)
    }

    /// The 32 bits encoded by hex characters `offset..offset + 8`, or 0 when
    /// that slice runs past the end of the literal.
    pub(crate) fn u32_at(&self, offset: usize) -> u32 {
        offset
            .checked_add(8)
            .and_then(|end| self.0.get(offset..end))
            .and_then(|slice| u32::from_str_radix(slice, 16).ok())
            .unwrap_or(0)
    }

    /// Short form for listings and log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = ProvmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = ProvmarkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_fingerprint_literal(&value) {
            Ok(Self(value))
        } else {
            Err(ProvmarkError::MalformedFingerprint(truncate(&value, 80)))
        }
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// True when `s` is exactly 64 lowercase hex characters.
pub fn is_fingerprint_literal(s: &str) -> bool {
    s.len() == FINGERPRINT_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ─── Wizard Snapshot ───────────────────────────────────────────────

/// The structured answer set that produced a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WizardSnapshot(Value);

impl WizardSnapshot {
    pub fn new(answers: Value) -> Self {
        Self(answers)
    }

    pub fn answers(&self) -> &Value {
        &self.0
    }

    /// Deterministic serialization with keys sorted at every depth.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Serializing a `Value` cannot fail: map keys are always strings.
        serde_json::to_vec(&canonicalize(&self.0)).unwrap_or_default()
    }

    /// SHA-256 of the canonical serialization, stored instead of the answers.
    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_bytes()))
    }
}

impl From<Value> for WizardSnapshot {
    fn from(answers: Value) -> Self {
        Self(answers)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

// ─── Generator ─────────────────────────────────────────────────────

/// Mints a fresh fingerprint per generation event.
#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    secret: Secret,
    clock: Arc<dyn Clock>,
}

impl FingerprintGenerator {
    pub fn new(secret: Secret, clock: Arc<dyn Clock>) -> Self {
        if secret.is_empty() {
            tracing::warn!("Fingerprint generator running with an empty secret");
        }
        Self { secret, clock }
    }

    /// Derive a fingerprint for `snapshot` at the current time.
    pub fn generate(&self, snapshot: &WizardSnapshot) -> Fingerprint {
        let timestamp = self.clock.now().timestamp();
        let nonce = Uuid::new_v4();

        let mut hasher = Sha256::new();
        hasher.update(snapshot.canonical_bytes());
        hasher.update(timestamp.to_string().as_bytes());
        hasher.update(nonce.as_bytes());
        hasher.update(self.secret.as_bytes());

        let fp = Fingerprint(hex::encode(hasher.finalize()));
        tracing::debug!(fingerprint = fp.short(), "Minted fingerprint");
        fp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn generator() -> (FingerprintGenerator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        ));
        (
            FingerprintGenerator::new(Secret::new("test-secret"), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_generated_fingerprint_format() {
        let (gen, _) = generator();
        let fp = gen.generate(&WizardSnapshot::new(json!({"company": "Acme GmbH"})));
        assert_eq!(fp.as_str().len(), 64);
        assert!(is_fingerprint_literal(fp.as_str()));
    }

    #[test]
    fn test_identical_input_yields_distinct_fingerprints() {
        let (gen, clock) = generator();
        let snapshot = WizardSnapshot::new(json!({"company": "Acme GmbH", "services": ["analytics"]}));
        let first = gen.generate(&snapshot);
        clock.advance(Duration::seconds(1));
        let second = gen.generate(&snapshot);
        assert_ne!(first, second);
        assert!(is_fingerprint_literal(second.as_str()));
    }

    #[test]
    fn test_same_second_still_distinct() {
        let (gen, _) = generator();
        let snapshot = WizardSnapshot::new(json!({}));
        assert_ne!(gen.generate(&snapshot), gen.generate(&snapshot));
    }

    #[test]
    fn test_canonical_bytes_ignore_key_order() {
        let a = WizardSnapshot::new(json!({"b": 1, "a": {"y": [1, 2], "x": null}}));
        let b = WizardSnapshot::new(json!({"a": {"x": null, "y": [1, 2]}, "b": 1}));
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Fingerprint::parse("abc").is_err());
        assert!(Fingerprint::parse(&"A".repeat(64)).is_err());
        assert!(Fingerprint::parse(&"g".repeat(64)).is_err());
        assert!(Fingerprint::parse(&"0".repeat(64)).is_ok());
    }

    #[test]
    fn test_bit_slices() {
        let fp = Fingerprint::parse(&format!("0000000a{}", "f".repeat(56))).unwrap();
        assert_eq!(fp.leading_u32(), 10);
        assert_eq!(fp.u32_at(8), u32::MAX);
        assert_eq!(fp.u32_at(56), u32::MAX);
        assert_eq!(fp.u32_at(57), 0);
        assert_eq!(fp.u32_at(usize::MAX), 0);
    }

    #[test]
    fn test_serde_validates() {
        let ok: Result<Fingerprint, _> = serde_json::from_str(&format!("\"{}\"", "1".repeat(64)));
        assert!(ok.is_ok());
        let bad: Result<Fingerprint, _> = serde_json::from_str("\"not-a-fingerprint\"");
        assert!(bad.is_err());
    }
}
