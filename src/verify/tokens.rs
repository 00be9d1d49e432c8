//! Domain verification tokens
//!
//! A token lets an external domain prove it is authorized to host content
//! carrying a given fingerprint without ever seeing the secret:
//! `token = sha256(fingerprint ∥ domain ∥ secret)`.

use crate::clock::Clock;
use crate::config::Secret;
use crate::fingerprint::Fingerprint;
use crate::store::{ProvenanceStore, VerificationToken};
use crate::{ProvmarkError, ProvmarkResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Default token lifetime.
pub const DEFAULT_TOKEN_VALIDITY_DAYS: i64 = 30;

/// Result of checking a presented token value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "token", rename_all = "snake_case")]
pub enum TokenStatus {
    Valid(VerificationToken),
    /// Issued, but `expires_at` has passed
    Expired(VerificationToken),
    /// Never issued
    Unknown,
}

impl TokenStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Issues and checks domain verification tokens.
pub struct TokenIssuer {
    store: Arc<dyn ProvenanceStore>,
    clock: Arc<dyn Clock>,
    secret: Secret,
    validity: Duration,
}

impl TokenIssuer {
    pub fn new(
        store: Arc<dyn ProvenanceStore>,
        clock: Arc<dyn Clock>,
        secret: Secret,
        validity: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            secret,
            validity,
        }
    }

    /// Token value for a `(fingerprint, domain)` pair.
    pub fn token_value(&self, fingerprint: &Fingerprint, domain: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_str().as_bytes());
        hasher.update(domain.as_bytes());
        hasher.update(self.secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Mint and persist a token for `domain`.
    pub fn issue(&self, fingerprint: &Fingerprint, domain: &str) -> ProvmarkResult<VerificationToken> {
        let domain = normalize_domain(domain)?;
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(self.validity).ok_or_else(|| {
            ProvmarkError::InvalidInput(format!(
                "token validity of {} days is out of range",
                self.validity.num_days()
            ))
        })?;
        let token = VerificationToken {
            fingerprint: fingerprint.clone(),
            token: self.token_value(fingerprint, &domain),
            domain,
            created_at: now,
            expires_at,
        };
        self.store.insert_verification_token(&token)?;
        tracing::info!(
            fingerprint = fingerprint.short(),
            domain = %token.domain,
            expires_at = %token.expires_at,
            "Issued verification token"
        );
        Ok(token)
    }

    /// Look a token up and check its expiry.
    pub fn check(&self, value: &str) -> ProvmarkResult<TokenStatus> {
        let value = value.trim();
        let Some(token) = self.store.find_verification_token(value)? else {
            return Ok(TokenStatus::Unknown);
        };
        if token.is_valid_at(self.clock.now()) {
            Ok(TokenStatus::Valid(token))
        } else {
            tracing::debug!(domain = %token.domain, "Verification token expired");
            Ok(TokenStatus::Expired(token))
        }
    }
}

/// Lowercase, strip a scheme and path, and reject empty or spaced input.
fn normalize_domain(domain: &str) -> ProvmarkResult<String> {
    let trimmed = domain.trim();
    let host = match url::Url::parse(trimmed) {
        Ok(parsed) if parsed.has_host() => parsed.host_str().unwrap_or_default().to_string(),
        _ => trimmed.split('/').next().unwrap_or_default().to_string(),
    };
    let host = host.to_ascii_lowercase();
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(ProvmarkError::InvalidInput(format!("invalid domain '{}'", domain)));
    }
    Ok(host)
}
