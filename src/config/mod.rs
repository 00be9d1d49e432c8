//! Watermark configuration (`.provmark.toml`)
//!
//! Holds the process-wide secret, layer toggles and the detection
//! parameters (theft threshold, duplicate window, token validity).
//! Loaded the same way from a project root as any other dotfile config;
//! missing or unreadable files fall back to defaults.

use crate::{ProvmarkError, ProvmarkResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the configured secret.
pub const SECRET_ENV_VAR: &str = "PROVMARK_SECRET";

/// Longest accepted duplicate-submission window (one year).
pub const MAX_DUPLICATE_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;
/// Longest accepted verification token lifetime (ten years).
pub const MAX_TOKEN_VALIDITY_DAYS: u32 = 3650;

/// Shared secret used in fingerprint derivation and token hashing.
///
/// `Debug` is redacted so the value never reaches a log line.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

/// Engine configuration (loaded from `.provmark.toml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Secret mixed into fingerprints and verification tokens
    #[serde(default)]
    pub secret: Secret,

    /// Master switch: when off, `embed` returns the body untouched
    #[serde(default = "default_true")]
    pub watermark_enabled: bool,

    /// Whether the invisible zero-width channel is written
    #[serde(default = "default_true")]
    pub zero_width_enabled: bool,

    /// Similarity percentage above which two documents are a theft candidate
    #[serde(default = "default_theft_threshold")]
    pub theft_threshold: f64,

    /// Window for the duplicate-submission check, in seconds
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window_secs: u64,

    /// Lifetime of a domain verification token, in days
    #[serde(default = "default_token_validity")]
    pub token_validity_days: u32,

    /// SQLite database used by the CLI
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
fn default_theft_threshold() -> f64 {
    80.0
}
fn default_duplicate_window() -> u64 {
    300
}
fn default_token_validity() -> u32 {
    30
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            secret: Secret::default(),
            watermark_enabled: true,
            zero_width_enabled: true,
            theft_threshold: default_theft_threshold(),
            duplicate_window_secs: default_duplicate_window(),
            token_validity_days: default_token_validity(),
            database_path: None,
        }
    }
}

impl WatermarkConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> ProvmarkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: WatermarkConfig = toml::from_str(&content)
            .map_err(|e| ProvmarkError::Config(format!("{}: {}", path.display(), e)))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Try `.provmark.toml`, then `provmark.toml` under `root`, else defaults.
    pub fn from_project_root(root: &Path) -> Self {
        for name in [".provmark.toml", "provmark.toml"] {
            let path = root.join(name);
            if !path.exists() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(config) => {
                    tracing::info!("Loaded watermark config from {}", path.display());
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {}, using defaults", path.display(), e);
                }
            }
        }

        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Replace the secret with `PROVMARK_SECRET` when it is set.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(SECRET_ENV_VAR) {
            if !value.is_empty() {
                tracing::debug!("Using secret from {}", SECRET_ENV_VAR);
                self.secret = Secret::new(value);
            }
        }
    }

    pub fn validate(&self) -> ProvmarkResult<()> {
        if !(0.0..=100.0).contains(&self.theft_threshold) {
            return Err(ProvmarkError::Config(format!(
                "theft_threshold must be within 0..=100, got {}",
                self.theft_threshold
            )));
        }
        if !(1..=MAX_TOKEN_VALIDITY_DAYS).contains(&self.token_validity_days) {
            return Err(ProvmarkError::Config(format!(
                "token_validity_days must be within 1..={}, got {}",
                MAX_TOKEN_VALIDITY_DAYS, self.token_validity_days
            )));
        }
        if self.duplicate_window_secs > MAX_DUPLICATE_WINDOW_SECS {
            return Err(ProvmarkError::Config(format!(
                "duplicate_window_secs must be at most {}, got {}",
                MAX_DUPLICATE_WINDOW_SECS, self.duplicate_window_secs
            )));
        }
        Ok(())
    }

    /// Duplicate window, clamped to [`MAX_DUPLICATE_WINDOW_SECS`] for configs
    /// built in code without `validate`.
    pub fn duplicate_window(&self) -> chrono::Duration {
        let secs = self.duplicate_window_secs.min(MAX_DUPLICATE_WINDOW_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or_default())
    }

    /// Token lifetime, clamped to [`MAX_TOKEN_VALIDITY_DAYS`].
    pub fn token_validity(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.token_validity_days.min(MAX_TOKEN_VALIDITY_DAYS)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WatermarkConfig::default();
        assert!(config.watermark_enabled);
        assert!(config.zero_width_enabled);
        assert_eq!(config.theft_threshold, 80.0);
        assert_eq!(config.duplicate_window_secs, 300);
        assert_eq!(config.token_validity_days, 30);
    }

    #[test]
    fn test_config_toml_parse() {
        let toml_str = r#"
            secret = "Dq6mThJH9dh5Jfp1"
            zero_width_enabled = false
            theft_threshold = 90.0
            database_path = "/var/lib/provmark/provenance.db"
        "#;
        let config: WatermarkConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.secret, Secret::new("Dq6mThJH9dh5Jfp1"));
        assert!(!config.zero_width_enabled);
        assert!(config.watermark_enabled);
        assert_eq!(config.theft_threshold, 90.0);
        assert_eq!(config.duplicate_window_secs, 300);
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/var/lib/provmark/provenance.db"))
        );
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = WatermarkConfig {
            theft_threshold: 120.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unbounded_durations_rejected() {
        let config = WatermarkConfig {
            token_validity_days: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ProvmarkError::Config(_))));
        assert_eq!(config.token_validity(), chrono::Duration::days(3650));

        let config = WatermarkConfig {
            duplicate_window_secs: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ProvmarkError::Config(_))));
        assert_eq!(
            config.duplicate_window(),
            chrono::Duration::seconds(MAX_DUPLICATE_WINDOW_SECS as i64)
        );

        let config = WatermarkConfig {
            token_validity_days: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(WatermarkConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_project_root_reads_dotfile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".provmark.toml"),
            "duplicate_window_secs = 60\n",
        )
        .unwrap();
        let config = WatermarkConfig::from_project_root(dir.path());
        assert_eq!(config.duplicate_window_secs, 60);
    }

    #[test]
    fn test_from_project_root_falls_back_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".provmark.toml"), "theft_threshold = \"high\"").unwrap();
        let config = WatermarkConfig::from_project_root(dir.path());
        assert_eq!(config.theft_threshold, 80.0);
    }
}
