/// Runtime configuration for the anchoring core.
///
/// All structs deserialize from the host's config source with defaults for
/// every omitted field.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::hash::HashAlgorithm;
use crate::error::{AnchorError, Result};

/// Configuration for [`crate::service::AnchorService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Digest used for leaves, tree nodes and storage pointers. Must match
    /// the ledger's verifier.
    pub hash_algorithm: HashAlgorithm,
    /// Upper bound on a single adapter commit, in milliseconds.
    pub commit_timeout_ms: u64,
    /// Ask the adapter to confirm roots during verification (non-simulated
    /// receipts only).
    pub confirm_on_chain: bool,
    /// Maximum byte length of any single consent event field.
    pub max_field_len: usize,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Keccak256,
            commit_timeout_ms: 30_000,
            confirm_on_chain: true,
            max_field_len: 16 * 1024,
        }
    }
}

impl AnchorConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.commit_timeout_ms == 0 {
            return Err(AnchorError::Config(
                "commit_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.max_field_len == 0 {
            return Err(AnchorError::Config(
                "max_field_len must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for [`crate::state::sqlite::SqliteStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// sqlx connection string, e.g. `sqlite://anchor.db?mode=rwc`.
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://consent-anchor.db?mode=rwc".to_string(),
            max_connections: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnchorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hash_algorithm, HashAlgorithm::Keccak256);
        assert_eq!(config.commit_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AnchorConfig =
            serde_json::from_str(r#"{"hash_algorithm":"blake3","confirm_on_chain":false}"#)
                .unwrap();
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
        assert!(!config.confirm_on_chain);
        assert_eq!(config.commit_timeout_ms, 30_000);
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let parsed: std::result::Result<AnchorConfig, _> =
            serde_json::from_str(r#"{"hash_algorithm":"crc32"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = AnchorConfig {
            commit_timeout_ms: 0,
            ..AnchorConfig::default()
        };
        assert!(matches!(config.validate(), Err(AnchorError::Config(_))));
    }
}
