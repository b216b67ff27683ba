//! Oracle gate and trade validation configuration.

use std::env;

/// Oracle environment configuration.
///
/// The threshold and window constants mirror the deployed contract; the
/// publisher/owner identities stand in for the signing keys.
#[derive(Debug, Clone)]
pub struct OracleEnvConfig {
    pub publisher: String,
    pub owner: String,
    /// Minimum confidence (0-100) for a prediction to be considered valid.
    pub confidence_threshold: u8,
    /// Maximum age and maximum forward expiry of a prediction, seconds.
    pub max_validity_secs: i64,
    /// Maximum forward distance of a trade deadline, seconds.
    pub trade_deadline_buffer_secs: i64,
}

impl Default for OracleEnvConfig {
    fn default() -> Self {
        Self {
            publisher: "oracle-publisher".to_string(),
            owner: "contract-owner".to_string(),
            confidence_threshold: 70,
            max_validity_secs: 3_600,
            trade_deadline_buffer_secs: 1_200,
        }
    }
}

impl OracleEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            publisher: env::var("ORACLE_PUBLISHER").unwrap_or(defaults.publisher),
            owner: env::var("ORACLE_OWNER").unwrap_or(defaults.owner),
            confidence_threshold: env::var("ORACLE_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.confidence_threshold),
            max_validity_secs: env::var("ORACLE_MAX_VALIDITY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_validity_secs),
            trade_deadline_buffer_secs: env::var("TRADE_DEADLINE_BUFFER_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.trade_deadline_buffer_secs),
        }
    }
}
