//! Streaming coordinator configuration parsing from environment variables.

use std::env;
use std::path::PathBuf;

/// Streaming environment configuration.
#[derive(Debug, Clone)]
pub struct StreamingEnvConfig {
    /// Rolling cap on the live observation buffer.
    pub buffer_cap: usize,
    /// Featurize/retrain cycle interval, seconds.
    pub tick_interval_secs: u64,
    /// Probability that a cycle triggers a quick-mode retrain.
    pub retrain_probability: f64,
    /// Optional CSV file that streamed feature rows are appended to.
    pub training_log_path: Option<PathBuf>,
}

impl Default for StreamingEnvConfig {
    fn default() -> Self {
        Self {
            buffer_cap: 1_000,
            tick_interval_secs: 60,
            retrain_probability: 0.10,
            training_log_path: None,
        }
    }
}

impl StreamingEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            buffer_cap: env::var("STREAM_BUFFER_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.buffer_cap),
            tick_interval_secs: env::var("STREAM_TICK_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.tick_interval_secs),
            retrain_probability: env::var("STREAM_RETRAIN_PROBABILITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retrain_probability),
            training_log_path: env::var("TRAINING_LOG_PATH").ok().map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_defaults() {
        let config = StreamingEnvConfig::default();
        assert_eq!(config.buffer_cap, 1_000);
        assert!((config.retrain_probability - 0.10).abs() < f64::EPSILON);
    }
}
