//! Configuration module for Tradepulse.
//!
//! Structured configuration loading from environment variables, organized by
//! domain: Collector, Streaming, Oracle, and Observability.

mod collector_config;
mod observability_config;
mod oracle_config;
mod streaming_config;

pub use collector_config::{CollectorEnvConfig, SourceEnvConfig};
pub use observability_config::ObservabilityEnvConfig;
pub use oracle_config::OracleEnvConfig;
pub use streaming_config::StreamingEnvConfig;

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Application execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mock,
    Live,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "live" => Ok(Mode::Live),
            _ => anyhow::bail!("Invalid MODE: {}. Must be 'mock' or 'live'", s),
        }
    }
}

/// Main application configuration, aggregated from the domain sub-configs.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub symbol: String,
    /// Directory that serialized model artifacts are written to and
    /// reloaded from on restart.
    pub model_dir: PathBuf,
    pub collector: CollectorEnvConfig,
    pub streaming: StreamingEnvConfig,
    pub oracle: OracleEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode = env::var("MODE")
            .unwrap_or_else(|_| "mock".to_string())
            .parse::<Mode>()?;

        let symbol = env::var("SYMBOL").unwrap_or_else(|_| "BTC/USDT".to_string());

        let model_dir = env::var("MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("models"));

        let config = Self {
            mode,
            symbol,
            model_dir,
            collector: CollectorEnvConfig::from_env(),
            streaming: StreamingEnvConfig::from_env(),
            oracle: OracleEnvConfig::from_env(),
            observability: ObservabilityEnvConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            anyhow::bail!("SYMBOL must not be empty");
        }
        url::Url::parse(&self.collector.coingecko.base_url)
            .context("COINGECKO_BASE_URL is not a valid URL")?;
        url::Url::parse(&self.collector.binance.base_url)
            .context("BINANCE_BASE_URL is not a valid URL")?;
        if self.collector.nominal_interval_secs == 0 {
            anyhow::bail!("NOMINAL_INTERVAL_SECS must be positive");
        }
        if !(0.0..=1.0).contains(&self.streaming.retrain_probability) {
            anyhow::bail!(
                "STREAM_RETRAIN_PROBABILITY must be in [0, 1], got {}",
                self.streaming.retrain_probability
            );
        }
        if self.streaming.buffer_cap == 0 {
            anyhow::bail!("STREAM_BUFFER_CAP must be positive");
        }
        if self.oracle.confidence_threshold > 100 {
            anyhow::bail!(
                "ORACLE_CONFIDENCE_THRESHOLD must be <= 100, got {}",
                self.oracle.confidence_threshold
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("mock".parse::<Mode>().unwrap(), Mode::Mock);
        assert_eq!("LIVE".parse::<Mode>().unwrap(), Mode::Live);
        assert!("paper".parse::<Mode>().is_err());
    }

    #[test]
    fn test_default_config_validates() {
        let config = Config {
            mode: Mode::Mock,
            symbol: "BTC/USDT".to_string(),
            model_dir: PathBuf::from("models"),
            collector: CollectorEnvConfig::default(),
            streaming: StreamingEnvConfig::default(),
            oracle: OracleEnvConfig::default(),
            observability: ObservabilityEnvConfig::default(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_retrain_probability_rejected() {
        let mut config = Config {
            mode: Mode::Mock,
            symbol: "BTC/USDT".to_string(),
            model_dir: PathBuf::from("models"),
            collector: CollectorEnvConfig::default(),
            streaming: StreamingEnvConfig::default(),
            oracle: OracleEnvConfig::default(),
            observability: ObservabilityEnvConfig::default(),
        };
        config.streaming.retrain_probability = 1.5;
        assert!(config.validate().is_err());
    }
}
