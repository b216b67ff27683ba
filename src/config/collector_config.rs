//! Data collector configuration parsing from environment variables.

use std::env;

/// Per-source endpoint and rate-limit settings.
#[derive(Debug, Clone)]
pub struct SourceEnvConfig {
    pub base_url: String,
    pub rate_limit_requests: u32,
    pub rate_limit_window_ms: u64,
}

/// Collector environment configuration.
#[derive(Debug, Clone)]
pub struct CollectorEnvConfig {
    pub coingecko: SourceEnvConfig,
    pub binance: SourceEnvConfig,
    /// Bound on each individual network call, seconds.
    pub fetch_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// TTL for the identical-range response cache, seconds.
    pub cache_ttl_secs: u64,
    /// A fallback source must return more than this many points to be accepted.
    pub min_viable_samples: usize,
    /// Nominal spacing between observations, seconds.
    pub nominal_interval_secs: u64,
    /// Seed for the synthetic fallback generator.
    pub synthetic_seed: u64,
}

impl Default for CollectorEnvConfig {
    fn default() -> Self {
        Self {
            coingecko: SourceEnvConfig {
                base_url: "https://api.coingecko.com/api/v3".to_string(),
                rate_limit_requests: 10,
                rate_limit_window_ms: 60_000,
            },
            binance: SourceEnvConfig {
                base_url: "https://api.binance.com".to_string(),
                rate_limit_requests: 20,
                rate_limit_window_ms: 60_000,
            },
            fetch_timeout_secs: 10,
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 5_000,
            cache_ttl_secs: 300,
            min_viable_samples: 10,
            nominal_interval_secs: 60,
            synthetic_seed: 42,
        }
    }
}

impl CollectorEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            coingecko: SourceEnvConfig {
                base_url: env::var("COINGECKO_BASE_URL")
                    .unwrap_or(defaults.coingecko.base_url),
                rate_limit_requests: parse_env(
                    "COINGECKO_RATE_LIMIT",
                    defaults.coingecko.rate_limit_requests,
                ),
                rate_limit_window_ms: parse_env(
                    "COINGECKO_RATE_WINDOW_MS",
                    defaults.coingecko.rate_limit_window_ms,
                ),
            },
            binance: SourceEnvConfig {
                base_url: env::var("BINANCE_BASE_URL").unwrap_or(defaults.binance.base_url),
                rate_limit_requests: parse_env(
                    "BINANCE_RATE_LIMIT",
                    defaults.binance.rate_limit_requests,
                ),
                rate_limit_window_ms: parse_env(
                    "BINANCE_RATE_WINDOW_MS",
                    defaults.binance.rate_limit_window_ms,
                ),
            },
            fetch_timeout_secs: parse_env("FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs),
            max_retries: parse_env("FETCH_MAX_RETRIES", defaults.max_retries),
            backoff_base_ms: parse_env("FETCH_BACKOFF_BASE_MS", defaults.backoff_base_ms),
            backoff_cap_ms: parse_env("FETCH_BACKOFF_CAP_MS", defaults.backoff_cap_ms),
            cache_ttl_secs: parse_env("COLLECTOR_CACHE_TTL_SECS", defaults.cache_ttl_secs),
            min_viable_samples: parse_env("MIN_VIABLE_SAMPLES", defaults.min_viable_samples),
            nominal_interval_secs: parse_env(
                "NOMINAL_INTERVAL_SECS",
                defaults.nominal_interval_secs,
            ),
            synthetic_seed: parse_env("SYNTHETIC_SEED", defaults.synthetic_seed),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
