use crate::domain::errors::CollectorError;
use crate::domain::types::MarketObservation;
use async_trait::async_trait;

/// Parameters for a historical observation fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchParams {
    pub symbol: String,
    pub start_ts: i64,
    pub end_ts: i64,
    pub interval_secs: u64,
}

/// Sliding-window rate limit declared by a source.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSpec {
    pub max_requests: u32,
    pub window_ms: u64,
}

/// An upstream market data source. Sources are tried in ascending
/// `priority` order (cheapest first) by the collector's fallback policy.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn id(&self) -> &str;

    fn priority(&self) -> u8;

    fn rate_limit(&self) -> RateLimitSpec;

    async fn fetch(&self, params: &FetchParams) -> Result<Vec<MarketObservation>, CollectorError>;
}

/// Injectable time source. Production uses the system clock; tests drive a
/// manual clock to make expiry and rate-limit behavior deterministic.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;

    fn now_unix(&self) -> i64 {
        self.now_millis() / 1000
    }
}
