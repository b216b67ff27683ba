//! Scripted in-memory source for tests and mock mode.

use crate::domain::errors::CollectorError;
use crate::domain::ports::{FetchParams, MarketDataSource, RateLimitSpec};
use crate::domain::types::{IndicatorSet, MarketObservation};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

type ScriptedResult = Result<Vec<MarketObservation>, CollectorError>;

/// A source that replays a scripted queue of responses. Once the script is
/// drained it keeps returning a generated clean series, so mock mode can
/// run indefinitely.
pub struct MockSource {
    id: String,
    priority: u8,
    rate_limit: RateLimitSpec,
    script: Mutex<VecDeque<ScriptedResult>>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(id: impl Into<String>, priority: u8) -> Self {
        Self {
            id: id.into(),
            priority,
            rate_limit: RateLimitSpec {
                max_requests: 1_000,
                window_ms: 60_000,
            },
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rate_limit(mut self, max_requests: u32, window_ms: u64) -> Self {
        self.rate_limit = RateLimitSpec {
            max_requests,
            window_ms,
        };
        self
    }

    /// Queues the next fetch outcome.
    pub fn push_response(&self, result: ScriptedResult) {
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .push_back(result);
    }

    /// Number of fetch calls that actually reached this source.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A clean, uniformly spaced series for the requested range.
    pub fn clean_series(params: &FetchParams) -> Vec<MarketObservation> {
        let interval = params.interval_secs.max(1) as i64;
        let count = ((params.end_ts - params.start_ts) / interval).max(1) as usize;
        let mut series = Vec::with_capacity(count);
        let mut price = 100.0;
        for i in 0..count {
            // Small deterministic oscillation keeps indicators non-degenerate.
            price *= 1.0 + 0.001 * ((i % 7) as f64 - 3.0) / 3.0;
            series.push(MarketObservation {
                timestamp: params.start_ts + (i as i64) * interval,
                price,
                volume: 50.0 + (i % 10) as f64,
                high: price * 1.002,
                low: price * 0.998,
                open: price * 0.999,
                close: price,
                indicators: IndicatorSet::default(),
            });
        }
        series
    }
}

#[async_trait]
impl MarketDataSource for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn rate_limit(&self) -> RateLimitSpec {
        self.rate_limit
    }

    async fn fetch(&self, params: &FetchParams) -> Result<Vec<MarketObservation>, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .script
            .lock()
            .expect("mock script lock poisoned")
            .pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(Self::clean_series(params)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FetchParams {
        FetchParams {
            symbol: "BTC/USDT".to_string(),
            start_ts: 1_700_000_000,
            end_ts: 1_700_006_000,
            interval_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_scripted_responses_replay_in_order() {
        let source = MockSource::new("mock", 0);
        source.push_response(Err(CollectorError::Timeout {
            source_name: "mock".to_string(),
            elapsed_ms: 10_000,
        }));

        let err = source.fetch(&params()).await.unwrap_err();
        assert!(matches!(err, CollectorError::Timeout { .. }));

        // Script drained: falls through to the generated series.
        let series = source.fetch(&params()).await.unwrap();
        assert_eq!(series.len(), 100);
        assert_eq!(source.call_count(), 2);
    }
}
