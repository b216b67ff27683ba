//! Market data collection with multi-source fallback.
//!
//! Sources are tried in priority order (cheapest first). Each source sits
//! behind its own sliding-window rate limiter; network calls are bounded by
//! a timeout and retried with exponential backoff. If every source fails,
//! a deterministic synthetic series is generated so downstream components
//! never see an empty input. Synthetic series are tagged as such, never
//! substituted silently.

pub mod rate_limiter;
pub mod synthetic;

use crate::config::CollectorEnvConfig;
use crate::domain::errors::CollectorError;
use crate::domain::ports::{Clock, FetchParams, MarketDataSource};
use crate::domain::types::{CollectedSeries, DataOrigin, MarketObservation};
use crate::infrastructure::observability::Metrics;
use rate_limiter::SlidingWindowRateLimiter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use synthetic::SyntheticSeriesGenerator;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct CacheEntry {
    source_id: String,
    observations: Vec<MarketObservation>,
    cached_at_millis: i64,
}

pub struct MarketDataCollector {
    sources: Vec<Arc<dyn MarketDataSource>>,
    limiters: HashMap<String, SlidingWindowRateLimiter>,
    cache: Mutex<HashMap<FetchParams, CacheEntry>>,
    synthetic: SyntheticSeriesGenerator,
    clock: Arc<dyn Clock>,
    config: CollectorEnvConfig,
    metrics: Metrics,
}

impl MarketDataCollector {
    pub fn new(
        mut sources: Vec<Arc<dyn MarketDataSource>>,
        clock: Arc<dyn Clock>,
        config: CollectorEnvConfig,
        metrics: Metrics,
    ) -> Self {
        sources.sort_by_key(|s| s.priority());
        let limiters = sources
            .iter()
            .map(|s| {
                (
                    s.id().to_string(),
                    SlidingWindowRateLimiter::new(s.rate_limit()),
                )
            })
            .collect();
        let synthetic = SyntheticSeriesGenerator::new(config.synthetic_seed);

        Self {
            sources,
            limiters,
            cache: Mutex::new(HashMap::new()),
            synthetic,
            clock,
            config,
            metrics,
        }
    }

    /// Fetches from one named source, applying its rate limiter and the
    /// retry policy. Retries happen strictly sequentially with backoff.
    pub async fn fetch_from(
        &self,
        source_id: &str,
        params: &FetchParams,
    ) -> Result<Vec<MarketObservation>, CollectorError> {
        let source = self
            .sources
            .iter()
            .find(|s| s.id() == source_id)
            .ok_or_else(|| CollectorError::ClientRejected {
                source_name: source_id.to_string(),
                status: 0,
            })?;
        self.fetch_with_retries(source.as_ref(), params).await
    }

    async fn fetch_with_retries(
        &self,
        source: &dyn MarketDataSource,
        params: &FetchParams,
    ) -> Result<Vec<MarketObservation>, CollectorError> {
        let mut last_error: Option<CollectorError> = None;

        // Initial attempt plus up to `max_retries` retries.
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_ms = (self.config.backoff_base_ms << (attempt - 1))
                    .min(self.config.backoff_cap_ms);
                debug!(
                    "MarketDataCollector: retry {}/{} for '{}' in {}ms",
                    attempt,
                    self.config.max_retries,
                    source.id(),
                    backoff_ms
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }

            // Every attempt is a real request against the upstream quota.
            if let Err(retry_after_ms) = self
                .limiters
                .get(source.id())
                .map(|l| l.try_acquire(self.clock.now_millis()))
                .unwrap_or(Ok(()))
            {
                return Err(CollectorError::RateLimited {
                    source_name: source.id().to_string(),
                    retry_after_ms,
                });
            }

            let started = std::time::Instant::now();
            let timeout = Duration::from_secs(self.config.fetch_timeout_secs);
            let result = match tokio::time::timeout(timeout, source.fetch(params)).await {
                Ok(result) => result,
                Err(_) => Err(CollectorError::Timeout {
                    source_name: source.id().to_string(),
                    elapsed_ms: timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(observations) => {
                    self.metrics
                        .fetch_attempts_total
                        .with_label_values(&[source.id(), "ok"])
                        .inc();
                    return Ok(observations);
                }
                Err(e) => {
                    self.metrics
                        .fetch_attempts_total
                        .with_label_values(&[source.id(), "error"])
                        .inc();
                    warn!(
                        "MarketDataCollector: source '{}' attempt {} failed after {}ms: {}",
                        source.id(),
                        attempt + 1,
                        started.elapsed().as_millis(),
                        e
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(CollectorError::Exhausted {
            source_name: source.id().to_string(),
            attempts: self.config.max_retries + 1,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Collects a series for the requested range: cache, then each source
    /// in priority order, then the synthetic fallback. The returned series
    /// is tagged with its actual origin.
    pub async fn collect(&self, params: &FetchParams) -> CollectedSeries {
        if let Some(cached) = self.cache_lookup(params).await {
            self.metrics
                .series_served_total
                .with_label_values(&["cached"])
                .inc();
            return cached;
        }

        for source in &self.sources {
            match self.fetch_with_retries(source.as_ref(), params).await {
                Ok(raw) => {
                    let observations = Self::validate_points(raw);
                    if observations.len() <= self.config.min_viable_samples {
                        warn!(
                            "MarketDataCollector: source '{}' returned {} valid points (min {}), falling back",
                            source.id(),
                            observations.len(),
                            self.config.min_viable_samples
                        );
                        continue;
                    }

                    info!(
                        "MarketDataCollector: accepted {} points from '{}'",
                        observations.len(),
                        source.id()
                    );
                    self.cache_store(params, source.id(), &observations).await;
                    self.metrics
                        .series_served_total
                        .with_label_values(&["live"])
                        .inc();
                    return CollectedSeries {
                        origin: DataOrigin::Live,
                        source_id: source.id().to_string(),
                        observations,
                    };
                }
                Err(e) => {
                    warn!(
                        "MarketDataCollector: source '{}' abandoned: {}",
                        source.id(),
                        e
                    );
                }
            }
        }

        warn!(
            "MarketDataCollector: all {} sources failed, generating synthetic series",
            self.sources.len()
        );
        self.metrics
            .series_served_total
            .with_label_values(&["synthetic"])
            .inc();
        CollectedSeries {
            origin: DataOrigin::Synthetic,
            source_id: "synthetic".to_string(),
            observations: self.synthetic.generate(params),
        }
    }

    /// Field-by-field validation of a fetched payload. Invalid points are
    /// dropped, never propagated.
    fn validate_points(raw: Vec<MarketObservation>) -> Vec<MarketObservation> {
        raw.into_iter()
            .filter(|o| o.is_structurally_valid())
            .collect()
    }

    async fn cache_lookup(&self, params: &FetchParams) -> Option<CollectedSeries> {
        let cache = self.cache.lock().await;
        let entry = cache.get(params)?;
        let age_ms = self.clock.now_millis() - entry.cached_at_millis;
        if age_ms > (self.config.cache_ttl_secs * 1000) as i64 {
            return None;
        }
        debug!(
            "MarketDataCollector: cache hit for {} ({}ms old)",
            params.symbol, age_ms
        );
        Some(CollectedSeries {
            origin: DataOrigin::Cached,
            source_id: entry.source_id.clone(),
            observations: entry.observations.clone(),
        })
    }

    async fn cache_store(
        &self,
        params: &FetchParams,
        source_id: &str,
        observations: &[MarketObservation],
    ) {
        let mut cache = self.cache.lock().await;
        cache.insert(
            params.clone(),
            CacheEntry {
                source_id: source_id.to_string(),
                observations: observations.to_vec(),
                cached_at_millis: self.clock.now_millis(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::sources::MockSource;

    fn test_config() -> CollectorEnvConfig {
        let mut config = CollectorEnvConfig::default();
        config.backoff_base_ms = 1;
        config.backoff_cap_ms = 5;
        config.fetch_timeout_secs = 2;
        config
    }

    fn params() -> FetchParams {
        FetchParams {
            symbol: "BTC/USDT".to_string(),
            start_ts: 1_700_000_000,
            end_ts: 1_700_006_000,
            interval_secs: 60,
        }
    }

    fn collector_with(sources: Vec<Arc<dyn MarketDataSource>>) -> MarketDataCollector {
        MarketDataCollector::new(
            sources,
            Arc::new(ManualClock::at_unix(1_700_000_000)),
            test_config(),
            Metrics::new().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_accepts_first_viable_source() {
        let primary = Arc::new(MockSource::new("primary", 0));
        let secondary = Arc::new(MockSource::new("secondary", 1));
        let collector = collector_with(vec![primary.clone(), secondary.clone()]);

        let series = collector.collect(&params()).await;
        assert_eq!(series.origin, DataOrigin::Live);
        assert_eq!(series.source_id, "primary");
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_on_client_error_without_retry() {
        let primary = Arc::new(MockSource::new("primary", 0));
        primary.push_response(Err(CollectorError::ClientRejected {
            source_name: "primary".to_string(),
            status: 404,
        }));
        let secondary = Arc::new(MockSource::new("secondary", 1));
        let collector = collector_with(vec![primary.clone(), secondary.clone()]);

        let series = collector.collect(&params()).await;
        assert_eq!(series.source_id, "secondary");
        // 4xx aborts immediately: exactly one call to the failing source.
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_errors_then_succeeds() {
        let primary = Arc::new(MockSource::new("primary", 0));
        primary.push_response(Err(CollectorError::Upstream {
            source_name: "primary".to_string(),
            status: 502,
            message: "bad gateway".to_string(),
        }));
        primary.push_response(Err(CollectorError::Upstream {
            source_name: "primary".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        }));
        let collector = collector_with(vec![primary.clone()]);

        let series = collector.collect(&params()).await;
        assert_eq!(series.origin, DataOrigin::Live);
        assert_eq!(primary.call_count(), 3);
    }

    #[tokio::test]
    async fn test_synthetic_fallback_when_all_sources_fail() {
        let primary = Arc::new(MockSource::new("primary", 0));
        for _ in 0..4 {
            primary.push_response(Err(CollectorError::Upstream {
                source_name: "primary".to_string(),
                status: 500,
                message: "boom".to_string(),
            }));
        }
        let collector = collector_with(vec![primary.clone()]);

        let series = collector.collect(&params()).await;
        assert_eq!(series.origin, DataOrigin::Synthetic);
        assert!(!series.observations.is_empty());
        // Initial attempt + 3 retries.
        assert_eq!(primary.call_count(), 4);
    }

    #[tokio::test]
    async fn test_rate_limited_source_fails_fast() {
        let primary: Arc<MockSource> =
            Arc::new(MockSource::new("primary", 0).with_rate_limit(1, 60_000));
        let collector = collector_with(vec![primary.clone()]);

        let first = collector.fetch_from("primary", &params()).await;
        assert!(first.is_ok());

        let second = collector.fetch_from("primary", &params()).await;
        assert!(matches!(second, Err(CollectorError::RateLimited { .. })));
        // The second call never reached the network.
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_serves_identical_range() {
        let primary = Arc::new(MockSource::new("primary", 0));
        let collector = collector_with(vec![primary.clone()]);

        let first = collector.collect(&params()).await;
        assert_eq!(first.origin, DataOrigin::Live);

        let second = collector.collect(&params()).await;
        assert_eq!(second.origin, DataOrigin::Cached);
        assert_eq!(second.observations, first.observations);
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_points_dropped_before_acceptance() {
        let primary = Arc::new(MockSource::new("primary", 0));
        let mut series = MockSource::clean_series(&params());
        series[3].price = -10.0;
        series[4].timestamp = 0;
        let expected = series.len() - 2;
        primary.push_response(Ok(series));
        let collector = collector_with(vec![primary]);

        let collected = collector.collect(&params()).await;
        assert_eq!(collected.observations.len(), expected);
    }
}
