//! Prometheus metrics definitions for Tradepulse.
//!
//! All metrics use the `tradepulse_` prefix and are read-only.

use prometheus::{
    CounterVec, Gauge, Opts, Registry,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Prometheus metrics for the decision pipeline.
#[derive(Clone)]
pub struct Metrics {
    #[allow(dead_code)]
    registry: Arc<Registry>,
    /// Fetch attempts by source and outcome
    pub fetch_attempts_total: CounterVec,
    /// Series served by origin (live/cached/synthetic)
    pub series_served_total: CounterVec,
    /// Points dropped by the preprocessor, by reason
    pub points_dropped_total: CounterVec,
    /// Current streaming buffer length
    pub stream_buffer_len: GenericGauge<AtomicF64>,
    /// Quick-mode retrains triggered by the streaming coordinator
    pub retrains_total: CounterVec,
    /// Last published oracle confidence (0-100)
    pub oracle_confidence: GenericGauge<AtomicF64>,
    /// Streaming errors observed
    pub stream_errors_total: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let fetch_attempts_total = CounterVec::new(
            Opts::new(
                "tradepulse_fetch_attempts_total",
                "Fetch attempts by source and outcome",
            ),
            &["source", "outcome"],
        )?;
        registry.register(Box::new(fetch_attempts_total.clone()))?;

        let series_served_total = CounterVec::new(
            Opts::new(
                "tradepulse_series_served_total",
                "Collected series by origin",
            ),
            &["origin"],
        )?;
        registry.register(Box::new(series_served_total.clone()))?;

        let points_dropped_total = CounterVec::new(
            Opts::new(
                "tradepulse_points_dropped_total",
                "Observations dropped by the preprocessor, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(points_dropped_total.clone()))?;

        let stream_buffer_len = Gauge::with_opts(Opts::new(
            "tradepulse_stream_buffer_len",
            "Current streaming buffer length",
        ))?;
        registry.register(Box::new(stream_buffer_len.clone()))?;

        let retrains_total = CounterVec::new(
            Opts::new(
                "tradepulse_retrains_total",
                "Quick-mode retrains triggered, by model",
            ),
            &["model"],
        )?;
        registry.register(Box::new(retrains_total.clone()))?;

        let oracle_confidence = Gauge::with_opts(Opts::new(
            "tradepulse_oracle_confidence",
            "Last published oracle confidence (0-100)",
        ))?;
        registry.register(Box::new(oracle_confidence.clone()))?;

        let stream_errors_total = CounterVec::new(
            Opts::new(
                "tradepulse_stream_errors_total",
                "Streaming errors observed, by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(stream_errors_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            fetch_attempts_total,
            series_served_total,
            points_dropped_total,
            stream_buffer_len,
            retrains_total,
            oracle_confidence,
            stream_errors_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_without_collision() {
        let metrics = Metrics::new().expect("metrics should register");
        metrics
            .fetch_attempts_total
            .with_label_values(&["coingecko", "ok"])
            .inc();
        metrics.stream_buffer_len.set(42.0);
        assert_eq!(metrics.stream_buffer_len.get(), 42.0);
    }
}
