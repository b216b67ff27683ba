//! Push-based metrics reporter.
//!
//! Periodically outputs a pipeline snapshot as structured JSON to stdout.
//! This system only sends data, it never accepts requests.

use crate::application::streaming::{StreamingCoordinator, StreamingStatus};
use crate::infrastructure::observability::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Serialize)]
pub struct PipelineSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub streaming: StreamingStatus,
    pub stream_buffer_len: f64,
    pub oracle_confidence: f64,
}

pub struct MetricsReporter {
    streaming: Arc<StreamingCoordinator>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(
        streaming: Arc<StreamingCoordinator>,
        metrics: Metrics,
        interval_seconds: u64,
    ) -> Self {
        Self {
            streaming,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    pub async fn run(self) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            self.interval
        );

        loop {
            tokio::time::sleep(self.interval).await;

            let snapshot = PipelineSnapshot {
                timestamp: chrono::Utc::now().to_rfc3339(),
                uptime_seconds: self.start_time.elapsed().as_secs(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                streaming: self.streaming.status().await,
                stream_buffer_len: self.metrics.stream_buffer_len.get(),
                oracle_confidence: self.metrics.oracle_confidence.get(),
            };

            match serde_json::to_string(&snapshot) {
                Ok(json) => info!(target: "metrics", "{}", json),
                Err(e) => warn!("MetricsReporter: Failed to serialize snapshot: {}", e),
            }
        }
    }
}
