//! Streaming coordinator.
//!
//! Buffers live observations, periodically converts the buffer to
//! features, and occasionally (a fixed small probability per cycle)
//! triggers a quick-mode retrain of both models. Start/stop are
//! idempotent; stopping synchronously cancels the worker task and
//! releases the buffer so no further writes occur after disablement.

use crate::application::ml::training_log::{TrainingLog, TrainingRow};
use crate::application::ml::{DecisionAgent, PricePredictor};
use crate::application::preprocess::{Preprocessor, to_feature_vectors};
use crate::config::StreamingEnvConfig;
use crate::domain::ports::Clock;
use crate::domain::types::MarketObservation;
use crate::infrastructure::observability::Metrics;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Status snapshot reported by the control interface.
#[derive(Debug, Clone, Serialize)]
pub struct StreamingStatus {
    pub connected: bool,
    pub active_streams: Vec<String>,
    pub last_update_ts: Option<i64>,
    pub error_count: u64,
    pub reconnect_attempts: u64,
    pub buffer_len: usize,
}

struct StreamShared {
    buffer: Mutex<Vec<MarketObservation>>,
    connected: AtomicBool,
    last_update_ts: AtomicI64,
    error_count: AtomicU64,
    reconnect_attempts: AtomicU64,
}

pub struct StreamingCoordinator {
    predictor: Arc<RwLock<PricePredictor>>,
    agent: Arc<RwLock<DecisionAgent>>,
    preprocessor: Arc<Preprocessor>,
    feed: broadcast::Sender<MarketObservation>,
    clock: Arc<dyn Clock>,
    config: StreamingEnvConfig,
    symbol: String,
    metrics: Metrics,
    training_log: Option<Arc<TrainingLog>>,
    rng_seed: u64,
    shared: Arc<StreamShared>,
    task: Mutex<Option<JoinHandle<()>>>,
    starts: AtomicU64,
}

impl StreamingCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        predictor: Arc<RwLock<PricePredictor>>,
        agent: Arc<RwLock<DecisionAgent>>,
        preprocessor: Arc<Preprocessor>,
        feed: broadcast::Sender<MarketObservation>,
        clock: Arc<dyn Clock>,
        config: StreamingEnvConfig,
        symbol: String,
        metrics: Metrics,
        rng_seed: u64,
    ) -> Self {
        let training_log = config
            .training_log_path
            .clone()
            .map(|path| Arc::new(TrainingLog::new(path)));

        Self {
            predictor,
            agent,
            preprocessor,
            feed,
            clock,
            config,
            symbol,
            metrics,
            training_log,
            rng_seed,
            shared: Arc::new(StreamShared {
                buffer: Mutex::new(Vec::new()),
                connected: AtomicBool::new(false),
                last_update_ts: AtomicI64::new(0),
                error_count: AtomicU64::new(0),
                reconnect_attempts: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
            starts: AtomicU64::new(0),
        }
    }

    /// Subscribes to the live feed and spawns the worker. Calling start
    /// while already running is a no-op.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            info!("StreamingCoordinator: already running, start is a no-op");
            return;
        }

        let prior_starts = self.starts.fetch_add(1, Ordering::SeqCst);
        if prior_starts > 0 {
            self.shared
                .reconnect_attempts
                .fetch_add(1, Ordering::SeqCst);
        }

        let rx = self.feed.subscribe();
        self.shared.connected.store(true, Ordering::SeqCst);

        let worker = StreamWorker {
            predictor: self.predictor.clone(),
            agent: self.agent.clone(),
            preprocessor: self.preprocessor.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            symbol: self.symbol.clone(),
            metrics: self.metrics.clone(),
            training_log: self.training_log.clone(),
            shared: self.shared.clone(),
            rng: StdRng::seed_from_u64(self.rng_seed.wrapping_add(prior_starts)),
        };
        *task = Some(tokio::spawn(worker.run(rx)));
        info!("StreamingCoordinator: started for {}", self.symbol);
    }

    /// Cancels the worker before returning, detaches the feed
    /// subscription, and releases the buffer. Idempotent.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        match task.take() {
            Some(handle) => {
                handle.abort();
                self.shared.connected.store(false, Ordering::SeqCst);
                self.shared.buffer.lock().await.clear();
                self.metrics.stream_buffer_len.set(0.0);
                info!("StreamingCoordinator: stopped");
            }
            None => {
                debug!("StreamingCoordinator: stop called while not running");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    pub async fn status(&self) -> StreamingStatus {
        let connected = self.shared.connected.load(Ordering::SeqCst);
        let last_update = self.shared.last_update_ts.load(Ordering::SeqCst);
        StreamingStatus {
            connected,
            active_streams: if connected {
                vec![self.symbol.clone()]
            } else {
                Vec::new()
            },
            last_update_ts: (last_update > 0).then_some(last_update),
            error_count: self.shared.error_count.load(Ordering::SeqCst),
            reconnect_attempts: self.shared.reconnect_attempts.load(Ordering::SeqCst),
            buffer_len: self.shared.buffer.lock().await.len(),
        }
    }

    /// Current buffer length, for tests and monitoring.
    pub async fn buffer_len(&self) -> usize {
        self.shared.buffer.lock().await.len()
    }
}

struct StreamWorker {
    predictor: Arc<RwLock<PricePredictor>>,
    agent: Arc<RwLock<DecisionAgent>>,
    preprocessor: Arc<Preprocessor>,
    clock: Arc<dyn Clock>,
    config: StreamingEnvConfig,
    symbol: String,
    metrics: Metrics,
    training_log: Option<Arc<TrainingLog>>,
    shared: Arc<StreamShared>,
    rng: StdRng,
}

impl StreamWorker {
    async fn run(mut self, mut rx: broadcast::Receiver<MarketObservation>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Ok(obs) => self.ingest(obs).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("StreamingCoordinator: receiver lagged, missed {} observations", n);
                        self.shared.error_count.fetch_add(1, Ordering::SeqCst);
                        self.metrics
                            .stream_errors_total
                            .with_label_values(&["lagged"])
                            .inc();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("StreamingCoordinator: live feed closed");
                        self.shared.connected.store(false, Ordering::SeqCst);
                        break;
                    }
                },
                _ = ticker.tick() => self.cycle().await,
            }
        }
    }

    /// Appends in arrival order; the rolling cap trims the oldest points
    /// but never clears the buffer outright, preserving training
    /// continuity.
    async fn ingest(&self, obs: MarketObservation) {
        if !obs.is_structurally_valid() {
            self.shared.error_count.fetch_add(1, Ordering::SeqCst);
            self.metrics
                .stream_errors_total
                .with_label_values(&["invalid_observation"])
                .inc();
            return;
        }

        let mut buffer = self.shared.buffer.lock().await;
        buffer.push(obs);
        let len = buffer.len();
        if len > self.config.buffer_cap {
            let excess = len - self.config.buffer_cap;
            buffer.drain(..excess);
        }
        self.metrics.stream_buffer_len.set(buffer.len() as f64);
        self.shared
            .last_update_ts
            .store(self.clock.now_unix(), Ordering::SeqCst);
    }

    async fn cycle(&mut self) {
        let snapshot: Vec<MarketObservation> = self.shared.buffer.lock().await.clone();
        if snapshot.is_empty() {
            return;
        }

        let processed = self.preprocessor.process(snapshot);
        let features = to_feature_vectors(&processed);
        if features.is_empty() {
            return;
        }

        if let (Some(log), Some(last_obs), Some(last_feature)) = (
            self.training_log.as_ref(),
            processed.last(),
            features.last(),
        ) {
            log.append(&[TrainingRow::from_feature(
                &self.symbol,
                last_obs.timestamp,
                last_feature,
            )]);
        }

        // Retrain on a coin flip rather than every cycle to bound cost.
        if !self.rng.random_bool(self.config.retrain_probability.clamp(0.0, 1.0)) {
            return;
        }

        debug!(
            "StreamingCoordinator: retrain triggered ({} features)",
            features.len()
        );

        let predictor = self.predictor.clone();
        let agent = self.agent.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            match predictor.write().await.train(&features, true).await {
                Ok(()) => {
                    metrics
                        .retrains_total
                        .with_label_values(&["predictor"])
                        .inc();
                }
                Err(e) => {
                    debug!("StreamingCoordinator: predictor retrain skipped: {}", e);
                }
            }

            agent.write().await.train(&features, None, true).await;
            metrics.retrains_total.with_label_values(&["agent"]).inc();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::sources::MockSource;
    use crate::domain::ports::FetchParams;

    fn coordinator(
        feed: broadcast::Sender<MarketObservation>,
        config: StreamingEnvConfig,
    ) -> StreamingCoordinator {
        let metrics = Metrics::new().unwrap();
        StreamingCoordinator::new(
            Arc::new(RwLock::new(PricePredictor::new())),
            Arc::new(RwLock::new(DecisionAgent::new(1))),
            Arc::new(Preprocessor::new(60, metrics.clone())),
            feed,
            Arc::new(ManualClock::at_unix(1_700_000_000)),
            config,
            "BTC/USDT".to_string(),
            metrics,
            7,
        )
    }

    fn observations(count: usize) -> Vec<MarketObservation> {
        MockSource::clean_series(&FetchParams {
            symbol: "BTC/USDT".to_string(),
            start_ts: 1_700_000_000,
            end_ts: 1_700_000_000 + (count as i64) * 60,
            interval_secs: 60,
        })
    }

    #[tokio::test]
    async fn test_start_twice_is_noop_and_stop_releases_buffer() {
        let (tx, _) = broadcast::channel(64);
        let mut config = StreamingEnvConfig::default();
        config.tick_interval_secs = 3600; // keep cycles out of this test
        let coordinator = coordinator(tx.clone(), config);

        coordinator.start().await;
        coordinator.start().await;
        assert!(coordinator.is_running().await);

        for obs in observations(5) {
            tx.send(obs).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coordinator.buffer_len().await, 5);

        coordinator.stop().await;
        assert!(!coordinator.is_running().await);
        assert_eq!(coordinator.buffer_len().await, 0);

        // Stopping again is a no-op.
        coordinator.stop().await;

        let status = coordinator.status().await;
        assert!(!status.connected);
        assert!(status.active_streams.is_empty());
    }

    #[tokio::test]
    async fn test_buffer_trims_to_rolling_cap() {
        let (tx, _) = broadcast::channel(4096);
        let mut config = StreamingEnvConfig::default();
        config.tick_interval_secs = 3600;
        config.buffer_cap = 100;
        let coordinator = coordinator(tx.clone(), config);

        coordinator.start().await;
        let series = observations(150);
        let newest = series.last().cloned().unwrap();
        for obs in series {
            tx.send(obs).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(coordinator.buffer_len().await, 100);
        // The most recent observations survive the trim.
        let buffer = coordinator.shared.buffer.lock().await;
        assert_eq!(buffer.last().unwrap().timestamp, newest.timestamp);
        drop(buffer);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_no_writes_after_stop() {
        let (tx, _) = broadcast::channel(64);
        let mut config = StreamingEnvConfig::default();
        config.tick_interval_secs = 3600;
        let coordinator = coordinator(tx.clone(), config);

        coordinator.start().await;
        coordinator.stop().await;

        for obs in observations(5) {
            let _ = tx.send(obs);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coordinator.buffer_len().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_observations_counted_not_buffered() {
        let (tx, _) = broadcast::channel(64);
        let mut config = StreamingEnvConfig::default();
        config.tick_interval_secs = 3600;
        let coordinator = coordinator(tx.clone(), config);

        coordinator.start().await;
        let mut bad = observations(1).pop().unwrap();
        bad.price = -1.0;
        tx.send(bad).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(coordinator.buffer_len().await, 0);
        assert_eq!(coordinator.status().await.error_count, 1);

        coordinator.stop().await;
    }
}
