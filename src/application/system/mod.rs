//! Application bootstrap.
//!
//! Builds every service once at process start and passes them by handle;
//! no globals, no singletons. The wiring mirrors the control flow:
//! collector feeds the preprocessor, models serve the API, the streaming
//! coordinator feeds the models, and the publisher task refreshes the
//! on-chain gate.

use crate::application::collector::MarketDataCollector;
use crate::application::ml::{DecisionAgent, PricePredictor};
use crate::application::oracle::trade_gate::TradeGate;
use crate::application::oracle::PredictionOracle;
use crate::application::preprocess::{Preprocessor, to_feature_vectors};
use crate::application::registry::{ModelRegistry, ModelType};
use crate::application::streaming::StreamingCoordinator;
use crate::config::{Config, Mode};
use crate::domain::ports::{Clock, FetchParams, MarketDataSource};
use crate::domain::types::MarketObservation;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::sources::{BinanceSource, CoinGeckoSource, MockSource};
use crate::interfaces::api::PipelineApi;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Intervals of history fetched for warmup training.
const WARMUP_LOOKBACK_INTERVALS: i64 = 300;

pub struct Application {
    config: Config,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    collector: Arc<MarketDataCollector>,
    preprocessor: Arc<Preprocessor>,
    predictor: Arc<RwLock<PricePredictor>>,
    agent: Arc<RwLock<DecisionAgent>>,
    registry: Arc<ModelRegistry>,
    oracle: Arc<PredictionOracle>,
    trade_gate: Arc<TradeGate>,
    streaming: Arc<StreamingCoordinator>,
    api: Arc<PipelineApi>,
    feed: broadcast::Sender<MarketObservation>,
}

pub struct ApplicationHandle {
    pub api: Arc<PipelineApi>,
    pub streaming: Arc<StreamingCoordinator>,
    pub metrics: Metrics,
    pub oracle: Arc<PredictionOracle>,
    pub trade_gate: Arc<TradeGate>,
    tasks: Vec<JoinHandle<()>>,
}

impl ApplicationHandle {
    /// Stops streaming and cancels the background tasks.
    pub async fn shutdown(mut self) {
        self.streaming.stop().await;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Application: shutdown complete");
    }
}

impl Application {
    pub fn build(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let metrics = Metrics::new()?;

        let sources: Vec<Arc<dyn MarketDataSource>> = match config.mode {
            Mode::Live => vec![
                Arc::new(CoinGeckoSource::new(
                    &config.collector.coingecko,
                    config.collector.fetch_timeout_secs,
                )),
                Arc::new(BinanceSource::new(
                    &config.collector.binance,
                    config.collector.fetch_timeout_secs,
                )),
            ],
            Mode::Mock => vec![Arc::new(MockSource::new("mock", 0))],
        };

        let collector = Arc::new(MarketDataCollector::new(
            sources,
            clock.clone(),
            config.collector.clone(),
            metrics.clone(),
        ));

        let preprocessor = Arc::new(Preprocessor::new(
            config.collector.nominal_interval_secs,
            metrics.clone(),
        ));

        let mut predictor = PricePredictor::new();
        let predictor_path = config.model_dir.join("sequence_model.json");
        if predictor_path.exists() {
            predictor.load(&predictor_path);
        }
        let predictor = Arc::new(RwLock::new(predictor));

        let mut agent = DecisionAgent::new(config.collector.synthetic_seed);
        let agent_path = config.model_dir.join("policy.json");
        if agent_path.exists() {
            agent.load(&agent_path);
        }
        let agent = Arc::new(RwLock::new(agent));

        let registry = Arc::new(ModelRegistry::new(
            predictor.clone(),
            agent.clone(),
            Some(config.model_dir.join("registry.json")),
        ));

        let oracle = Arc::new(PredictionOracle::new(
            config.oracle.publisher.clone(),
            config.oracle.owner.clone(),
            config.oracle.confidence_threshold,
            config.oracle.max_validity_secs,
            clock.clone(),
        ));

        let trade_gate = Arc::new(TradeGate::new(
            oracle.clone(),
            config.oracle.owner.clone(),
            config.oracle.trade_deadline_buffer_secs,
            clock.clone(),
        ));

        let (feed, _) = broadcast::channel(1_024);

        let streaming = Arc::new(StreamingCoordinator::new(
            predictor.clone(),
            agent.clone(),
            preprocessor.clone(),
            feed.clone(),
            clock.clone(),
            config.streaming.clone(),
            config.symbol.clone(),
            metrics.clone(),
            config.collector.synthetic_seed,
        ));

        let api = Arc::new(PipelineApi::new(
            collector.clone(),
            preprocessor.clone(),
            predictor.clone(),
            agent.clone(),
            streaming.clone(),
            oracle.clone(),
            clock.clone(),
            metrics.clone(),
            config.symbol.clone(),
            config.collector.nominal_interval_secs,
            config.oracle.publisher.clone(),
        ));

        Ok(Self {
            config,
            clock,
            metrics,
            collector,
            preprocessor,
            predictor,
            agent,
            registry,
            oracle,
            trade_gate,
            streaming,
            api,
            feed,
        })
    }

    /// Warms up the models, starts the live feed and streaming, and
    /// spawns the oracle publisher task.
    pub async fn start(self) -> Result<ApplicationHandle> {
        let registry_state = self.config.model_dir.join("registry.json");
        self.registry.load_state(&registry_state).await;

        if !self.predictor.read().await.is_ready() {
            self.warmup().await;
        } else {
            info!("Application: predictor restored from artifact, skipping warmup");
        }

        let mut tasks = Vec::new();
        tasks.push(self.spawn_live_feed());
        tasks.push(self.spawn_oracle_publisher());

        self.streaming.start().await;

        Ok(ApplicationHandle {
            api: self.api,
            streaming: self.streaming,
            metrics: self.metrics,
            oracle: self.oracle,
            trade_gate: self.trade_gate,
            tasks,
        })
    }

    /// Initial full-mode training from collected history. Failures leave
    /// the models not-ready (the API reports 503) rather than aborting
    /// startup.
    async fn warmup(&self) {
        let now = self.clock.now_unix();
        let interval = self.config.collector.nominal_interval_secs;
        let params = FetchParams {
            symbol: self.config.symbol.clone(),
            start_ts: now - WARMUP_LOOKBACK_INTERVALS * interval as i64,
            end_ts: now,
            interval_secs: interval,
        };

        let series = self.collector.collect(&params).await;
        info!(
            "Application: warmup on {} {} observations",
            series.observations.len(),
            series.origin
        );

        let processed = self.preprocessor.process(series.observations);
        let features = to_feature_vectors(&processed);

        match self.predictor.write().await.train(&features, false).await {
            Ok(()) => {
                let path = self.config.model_dir.join("sequence_model.json");
                if let Err(e) = self.predictor.read().await.save(&path) {
                    warn!("Application: failed to save predictor artifact: {}", e);
                } else {
                    let version = self
                        .registry
                        .register_version(ModelType::SequenceRegressor, path)
                        .await;
                    if let Err(e) = self.registry.activate_version(&version.version).await {
                        warn!("Application: failed to activate predictor version: {}", e);
                    }
                }
            }
            Err(e) => warn!("Application: predictor warmup failed: {}", e),
        }

        self.agent.write().await.train(&features, None, false).await;
        let agent_path = self.config.model_dir.join("policy.json");
        if let Err(e) = self.agent.read().await.save(&agent_path) {
            warn!("Application: failed to save policy artifact: {}", e);
        } else {
            let version = self
                .registry
                .register_version(ModelType::PolicyAgent, agent_path)
                .await;
            if let Err(e) = self.registry.activate_version(&version.version).await {
                warn!("Application: failed to activate agent version: {}", e);
            }
        }
    }

    /// Polls the collector and pushes the freshest observation onto the
    /// live-update channel the streaming coordinator subscribes to.
    fn spawn_live_feed(&self) -> JoinHandle<()> {
        let collector = self.collector.clone();
        let clock = self.clock.clone();
        let feed = self.feed.clone();
        let symbol = self.config.symbol.clone();
        let interval_secs = self.config.collector.nominal_interval_secs;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_sent_ts = 0i64;

            loop {
                ticker.tick().await;
                let now = clock.now_unix();
                let params = FetchParams {
                    symbol: symbol.clone(),
                    start_ts: now - 2 * interval_secs as i64,
                    end_ts: now,
                    interval_secs,
                };
                let series = collector.collect(&params).await;
                if let Some(latest) = series.observations.last() {
                    if latest.timestamp > last_sent_ts {
                        last_sent_ts = latest.timestamp;
                        // Send fails only when nobody is subscribed.
                        let _ = feed.send(latest.clone());
                    }
                }
            }
        })
    }

    /// Periodically publishes a refreshed forecast to the oracle gate.
    fn spawn_oracle_publisher(&self) -> JoinHandle<()> {
        let api = self.api.clone();
        let publish_interval =
            Duration::from_secs(self.config.streaming.tick_interval_secs.max(1) * 5);
        let expires_in = self.config.oracle.max_validity_secs / 2;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(publish_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match api.publish_forecast(expires_in).await {
                    Ok(record) => info!(
                        "Application: oracle refreshed (price {}, confidence {})",
                        record.price, record.confidence
                    ),
                    Err(e) => warn!("Application: oracle publish skipped: {}", e),
                }
            }
        })
    }
}
