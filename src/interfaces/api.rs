//! Typed request/response boundary of the pipeline.
//!
//! HTTP route wiring lives outside this crate; these handlers define the
//! contracts it maps onto. Every precondition is validated here so
//! malformed input never reaches model code, and model-not-ready is
//! reported distinctly from data errors.

use crate::application::collector::MarketDataCollector;
use crate::application::ml::{DecisionAgent, PricePredictor};
use crate::application::oracle::{OnChainPrediction, PredictionOracle};
use crate::application::preprocess::{Preprocessor, to_feature_vectors};
use crate::application::streaming::{StreamingCoordinator, StreamingStatus};
use crate::domain::errors::{AgentError, ApiError, PredictionError};
use crate::domain::ports::{Clock, FetchParams};
use crate::domain::types::{DataOrigin, FeatureVector, MarketObservation, TradeAction};
use crate::infrastructure::observability::Metrics;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Minimum trailing window a caller may supply.
pub const MIN_PREDICTION_WINDOW: usize = 60;
/// Intervals fetched when the caller supplies no window. Covers indicator
/// warmup plus the model window with headroom.
const DEFAULT_LOOKBACK_INTERVALS: i64 = 200;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionRequest {
    /// Optional trailing observation window; fetched internally if absent.
    pub window: Option<Vec<MarketObservation>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub price: f64,
    /// Confidence rescaled to 0-100.
    pub confidence: u8,
    pub timestamp: i64,
    pub origin: DataOrigin,
}

/// Incoming feature record: all 11 fields required, all numeric.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRecordDto {
    pub price: Option<f64>,
    pub sma7: Option<f64>,
    pub sma14: Option<f64>,
    pub sma30: Option<f64>,
    pub ema10: Option<f64>,
    pub ema30: Option<f64>,
    pub volatility: Option<f64>,
    pub momentum: Option<f64>,
    pub volume: Option<f64>,
    pub price_change: Option<f64>,
    pub volume_change: Option<f64>,
}

impl FeatureRecordDto {
    fn validate(&self) -> Result<FeatureVector, ApiError> {
        let field = |value: Option<f64>, name: &str| -> Result<f64, ApiError> {
            match value {
                Some(v) if v.is_finite() => Ok(v),
                Some(_) => Err(ApiError::BadRequest {
                    reason: format!("feature field '{}' is not a finite number", name),
                }),
                None => Err(ApiError::BadRequest {
                    reason: format!("feature field '{}' is missing", name),
                }),
            }
        };

        Ok(FeatureVector {
            price: field(self.price, "price")?,
            sma_7: field(self.sma7, "sma7")?,
            sma_14: field(self.sma14, "sma14")?,
            sma_30: field(self.sma30, "sma30")?,
            ema_10: field(self.ema10, "ema10")?,
            ema_30: field(self.ema30, "ema30")?,
            volatility: field(self.volatility, "volatility")?,
            momentum: field(self.momentum, "momentum")?,
            volume: field(self.volume, "volume")?,
            price_change: field(self.price_change, "priceChange")?,
            volume_change: field(self.volume_change, "volumeChange")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    pub feature: FeatureRecordDto,
    pub portfolio_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionResponse {
    pub action: TradeAction,
    pub confidence: f64,
    pub timestamp: i64,
}

pub struct PipelineApi {
    collector: Arc<MarketDataCollector>,
    preprocessor: Arc<Preprocessor>,
    predictor: Arc<RwLock<PricePredictor>>,
    agent: Arc<RwLock<DecisionAgent>>,
    streaming: Arc<StreamingCoordinator>,
    oracle: Arc<PredictionOracle>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    symbol: String,
    interval_secs: u64,
    publisher: String,
}

impl PipelineApi {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        collector: Arc<MarketDataCollector>,
        preprocessor: Arc<Preprocessor>,
        predictor: Arc<RwLock<PricePredictor>>,
        agent: Arc<RwLock<DecisionAgent>>,
        streaming: Arc<StreamingCoordinator>,
        oracle: Arc<PredictionOracle>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        symbol: String,
        interval_secs: u64,
        publisher: String,
    ) -> Self {
        Self {
            collector,
            preprocessor,
            predictor,
            agent,
            streaming,
            oracle,
            clock,
            metrics,
            symbol,
            interval_secs,
            publisher,
        }
    }

    /// Produces a forecast from the supplied window, or from freshly
    /// collected data when none is given.
    pub async fn predict(
        &self,
        request: PredictionRequest,
    ) -> Result<PredictionResponse, ApiError> {
        let (observations, origin) = match request.window {
            Some(window) => {
                if window.len() < MIN_PREDICTION_WINDOW {
                    return Err(ApiError::BadRequest {
                        reason: format!(
                            "trailing window has {} points, need at least {}",
                            window.len(),
                            MIN_PREDICTION_WINDOW
                        ),
                    });
                }
                (window, DataOrigin::Live)
            }
            None => {
                let now = self.clock.now_unix();
                let params = FetchParams {
                    symbol: self.symbol.clone(),
                    start_ts: now - DEFAULT_LOOKBACK_INTERVALS * self.interval_secs as i64,
                    end_ts: now,
                    interval_secs: self.interval_secs,
                };
                let series = self.collector.collect(&params).await;
                if series.origin == DataOrigin::Synthetic {
                    warn!("PipelineApi: serving prediction from synthetic fallback data");
                }
                (series.observations, series.origin)
            }
        };

        let processed = self.preprocessor.process(observations);
        let features = to_feature_vectors(&processed);

        let forecast = self
            .predictor
            .read()
            .await
            .predict(&features, self.clock.now_unix())
            .map_err(|e| match e {
                PredictionError::NotReady => ApiError::ServiceUnavailable {
                    reason: "model is not trained or loaded yet".to_string(),
                },
                other => ApiError::BadRequest {
                    reason: other.to_string(),
                },
            })?;

        Ok(PredictionResponse {
            price: forecast.price,
            confidence: (forecast.confidence * 100.0).round().clamp(0.0, 100.0) as u8,
            timestamp: forecast.timestamp,
            origin,
        })
    }

    /// Maps a validated feature record and exposure ratio to a trading
    /// decision.
    pub async fn decide(&self, request: DecisionRequest) -> Result<DecisionResponse, ApiError> {
        let feature = request.feature.validate()?;

        if !request.portfolio_ratio.is_finite()
            || !(0.0..=1.0).contains(&request.portfolio_ratio)
        {
            return Err(ApiError::BadRequest {
                reason: format!(
                    "portfolio ratio must be within [0, 1], got {}",
                    request.portfolio_ratio
                ),
            });
        }

        let decision = self
            .agent
            .read()
            .await
            .decide(&feature, request.portfolio_ratio)
            .map_err(|e| match e {
                AgentError::NotInitialized => ApiError::ServiceUnavailable {
                    reason: "decision agent is not initialized".to_string(),
                },
                other => ApiError::ServiceUnavailable {
                    reason: other.to_string(),
                },
            })?;

        Ok(DecisionResponse {
            action: decision.action,
            confidence: decision.confidence,
            timestamp: self.clock.now_unix(),
        })
    }

    /// Runs a fresh forecast and publishes it to the on-chain gate as the
    /// authorized publisher.
    pub async fn publish_forecast(
        &self,
        expires_in_secs: i64,
    ) -> Result<OnChainPrediction, ApiError> {
        let response = self.predict(PredictionRequest::default()).await?;

        let price = Decimal::from_f64_retain(response.price).ok_or_else(|| {
            ApiError::BadRequest {
                reason: "forecast price is not representable".to_string(),
            }
        })?;

        let expires_at = self.clock.now_unix() + expires_in_secs;
        self.oracle
            .publish(&self.publisher, price, response.confidence as u32, expires_at)
            .map_err(|e| ApiError::BadRequest {
                reason: e.to_string(),
            })?;

        self.metrics.oracle_confidence.set(response.confidence as f64);
        info!(
            "PipelineApi: published forecast to oracle (confidence {})",
            response.confidence
        );

        self.oracle
            .get_prediction()
            .ok_or_else(|| ApiError::ServiceUnavailable {
                reason: "oracle slot empty after publish".to_string(),
            })
    }

    pub async fn start_streaming(&self) {
        self.streaming.start().await;
    }

    pub async fn stop_streaming(&self) {
        self.streaming.stop().await;
    }

    pub async fn streaming_status(&self) -> StreamingStatus {
        self.streaming.status().await
    }
}
