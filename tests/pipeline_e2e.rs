//! End-to-end decision flow: collect -> preprocess -> train -> serve ->
//! publish -> trade gate.

use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tradepulse::application::collector::MarketDataCollector;
use tradepulse::application::ml::{DecisionAgent, PricePredictor};
use tradepulse::application::oracle::PredictionOracle;
use tradepulse::application::oracle::trade_gate::{SwapParams, TradeGate};
use tradepulse::application::preprocess::{Preprocessor, to_feature_vectors};
use tradepulse::application::streaming::StreamingCoordinator;
use tradepulse::config::{CollectorEnvConfig, StreamingEnvConfig};
use tradepulse::domain::ports::{Clock, FetchParams, MarketDataSource};
use tradepulse::domain::types::DataOrigin;
use tradepulse::infrastructure::clock::ManualClock;
use tradepulse::infrastructure::observability::Metrics;
use tradepulse::infrastructure::sources::MockSource;
use tradepulse::interfaces::api::{
    DecisionRequest, FeatureRecordDto, PipelineApi, PredictionRequest,
};

const T0: i64 = 1_700_000_000;
const PUBLISHER: &str = "oracle-publisher";
const OWNER: &str = "contract-owner";

struct Fixture {
    api: PipelineApi,
    clock: Arc<ManualClock>,
    oracle: Arc<PredictionOracle>,
    trade_gate: TradeGate,
}

async fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::at_unix(T0));
    let metrics = Metrics::new().unwrap();

    let mut collector_config = CollectorEnvConfig::default();
    collector_config.backoff_base_ms = 1;
    collector_config.backoff_cap_ms = 5;

    let source: Arc<dyn MarketDataSource> = Arc::new(MockSource::new("mock", 0));
    let collector = Arc::new(MarketDataCollector::new(
        vec![source],
        clock.clone(),
        collector_config,
        metrics.clone(),
    ));

    let preprocessor = Arc::new(Preprocessor::new(60, metrics.clone()));
    let predictor = Arc::new(RwLock::new(PricePredictor::new()));
    let agent = Arc::new(RwLock::new(DecisionAgent::new(7)));

    // Warmup: train both models on collected history.
    let params = FetchParams {
        symbol: "BTC/USDT".to_string(),
        start_ts: T0 - 300 * 60,
        end_ts: T0,
        interval_secs: 60,
    };
    let series = collector.collect(&params).await;
    assert_eq!(series.origin, DataOrigin::Live);
    let processed = preprocessor.process(series.observations);
    let features = to_feature_vectors(&processed);
    assert!(features.len() >= 60);

    predictor
        .write()
        .await
        .train(&features, false)
        .await
        .unwrap();
    agent.write().await.train(&features, None, false).await;

    // Threshold low enough that a mock-market forecast clears it; the
    // threshold dynamics themselves are covered by the gate tests.
    let oracle = Arc::new(PredictionOracle::new(
        PUBLISHER.to_string(),
        OWNER.to_string(),
        40,
        3_600,
        clock.clone(),
    ));
    let trade_gate = TradeGate::new(oracle.clone(), OWNER.to_string(), 1_200, clock.clone());

    let (feed, _) = broadcast::channel(64);
    let streaming = Arc::new(StreamingCoordinator::new(
        predictor.clone(),
        agent.clone(),
        preprocessor.clone(),
        feed,
        clock.clone(),
        StreamingEnvConfig::default(),
        "BTC/USDT".to_string(),
        metrics.clone(),
        7,
    ));

    let api = PipelineApi::new(
        collector,
        preprocessor,
        predictor,
        agent,
        streaming,
        oracle.clone(),
        clock.clone(),
        metrics,
        "BTC/USDT".to_string(),
        60,
        PUBLISHER.to_string(),
    );

    Fixture {
        api,
        clock,
        oracle,
        trade_gate,
    }
}

#[tokio::test]
async fn test_prediction_request_end_to_end() {
    let fixture = fixture().await;

    let response = fixture
        .api
        .predict(PredictionRequest::default())
        .await
        .unwrap();
    assert!(response.confidence <= 100);
    assert!(response.price.is_finite());
    assert_eq!(response.timestamp, T0);
}

#[tokio::test]
async fn test_prediction_rejects_short_window() {
    let fixture = fixture().await;

    let short = MockSource::clean_series(&FetchParams {
        symbol: "BTC/USDT".to_string(),
        start_ts: T0,
        end_ts: T0 + 59 * 60,
        interval_secs: 60,
    });
    assert_eq!(short.len(), 59);

    let err = fixture
        .api
        .predict(PredictionRequest {
            window: Some(short),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_prediction_accepts_supplied_window() {
    let fixture = fixture().await;

    let window = MockSource::clean_series(&FetchParams {
        symbol: "BTC/USDT".to_string(),
        start_ts: T0,
        end_ts: T0 + 120 * 60,
        interval_secs: 60,
    });
    let response = fixture
        .api
        .predict(PredictionRequest {
            window: Some(window),
        })
        .await
        .unwrap();
    assert!(response.confidence <= 100);
}

#[tokio::test]
async fn test_not_ready_model_maps_to_service_unavailable() {
    let clock = Arc::new(ManualClock::at_unix(T0));
    let metrics = Metrics::new().unwrap();
    let source: Arc<dyn MarketDataSource> = Arc::new(MockSource::new("mock", 0));
    let collector = Arc::new(MarketDataCollector::new(
        vec![source],
        clock.clone(),
        CollectorEnvConfig::default(),
        metrics.clone(),
    ));
    let preprocessor = Arc::new(Preprocessor::new(60, metrics.clone()));
    let predictor = Arc::new(RwLock::new(PricePredictor::new()));
    let agent = Arc::new(RwLock::new(DecisionAgent::new(7)));
    let oracle = Arc::new(PredictionOracle::new(
        PUBLISHER.to_string(),
        OWNER.to_string(),
        70,
        3_600,
        clock.clone(),
    ));
    let (feed, _) = broadcast::channel(64);
    let streaming = Arc::new(StreamingCoordinator::new(
        predictor.clone(),
        agent.clone(),
        preprocessor.clone(),
        feed,
        clock.clone(),
        StreamingEnvConfig::default(),
        "BTC/USDT".to_string(),
        metrics.clone(),
        7,
    ));
    let api = PipelineApi::new(
        collector,
        preprocessor,
        predictor,
        agent,
        streaming,
        oracle,
        clock,
        metrics,
        "BTC/USDT".to_string(),
        60,
        PUBLISHER.to_string(),
    );

    let err = api.predict(PredictionRequest::default()).await.unwrap_err();
    assert_eq!(err.status_code(), 503);

    // The untrained agent is reported the same way.
    let err = api
        .decide(DecisionRequest {
            feature: complete_feature(),
            portfolio_ratio: 0.5,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 503);
}

fn complete_feature() -> FeatureRecordDto {
    FeatureRecordDto {
        price: Some(100.0),
        sma7: Some(100.0),
        sma14: Some(100.0),
        sma30: Some(99.0),
        ema10: Some(100.0),
        ema30: Some(99.5),
        volatility: Some(0.002),
        momentum: Some(0.5),
        volume: Some(50.0),
        price_change: Some(0.001),
        volume_change: Some(0.0),
    }
}

#[tokio::test]
async fn test_decision_request_end_to_end() {
    let fixture = fixture().await;

    let response = fixture
        .api
        .decide(DecisionRequest {
            feature: complete_feature(),
            portfolio_ratio: 0.5,
        })
        .await
        .unwrap();
    assert!((0.0..=100.0).contains(&response.confidence));
}

#[tokio::test]
async fn test_decision_boundary_rejections() {
    let fixture = fixture().await;

    let err = fixture
        .api
        .decide(DecisionRequest {
            feature: complete_feature(),
            portfolio_ratio: 1.5,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    let mut missing = complete_feature();
    missing.volatility = None;
    let err = fixture
        .api
        .decide(DecisionRequest {
            feature: missing,
            portfolio_ratio: 0.5,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_publish_and_trade_through_the_gate() {
    let fixture = fixture().await;

    let record = fixture.api.publish_forecast(1_800).await.unwrap();
    assert!(record.confidence <= 100);
    assert_eq!(record.timestamp, T0);

    let swap = SwapParams {
        token_in: "0xaaa1".to_string(),
        token_out: "0xbbb2".to_string(),
        amount_in: dec!(5),
        deadline: T0 + 600,
    };

    assert!(fixture.oracle.is_valid());
    let receipt = fixture.trade_gate.execute_swap(&swap).unwrap();
    assert_eq!(receipt.amount_in, dec!(5));
    assert_eq!(receipt.oracle_confidence, record.confidence);

    // Expiry closes the gate regardless of prior validity.
    fixture.clock.advance_secs(1_801);
    let late = SwapParams {
        deadline: fixture.clock.now_unix() + 600,
        ..swap
    };
    let err = fixture.trade_gate.execute_swap(&late).unwrap_err();
    assert!(err.to_string().contains(&record.confidence.to_string()));
}
