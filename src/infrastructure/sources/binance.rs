//! Binance market data source.
//!
//! Second in the fallback order. Klines come back as positional JSON
//! arrays: `[timestamp, open, high, low, close, volume, ...]`.

use crate::config::SourceEnvConfig;
use crate::domain::errors::CollectorError;
use crate::domain::ports::{FetchParams, MarketDataSource, RateLimitSpec};
use crate::domain::types::{IndicatorSet, MarketObservation};
use crate::infrastructure::http_client_factory::{HttpClientFactory, build_url_with_query};
use crate::infrastructure::sources::coingecko::{classify_status, classify_transport_error};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use tracing::{debug, info};

pub struct BinanceSource {
    client: ClientWithMiddleware,
    base_url: String,
    rate_limit: RateLimitSpec,
}

impl BinanceSource {
    pub fn new(config: &SourceEnvConfig, timeout_secs: u64) -> Self {
        Self {
            client: HttpClientFactory::create_client(timeout_secs),
            base_url: config.base_url.clone(),
            rate_limit: RateLimitSpec {
                max_requests: config.rate_limit_requests,
                window_ms: config.rate_limit_window_ms,
            },
        }
    }

    /// `BTC/USDT` -> `BTCUSDT`
    fn api_symbol(symbol: &str) -> String {
        symbol.replace('/', "").to_uppercase()
    }

    fn interval_str(interval_secs: u64) -> &'static str {
        match interval_secs {
            0..=60 => "1m",
            61..=300 => "5m",
            301..=900 => "15m",
            901..=3600 => "1h",
            _ => "1d",
        }
    }
}

#[async_trait]
impl MarketDataSource for BinanceSource {
    fn id(&self) -> &str {
        "binance"
    }

    fn priority(&self) -> u8 {
        1
    }

    fn rate_limit(&self) -> RateLimitSpec {
        self.rate_limit
    }

    async fn fetch(&self, params: &FetchParams) -> Result<Vec<MarketObservation>, CollectorError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let start_ms = (params.start_ts * 1000).to_string();
        let end_ms = (params.end_ts * 1000).to_string();
        let url = build_url_with_query(
            &url,
            &[
                ("symbol", Self::api_symbol(&params.symbol).as_str()),
                ("interval", Self::interval_str(params.interval_secs)),
                ("startTime", start_ms.as_str()),
                ("endTime", end_ms.as_str()),
                ("limit", "1000"),
            ],
        );

        debug!("BinanceSource: GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_transport_error("binance", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status("binance", status.as_u16()));
        }

        let klines: Vec<serde_json::Value> =
            response
                .json()
                .await
                .map_err(|e| CollectorError::MalformedPayload {
                    source_name: "binance".to_string(),
                    reason: e.to_string(),
                })?;

        let observations: Vec<MarketObservation> = klines
            .into_iter()
            .filter_map(|k| {
                let arr = k.as_array()?;
                if arr.len() < 6 {
                    return None;
                }

                let timestamp = arr[0].as_i64()? / 1000;
                let open = arr[1].as_str()?.parse::<f64>().ok()?;
                let high = arr[2].as_str()?.parse::<f64>().ok()?;
                let low = arr[3].as_str()?.parse::<f64>().ok()?;
                let close = arr[4].as_str()?.parse::<f64>().ok()?;
                let volume = arr[5].as_str()?.parse::<f64>().ok()?;

                Some(MarketObservation {
                    timestamp,
                    price: close,
                    volume,
                    high,
                    low,
                    open,
                    close,
                    indicators: IndicatorSet::default(),
                })
            })
            .collect();

        if observations.is_empty() {
            return Err(CollectorError::MalformedPayload {
                source_name: "binance".to_string(),
                reason: "no parseable klines in response".to_string(),
            });
        }

        info!(
            "BinanceSource: Fetched {} bars for {}",
            observations.len(),
            params.symbol
        );

        Ok(observations)
    }
}
