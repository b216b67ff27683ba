//! CoinGecko market data source.
//!
//! Free tier, so it sits first in the fallback order. The range endpoint
//! returns price and volume point series; OHLC fields are reconstructed
//! from consecutive price points.

use crate::config::SourceEnvConfig;
use crate::domain::errors::CollectorError;
use crate::domain::ports::{FetchParams, MarketDataSource, RateLimitSpec};
use crate::domain::types::{IndicatorSet, MarketObservation};
use crate::infrastructure::http_client_factory::{HttpClientFactory, build_url_with_query};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tracing::{debug, info};

pub struct CoinGeckoSource {
    client: ClientWithMiddleware,
    base_url: String,
    rate_limit: RateLimitSpec,
}

#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    /// `[[timestamp_ms, price], ...]`
    prices: Vec<[f64; 2]>,
    /// `[[timestamp_ms, volume], ...]`
    total_volumes: Vec<[f64; 2]>,
}

impl CoinGeckoSource {
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

    /// Maps a normalized symbol like `BTC/USDT` onto a CoinGecko coin id.
    fn coin_id(symbol: &str) -> &'static str {
        let base = symbol.split('/').next().unwrap_or(symbol);
        match base.to_uppercase().as_str() {
            "BTC" => "bitcoin",
            "ETH" => "ethereum",
            "SOL" => "solana",
            "AVAX" => "avalanche-2",
            _ => "bitcoin",
        }
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoSource {
    fn id(&self) -> &str {
        "coingecko"
    }

    fn priority(&self) -> u8 {
        0
    }

    fn rate_limit(&self) -> RateLimitSpec {
        self.rate_limit
    }

    async fn fetch(&self, params: &FetchParams) -> Result<Vec<MarketObservation>, CollectorError> {
        let url = format!(
            "{}/coins/{}/market_chart/range",
            self.base_url,
            Self::coin_id(&params.symbol)
        );
        let from = params.start_ts.to_string();
        let to = params.end_ts.to_string();
        let url = build_url_with_query(
            &url,
            &[
                ("vs_currency", "usd"),
                ("from", from.as_str()),
                ("to", to.as_str()),
            ],
        );

        debug!("CoinGeckoSource: GET {}", url);

        let response =
            self.client.get(&url).send().await.map_err(|e| {
                classify_transport_error("coingecko", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status("coingecko", status.as_u16()));
        }

        let chart: MarketChartResponse = response
            .json()
            .await
            .map_err(|e| CollectorError::MalformedPayload {
                source_name: "coingecko".to_string(),
                reason: e.to_string(),
            })?;

        if chart.prices.is_empty() {
            return Err(CollectorError::MalformedPayload {
                source_name: "coingecko".to_string(),
                reason: "empty price series".to_string(),
            });
        }

        let mut observations = Vec::with_capacity(chart.prices.len());
        let mut prev_price: Option<f64> = None;
        for (i, point) in chart.prices.iter().enumerate() {
            let timestamp = (point[0] / 1000.0) as i64;
            let price = point[1];
            let volume = chart
                .total_volumes
                .get(i)
                .map(|v| v[1])
                .unwrap_or(0.0);

            let open = prev_price.unwrap_or(price);
            observations.push(MarketObservation {
                timestamp,
                price,
                volume,
                high: open.max(price),
                low: open.min(price),
                open,
                close: price,
                indicators: IndicatorSet::default(),
            });
            prev_price = Some(price);
        }

        info!(
            "CoinGeckoSource: Fetched {} points for {}",
            observations.len(),
            params.symbol
        );

        Ok(observations)
    }
}

/// Maps transport-layer failures onto the collector error taxonomy.
pub(crate) fn classify_transport_error(
    source: &str,
    error: reqwest_middleware::Error,
) -> CollectorError {
    match &error {
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => CollectorError::Timeout {
            source_name: source.to_string(),
            elapsed_ms: 0,
        },
        _ => CollectorError::Upstream {
            source_name: source.to_string(),
            status: 0,
            message: error.to_string(),
        },
    }
}

/// Maps an HTTP status onto the collector error taxonomy: 429 is a
/// rate-limit abort, other 4xx abort as client errors, everything else
/// is a retryable upstream failure.
pub(crate) fn classify_status(source: &str, status: u16) -> CollectorError {
    match status {
        429 => CollectorError::RateLimited {
            source_name: source.to_string(),
            retry_after_ms: 60_000,
        },
        400..=499 => CollectorError::ClientRejected {
            source_name: source.to_string(),
            status,
        },
        _ => CollectorError::Upstream {
            source_name: source.to_string(),
            status,
            message: format!("HTTP {}", status),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_id_mapping() {
        assert_eq!(CoinGeckoSource::coin_id("BTC/USDT"), "bitcoin");
        assert_eq!(CoinGeckoSource::coin_id("eth/usdt"), "ethereum");
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status("coingecko", 429),
            CollectorError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status("coingecko", 404),
            CollectorError::ClientRejected { status: 404, .. }
        ));
        assert!(matches!(
            classify_status("coingecko", 503),
            CollectorError::Upstream { status: 503, .. }
        ));
    }
}
