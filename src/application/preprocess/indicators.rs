//! Technical indicator enrichment.
//!
//! SMA/EMA come from the `ta` streaming indicators; volatility, momentum
//! and volume statistics are computed over trailing windows directly.
//! A point only gets an indicator once enough history exists; values are
//! omitted, never defaulted to zero.

use crate::domain::types::MarketObservation;
use ta::Next;
use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};

pub const SMA_SHORT: usize = 7;
pub const SMA_MID: usize = 14;
pub const SMA_LONG: usize = 30;
pub const EMA_FAST: usize = 10;
pub const EMA_SLOW: usize = 30;
/// Trailing window for volatility, momentum and volume SMA.
pub const ROLLING_WINDOW: usize = 10;

pub fn enrich(observations: &mut [MarketObservation]) {
    let mut sma_7 = SimpleMovingAverage::new(SMA_SHORT).expect("period is non-zero");
    let mut sma_14 = SimpleMovingAverage::new(SMA_MID).expect("period is non-zero");
    let mut sma_30 = SimpleMovingAverage::new(SMA_LONG).expect("period is non-zero");
    let mut ema_10 = ExponentialMovingAverage::new(EMA_FAST).expect("period is non-zero");
    let mut ema_30 = ExponentialMovingAverage::new(EMA_SLOW).expect("period is non-zero");
    let mut volume_sma = SimpleMovingAverage::new(ROLLING_WINDOW).expect("period is non-zero");

    let prices: Vec<f64> = observations.iter().map(|o| o.price).collect();

    for i in 0..observations.len() {
        let price = prices[i];

        let sma_7_val = sma_7.next(price);
        let sma_14_val = sma_14.next(price);
        let sma_30_val = sma_30.next(price);
        let ema_10_val = ema_10.next(price);
        let ema_30_val = ema_30.next(price);
        let volume_sma_val = volume_sma.next(observations[i].volume);

        let ind = &mut observations[i].indicators;
        ind.sma_7 = (i + 1 >= SMA_SHORT).then_some(sma_7_val);
        ind.sma_14 = (i + 1 >= SMA_MID).then_some(sma_14_val);
        ind.sma_30 = (i + 1 >= SMA_LONG).then_some(sma_30_val);
        ind.ema_10 = (i + 1 >= EMA_FAST).then_some(ema_10_val);
        ind.ema_30 = (i + 1 >= EMA_SLOW).then_some(ema_30_val);
        ind.volume_sma = (i + 1 >= ROLLING_WINDOW).then_some(volume_sma_val);
        ind.volatility = rolling_volatility(&prices[..=i]);
        ind.momentum = (i >= ROLLING_WINDOW).then(|| price - prices[i - ROLLING_WINDOW]);
    }
}

/// Standard deviation of relative returns over the trailing window.
/// Requires `ROLLING_WINDOW` returns, i.e. `ROLLING_WINDOW + 1` prices.
pub fn rolling_volatility(prices: &[f64]) -> Option<f64> {
    if prices.len() < ROLLING_WINDOW + 1 {
        return None;
    }
    let tail = &prices[prices.len() - (ROLLING_WINDOW + 1)..];
    let returns: Vec<f64> = tail
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    Some(variance.sqrt())
}
