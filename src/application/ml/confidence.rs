//! Composite forecast confidence.
//!
//! Four signals over the trailing feature window, each clamped to
//! [0.1, 0.95] before blending: volatility (lower is better), price-trend
//! directional consistency, volume coefficient-of-variation, and
//! SMA/EMA/momentum alignment.

use crate::domain::types::FeatureVector;

const WEIGHT_VOLATILITY: f64 = 0.30;
const WEIGHT_TREND: f64 = 0.25;
const WEIGHT_VOLUME: f64 = 0.20;
const WEIGHT_ALIGNMENT: f64 = 0.25;

const SCORE_FLOOR: f64 = 0.1;
const SCORE_CEIL: f64 = 0.95;

/// Volatility level treated as "fully uncertain" (stddev of returns).
const VOLATILITY_SATURATION: f64 = 0.02;

pub fn composite_confidence(window: &[FeatureVector]) -> f64 {
    let vol = clamp(volatility_score(window));
    let trend = clamp(trend_consistency_score(window));
    let volume = clamp(volume_consistency_score(window));
    let alignment = clamp(alignment_score(window));

    WEIGHT_VOLATILITY * vol
        + WEIGHT_TREND * trend
        + WEIGHT_VOLUME * volume
        + WEIGHT_ALIGNMENT * alignment
}

fn clamp(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(SCORE_FLOOR, SCORE_CEIL)
    } else {
        SCORE_FLOOR
    }
}

/// Lower recent volatility means higher confidence.
fn volatility_score(window: &[FeatureVector]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let mean_vol = window.iter().map(|f| f.volatility).sum::<f64>() / window.len() as f64;
    1.0 - (mean_vol / VOLATILITY_SATURATION).min(1.0)
}

/// Fraction of consecutive price moves agreeing with the majority
/// direction, rescaled from [0.5, 1] to [0, 1].
fn trend_consistency_score(window: &[FeatureVector]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let mut ups = 0usize;
    let mut downs = 0usize;
    for pair in window.windows(2) {
        if pair[1].price > pair[0].price {
            ups += 1;
        } else if pair[1].price < pair[0].price {
            downs += 1;
        }
    }
    let total = ups + downs;
    if total == 0 {
        // Flat prices: perfectly consistent.
        return 1.0;
    }
    let majority = ups.max(downs) as f64 / total as f64;
    (majority - 0.5) * 2.0
}

/// Low volume coefficient-of-variation means steadier participation.
fn volume_consistency_score(window: &[FeatureVector]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let volumes: Vec<f64> = window.iter().map(|f| f.volume).collect();
    let mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance =
        volumes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / volumes.len() as f64;
    let cv = variance.sqrt() / mean;
    1.0 - cv.min(1.0)
}

/// Agreement between moving averages, EMAs and momentum on the latest
/// point. Full agreement in either direction scores 1.
fn alignment_score(window: &[FeatureVector]) -> f64 {
    let Some(last) = window.last() else {
        return 0.0;
    };

    let mut bullish = 0i32;
    let mut bearish = 0i32;
    let mut vote = |up: bool| if up { bullish += 1 } else { bearish += 1 };

    vote(last.sma_7 >= last.sma_14);
    vote(last.sma_14 >= last.sma_30);
    vote(last.ema_10 >= last.ema_30);
    vote(last.momentum >= 0.0);
    vote(last.price >= last.sma_7);

    let total = bullish + bearish;
    (bullish - bearish).abs() as f64 / total as f64
}
