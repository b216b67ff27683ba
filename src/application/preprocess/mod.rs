//! Observation series preprocessing.
//!
//! Pipeline order: structural validation, MAD outlier removal, timestamp
//! sort, duplicate removal, gap interpolation, indicator enrichment.
//! Data-quality failures drop the offending point silently; they never
//! surface as request failures.

pub mod indicators;

use crate::domain::types::{FeatureVector, MarketObservation};
use crate::infrastructure::observability::Metrics;
use statrs::statistics::{Data, OrderStatistics};
use tracing::debug;

/// A gap wider than this multiple of the nominal interval is interpolated.
const GAP_FACTOR: f64 = 1.5;
/// Outlier cutoff: relative change beyond `median + 3 * MAD`.
const OUTLIER_MAD_MULTIPLIER: f64 = 3.0;

pub struct Preprocessor {
    nominal_interval_secs: u64,
    metrics: Metrics,
}

impl Preprocessor {
    pub fn new(nominal_interval_secs: u64, metrics: Metrics) -> Self {
        Self {
            nominal_interval_secs,
            metrics,
        }
    }

    pub fn process(&self, raw: Vec<MarketObservation>) -> Vec<MarketObservation> {
        let initial = raw.len();

        let valid = self.drop_invalid(raw);
        let filtered = self.drop_outliers(valid);
        let mut sorted = filtered;
        sorted.sort_by_key(|o| o.timestamp);
        let deduped = self.drop_duplicates(sorted);
        let mut dense = self.interpolate_gaps(deduped);
        indicators::enrich(&mut dense);

        debug!(
            "Preprocessor: {} raw -> {} processed points",
            initial,
            dense.len()
        );
        dense
    }

    fn drop_invalid(&self, raw: Vec<MarketObservation>) -> Vec<MarketObservation> {
        let before = raw.len();
        let valid: Vec<MarketObservation> = raw
            .into_iter()
            .filter(|o| o.is_structurally_valid())
            .collect();
        let dropped = before - valid.len();
        if dropped > 0 {
            self.metrics
                .points_dropped_total
                .with_label_values(&["invalid"])
                .inc_by(dropped as f64);
        }
        valid
    }

    /// Drops points whose pairwise relative price change exceeds
    /// `median + 3 * MAD` of all changes. The first point is always kept.
    fn drop_outliers(&self, observations: Vec<MarketObservation>) -> Vec<MarketObservation> {
        if observations.len() < 3 {
            return observations;
        }

        let changes: Vec<f64> = observations
            .windows(2)
            .map(|w| ((w[1].price - w[0].price) / w[0].price).abs())
            .collect();

        let mut data = Data::new(changes.clone());
        let median = data.median();
        let deviations: Vec<f64> = changes.iter().map(|c| (c - median).abs()).collect();
        let mad = Data::new(deviations).median();
        let cutoff = median + OUTLIER_MAD_MULTIPLIER * mad;

        let mut dropped = 0usize;
        let kept: Vec<MarketObservation> = observations
            .into_iter()
            .enumerate()
            .filter(|(i, _)| {
                if *i == 0 {
                    return true;
                }
                let keep = changes[i - 1] <= cutoff;
                if !keep {
                    dropped += 1;
                }
                keep
            })
            .map(|(_, o)| o)
            .collect();

        if dropped > 0 {
            self.metrics
                .points_dropped_total
                .with_label_values(&["outlier"])
                .inc_by(dropped as f64);
            debug!(
                "Preprocessor: dropped {} outlier points (cutoff {:.6})",
                dropped, cutoff
            );
        }
        kept
    }

    /// Drops exact-timestamp duplicates, keeping the first occurrence.
    /// Input must already be sorted by timestamp.
    fn drop_duplicates(&self, observations: Vec<MarketObservation>) -> Vec<MarketObservation> {
        let before = observations.len();
        let mut deduped: Vec<MarketObservation> = Vec::with_capacity(before);
        for obs in observations {
            match deduped.last() {
                Some(last) if last.timestamp == obs.timestamp => {}
                _ => deduped.push(obs),
            }
        }
        let dropped = before - deduped.len();
        if dropped > 0 {
            self.metrics
                .points_dropped_total
                .with_label_values(&["duplicate"])
                .inc_by(dropped as f64);
        }
        deduped
    }

    /// Linearly interpolates all OHLCV fields across gaps wider than
    /// 1.5x the nominal interval, restoring uniform spacing.
    fn interpolate_gaps(&self, observations: Vec<MarketObservation>) -> Vec<MarketObservation> {
        if observations.len() < 2 {
            return observations;
        }

        let interval = self.nominal_interval_secs as i64;
        let gap_threshold = (self.nominal_interval_secs as f64 * GAP_FACTOR) as i64;
        let mut dense: Vec<MarketObservation> = Vec::with_capacity(observations.len());

        for obs in observations {
            if let Some(prev) = dense.last().cloned() {
                let gap = obs.timestamp - prev.timestamp;
                if gap > gap_threshold {
                    let missing = ((gap as f64 / interval as f64).round() as i64 - 1).max(0);
                    for j in 1..=missing {
                        let t = prev.timestamp + j * interval;
                        if t >= obs.timestamp {
                            break;
                        }
                        let fraction = (t - prev.timestamp) as f64 / gap as f64;
                        dense.push(lerp_observation(&prev, &obs, t, fraction));
                    }
                }
            }
            dense.push(obs);
        }
        dense
    }
}

fn lerp_observation(
    a: &MarketObservation,
    b: &MarketObservation,
    timestamp: i64,
    fraction: f64,
) -> MarketObservation {
    let lerp = |x: f64, y: f64| x + (y - x) * fraction;
    MarketObservation {
        timestamp,
        price: lerp(a.price, b.price),
        volume: lerp(a.volume, b.volume),
        high: lerp(a.high, b.high),
        low: lerp(a.low, b.low),
        open: lerp(a.open, b.open),
        close: lerp(a.close, b.close),
        indicators: Default::default(),
    }
}

/// Converts a processed series into feature vectors. Only points with a
/// complete indicator block and a predecessor (for the change fields)
/// produce a vector.
pub fn to_feature_vectors(observations: &[MarketObservation]) -> Vec<FeatureVector> {
    let mut features = Vec::new();
    for i in 1..observations.len() {
        let obs = &observations[i];
        let prev = &observations[i - 1];
        let ind = &obs.indicators;
        if !ind.is_complete() {
            continue;
        }

        let price_change = if prev.price > 0.0 {
            (obs.price - prev.price) / prev.price
        } else {
            0.0
        };
        let volume_change = if prev.volume > 0.0 {
            (obs.volume - prev.volume) / prev.volume
        } else {
            0.0
        };

        features.push(FeatureVector {
            price: obs.price,
            sma_7: ind.sma_7.unwrap_or(obs.price),
            sma_14: ind.sma_14.unwrap_or(obs.price),
            sma_30: ind.sma_30.unwrap_or(obs.price),
            ema_10: ind.ema_10.unwrap_or(obs.price),
            ema_30: ind.ema_30.unwrap_or(obs.price),
            volatility: ind.volatility.unwrap_or(0.0),
            momentum: ind.momentum.unwrap_or(0.0),
            volume: obs.volume,
            price_change,
            volume_change,
        });
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::IndicatorSet;

    fn obs(timestamp: i64, price: f64) -> MarketObservation {
        MarketObservation {
            timestamp,
            price,
            volume: 100.0,
            high: price * 1.001,
            low: price * 0.999,
            open: price,
            close: price,
            indicators: IndicatorSet::default(),
        }
    }

    /// Gently drifting series: pairwise changes are nearly equal, so the
    /// MAD filter keeps every point.
    fn drifting_series(count: usize) -> Vec<MarketObservation> {
        (0..count)
            .map(|i| obs(1_700_000_000 + (i as i64) * 60, 100.0 + (i as f64) * 0.05))
            .collect()
    }

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(60, Metrics::new().unwrap())
    }

    #[test]
    fn test_output_strictly_increasing_no_duplicates() {
        let mut raw = drifting_series(50);
        // Shuffle in a duplicate and an out-of-order point.
        raw.push(obs(1_700_000_000 + 10 * 60, 100.3));
        raw.swap(5, 20);

        let processed = preprocessor().process(raw);
        for w in processed.windows(2) {
            assert!(w[1].timestamp > w[0].timestamp);
        }
    }

    #[test]
    fn test_spike_removed_clean_series_unchanged() {
        let clean = drifting_series(50);
        let clean_len = preprocessor().process(clean.clone()).len();
        assert_eq!(clean_len, 50);

        let mut spiked = clean;
        spiked[25].price = 1_000.0; // far beyond median + 3*MAD
        let processed = preprocessor().process(spiked);
        assert!(processed.iter().all(|o| o.price < 500.0));
    }

    #[test]
    fn test_gap_of_twice_interval_inserts_one_point() {
        // Constant price keeps the outlier filter inert; the ramped volume
        // checks that interpolation covers every field, not just price.
        let mut raw: Vec<MarketObservation> = (0..30)
            .map(|i| {
                let mut o = obs(1_700_000_000 + (i as i64) * 60, 100.0);
                o.volume = 100.0 + (i as f64) * 2.0;
                o
            })
            .collect();
        let removed = raw.remove(10);
        let before = raw[9].clone();
        let after = raw[10].clone();
        assert_eq!(after.timestamp - before.timestamp, 120);

        let processed = preprocessor().process(raw);
        assert_eq!(processed.len(), 30);
        let inserted = processed
            .iter()
            .find(|o| o.timestamp == removed.timestamp)
            .expect("interpolated point should exist");
        assert!((inserted.price - 100.0).abs() < 1e-9);
        let expected_volume = (before.volume + after.volume) / 2.0;
        assert!((inserted.volume - expected_volume).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_timestamps_keep_first() {
        let mut raw: Vec<MarketObservation> = (0..20)
            .map(|i| obs(1_700_000_000 + (i as i64) * 60, 100.0))
            .collect();
        let mut dup = raw[5].clone();
        dup.volume = 999.0;
        raw.insert(6, dup);

        let processed = preprocessor().process(raw);
        assert_eq!(processed.len(), 20);
        let at = processed
            .iter()
            .find(|o| o.timestamp == 1_700_000_000 + 5 * 60)
            .unwrap();
        assert!((at.volume - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_feature_vectors_require_complete_indicators() {
        let raw = drifting_series(80);
        let processed = preprocessor().process(raw);
        assert_eq!(processed.len(), 80);
        let features = to_feature_vectors(&processed);
        // Indicators complete from index 29 (SMA30/EMA30 need 30 points).
        assert_eq!(features.len(), processed.len() - 29);
        assert!(features.iter().all(|f| f.is_finite()));
    }
}
