//! Append-only CSV log of streamed feature rows, for offline retraining
//! and model audits.

use crate::domain::types::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRow {
    pub timestamp: i64,
    pub symbol: String,
    pub price: f64,
    pub sma_7: f64,
    pub sma_14: f64,
    pub sma_30: f64,
    pub ema_10: f64,
    pub ema_30: f64,
    pub volatility: f64,
    pub momentum: f64,
    pub volume: f64,
    pub price_change: f64,
    pub volume_change: f64,
}

impl TrainingRow {
    pub fn from_feature(symbol: &str, timestamp: i64, f: &FeatureVector) -> Self {
        Self {
            timestamp,
            symbol: symbol.to_string(),
            price: f.price,
            sma_7: f.sma_7,
            sma_14: f.sma_14,
            sma_30: f.sma_30,
            ema_10: f.ema_10,
            ema_30: f.ema_30,
            volatility: f.volatility,
            momentum: f.momentum,
            volume: f.volume,
            price_change: f.price_change,
            volume_change: f.volume_change,
        }
    }
}

pub struct TrainingLog {
    output_path: PathBuf,
}

impl TrainingLog {
    pub fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }

    /// Appends rows to the CSV file, writing the header only on first
    /// creation. Write failures are logged, never propagated; losing a
    /// log row must not disturb the decision path.
    pub fn append(&self, rows: &[TrainingRow]) {
        if rows.is_empty() {
            return;
        }

        let file_exists = self.output_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path);

        match file {
            Ok(f) => {
                let mut wtr = csv::WriterBuilder::new()
                    .has_headers(!file_exists)
                    .from_writer(f);
                for row in rows {
                    if let Err(e) = wtr.serialize(row) {
                        error!("TrainingLog: failed to serialize row: {}", e);
                        return;
                    }
                }
                if let Err(e) = wtr.flush() {
                    error!("TrainingLog: failed to flush writer: {}", e);
                }
            }
            Err(e) => {
                error!("TrainingLog: failed to open {:?}: {}", self.output_path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_writes_header_once() {
        let dir = std::env::temp_dir().join("tradepulse_training_log_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("training.csv");
        std::fs::remove_file(&path).ok();

        let log = TrainingLog::new(path.clone());
        let feature = FeatureVector {
            price: 100.0,
            sma_7: 100.0,
            sma_14: 100.0,
            sma_30: 100.0,
            ema_10: 100.0,
            ema_30: 100.0,
            volatility: 0.01,
            momentum: 0.2,
            volume: 42.0,
            price_change: 0.001,
            volume_change: 0.0,
        };
        let row = TrainingRow::from_feature("BTC/USDT", 1_700_000_000, &feature);
        log.append(&[row.clone()]);
        log.append(&[row]);

        let content = std::fs::read_to_string(&path).unwrap();
        let header_count = content
            .lines()
            .filter(|l| l.starts_with("timestamp"))
            .count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);

        std::fs::remove_dir_all(&dir).ok();
    }
}
