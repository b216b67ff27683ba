//! Windowed price forecaster.
//!
//! A linear sequence regressor over the flattened, robust-scaled feature
//! window. Robust scaling (median / MAD * 1.4826) instead of mean/stddev
//! keeps single spiked observations from distorting the whole scale.

use crate::application::ml::confidence::composite_confidence;
use crate::domain::errors::PredictionError;
use crate::domain::types::{Direction, FEATURE_DIM, FeatureVector, Forecast};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Fixed model input window length.
pub const WINDOW_SIZE: usize = 60;

/// Consistency factor making MAD comparable to a normal stddev.
const MAD_SCALE: f64 = 1.4826;

const EPOCHS_FULL: usize = 100;
const EPOCHS_QUICK: usize = 10;
/// Base step size, scaled down by the input dimension before use.
const LEARNING_RATE: f64 = 0.5;
/// Gradient L2-norm cap. Overlapping windows make the design matrix
/// nearly rank-deficient, so unclipped full-batch steps can diverge.
const GRADIENT_CLIP: f64 = 5.0;
/// Stop early once validation loss exceeds this multiple of train loss.
const OVERFIT_FACTOR: f64 = 1.5;
const VALIDATION_SPLIT: f64 = 0.2;

/// Per-dimension robust scaler fitted on the training set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustScaler {
    medians: Vec<f64>,
    scales: Vec<f64>,
}

impl RobustScaler {
    pub fn fit(features: &[FeatureVector]) -> Self {
        let mut medians = vec![0.0; FEATURE_DIM];
        let mut scales = vec![1.0; FEATURE_DIM];

        for dim in 0..FEATURE_DIM {
            let mut values: Vec<f64> = features.iter().map(|f| f.to_array()[dim]).collect();
            let median = median_of(&mut values);
            let mut deviations: Vec<f64> = values.iter().map(|v| (v - median).abs()).collect();
            let mad = median_of(&mut deviations);

            medians[dim] = median;
            let scale = mad * MAD_SCALE;
            scales[dim] = if scale > f64::EPSILON { scale } else { 1.0 };
        }

        Self { medians, scales }
    }

    pub fn transform(&self, feature: &FeatureVector) -> [f64; FEATURE_DIM] {
        let raw = feature.to_array();
        let mut scaled = [0.0; FEATURE_DIM];
        for dim in 0..FEATURE_DIM {
            scaled[dim] = (raw[dim] - self.medians[dim]) / self.scales[dim];
        }
        scaled
    }

    /// Price dimension is index 0 of the feature array.
    pub fn scale_price(&self, price: f64) -> f64 {
        (price - self.medians[0]) / self.scales[0]
    }

    pub fn unscale_price(&self, scaled: f64) -> f64 {
        scaled * self.scales[0] + self.medians[0]
    }
}

fn median_of(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Serialized model artifact, reloadable on restart without retraining.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PredictorArtifact {
    scaler: RobustScaler,
    weights: Vec<f64>,
    trained_at: i64,
    epochs_run: usize,
}

pub struct PricePredictor {
    artifact: Option<PredictorArtifact>,
}

impl PricePredictor {
    pub fn new() -> Self {
        Self { artifact: None }
    }

    pub fn is_ready(&self) -> bool {
        self.artifact.is_some()
    }

    /// Trains the regressor on chronologically ordered features. Quick
    /// mode runs fewer epochs for low-latency incremental updates.
    ///
    /// Yields to the scheduler between epochs so training never starves
    /// the event loop.
    pub async fn train(
        &mut self,
        features: &[FeatureVector],
        quick_mode: bool,
    ) -> Result<(), PredictionError> {
        if features.len() < WINDOW_SIZE + 2 {
            return Err(PredictionError::InsufficientData {
                got: features.len(),
                need: WINDOW_SIZE + 2,
            });
        }

        let scaler = RobustScaler::fit(features);

        // Supervised pairs: flattened scaled window -> next scaled price.
        let input_dim = WINDOW_SIZE * FEATURE_DIM + 1;
        let sample_count = features.len() - WINDOW_SIZE;
        let mut flat = Vec::with_capacity(sample_count * input_dim);
        let mut targets = Vec::with_capacity(sample_count);
        for i in WINDOW_SIZE..features.len() {
            for feature in &features[i - WINDOW_SIZE..i] {
                flat.extend_from_slice(&scaler.transform(feature));
            }
            flat.push(1.0); // bias
            targets.push(scaler.scale_price(features[i].price));
        }

        let x = Array2::from_shape_vec((sample_count, input_dim), flat).map_err(|e| {
            PredictionError::TrainingFailed {
                reason: e.to_string(),
            }
        })?;
        let y = Array1::from_vec(targets);

        // Held-out validation split: the most recent samples.
        let val_count = ((sample_count as f64) * VALIDATION_SPLIT).floor() as usize;
        let train_count = sample_count - val_count;
        let x_train = x.slice(ndarray::s![..train_count, ..]).to_owned();
        let y_train = y.slice(ndarray::s![..train_count]).to_owned();
        let x_val = x.slice(ndarray::s![train_count.., ..]).to_owned();
        let y_val = y.slice(ndarray::s![train_count..]).to_owned();

        let epochs = if quick_mode { EPOCHS_QUICK } else { EPOCHS_FULL };
        let mut weights = match &self.artifact {
            // Incremental refit continues from the current weights.
            Some(existing) if existing.weights.len() == input_dim => {
                Array1::from_vec(existing.weights.clone())
            }
            _ => Array1::zeros(input_dim),
        };

        let step = LEARNING_RATE / input_dim as f64;
        let mut epochs_run = 0;
        for epoch in 0..epochs {
            let residual = &x_train.dot(&weights) - &y_train;
            let train_loss =
                residual.mapv(|r| r * r).sum() / train_count.max(1) as f64;
            let mut gradient = x_train.t().dot(&residual) * (2.0 / train_count.max(1) as f64);
            let norm = gradient.mapv(|g| g * g).sum().sqrt();
            if norm > GRADIENT_CLIP {
                gradient *= GRADIENT_CLIP / norm;
            }
            weights = &weights - &(gradient * step);
            epochs_run = epoch + 1;

            if val_count > 0 {
                let val_residual = &x_val.dot(&weights) - &y_val;
                let val_loss = val_residual.mapv(|r| r * r).sum() / val_count as f64;
                if epoch > 0 && val_loss > OVERFIT_FACTOR * train_loss {
                    debug!(
                        "PricePredictor: early stop at epoch {} (val {:.6} > {:.1}x train {:.6})",
                        epoch, val_loss, OVERFIT_FACTOR, train_loss
                    );
                    break;
                }
            }

            tokio::task::yield_now().await;
        }

        info!(
            "PricePredictor: trained on {} samples, {} epochs ({})",
            sample_count,
            epochs_run,
            if quick_mode { "quick" } else { "full" }
        );

        self.artifact = Some(PredictorArtifact {
            scaler,
            weights: weights.to_vec(),
            trained_at: chrono::Utc::now().timestamp(),
            epochs_run,
        });
        Ok(())
    }

    /// Forecasts the next price from the trailing feature window.
    pub fn predict(
        &self,
        recent: &[FeatureVector],
        timestamp: i64,
    ) -> Result<Forecast, PredictionError> {
        let artifact = self.artifact.as_ref().ok_or(PredictionError::NotReady)?;

        if recent.len() < WINDOW_SIZE {
            return Err(PredictionError::InsufficientData {
                got: recent.len(),
                need: WINDOW_SIZE,
            });
        }

        let window = &recent[recent.len() - WINDOW_SIZE..];
        let mut input = Vec::with_capacity(WINDOW_SIZE * FEATURE_DIM + 1);
        for feature in window {
            input.extend_from_slice(&artifact.scaler.transform(feature));
        }
        input.push(1.0);

        let weights = Array1::from_vec(artifact.weights.clone());
        let scaled = Array1::from_vec(input).dot(&weights);
        let price = artifact.scaler.unscale_price(scaled);

        let last_price = window[window.len() - 1].price;
        let direction = if price >= last_price {
            Direction::Up
        } else {
            Direction::Down
        };

        Ok(Forecast {
            price,
            confidence: composite_confidence(window),
            direction,
            timestamp,
        })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let artifact = self
            .artifact
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no trained model to save"))?;
        let json = serde_json::to_vec_pretty(artifact)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        info!("PricePredictor: saved model artifact to {:?}", path);
        Ok(())
    }

    /// Loads a persisted artifact. Missing or corrupt files leave the
    /// predictor not-ready; the failure is logged, not fatal.
    pub fn load(&mut self, path: &Path) -> bool {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<PredictorArtifact>(&bytes) {
                Ok(artifact) => {
                    info!("PricePredictor: loaded model artifact from {:?}", path);
                    self.artifact = Some(artifact);
                    true
                }
                Err(e) => {
                    warn!("PricePredictor: failed to deserialize {:?}: {}", path, e);
                    false
                }
            },
            Err(e) => {
                warn!("PricePredictor: model artifact {:?} unreadable: {}", path, e);
                false
            }
        }
    }
}

impl Default for PricePredictor {
    fn default() -> Self {
        Self::new()
    }
}
