//! Q-table decision agent.
//!
//! State is a discretization of the feature vector plus the current
//! portfolio exposure bucket. Exploration happens only during training;
//! serving is a pure argmax over the learned action values.

use crate::domain::errors::AgentError;
use crate::domain::types::{FeatureVector, TradeAction, TradingDecision};
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

const LEARNING_RATE: f64 = 0.1;
const DISCOUNT: f64 = 0.9;
const EXPLORATION_RATE: f64 = 0.1;
const PASSES_FULL: usize = 5;
const PASSES_QUICK: usize = 1;

/// Exported policy: the learned value table plus bookkeeping. Persisted
/// as JSON and reloadable without retraining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub q_table: HashMap<String, [f64; 3]>,
    pub training_passes: usize,
}

pub struct DecisionAgent {
    q_table: HashMap<String, [f64; 3]>,
    training_passes: usize,
    rng: StdRng,
}

impl DecisionAgent {
    pub fn new(seed: u64) -> Self {
        Self {
            q_table: HashMap::new(),
            training_passes: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.training_passes > 0 && !self.q_table.is_empty()
    }

    /// Discretized state key. Buckets are coarse on purpose: the value
    /// table must stay dense enough to be learnable from a 1000-point
    /// streaming buffer.
    fn state_key(feature: &FeatureVector, portfolio_ratio: f64) -> String {
        let sign_bucket = |v: f64, threshold: f64| -> i8 {
            if v > threshold {
                1
            } else if v < -threshold {
                -1
            } else {
                0
            }
        };

        let price_change = sign_bucket(feature.price_change, 0.0005);
        let momentum = sign_bucket(feature.momentum, f64::EPSILON);
        let trend = sign_bucket(feature.sma_7 - feature.sma_30, f64::EPSILON);
        let volatility = if feature.volatility < 0.005 {
            0
        } else if feature.volatility < 0.02 {
            1
        } else {
            2
        };
        let exposure = ((portfolio_ratio * 5.0).floor() as i8).min(4);

        format!(
            "{}|{}|{}|{}|{}",
            price_change, momentum, trend, volatility, exposure
        )
    }

    /// Trains the value table over consecutive feature transitions.
    /// Rewards default to the realized next-step return of the chosen
    /// action; an explicit reward signal overrides it element-wise.
    ///
    /// Yields between passes so long training never starves the loop.
    pub async fn train(
        &mut self,
        features: &[FeatureVector],
        reward_signal: Option<&[f64]>,
        quick_mode: bool,
    ) {
        if features.len() < 2 {
            warn!("DecisionAgent: not enough features to train on");
            return;
        }

        let passes = if quick_mode { PASSES_QUICK } else { PASSES_FULL };
        for _ in 0..passes {
            let mut exposure: f64 = 0.5;

            for i in 0..features.len() - 1 {
                let state = Self::state_key(&features[i], exposure);
                let next_return = if features[i].price > 0.0 {
                    (features[i + 1].price - features[i].price) / features[i].price
                } else {
                    0.0
                };

                // epsilon-greedy action selection, training only.
                let action = if self.rng.random_bool(EXPLORATION_RATE) {
                    TradeAction::ALL[self.rng.random_range(0..TradeAction::ALL.len())]
                } else {
                    self.best_action(&state)
                };

                let reward = match reward_signal.and_then(|r| r.get(i)) {
                    Some(&r) => r,
                    None => match action {
                        TradeAction::Buy => next_return,
                        TradeAction::Sell => -next_return,
                        TradeAction::Hold => -next_return.abs() * 0.1,
                    },
                };

                exposure = match action {
                    TradeAction::Buy => (exposure + 0.2).min(1.0),
                    TradeAction::Sell => (exposure - 0.2).max(0.0),
                    TradeAction::Hold => exposure,
                };

                let next_state = Self::state_key(&features[i + 1], exposure);
                let next_best = self
                    .q_table
                    .get(&next_state)
                    .map(|q| q.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
                    .unwrap_or(0.0);

                let entry = self.q_table.entry(state).or_insert([0.0; 3]);
                let idx = action.index();
                entry[idx] += LEARNING_RATE * (reward + DISCOUNT * next_best - entry[idx]);
            }

            self.training_passes += 1;
            tokio::task::yield_now().await;
        }

        info!(
            "DecisionAgent: trained {} pass(es), {} states known",
            passes,
            self.q_table.len()
        );
    }

    fn best_action(&self, state: &str) -> TradeAction {
        let values = self.q_table.get(state).copied().unwrap_or([0.0; 3]);
        let mut best = TradeAction::Hold;
        let mut best_value = f64::NEG_INFINITY;
        for action in TradeAction::ALL {
            let v = values[action.index()];
            if v > best_value {
                best_value = v;
                best = action;
            }
        }
        best
    }

    /// Serving-time decision: pure argmax, no exploration. The caller
    /// guarantees `portfolio_ratio` is within [0, 1]; out-of-range values
    /// are rejected at the API boundary before reaching the agent.
    pub fn decide(
        &self,
        feature: &FeatureVector,
        portfolio_ratio: f64,
    ) -> Result<TradingDecision, AgentError> {
        if !self.is_initialized() {
            return Err(AgentError::NotInitialized);
        }

        let state = Self::state_key(feature, portfolio_ratio);
        let values = self.q_table.get(&state).copied().unwrap_or([0.0; 3]);

        let action = self.best_action(&state);
        let confidence = Self::decision_confidence(&values, action);

        Ok(TradingDecision { action, confidence })
    }

    /// Margin of the chosen action over the runner-up, mapped to [0, 100].
    fn decision_confidence(values: &[f64; 3], chosen: TradeAction) -> f64 {
        let best = values[chosen.index()];
        let runner_up = values
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != chosen.index())
            .map(|(_, v)| *v)
            .fold(f64::NEG_INFINITY, f64::max);

        let margin = best - runner_up;
        let denominator = best.abs() + runner_up.abs();
        if denominator <= f64::EPSILON {
            return 50.0;
        }
        (50.0 + 50.0 * (margin / denominator)).clamp(0.0, 100.0)
    }

    pub fn export_policy(&self) -> PolicySnapshot {
        PolicySnapshot {
            q_table: self.q_table.clone(),
            training_passes: self.training_passes,
        }
    }

    pub fn import_policy(&mut self, snapshot: PolicySnapshot) {
        self.q_table = snapshot.q_table;
        self.training_passes = snapshot.training_passes;
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(&self.export_policy())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        info!("DecisionAgent: saved policy to {:?}", path);
        Ok(())
    }

    /// Loads a persisted policy. Failures are logged and leave the agent
    /// uninitialized.
    pub fn load(&mut self, path: &Path) -> bool {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<PolicySnapshot>(&bytes) {
                Ok(snapshot) => {
                    info!("DecisionAgent: loaded policy from {:?}", path);
                    self.import_policy(snapshot);
                    true
                }
                Err(e) => {
                    warn!("DecisionAgent: failed to deserialize {:?}: {}", path, e);
                    false
                }
            },
            Err(e) => {
                warn!("DecisionAgent: policy artifact {:?} unreadable: {}", path, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(price: f64, price_change: f64) -> FeatureVector {
        FeatureVector {
            price,
            sma_7: price,
            sma_14: price,
            sma_30: price - 1.0,
            ema_10: price,
            ema_30: price,
            volatility: 0.002,
            momentum: 0.5,
            volume: 50.0,
            price_change,
            volume_change: 0.0,
        }
    }

    fn rising_series(count: usize) -> Vec<FeatureVector> {
        (0..count)
            .map(|i| feature(100.0 + i as f64, 0.01))
            .collect()
    }

    #[tokio::test]
    async fn test_uninitialized_agent_rejects_decisions() {
        let agent = DecisionAgent::new(7);
        let err = agent.decide(&feature(100.0, 0.01), 0.5).unwrap_err();
        assert!(matches!(err, AgentError::NotInitialized));
    }

    #[tokio::test]
    async fn test_decision_is_deterministic_at_serving_time() {
        let mut agent = DecisionAgent::new(7);
        agent.train(&rising_series(200), None, false).await;

        let f = feature(300.0, 0.01);
        let first = agent.decide(&f, 0.5).unwrap();
        for _ in 0..10 {
            let again = agent.decide(&f, 0.5).unwrap();
            assert_eq!(again.action, first.action);
            assert!((again.confidence - first.confidence).abs() < 1e-12);
        }
        assert!((0.0..=100.0).contains(&first.confidence));
    }

    #[tokio::test]
    async fn test_rising_market_learns_to_buy() {
        let mut agent = DecisionAgent::new(7);
        agent.train(&rising_series(400), None, false).await;

        // Mid exposure in a consistently rising state.
        let decision = agent.decide(&feature(500.0, 0.01), 0.4).unwrap();
        assert_eq!(decision.action, TradeAction::Buy);
    }

    #[tokio::test]
    async fn test_policy_round_trip() {
        let mut agent = DecisionAgent::new(7);
        agent.train(&rising_series(200), None, true).await;
        let f = feature(300.0, 0.01);
        let before = agent.decide(&f, 0.5).unwrap();

        let dir = std::env::temp_dir().join("tradepulse_agent_test");
        let path = dir.join("policy.json");
        agent.save(&path).unwrap();

        let mut restored = DecisionAgent::new(99);
        assert!(restored.load(&path));
        assert!(restored.is_initialized());
        let after = restored.decide(&f, 0.5).unwrap();
        assert_eq!(before.action, after.action);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_external_reward_signal_overrides_returns() {
        let mut agent = DecisionAgent::new(7);
        let series = rising_series(50);
        let rewards = vec![-1.0; 49];
        agent.train(&series, Some(&rewards), true).await;
        assert!(agent.is_initialized());
    }
}
