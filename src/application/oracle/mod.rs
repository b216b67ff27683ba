//! On-chain prediction oracle.
//!
//! A single-slot, ledger-resident record of {price, confidence, timestamp,
//! expiry}. The slot is overwritten wholesale on each publish and mutated
//! only by the authorized publisher. Validity is a pure function of the
//! record plus current time, evaluated in exactly one place so read sites
//! can never drift apart.
//!
//! The oracle is its own consistency domain: callers must treat publish
//! and read-before-trade as independently ordered events.

pub mod trade_gate;

use crate::domain::errors::OracleError;
use crate::domain::ports::Clock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::{info, warn};

/// The ledger-resident prediction record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OnChainPrediction {
    pub price: Decimal,
    /// Integer confidence, 0-100.
    pub confidence: u8,
    /// Time the record was set.
    pub timestamp: i64,
    pub expires_at: i64,
    pub is_valid: bool,
}

/// Observed state of the prediction slot. Never stored: always derived
/// from the record and the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionState {
    Empty,
    Valid,
    Expired,
    LowConfidence,
    Invalidated,
}

struct OracleState {
    slot: Option<OnChainPrediction>,
    confidence_threshold: u8,
}

pub struct PredictionOracle {
    state: Mutex<OracleState>,
    publisher: String,
    owner: String,
    max_validity_secs: i64,
    clock: Arc<dyn Clock>,
}

impl PredictionOracle {
    pub fn new(
        publisher: String,
        owner: String,
        confidence_threshold: u8,
        max_validity_secs: i64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Mutex::new(OracleState {
                slot: None,
                confidence_threshold,
            }),
            publisher,
            owner,
            max_validity_secs,
            clock,
        }
    }

    /// Publishes a fresh prediction, overwriting the prior record
    /// entirely. Publisher-only.
    pub fn publish(
        &self,
        caller: &str,
        price: Decimal,
        confidence: u32,
        expires_at: i64,
    ) -> Result<(), OracleError> {
        if caller != self.publisher {
            return Err(OracleError::NotPublisher {
                caller: caller.to_string(),
            });
        }
        if price <= Decimal::ZERO {
            return Err(OracleError::InvalidPrice { price });
        }
        if confidence > 100 {
            return Err(OracleError::InvalidConfidence { confidence });
        }

        let now = self.clock.now_unix();
        if expires_at <= now {
            return Err(OracleError::ExpiryInPast { expires_at, now });
        }
        if expires_at > now + self.max_validity_secs {
            return Err(OracleError::ExpiryTooFar {
                expires_at,
                max_secs: self.max_validity_secs,
            });
        }

        let record = OnChainPrediction {
            price,
            confidence: confidence as u8,
            timestamp: now,
            expires_at,
            is_valid: true,
        };
        self.lock_state().slot = Some(record);
        info!(
            "PredictionOracle: published price={} confidence={} expires_at={}",
            price, confidence, expires_at
        );
        Ok(())
    }

    pub fn get_prediction(&self) -> Option<OnChainPrediction> {
        self.lock_state().slot
    }

    /// Observed slot state at the current time.
    pub fn state(&self) -> PredictionState {
        let state = self.lock_state();
        evaluate(
            state.slot.as_ref(),
            state.confidence_threshold,
            self.clock.now_unix(),
            self.max_validity_secs,
        )
    }

    /// The single validity predicate: set flag, not expired, not older
    /// than the maximum validity window, confidence at or above the
    /// threshold. All four must hold simultaneously.
    pub fn is_valid(&self) -> bool {
        self.state() == PredictionState::Valid
    }

    /// Force-clears validity without waiting for expiry. Publisher-only;
    /// used for emergency halts. Idempotent on an empty slot.
    pub fn invalidate(&self, caller: &str) -> Result<(), OracleError> {
        if caller != self.publisher {
            return Err(OracleError::NotPublisher {
                caller: caller.to_string(),
            });
        }
        let mut state = self.lock_state();
        if let Some(slot) = state.slot.as_mut() {
            slot.is_valid = false;
            warn!("PredictionOracle: prediction invalidated by publisher");
        }
        Ok(())
    }

    /// Adjusts the minimum confidence. Owner-only.
    pub fn update_confidence_threshold(&self, caller: &str, value: u8) -> Result<(), OracleError> {
        if caller != self.owner {
            return Err(OracleError::NotOwner {
                caller: caller.to_string(),
            });
        }
        if value > 100 {
            return Err(OracleError::ThresholdOutOfRange { value });
        }
        self.lock_state().confidence_threshold = value;
        info!("PredictionOracle: confidence threshold set to {}", value);
        Ok(())
    }

    pub fn confidence_threshold(&self) -> u8 {
        self.lock_state().confidence_threshold
    }

    /// Confidence of the current record, 0 when the slot is empty.
    pub fn current_confidence(&self) -> u8 {
        self.lock_state().slot.map(|s| s.confidence).unwrap_or(0)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, OracleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn evaluate(
    slot: Option<&OnChainPrediction>,
    threshold: u8,
    now: i64,
    max_validity_secs: i64,
) -> PredictionState {
    let Some(record) = slot else {
        return PredictionState::Empty;
    };
    if !record.is_valid {
        return PredictionState::Invalidated;
    }
    if now > record.expires_at || now - record.timestamp > max_validity_secs {
        return PredictionState::Expired;
    }
    if record.confidence < threshold {
        return PredictionState::LowConfidence;
    }
    PredictionState::Valid
}
