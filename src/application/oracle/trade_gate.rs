//! Trade execution gate.
//!
//! Every swap consults the oracle's validity predicate first and reverts
//! with a typed, confidence-carrying error when it fails. All checks run
//! before any state changes, so a rejected trade never partially
//! transfers funds.

use crate::application::oracle::PredictionOracle;
use crate::domain::errors::TradeGateError;
use crate::domain::ports::Clock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SwapParams {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub deadline: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapReceipt {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub oracle_price: Decimal,
    pub oracle_confidence: u8,
    pub executed_at: i64,
}

pub struct TradeGate {
    oracle: Arc<PredictionOracle>,
    owner: String,
    paused: AtomicBool,
    deadline_buffer_secs: i64,
    clock: Arc<dyn Clock>,
}

impl TradeGate {
    pub fn new(
        oracle: Arc<PredictionOracle>,
        owner: String,
        deadline_buffer_secs: i64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            oracle,
            owner,
            paused: AtomicBool::new(false),
            deadline_buffer_secs,
            clock,
        }
    }

    pub fn pause(&self, caller: &str) -> Result<(), TradeGateError> {
        self.require_owner(caller)?;
        self.paused.store(true, Ordering::SeqCst);
        warn!("TradeGate: trading paused");
        Ok(())
    }

    pub fn unpause(&self, caller: &str) -> Result<(), TradeGateError> {
        self.require_owner(caller)?;
        self.paused.store(false, Ordering::SeqCst);
        info!("TradeGate: trading resumed");
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Executes a swap at the oracle price. Checks, in order: pause
    /// switch, amount, token addresses, deadline bounds, oracle validity.
    /// Any failure reverts the whole call.
    pub fn execute_swap(&self, params: &SwapParams) -> Result<SwapReceipt, TradeGateError> {
        if self.is_paused() {
            return Err(TradeGateError::TradingPaused);
        }
        if params.amount_in <= Decimal::ZERO {
            return Err(TradeGateError::ZeroAmount);
        }
        if is_zero_address(&params.token_in) || is_zero_address(&params.token_out) {
            return Err(TradeGateError::ZeroTokenAddress);
        }
        if params.token_in == params.token_out {
            return Err(TradeGateError::IdenticalTokens);
        }

        let now = self.clock.now_unix();
        if params.deadline <= now {
            return Err(TradeGateError::DeadlinePassed {
                deadline: params.deadline,
                now,
            });
        }
        if params.deadline > now + self.deadline_buffer_secs {
            return Err(TradeGateError::DeadlineTooFar {
                deadline: params.deadline,
                max_secs: self.deadline_buffer_secs,
            });
        }

        if !self.oracle.is_valid() {
            return Err(TradeGateError::InvalidPrediction {
                confidence: self.oracle.current_confidence(),
            });
        }

        // All gates passed; the prediction is guaranteed present here.
        let prediction = self
            .oracle
            .get_prediction()
            .ok_or(TradeGateError::InvalidPrediction { confidence: 0 })?;

        let amount_out = params.amount_in * prediction.price;
        info!(
            "TradeGate: swap {} {} -> {} {} at oracle price {}",
            params.amount_in, params.token_in, amount_out, params.token_out, prediction.price
        );

        Ok(SwapReceipt {
            token_in: params.token_in.clone(),
            token_out: params.token_out.clone(),
            amount_in: params.amount_in,
            amount_out,
            oracle_price: prediction.price,
            oracle_confidence: prediction.confidence,
            executed_at: now,
        })
    }

    fn require_owner(&self, caller: &str) -> Result<(), TradeGateError> {
        if caller != self.owner {
            return Err(TradeGateError::NotOwner {
                caller: caller.to_string(),
            });
        }
        Ok(())
    }
}

fn is_zero_address(address: &str) -> bool {
    if address.is_empty() {
        return true;
    }
    let trimmed = address.strip_prefix("0x").unwrap_or(address);
    !trimmed.is_empty() && trimmed.chars().all(|c| c == '0')
}
