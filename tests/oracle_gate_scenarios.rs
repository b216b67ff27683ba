//! Oracle gate scenario walk: publish, expiry, threshold raises and
//! lowers, and the trade contract's behavior at each step.

use rust_decimal_macros::dec;
use std::sync::Arc;
use tradepulse::application::oracle::trade_gate::{SwapParams, TradeGate};
use tradepulse::application::oracle::{PredictionOracle, PredictionState};
use tradepulse::domain::errors::TradeGateError;
use tradepulse::domain::ports::Clock;
use tradepulse::infrastructure::clock::ManualClock;

const T0: i64 = 1_700_000_000;
const PUBLISHER: &str = "oracle-publisher";
const OWNER: &str = "contract-owner";

fn setup() -> (Arc<PredictionOracle>, TradeGate, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_unix(T0));
    let oracle = Arc::new(PredictionOracle::new(
        PUBLISHER.to_string(),
        OWNER.to_string(),
        70,
        3_600,
        clock.clone(),
    ));
    let gate = TradeGate::new(oracle.clone(), OWNER.to_string(), 1_200, clock.clone());
    (oracle, gate, clock)
}

fn swap_at(now: i64) -> SwapParams {
    SwapParams {
        token_in: "0xaaa1".to_string(),
        token_out: "0xbbb2".to_string(),
        amount_in: dec!(10),
        deadline: now + 600,
    }
}

#[test]
fn test_validity_sequence_from_the_specification() {
    let (oracle, _gate, clock) = setup();

    // publish(price=100, confidence=80, expiresAt=now+1800)
    oracle.publish(PUBLISHER, dec!(100), 80, T0 + 1_800).unwrap();
    assert!(oracle.is_valid());

    // Raising the threshold above the record's confidence invalidates it.
    oracle.update_confidence_threshold(OWNER, 85).unwrap();
    assert!(!oracle.is_valid());
    assert_eq!(oracle.state(), PredictionState::LowConfidence);

    // Lowering it back restores validity.
    oracle.update_confidence_threshold(OWNER, 70).unwrap();
    assert!(oracle.is_valid());

    // Advancing past expiry kills it for good.
    clock.advance_secs(1_801);
    assert!(!oracle.is_valid());
    assert_eq!(oracle.state(), PredictionState::Expired);
}

#[test]
fn test_trade_reverts_with_confidence_when_gate_closed() {
    let (oracle, gate, clock) = setup();

    // Empty slot: revert carries confidence 0.
    let err = gate.execute_swap(&swap_at(T0)).unwrap_err();
    assert!(matches!(
        err,
        TradeGateError::InvalidPrediction { confidence: 0 }
    ));

    // Published but below threshold: revert carries the stored value.
    oracle.publish(PUBLISHER, dec!(100), 60, T0 + 1_800).unwrap();
    let err = gate.execute_swap(&swap_at(T0)).unwrap_err();
    assert!(matches!(
        err,
        TradeGateError::InvalidPrediction { confidence: 60 }
    ));

    // Valid prediction: the swap goes through and prices at the oracle.
    oracle.publish(PUBLISHER, dec!(100), 80, T0 + 1_800).unwrap();
    let receipt = gate.execute_swap(&swap_at(T0)).unwrap();
    assert_eq!(receipt.amount_out, dec!(1000));

    // Emergency invalidation closes the gate immediately.
    oracle.invalidate(PUBLISHER).unwrap();
    let now = clock.now_unix();
    let err = gate.execute_swap(&swap_at(now)).unwrap_err();
    assert!(matches!(
        err,
        TradeGateError::InvalidPrediction { confidence: 80 }
    ));
}

#[test]
fn test_pause_dominates_oracle_state() {
    let (oracle, gate, _clock) = setup();
    oracle.publish(PUBLISHER, dec!(100), 90, T0 + 1_800).unwrap();
    assert!(oracle.is_valid());

    gate.pause(OWNER).unwrap();
    assert!(matches!(
        gate.execute_swap(&swap_at(T0)),
        Err(TradeGateError::TradingPaused)
    ));

    gate.unpause(OWNER).unwrap();
    assert!(gate.execute_swap(&swap_at(T0)).is_ok());
}

#[test]
fn test_republish_resets_the_window() {
    let (oracle, gate, clock) = setup();
    oracle.publish(PUBLISHER, dec!(100), 80, T0 + 600).unwrap();

    clock.advance_secs(601);
    assert!(!oracle.is_valid());

    // A fresh publish after expiry reopens the gate.
    let now = clock.now_unix();
    oracle.publish(PUBLISHER, dec!(105), 75, now + 600).unwrap();
    assert!(oracle.is_valid());
    let receipt = gate.execute_swap(&swap_at(now)).unwrap();
    assert_eq!(receipt.oracle_price, dec!(105));
}
