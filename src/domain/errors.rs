use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while collecting market data from upstream sources.
///
/// Transient failures (timeouts, 5xx) are retried with backoff before the
/// source is abandoned; permanent failures (4xx, malformed payloads) abandon
/// the source immediately.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Rate limit for source '{source_name}' exceeded: retry in {retry_after_ms}ms")]
    RateLimited {
        source_name: String,
        retry_after_ms: u64,
    },

    #[error("Source '{source_name}' timed out after {elapsed_ms}ms")]
    Timeout {
        source_name: String,
        elapsed_ms: u64,
    },

    #[error("Source '{source_name}' upstream error (HTTP {status}): {message}")]
    Upstream {
        source_name: String,
        status: u16,
        message: String,
    },

    #[error("Source '{source_name}' rejected the request (HTTP {status}), not retryable")]
    ClientRejected { source_name: String, status: u16 },

    #[error("Source '{source_name}' returned a malformed payload: {reason}")]
    MalformedPayload { source_name: String, reason: String },

    #[error("Source '{source_name}' exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        source_name: String,
        attempts: u32,
        last_error: String,
    },

    #[error("All {attempted} data sources failed")]
    AllSourcesFailed { attempted: usize },
}

impl CollectorError {
    /// Transient errors are retried; permanent ones abandon the source.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollectorError::Timeout { .. } | CollectorError::Upstream { .. }
        )
    }
}

/// Errors raised by the price predictor.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Insufficient data: got {got} feature points, need {need}")]
    InsufficientData { got: usize, need: usize },

    #[error("Model is not trained or loaded yet")]
    NotReady,

    #[error("Training failed: {reason}")]
    TrainingFailed { reason: String },
}

/// Errors raised by the decision agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Decision agent has not been initialized")]
    NotInitialized,

    #[error("Policy import failed: {reason}")]
    ImportFailed { reason: String },
}

/// Errors raised by the model registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Model version '{version}' not found")]
    VersionNotFound { version: String },

    #[error("A/B test '{test_id}' not found")]
    TestNotFound { test_id: String },

    #[error("A/B test '{test_id}' is not active")]
    TestInactive { test_id: String },

    #[error("Model artifact at '{path}' could not be loaded: {reason}")]
    ArtifactUnreadable { path: String, reason: String },
}

/// Errors raised by the on-chain prediction oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Caller '{caller}' is not the authorized publisher")]
    NotPublisher { caller: String },

    #[error("Caller '{caller}' is not the contract owner")]
    NotOwner { caller: String },

    #[error("Prediction price must be positive, got {price}")]
    InvalidPrice { price: Decimal },

    #[error("Confidence {confidence} exceeds maximum of 100")]
    InvalidConfidence { confidence: u32 },

    #[error("Expiry {expires_at} is not in the future (now {now})")]
    ExpiryInPast { expires_at: i64, now: i64 },

    #[error("Expiry {expires_at} is more than {max_secs}s ahead")]
    ExpiryTooFar { expires_at: i64, max_secs: i64 },

    #[error("Confidence threshold {value} exceeds maximum of 100")]
    ThresholdOutOfRange { value: u8 },
}

/// Typed, non-retryable trade rejections. The swap reverts atomically; no
/// partial transfer ever occurs on any of these.
#[derive(Debug, Error)]
pub enum TradeGateError {
    #[error("Oracle prediction is not valid (confidence {confidence})")]
    InvalidPrediction { confidence: u8 },

    #[error("Trading is paused")]
    TradingPaused,

    #[error("Swap amount must be non-zero")]
    ZeroAmount,

    #[error("Token address must be non-zero")]
    ZeroTokenAddress,

    #[error("Input and output tokens must be distinct")]
    IdenticalTokens,

    #[error("Deadline {deadline} has already passed (now {now})")]
    DeadlinePassed { deadline: i64, now: i64 },

    #[error("Deadline {deadline} is more than {max_secs}s ahead")]
    DeadlineTooFar { deadline: i64, max_secs: i64 },

    #[error("Caller '{caller}' is not the contract owner")]
    NotOwner { caller: String },

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Boundary errors for the external request/response interface. Carries a
/// status-code class so route glue can map responses mechanically.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {reason}")]
    BadRequest { reason: String },

    #[error("Service unavailable: {reason}")]
    ServiceUnavailable { reason: String },
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::ServiceUnavailable { .. } => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_collector_error_retryability() {
        let transient = CollectorError::Upstream {
            source_name: "coingecko".to_string(),
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert!(transient.is_retryable());

        let permanent = CollectorError::ClientRejected {
            source_name: "coingecko".to_string(),
            status: 404,
        };
        assert!(!permanent.is_retryable());

        let limited = CollectorError::RateLimited {
            source_name: "binance".to_string(),
            retry_after_ms: 1200,
        };
        assert!(!limited.is_retryable());
    }

    #[test]
    fn test_trade_gate_error_carries_confidence() {
        let err = TradeGateError::InvalidPrediction { confidence: 42 };
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_oracle_error_formatting() {
        let err = OracleError::InvalidPrice { price: dec!(-1.5) };
        assert!(err.to_string().contains("-1.5"));
    }

    #[test]
    fn test_api_error_status_codes() {
        let bad = ApiError::BadRequest {
            reason: "portfolio ratio out of range".to_string(),
        };
        assert_eq!(bad.status_code(), 400);

        let unavailable = ApiError::ServiceUnavailable {
            reason: "model not trained".to_string(),
        };
        assert_eq!(unavailable.status_code(), 503);
    }
}
