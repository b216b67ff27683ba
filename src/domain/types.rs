use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fields in a [`FeatureVector`]. The model input dimension is
/// fixed; changing it invalidates every persisted artifact.
pub const FEATURE_DIM: usize = 11;

/// Technical indicators computed by the preprocessor. A `None` field means
/// the point does not yet have enough trailing history for that indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub sma_7: Option<f64>,
    pub sma_14: Option<f64>,
    pub sma_30: Option<f64>,
    pub ema_10: Option<f64>,
    pub ema_30: Option<f64>,
    pub volatility: Option<f64>,
    pub momentum: Option<f64>,
    pub volume_sma: Option<f64>,
}

impl IndicatorSet {
    /// True once every indicator has a value.
    pub fn is_complete(&self) -> bool {
        self.sma_7.is_some()
            && self.sma_14.is_some()
            && self.sma_30.is_some()
            && self.ema_10.is_some()
            && self.ema_30.is_some()
            && self.volatility.is_some()
            && self.momentum.is_some()
            && self.volume_sma.is_some()
    }
}

/// A single OHLCV market observation, timestamped in unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketObservation {
    pub timestamp: i64,
    pub price: f64,
    pub volume: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
    #[serde(default)]
    pub indicators: IndicatorSet,
}

impl MarketObservation {
    /// Structural validity: positive timestamp, positive finite prices,
    /// non-negative finite volume, low not above high.
    pub fn is_structurally_valid(&self) -> bool {
        if self.timestamp <= 0 {
            return false;
        }
        for p in [self.price, self.high, self.low, self.open, self.close] {
            if !p.is_finite() || p <= 0.0 {
                return false;
            }
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return false;
        }
        self.low <= self.high
    }
}

/// Fixed 11-dimensional feature record derived from an observation window.
/// Ephemeral: built per prediction/training call, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
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

impl FeatureVector {
    pub fn to_array(&self) -> [f64; FEATURE_DIM] {
        [
            self.price,
            self.sma_7,
            self.sma_14,
            self.sma_30,
            self.ema_10,
            self.ema_30,
            self.volatility,
            self.momentum,
            self.volume,
            self.price_change,
            self.volume_change,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Forecast direction relative to the last known price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A price forecast with its composite confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub price: f64,
    /// Composite confidence in [0, 1].
    pub confidence: f64,
    pub direction: Direction,
    pub timestamp: i64,
}

/// Discrete trading action selected by the decision agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub const ALL: [TradeAction; 3] = [TradeAction::Buy, TradeAction::Sell, TradeAction::Hold];

    pub fn index(&self) -> usize {
        match self {
            TradeAction::Buy => 0,
            TradeAction::Sell => 1,
            TradeAction::Hold => 2,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// Action plus confidence in [0, 100], derived purely from the current
/// feature vector and portfolio exposure ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradingDecision {
    pub action: TradeAction,
    pub confidence: f64,
}

/// Where a collected series actually came from. Degraded-mode data is
/// tagged, never silently substituted for live data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Live,
    Cached,
    Synthetic,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataOrigin::Live => write!(f, "live"),
            DataOrigin::Cached => write!(f, "cached"),
            DataOrigin::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// A collected observation series tagged with its origin and the source
/// that produced it (`"synthetic"` when every upstream failed).
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedSeries {
    pub origin: DataOrigin,
    pub source_id: String,
    pub observations: Vec<MarketObservation>,
}
