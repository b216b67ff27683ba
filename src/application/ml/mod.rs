pub mod agent;
pub mod confidence;
pub mod predictor;
pub mod training_log;

pub use agent::DecisionAgent;
pub use predictor::PricePredictor;
