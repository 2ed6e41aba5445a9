//! Model Module - Classifiers & Inference
//!
//! Tách logic inference khỏi training.
//! - `tree`, `forest`, `boosting` - the two candidate ensembles
//! - `scaler` - feature standardization stored with each model
//! - `classifier` - shared trait and the serializable `TrainedModel`
//! - `tier` - probability → risk tier
//! - `inference` - the `Predictor`

pub mod tree;
pub mod forest;
pub mod boosting;
pub mod scaler;
pub mod classifier;
pub mod tier;
pub mod inference;

// Re-export common types
pub use classifier::{Algorithm, Classifier, FitError, ModelConfig, TrainedModel};
pub use scaler::StandardScaler;
pub use tier::RiskTier;
pub use inference::{ActiveModelSource, PredictError, Prediction, Predictor, PredictorStatus, RiskAssessment};
