//! Dropout Risk Engine - Core Library
//!
//! Aggregates student histories into snapshots, trains and versions
//! dropout classifiers, scores students on a schedule and raises alerts
//! when a student's risk tier changes.

pub mod constants;
pub mod logic;

pub use logic::config::EngineConfig;
pub use logic::features::{StudentFeatures, StudentHistory, StudentSnapshot};
pub use logic::model::{Prediction, Predictor, RiskAssessment, RiskTier};
pub use logic::registry::{ModelRegistry, PromotionResult};
pub use logic::scheduler::{RefreshReport, RetrainReport, Scheduler, SchedulerHandle};
