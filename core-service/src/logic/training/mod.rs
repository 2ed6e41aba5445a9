//! Training Module - Model Trainer
//!
//! Stratified 80/20 split, scaler fitted on the training split only, two
//! candidate ensembles scored by stratified k-fold CV, winner refitted and
//! evaluated on the held-out split.
//!
//! Không quyết định promotion ở đây; the registry owns that policy.

pub mod split;
pub mod metrics;
pub mod cross_validation;
pub mod trainer;


pub use cross_validation::CandidateScore;
pub use trainer::{Trainer, TrainerConfig, TrainingError, TrainingOutcome};
