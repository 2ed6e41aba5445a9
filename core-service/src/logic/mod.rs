//! Logic Module - Business Logic & Engines
//!
//! Chứa các engines: aggregator, trainer, registry, predictor, scheduler.
//!
//! ## Architecture
//! - `features/` - student history → fixed snapshot
//! - `model/` - classifiers, scaler, risk tiers, predictor
//! - `training/` - split, cross-validation, candidate selection
//! - `registry/` - versioned artifacts and atomic promotion
//! - `scheduler/` - periodic refresh and retrain jobs

pub mod config;

// Data
pub mod features;
pub mod dataset;
pub mod sources;
pub mod predictions;
pub mod alerts;

// Models
pub mod model;
pub mod explain;
pub mod training;
pub mod registry;

// Jobs
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testutil;
