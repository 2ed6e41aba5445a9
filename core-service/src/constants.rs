//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Environment overrides are read in `logic::config`.

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name (also the data directory name)
pub const APP_NAME: &str = "dropout-risk";

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "RISK_";

/// Refresh job period (seconds): daily
pub const DEFAULT_REFRESH_INTERVAL: u64 = 24 * 60 * 60;

/// Retrain job period (seconds): weekly
pub const DEFAULT_RETRAIN_INTERVAL: u64 = 7 * 24 * 60 * 60;

/// Upper bound for one training run (seconds)
pub const DEFAULT_TRAINING_TIMEOUT: u64 = 30 * 60;

/// Concurrent per-student work units
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Minimum held-out accuracy for promotion
pub const DEFAULT_PROMOTION_THRESHOLD: f64 = 0.75;

/// Smallest training set the trainer accepts
pub const DEFAULT_MIN_EXAMPLES: usize = 20;

/// Trees per ensemble
pub const DEFAULT_N_ESTIMATORS: usize = 100;

/// Split / fold / ensemble seed
pub const DEFAULT_SEED: u64 = 42;

/// Student histories file name under the data directory
pub const STUDENTS_FILE: &str = "students.jsonl";
