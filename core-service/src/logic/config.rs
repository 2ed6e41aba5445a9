//! Engine configuration
//!
//! Defaults from `constants`, overridden by `RISK_*` environment variables
//! (a `.env` file is loaded by the binary first).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::logic::dataset::dataset_dir;
use crate::logic::model::ModelConfig;
use crate::logic::predictions::default_predictions_path;
use crate::logic::registry::storage::default_registry_path;
use crate::logic::training::TrainerConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub refresh_interval: Duration,
    pub retrain_interval: Duration,
    pub training_timeout: Duration,
    pub max_workers: usize,
    pub promotion_threshold: f64,
    pub min_examples: usize,
    pub n_estimators: usize,
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL),
            retrain_interval: Duration::from_secs(DEFAULT_RETRAIN_INTERVAL),
            training_timeout: Duration::from_secs(DEFAULT_TRAINING_TIMEOUT),
            max_workers: DEFAULT_MAX_WORKERS,
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
            min_examples: DEFAULT_MIN_EXAMPLES,
            n_estimators: DEFAULT_N_ESTIMATORS,
            seed: DEFAULT_SEED,
        }
    }
}

/// `<local data dir>/dropout-risk`, or `./dropout-risk` when unknown
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unparsable values fall back to defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let defaults = Self::default();
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        // Non-finite, overflowing and sub-nanosecond values are all rejected
        let secs = |name: &str, default: Duration| {
            parse_value::<f64>(name, get(name))
                .and_then(|v| Duration::try_from_secs_f64(v).ok())
                .filter(|d| !d.is_zero())
                .unwrap_or(default)
        };
        let count = |name: &str, default: usize| {
            parse_value::<usize>(name, get(name)).filter(|v| *v >= 1).unwrap_or(default)
        };

        Self {
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            refresh_interval: secs("REFRESH_INTERVAL_SECS", defaults.refresh_interval),
            retrain_interval: secs("RETRAIN_INTERVAL_SECS", defaults.retrain_interval),
            training_timeout: secs("TRAINING_TIMEOUT_SECS", defaults.training_timeout),
            max_workers: count("MAX_WORKERS", defaults.max_workers),
            promotion_threshold: parse_value::<f64>("PROMOTION_THRESHOLD", get("PROMOTION_THRESHOLD"))
                .filter(|v| (0.0..=1.0).contains(v))
                .unwrap_or(defaults.promotion_threshold),
            min_examples: count("MIN_EXAMPLES", defaults.min_examples),
            n_estimators: count("N_ESTIMATORS", defaults.n_estimators),
            seed: parse_value::<u64>("SEED", get("SEED")).unwrap_or(defaults.seed),
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            min_examples: self.min_examples,
            seed: self.seed,
            model: ModelConfig {
                n_estimators: self.n_estimators,
                seed: self.seed,
                ..ModelConfig::default()
            },
            ..TrainerConfig::default()
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        default_registry_path(&self.data_dir)
    }

    pub fn predictions_path(&self) -> PathBuf {
        default_predictions_path(&self.data_dir)
    }

    pub fn students_path(&self) -> PathBuf {
        self.data_dir.join(STUDENTS_FILE)
    }

    pub fn dataset_dir(&self) -> PathBuf {
        dataset_dir(&self.data_dir)
    }
}

fn parse_value<T: FromStr>(name: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring {}{}={:?}: not a valid value", ENV_PREFIX, name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(|_| None);
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.promotion_threshold, 0.75);
        assert_eq!(config.trainer_config().min_examples, 20);
        assert_eq!(config.trainer_config().model.n_estimators, 100);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("RISK_DATA_DIR", "/tmp/risk"),
            ("RISK_MAX_WORKERS", "3"),
            ("RISK_PROMOTION_THRESHOLD", "0.8"),
            ("RISK_TRAINING_TIMEOUT_SECS", "90"),
            ("RISK_SEED", "7"),
        ]));

        assert_eq!(config.data_dir, PathBuf::from("/tmp/risk"));
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.promotion_threshold, 0.8);
        assert_eq!(config.training_timeout, Duration::from_secs(90));
        assert_eq!(config.trainer_config().model.seed, 7);
        assert_eq!(config.registry_path(), PathBuf::from("/tmp/risk/registry.db"));
        assert_eq!(config.students_path(), PathBuf::from("/tmp/risk/students.jsonl"));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("RISK_MAX_WORKERS", "0"),
            ("RISK_PROMOTION_THRESHOLD", "1.5"),
            ("RISK_REFRESH_INTERVAL_SECS", "soon"),
        ]));
        let defaults = EngineConfig::default();
        assert_eq!(config.max_workers, defaults.max_workers);
        assert_eq!(config.promotion_threshold, defaults.promotion_threshold);
        assert_eq!(config.refresh_interval, defaults.refresh_interval);

        // Durations that cannot be represented, or round to zero
        let config = EngineConfig::from_lookup(lookup(&[
            ("RISK_REFRESH_INTERVAL_SECS", "1e20"),
            ("RISK_RETRAIN_INTERVAL_SECS", "inf"),
            ("RISK_TRAINING_TIMEOUT_SECS", "1e-12"),
            ("RISK_PROMOTION_THRESHOLD", "NaN"),
        ]));
        assert_eq!(config.refresh_interval, defaults.refresh_interval);
        assert_eq!(config.retrain_interval, defaults.retrain_interval);
        assert_eq!(config.training_timeout, defaults.training_timeout);
        assert_eq!(config.promotion_threshold, defaults.promotion_threshold);

        // Counts and seeds are integers, never truncated floats
        let config = EngineConfig::from_lookup(lookup(&[
            ("RISK_MAX_WORKERS", "2.7"),
            ("RISK_MIN_EXAMPLES", "-5"),
            ("RISK_N_ESTIMATORS", "1e3"),
            ("RISK_SEED", "-1"),
        ]));
        assert_eq!(config.max_workers, defaults.max_workers);
        assert_eq!(config.min_examples, defaults.min_examples);
        assert_eq!(config.n_estimators, defaults.n_estimators);
        assert_eq!(config.seed, defaults.seed);
    }

    #[test]
    fn test_large_seed_is_exact() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("RISK_SEED", "9007199254740993"),
            ("RISK_TRAINING_TIMEOUT_SECS", "0.5"),
        ]));
        assert_eq!(config.seed, 9_007_199_254_740_993);
        assert_eq!(config.training_timeout, Duration::from_millis(500));
    }
}
