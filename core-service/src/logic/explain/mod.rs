//! Explain Module - Risk factor ranking
//!
//! Turns model feature importances into named, ranked risk factors.

pub mod engine;
pub mod types;

pub use engine::{explain, importance_map, top_factors, DEFAULT_TOP_FACTORS};
pub use types::{ExplainResult, FeatureContribution};
