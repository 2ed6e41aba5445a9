//! Features Module - Snapshot Extraction Engine
//!
//! Tách logic trích xuất features khỏi event store.
//! - `layout` - the authoritative feature schema (names, version, hash)
//! - `vector` - `StudentFeatures`, `StudentSnapshot`, versioned `FeatureVector`
//! - `history` - raw event-store records and their validation
//! - `aggregator` - history → snapshot

pub mod layout;
pub mod vector;
pub mod history;
pub mod aggregator;


// Re-export common types
pub use layout::{feature_name, layout_hash, FEATURE_COUNT, FEATURE_LAYOUT, FEATURE_VERSION};
pub use vector::{FeatureVector, StudentFeatures, StudentSnapshot};
pub use history::{HistoryError, StudentHistory};
pub use aggregator::{aggregate, aggregate_at};
