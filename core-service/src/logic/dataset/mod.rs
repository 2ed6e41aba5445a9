//! Dataset Module - Labeled training examples
//!
//! Versioned feature vectors plus the observed outcome, stored as JSONL with
//! automatic rotation. Records written under another feature layout are
//! skipped on read.

pub mod record;
pub mod writer;


use std::path::{Path, PathBuf};

pub use record::{DatasetRecord, DropoutLabel, TrainingExample};
pub use writer::{read_examples, DatasetLoad, DatasetWriter};

/// Dataset directory under a data root
pub fn dataset_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("dataset")
}
