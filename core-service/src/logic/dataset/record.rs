use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::features::{FeatureVector, StudentFeatures, StudentSnapshot};

/// Observed outcome for a student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropoutLabel {
    Retained,
    DroppedOut,
}

impl DropoutLabel {
    /// 0.0 / 1.0 target used by the classifiers
    pub fn as_target(&self) -> f64 {
        match self {
            DropoutLabel::Retained => 0.0,
            DropoutLabel::DroppedOut => 1.0,
        }
    }

    pub fn class_index(&self) -> usize {
        match self {
            DropoutLabel::Retained => 0,
            DropoutLabel::DroppedOut => 1,
        }
    }
}

impl FromStr for DropoutLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retained" => Ok(DropoutLabel::Retained),
            "dropped_out" | "dropped-out" => Ok(DropoutLabel::DroppedOut),
            other => Err(format!("unknown label {:?} (expected retained or dropped_out)", other)),
        }
    }
}

impl From<bool> for DropoutLabel {
    fn from(dropped_out: bool) -> Self {
        if dropped_out {
            DropoutLabel::DroppedOut
        } else {
            DropoutLabel::Retained
        }
    }
}

/// A labeled snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub snapshot: StudentSnapshot,
    pub label: DropoutLabel,
}

impl TrainingExample {
    pub fn new(snapshot: StudentSnapshot, label: DropoutLabel) -> Self {
        Self { snapshot, label }
    }

    pub fn features(&self) -> &StudentFeatures {
        &self.snapshot.features
    }
}

/// On-disk form of a `TrainingExample` (one JSONL line)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatasetRecord {
    pub student_id: String,
    pub taken_at: DateTime<Utc>,

    // Feature contract
    pub feature_version: u8,
    pub layout_hash: u32,
    pub features: Vec<f64>,

    pub label: DropoutLabel,
}

impl From<&TrainingExample> for DatasetRecord {
    fn from(example: &TrainingExample) -> Self {
        let vector = example.snapshot.features.to_vector();
        Self {
            student_id: example.snapshot.student_id.clone(),
            taken_at: example.snapshot.taken_at,
            feature_version: vector.version,
            layout_hash: vector.layout_hash,
            features: vector.values,
            label: example.label,
        }
    }
}

impl DatasetRecord {
    /// `None` when the record was written under another feature layout
    pub fn to_example(&self) -> Option<TrainingExample> {
        let vector = FeatureVector {
            version: self.feature_version,
            layout_hash: self.layout_hash,
            values: self.features.clone(),
        };
        let features = vector.to_features()?;
        Some(TrainingExample {
            snapshot: StudentSnapshot {
                student_id: self.student_id.clone(),
                taken_at: self.taken_at,
                features,
            },
            label: self.label,
        })
    }
}
