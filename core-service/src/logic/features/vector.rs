//! Feature Vector - Core data structure for ML input
//!
//! `StudentFeatures` is the fixed-schema record shared by the aggregator, the
//! trainer and the predictor. Field order matches `FEATURE_LAYOUT`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::layout::{
    layout_hash, validate_layout, LayoutMismatchError, FEATURE_COUNT, FEATURE_VERSION,
};

// ============================================================================
// DEFAULTS
// ============================================================================

/// Age used when the date of birth is unknown
pub const DEFAULT_AGE: f64 = 18.0;

/// Neutral parent education code (0-5 scale)
pub const DEFAULT_PARENT_EDUCATION_LEVEL: f64 = 2.0;

/// Neutral family income bracket code
pub const DEFAULT_FAMILY_INCOME_BRACKET: f64 = 2.0;

// ============================================================================
// STUDENT FEATURES
// ============================================================================

/// One student's numeric features, in layout order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StudentFeatures {
    pub attendance_percentage: f64,
    pub gpa: f64,
    pub consecutive_absences: f64,
    pub failing_subjects: f64,
    pub late_submissions: f64,
    pub fee_overdue_days: f64,
    pub age: f64,
    pub parent_education_level: f64,
    pub family_income_bracket: f64,
}

impl StudentFeatures {
    /// Values in `FEATURE_LAYOUT` order
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.attendance_percentage,
            self.gpa,
            self.consecutive_absences,
            self.failing_subjects,
            self.late_submissions,
            self.fee_overdue_days,
            self.age,
            self.parent_education_level,
            self.family_income_bracket,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        let [attendance_percentage, gpa, consecutive_absences, failing_subjects, late_submissions, fee_overdue_days, age, parent_education_level, family_income_bracket] =
            values;
        Self {
            attendance_percentage,
            gpa,
            consecutive_absences,
            failing_subjects,
            late_submissions,
            fee_overdue_days,
            age,
            parent_education_level,
            family_income_bracket,
        }
    }

    /// Get feature by name
    pub fn get_by_name(&self, name: &str) -> Option<f64> {
        super::layout::feature_index(name).map(|i| self.to_array()[i])
    }

    /// Versioned wire form
    pub fn to_vector(&self) -> FeatureVector {
        FeatureVector::from_values(self.to_array().to_vec())
    }
}

impl Default for StudentFeatures {
    /// Documented defaults for a student with no recorded history
    fn default() -> Self {
        Self {
            attendance_percentage: 0.0,
            gpa: 0.0,
            consecutive_absences: 0.0,
            failing_subjects: 0.0,
            late_submissions: 0.0,
            fee_overdue_days: 0.0,
            age: DEFAULT_AGE,
            parent_education_level: DEFAULT_PARENT_EDUCATION_LEVEL,
            family_income_bracket: DEFAULT_FAMILY_INCOME_BRACKET,
        }
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Features for one student at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub student_id: String,
    pub taken_at: DateTime<Utc>,
    pub features: StudentFeatures,
}

impl StudentSnapshot {
    pub fn new(student_id: impl Into<String>, features: StudentFeatures) -> Self {
        Self {
            student_id: student_id.into(),
            taken_at: Utc::now(),
            features,
        }
    }
}

// ============================================================================
// VERSIONED FEATURE VECTOR
// ============================================================================

/// Versioned Feature Vector with layout metadata
///
/// Used wherever features leave the process. Length is not fixed by the
/// type; a vector from another schema fails `validate` or `to_features`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Feature layout version
    pub version: u8,
    /// CRC32 hash of the feature layout (for mismatch detection)
    pub layout_hash: u32,
    /// Feature values in order defined by FEATURE_LAYOUT
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Create from raw values with current version
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            values,
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Validate that this vector is compatible with current layout
    pub fn validate(&self) -> Result<(), LayoutMismatchError> {
        validate_layout(self.version, self.layout_hash)
    }

    /// Convert back into the fixed record, if the layout and length match
    pub fn to_features(&self) -> Option<StudentFeatures> {
        if self.validate().is_err() {
            return None;
        }
        let values: [f64; FEATURE_COUNT] = self.values.as_slice().try_into().ok()?;
        Some(StudentFeatures::from_array(values))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::layout::FEATURE_LAYOUT;

    #[test]
    fn test_defaults_are_documented_values() {
        let f = StudentFeatures::default();
        assert_eq!(f.age, 18.0);
        assert_eq!(f.parent_education_level, 2.0);
        assert_eq!(f.family_income_bracket, 2.0);
        assert_eq!(f.attendance_percentage, 0.0);
        assert_eq!(f.fee_overdue_days, 0.0);
    }

    #[test]
    fn test_array_order_matches_layout() {
        let f = StudentFeatures {
            attendance_percentage: 1.0,
            gpa: 2.0,
            consecutive_absences: 3.0,
            failing_subjects: 4.0,
            late_submissions: 5.0,
            fee_overdue_days: 6.0,
            age: 7.0,
            parent_education_level: 8.0,
            family_income_bracket: 9.0,
        };
        for (i, name) in FEATURE_LAYOUT.iter().enumerate() {
            assert_eq!(f.get_by_name(name), Some((i + 1) as f64));
        }
        assert_eq!(StudentFeatures::from_array(f.to_array()), f);
    }

    #[test]
    fn test_vector_round_trip() {
        let f = StudentFeatures { gpa: 3.1, ..Default::default() };
        let v = f.to_vector();
        assert!(v.validate().is_ok());
        assert_eq!(v.to_features(), Some(f));
    }

    #[test]
    fn test_short_vector_is_not_padded() {
        let v = FeatureVector::from_values(vec![1.0; FEATURE_COUNT - 1]);
        assert_eq!(v.to_features(), None);
    }
}
