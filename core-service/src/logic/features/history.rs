//! Student History - raw records as read from the event store
//!
//! Missing data is normal (a new student has no assessments yet) and is
//! handled by the aggregator's defaults. Malformed data is not: it is
//! rejected here so the scheduler can count it as a per-student failure.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Highest valid demographic code
pub const MAX_DEMOGRAPHIC_CODE: u8 = 5;

// ============================================================================
// RAW RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub subject: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub subject: String,
    pub max_marks: f64,
    pub obtained_marks: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub submitted_late: bool,
}

impl AssessmentRecord {
    pub fn percentage(&self) -> f64 {
        if self.max_marks > 0.0 {
            self.obtained_marks / self.max_marks * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRecord {
    pub due_date: NaiveDate,
    pub total_amount: f64,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default)]
    pub paid_on: Option<NaiveDate>,
}

impl FeeRecord {
    pub fn outstanding(&self) -> f64 {
        (self.total_amount - self.paid_amount).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisciplinaryRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
}

/// Everything the event store knows about one student
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentHistory {
    pub student_id: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    pub assessments: Vec<AssessmentRecord>,
    #[serde(default)]
    pub fees: Vec<FeeRecord>,
    #[serde(default)]
    pub disciplinary: Vec<DisciplinaryRecord>,
    #[serde(default)]
    pub parent_education_level: Option<u8>,
    #[serde(default)]
    pub family_income_bracket: Option<u8>,
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistoryError {
    #[error("Malformed history for student {student_id}: {reason}")]
    Malformed { student_id: String, reason: String },
}

impl StudentHistory {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            ..Default::default()
        }
    }

    /// Reject records that cannot be aggregated meaningfully
    pub fn validate(&self, as_of: DateTime<Utc>) -> Result<(), HistoryError> {
        let malformed = |reason: String| HistoryError::Malformed {
            student_id: self.student_id.clone(),
            reason,
        };

        if let Some(dob) = self.date_of_birth {
            if dob > as_of.date_naive() {
                return Err(malformed(format!("date of birth {} is in the future", dob)));
            }
        }

        for a in &self.assessments {
            if !a.max_marks.is_finite() || a.max_marks <= 0.0 {
                return Err(malformed(format!(
                    "assessment '{}' on {} has max_marks {}",
                    a.subject, a.date, a.max_marks
                )));
            }
            if !a.obtained_marks.is_finite() || a.obtained_marks < 0.0 || a.obtained_marks > a.max_marks {
                return Err(malformed(format!(
                    "assessment '{}' on {} has obtained_marks {} outside 0..={}",
                    a.subject, a.date, a.obtained_marks, a.max_marks
                )));
            }
        }

        for fee in &self.fees {
            if !fee.total_amount.is_finite() || fee.total_amount < 0.0 {
                return Err(malformed(format!("fee due {} has total {}", fee.due_date, fee.total_amount)));
            }
            if !fee.paid_amount.is_finite() || fee.paid_amount < 0.0 || fee.paid_amount > fee.total_amount {
                return Err(malformed(format!(
                    "fee due {} has paid {} of {}",
                    fee.due_date, fee.paid_amount, fee.total_amount
                )));
            }
        }

        for (name, code) in [
            ("parent_education_level", self.parent_education_level),
            ("family_income_bracket", self.family_income_bracket),
        ] {
            if let Some(c) = code {
                if c > MAX_DEMOGRAPHIC_CODE {
                    return Err(malformed(format!("{} code {} above {}", name, c, MAX_DEMOGRAPHIC_CODE)));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_history_is_valid() {
        assert!(StudentHistory::new("S1").validate(Utc::now()).is_ok());
    }

    #[test]
    fn test_rejects_marks_above_maximum() {
        let mut h = StudentHistory::new("S1");
        h.assessments.push(AssessmentRecord {
            subject: "Math".into(),
            max_marks: 50.0,
            obtained_marks: 70.0,
            date: date(2024, 3, 1),
            submitted_late: false,
        });

        let err = h.validate(Utc::now()).unwrap_err();
        assert!(matches!(err, HistoryError::Malformed { ref student_id, .. } if student_id == "S1"));
    }

    #[test]
    fn test_rejects_zero_max_marks() {
        let mut h = StudentHistory::new("S1");
        h.assessments.push(AssessmentRecord {
            subject: "Art".into(),
            max_marks: 0.0,
            obtained_marks: 0.0,
            date: date(2024, 3, 1),
            submitted_late: false,
        });
        assert!(h.validate(Utc::now()).is_err());
    }

    #[test]
    fn test_rejects_overpaid_fee_and_bad_codes() {
        let mut h = StudentHistory::new("S2");
        h.fees.push(FeeRecord {
            due_date: date(2024, 1, 10),
            total_amount: 100.0,
            paid_amount: 150.0,
            paid_on: None,
        });
        assert!(h.validate(Utc::now()).is_err());

        let mut h = StudentHistory::new("S3");
        h.family_income_bracket = Some(9);
        assert!(h.validate(Utc::now()).is_err());
    }

    #[test]
    fn test_deserializes_with_missing_sections() {
        let h: StudentHistory = serde_json::from_str(r#"{"student_id":"S9"}"#).unwrap();
        assert_eq!(h, StudentHistory::new("S9"));
    }
}
