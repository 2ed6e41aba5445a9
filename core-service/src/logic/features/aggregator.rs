//! Feature Aggregator
//!
//! Chuyển lịch sử thô của học sinh thành snapshot cố định.
//! Pure transform: no I/O, no clock reads except in `aggregate()`, and no
//! errors. Missing inputs fall back to the defaults in `vector.rs`.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use super::history::{AttendanceStatus, StudentHistory};
use super::vector::{
    StudentFeatures, StudentSnapshot, DEFAULT_AGE, DEFAULT_FAMILY_INCOME_BRACKET,
    DEFAULT_PARENT_EDUCATION_LEVEL,
};

/// Minimum mean percentage for a subject to count as passed
pub const PASS_MARK_PERCENT: f64 = 40.0;

/// Top of the GPA scale
pub const GPA_SCALE: f64 = 4.0;

/// Build a snapshot as of now
pub fn aggregate(history: &StudentHistory) -> StudentSnapshot {
    aggregate_at(history, Utc::now())
}

/// Build a snapshot as of a fixed instant (deterministic)
pub fn aggregate_at(history: &StudentHistory, as_of: DateTime<Utc>) -> StudentSnapshot {
    let today = as_of.date_naive();

    let features = StudentFeatures {
        attendance_percentage: attendance_percentage(history),
        gpa: gpa(history),
        consecutive_absences: consecutive_absences(history) as f64,
        failing_subjects: failing_subjects(history) as f64,
        late_submissions: history.assessments.iter().filter(|a| a.submitted_late).count() as f64,
        fee_overdue_days: fee_overdue_days(history, today) as f64,
        age: history
            .date_of_birth
            .and_then(|dob| age_on(dob, today))
            .map(|a| a as f64)
            .unwrap_or(DEFAULT_AGE),
        parent_education_level: history
            .parent_education_level
            .map(f64::from)
            .unwrap_or(DEFAULT_PARENT_EDUCATION_LEVEL),
        family_income_bracket: history
            .family_income_bracket
            .map(f64::from)
            .unwrap_or(DEFAULT_FAMILY_INCOME_BRACKET),
    };

    StudentSnapshot {
        student_id: history.student_id.clone(),
        taken_at: as_of,
        features,
    }
}

// ============================================================================
// DERIVATIONS
// ============================================================================

fn attendance_percentage(history: &StudentHistory) -> f64 {
    let total = history.attendance.len();
    if total == 0 {
        return 0.0;
    }
    let attended = history
        .attendance
        .iter()
        .filter(|r| matches!(r.status, AttendanceStatus::Present | AttendanceStatus::Late))
        .count();
    attended as f64 / total as f64 * 100.0
}

fn gpa(history: &StudentHistory) -> f64 {
    if history.assessments.is_empty() {
        return 0.0;
    }
    let mean = history.assessments.iter().map(|a| a.percentage()).sum::<f64>()
        / history.assessments.len() as f64;
    (mean / 100.0 * GPA_SCALE).min(GPA_SCALE)
}

/// Trailing run of school days on which every recorded session was missed
fn consecutive_absences(history: &StudentHistory) -> usize {
    // date -> all sessions absent?
    let mut days: BTreeMap<NaiveDate, bool> = BTreeMap::new();
    for r in &history.attendance {
        let absent = r.status == AttendanceStatus::Absent;
        days.entry(r.date)
            .and_modify(|all_absent| *all_absent &= absent)
            .or_insert(absent);
    }
    days.values().rev().take_while(|&&all_absent| all_absent).count()
}

fn failing_subjects(history: &StudentHistory) -> usize {
    let mut per_subject: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for a in &history.assessments {
        let entry = per_subject.entry(a.subject.as_str()).or_insert((0.0, 0));
        entry.0 += a.percentage();
        entry.1 += 1;
    }
    per_subject
        .values()
        .filter(|(sum, n)| sum / (*n as f64) < PASS_MARK_PERCENT)
        .count()
}

fn fee_overdue_days(history: &StudentHistory, today: NaiveDate) -> i64 {
    history
        .fees
        .iter()
        .filter(|f| f.outstanding() > 0.0)
        .map(|f| (today - f.due_date).num_days())
        .filter(|days| *days > 0)
        .max()
        .unwrap_or(0)
}

fn age_on(dob: NaiveDate, today: NaiveDate) -> Option<u32> {
    if dob > today {
        return None;
    }
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::history::{AssessmentRecord, AttendanceRecord, FeeRecord};
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn attendance(d: NaiveDate, subject: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord { date: d, subject: subject.into(), status }
    }

    fn assessment(subject: &str, obtained: f64, late: bool) -> AssessmentRecord {
        AssessmentRecord {
            subject: subject.into(),
            max_marks: 100.0,
            obtained_marks: obtained,
            date: date(2024, 5, 1),
            submitted_late: late,
        }
    }

    #[test]
    fn test_empty_history_uses_documented_defaults() {
        let snapshot = aggregate_at(&StudentHistory::new("S1"), as_of());

        assert_eq!(snapshot.student_id, "S1");
        assert_eq!(snapshot.taken_at, as_of());
        assert_eq!(snapshot.features, StudentFeatures::default());
        assert_eq!(snapshot.features.age, 18.0);
        assert_eq!(snapshot.features.parent_education_level, 2.0);
        assert_eq!(snapshot.features.family_income_bracket, 2.0);
    }

    #[test]
    fn test_attendance_counts_late_as_attended() {
        let mut h = StudentHistory::new("S1");
        h.attendance = vec![
            attendance(date(2024, 5, 1), "Math", AttendanceStatus::Present),
            attendance(date(2024, 5, 2), "Math", AttendanceStatus::Late),
            attendance(date(2024, 5, 3), "Math", AttendanceStatus::Absent),
            attendance(date(2024, 5, 4), "Math", AttendanceStatus::Present),
        ];
        let f = aggregate_at(&h, as_of()).features;
        assert_eq!(f.attendance_percentage, 75.0);
    }

    #[test]
    fn test_consecutive_absences_counts_trailing_full_days() {
        let mut h = StudentHistory::new("S1");
        h.attendance = vec![
            attendance(date(2024, 5, 1), "Math", AttendanceStatus::Absent),
            attendance(date(2024, 5, 2), "Math", AttendanceStatus::Present),
            attendance(date(2024, 5, 3), "Math", AttendanceStatus::Absent),
            attendance(date(2024, 5, 3), "Art", AttendanceStatus::Absent),
            attendance(date(2024, 5, 4), "Math", AttendanceStatus::Absent),
            // Records arrive unordered
            attendance(date(2024, 5, 5), "Math", AttendanceStatus::Absent),
        ];
        assert_eq!(aggregate_at(&h, as_of()).features.consecutive_absences, 3.0);

        // A partially attended day breaks the run
        h.attendance.push(attendance(date(2024, 5, 5), "Art", AttendanceStatus::Late));
        assert_eq!(aggregate_at(&h, as_of()).features.consecutive_absences, 0.0);
    }

    #[test]
    fn test_gpa_failing_subjects_and_late_submissions() {
        let mut h = StudentHistory::new("S1");
        h.assessments = vec![
            assessment("Math", 90.0, false),
            assessment("Math", 70.0, true),
            assessment("History", 30.0, true),
            assessment("History", 20.0, false),
        ];
        let f = aggregate_at(&h, as_of()).features;

        // mean 52.5% → 2.1
        assert!((f.gpa - 2.1).abs() < 1e-12);
        assert_eq!(f.failing_subjects, 1.0);
        assert_eq!(f.late_submissions, 2.0);
    }

    #[test]
    fn test_pass_mark_is_inclusive() {
        let mut h = StudentHistory::new("S1");
        h.assessments = vec![
            assessment("Math", 40.0, false),
            assessment("Art", 39.5, false),
            assessment("Art", 40.0, false),
        ];
        // Math averages exactly 40, Art 39.75
        assert_eq!(aggregate_at(&h, as_of()).features.failing_subjects, 1.0);
    }

    #[test]
    fn test_fee_overdue_days_uses_oldest_outstanding() {
        let mut h = StudentHistory::new("S1");
        h.fees = vec![
            FeeRecord { due_date: date(2024, 5, 22), total_amount: 100.0, paid_amount: 0.0, paid_on: None },
            FeeRecord { due_date: date(2024, 4, 2), total_amount: 100.0, paid_amount: 40.0, paid_on: None },
            // Paid in full: ignored even though older
            FeeRecord { due_date: date(2024, 1, 1), total_amount: 100.0, paid_amount: 100.0, paid_on: Some(date(2024, 1, 5)) },
            // Not yet due
            FeeRecord { due_date: date(2024, 7, 1), total_amount: 100.0, paid_amount: 0.0, paid_on: None },
        ];
        assert_eq!(aggregate_at(&h, as_of()).features.fee_overdue_days, 60.0);
    }

    #[test]
    fn test_age_and_codes() {
        let mut h = StudentHistory::new("S1");
        h.date_of_birth = Some(date(2008, 6, 2));
        h.parent_education_level = Some(4);
        h.family_income_bracket = Some(1);

        let f = aggregate_at(&h, as_of()).features;
        assert_eq!(f.age, 15.0); // birthday is tomorrow
        assert_eq!(f.parent_education_level, 4.0);
        assert_eq!(f.family_income_bracket, 1.0);
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let mut h = StudentHistory::new("S1");
        h.assessments = vec![assessment("Math", 55.0, false)];
        assert_eq!(aggregate_at(&h, as_of()), aggregate_at(&h, as_of()));
    }
}
