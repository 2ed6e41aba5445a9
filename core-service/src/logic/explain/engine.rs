use std::collections::BTreeMap;

use super::types::{ExplainResult, FeatureContribution};
use crate::logic::features::{feature_name, StudentFeatures};

/// Risk factors shown by default
pub const DEFAULT_TOP_FACTORS: usize = 5;

/// Model importances keyed by feature name. Extra trailing values are ignored.
pub fn importance_map(importances: &[f64]) -> BTreeMap<String, f64> {
    importances
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| feature_name(i).map(|name| (name.to_string(), v)))
        .collect()
}

/// The `n` most important features, descending. Ties stay in name order.
pub fn top_factors(explanation: &BTreeMap<String, f64>, n: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = explanation.iter().map(|(k, &v)| (k.clone(), v)).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(n);
    ranked
}

/// Ranked factors with the student's values attached. Features with zero
/// importance are left out.
pub fn explain(explanation: &BTreeMap<String, f64>, features: Option<&StudentFeatures>) -> Option<ExplainResult> {
    let contributions: Vec<FeatureContribution> = top_factors(explanation, DEFAULT_TOP_FACTORS)
        .into_iter()
        .filter(|(_, importance)| *importance > 0.0)
        .map(|(name, importance)| FeatureContribution {
            value: features.and_then(|f| f.get_by_name(&name)),
            description: get_description(&name),
            name,
            importance,
        })
        .collect();

    if contributions.is_empty() {
        return None;
    }

    Some(ExplainResult { contributions })
}

fn get_description(name: &str) -> Option<String> {
    match name {
        "attendance_percentage" => Some("Low attendance rate".to_string()),
        "gpa" => Some("Weak academic performance".to_string()),
        "consecutive_absences" => Some("Recent run of absences".to_string()),
        "failing_subjects" => Some("Failing several subjects".to_string()),
        "late_submissions" => Some("Frequent late submissions".to_string()),
        "fee_overdue_days" => Some("Fees overdue".to_string()),
        _ => None,
    }
}
