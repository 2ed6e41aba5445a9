//! Per-student work units and the batch accumulator
//!
//! A unit is idempotent: it reads, predicts and appends one row. Running it
//! twice adds a second identical-probability prediction and no tier change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::alerts::{AlertGateway, TierChangeEvent};
use crate::logic::explain::ExplainResult;
use crate::logic::features::{aggregate_at, HistoryError, StudentSnapshot};
use crate::logic::model::{PredictError, Predictor, RiskAssessment, RiskTier};
use crate::logic::predictions::{PredictionStore, StoreError};
use crate::logic::sources::{EventStore, EventStoreError};

// ============================================================================
// CONTEXT & ERRORS
// ============================================================================

/// Shared, read-mostly collaborators of every unit
pub struct UnitContext {
    pub events: Arc<dyn EventStore>,
    pub predictor: Arc<Predictor>,
    pub predictions: Arc<dyn PredictionStore>,
    pub alerts: Arc<dyn AlertGateway>,
}

#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error(transparent)]
    Source(#[from] EventStoreError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Predict(#[from] PredictError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("dataset write failed: {0}")]
    Dataset(#[from] std::io::Error),
    #[error("skipped: batch aborted")]
    Skipped,
}

impl UnitError {
    /// Failures that abort the whole batch
    pub fn is_global(&self) -> bool {
        matches!(self, UnitError::Source(e) if e.is_global())
    }
}

// ============================================================================
// WORK UNIT
// ============================================================================

#[derive(Debug, Clone)]
pub struct StudentWorkUnit {
    pub student_id: String,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutcome {
    pub tier: RiskTier,
    pub probability: f64,
    pub tier_change: Option<TierChangeEvent>,
}

/// Read-only view of one student: nothing is persisted or published
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAssessment {
    pub snapshot: StudentSnapshot,
    pub assessment: RiskAssessment,
    pub factors: Option<ExplainResult>,
}

impl StudentWorkUnit {
    pub fn new(student_id: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self { student_id: student_id.into(), as_of }
    }

    /// fetch → validate → aggregate
    pub fn snapshot(&self, ctx: &UnitContext) -> Result<StudentSnapshot, UnitError> {
        let history = ctx.events.history(&self.student_id)?;
        history.validate(self.as_of)?;

        let mut snapshot = aggregate_at(&history, self.as_of);
        // Records are keyed by the id the unit was dispatched for
        snapshot.student_id = self.student_id.clone();
        Ok(snapshot)
    }

    /// Score and explain without touching the prediction store
    pub fn assess(&self, ctx: &UnitContext) -> Result<StudentAssessment, UnitError> {
        let snapshot = self.snapshot(ctx)?;
        let assessment = ctx.predictor.assess(&snapshot)?;
        let factors = match &assessment {
            RiskAssessment::Scored(prediction) => prediction.explain(Some(&snapshot)),
            RiskAssessment::Unavailable { .. } => None,
        };
        Ok(StudentAssessment { snapshot, assessment, factors })
    }

    /// fetch → validate → aggregate → predict → persist → alert
    pub fn run(&self, ctx: &UnitContext) -> Result<UnitOutcome, UnitError> {
        let snapshot = self.snapshot(ctx)?;

        let prediction = ctx.predictor.predict(&snapshot)?;
        let previous_tier = ctx
            .predictions
            .latest(&self.student_id)?
            .map(|p| p.tier)
            .unwrap_or_default();

        ctx.predictions.append(&prediction)?;

        let tier_change = (previous_tier != prediction.tier).then(|| TierChangeEvent {
            student_id: self.student_id.clone(),
            previous_tier,
            new_tier: prediction.tier,
            probability: prediction.probability,
            timestamp: prediction.created_at,
        });

        if let Some(event) = &tier_change {
            // Prediction is already stored; a lost alert is logged, not retried
            if let Err(e) = ctx.alerts.publish(event) {
                log::error!("Alert for {} not delivered: {}", self.student_id, e);
            }
        }

        Ok(UnitOutcome {
            tier: prediction.tier,
            probability: prediction.probability,
            tier_change,
        })
    }
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub student_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub students: usize,
    pub persisted: usize,
    pub tier_changes: usize,
    pub failures: Vec<UnitFailure>,
    /// No active model; nothing was scored
    pub model_unavailable: bool,
}

impl RefreshReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Collects unit results in completion order
#[derive(Debug)]
pub struct BatchAccumulator {
    started_at: DateTime<Utc>,
    students: usize,
    persisted: usize,
    tier_changes: usize,
    failures: Vec<UnitFailure>,
    abort: Option<EventStoreError>,
}

impl BatchAccumulator {
    pub fn new(students: usize) -> Self {
        Self {
            started_at: Utc::now(),
            students,
            persisted: 0,
            tier_changes: 0,
            failures: Vec::new(),
            abort: None,
        }
    }

    pub fn record(&mut self, student_id: &str, result: Result<UnitOutcome, UnitError>) {
        match result {
            Ok(outcome) => {
                self.persisted += 1;
                if outcome.tier_change.is_some() {
                    self.tier_changes += 1;
                }
            }
            Err(UnitError::Skipped) => {}
            Err(UnitError::Source(e)) if e.is_global() => {
                log::error!("Event store failed while processing {}: {}", student_id, e);
                self.abort.get_or_insert(e);
            }
            Err(e) => {
                log::warn!("Refresh failed for {}: {}", student_id, e);
                self.record_failure(student_id, e.to_string());
            }
        }
    }

    pub fn record_failure(&mut self, student_id: &str, reason: String) {
        self.failures.push(UnitFailure {
            student_id: student_id.to_string(),
            reason,
        });
    }

    pub fn aborted(&self) -> Option<&EventStoreError> {
        self.abort.as_ref()
    }

    pub fn finish(self) -> Result<RefreshReport, EventStoreError> {
        if let Some(e) = self.abort {
            return Err(e);
        }
        Ok(RefreshReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            students: self.students,
            persisted: self.persisted,
            tier_changes: self.tier_changes,
            failures: self.failures,
            model_unavailable: false,
        })
    }
}
