//! Retrain job - train, evaluate, submit to the registry
//!
//! Never returns an error: every way a run can end is a `RetrainReport`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::registry::{EvaluationMetrics, ModelRegistry, PromotionResult};
use crate::logic::sources::LabelSource;
use crate::logic::training::{Trainer, TrainingError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetrainReport {
    Promoted {
        artifact_id: Uuid,
        version: String,
        metrics: EvaluationMetrics,
        replaced: Option<Uuid>,
    },
    Rejected {
        artifact_id: Uuid,
        version: String,
        accuracy: f64,
        threshold: f64,
    },
    InsufficientData {
        examples: usize,
        classes: usize,
        minimum: usize,
    },
    TimedOut {
        after_ms: u64,
    },
    Failed {
        reason: String,
    },
}

impl RetrainReport {
    pub fn is_promoted(&self) -> bool {
        matches!(self, RetrainReport::Promoted { .. })
    }
}

pub async fn run_retrain(
    labels: Arc<dyn LabelSource>,
    trainer: Trainer,
    registry: Arc<ModelRegistry>,
    timeout: Duration,
) -> RetrainReport {
    let examples = match tokio::task::spawn_blocking(move || labels.labeled_examples()).await {
        Ok(Ok(examples)) => examples,
        Ok(Err(e)) => return failed(format!("label source: {}", e)),
        Err(e) => return failed(format!("label loader panicked: {}", e)),
    };

    log::info!("Retraining on {} labeled examples (timeout {:?})", examples.len(), timeout);

    let cancel = Arc::new(AtomicBool::new(false));
    let worker_cancel = Arc::clone(&cancel);
    let training = tokio::task::spawn_blocking(move || trainer.train_with_cancel(&examples, &worker_cancel));

    let outcome = match tokio::time::timeout(timeout, training).await {
        Err(_) => {
            // The blocking task stops at its next cancel check; its result is dropped
            cancel.store(true, Ordering::SeqCst);
            log::warn!("Training exceeded {:?}, cancelled", timeout);
            return RetrainReport::TimedOut { after_ms: timeout.as_millis() as u64 };
        }
        Ok(Err(e)) => return failed(format!("trainer panicked: {}", e)),
        Ok(Ok(Err(TrainingError::InsufficientData { examples, classes, minimum }))) => {
            log::warn!("Retrain skipped: {} examples, {} classes (minimum {})", examples, classes, minimum);
            return RetrainReport::InsufficientData { examples, classes, minimum };
        }
        Ok(Ok(Err(e))) => return failed(e.to_string()),
        Ok(Ok(Ok(outcome))) => outcome,
    };

    let metrics = outcome.metrics;
    let submitted = tokio::task::spawn_blocking(move || registry.submit(outcome.candidate)).await;

    match submitted {
        Ok(Ok(PromotionResult::Promoted { artifact_id, version, replaced })) => RetrainReport::Promoted {
            artifact_id,
            version,
            metrics,
            replaced,
        },
        Ok(Ok(PromotionResult::Rejected { artifact_id, version, accuracy, threshold })) => RetrainReport::Rejected {
            artifact_id,
            version,
            accuracy,
            threshold,
        },
        Ok(Err(e)) => failed(format!("registry: {}", e)),
        Err(e) => failed(format!("registry task panicked: {}", e)),
    }
}

fn failed(reason: String) -> RetrainReport {
    log::error!("Retrain failed: {}", reason);
    RetrainReport::Failed { reason }
}
