//! Scheduler Module - periodic refresh and retrain jobs
//!
//! Lên lịch chấm điểm lại và huấn luyện lại.
//!
//! # Architecture
//! - `worker.rs`: one student's fetch → aggregate → predict → persist → alert
//! - `refresh.rs`: bounded fan-out of work units over the blocking pool
//! - `retrain.rs`: train under a timeout, submit to the registry
//!
//! Each job loop awaits its own run before the next tick, so a job never
//! overlaps itself. Refresh and retrain may overlap each other; promotion
//! swaps the active pair atomically.

pub mod worker;
pub mod refresh;
pub mod retrain;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::logic::alerts::AlertGateway;
use crate::logic::config::EngineConfig;
use crate::logic::dataset::{DatasetWriter, DropoutLabel, TrainingExample};
use crate::logic::model::{ActiveModelSource, Predictor};
use crate::logic::predictions::PredictionStore;
use crate::logic::registry::{ModelRegistry, RegistryError};
use crate::logic::sources::{EventStore, EventStoreError, LabelSource};
use crate::logic::training::Trainer;

pub use refresh::run_refresh;
pub use retrain::{run_retrain, RetrainReport};
pub use worker::{
    BatchAccumulator, RefreshReport, StudentAssessment, StudentWorkUnit, UnitContext, UnitError, UnitFailure,
    UnitOutcome,
};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("task failed: {0}")]
    Join(String),
}

impl From<JoinError> for SchedulerError {
    fn from(err: JoinError) -> Self {
        SchedulerError::Join(err.to_string())
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

pub struct Scheduler {
    config: EngineConfig,
    units: Arc<UnitContext>,
    labels: Arc<dyn LabelSource>,
    registry: Arc<ModelRegistry>,
    trainer: Trainer,
}

impl Scheduler {
    pub fn new(
        config: EngineConfig,
        events: Arc<dyn EventStore>,
        labels: Arc<dyn LabelSource>,
        registry: Arc<ModelRegistry>,
        predictions: Arc<dyn PredictionStore>,
        alerts: Arc<dyn AlertGateway>,
    ) -> Self {
        let source: Arc<dyn ActiveModelSource> = registry.clone();
        let units = Arc::new(UnitContext {
            events,
            predictor: Arc::new(Predictor::new(source)),
            predictions,
            alerts,
        });
        Self {
            trainer: Trainer::new(config.trainer_config()),
            config,
            units,
            labels,
            registry,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn predictor(&self) -> Arc<Predictor> {
        Arc::clone(&self.units.predictor)
    }

    pub fn registry(&self) -> Arc<ModelRegistry> {
        Arc::clone(&self.registry)
    }

    /// One refresh pass now
    pub async fn run_refresh(&self) -> Result<RefreshReport, SchedulerError> {
        let registry = Arc::clone(&self.registry);
        match tokio::task::spawn_blocking(move || registry.refresh_active()).await? {
            Ok(true) => log::info!("Active model changed since last refresh"),
            Ok(false) => {}
            Err(e @ (RegistryError::ArtifactCorrupted { .. } | RegistryError::LayoutMismatch { .. })) => {
                log::warn!("Active artifact unusable: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
        run_refresh(Arc::clone(&self.units), self.config.max_workers, Utc::now()).await
    }

    /// Current snapshot and risk of one student, without persisting it
    pub fn assess_student(&self, student_id: &str) -> Result<StudentAssessment, UnitError> {
        StudentWorkUnit::new(student_id, Utc::now()).assess(&self.units)
    }

    /// Record an observed outcome for a student's current snapshot
    pub fn record_label(
        &self,
        writer: &DatasetWriter,
        student_id: &str,
        label: DropoutLabel,
    ) -> Result<TrainingExample, UnitError> {
        let snapshot = StudentWorkUnit::new(student_id, Utc::now()).snapshot(&self.units)?;
        let example = TrainingExample::new(snapshot, label);
        writer.append(&example)?;
        log::info!("Labeled {} as {:?}", student_id, label);
        Ok(example)
    }

    /// One retrain run now
    pub async fn run_retrain(&self) -> RetrainReport {
        run_retrain(
            Arc::clone(&self.labels),
            self.trainer.clone(),
            Arc::clone(&self.registry),
            self.config.training_timeout,
        )
        .await
    }

    /// Spawn both job loops. Refresh runs immediately; retrain runs
    /// immediately only when there is no active model.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);

        let refresh_first = Instant::now();
        let retrain_first = if self.registry.active_model().is_none() {
            Instant::now()
        } else {
            Instant::now() + self.config.retrain_interval
        };

        log::info!(
            "Scheduler started: refresh every {:?}, retrain every {:?}, {} workers",
            self.config.refresh_interval, self.config.retrain_interval, self.config.max_workers
        );

        let tasks = vec![
            tokio::spawn(refresh_loop(Arc::clone(&self), refresh_first, rx.clone())),
            tokio::spawn(retrain_loop(self, retrain_first, rx)),
        ];
        SchedulerHandle { shutdown, tasks }
    }
}

async fn refresh_loop(scheduler: Arc<Scheduler>, first: Instant, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval_at(first, scheduler.config.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = scheduler.run_refresh().await {
                    log::error!("Refresh batch failed: {}", e);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    log::info!("Refresh loop stopped");
}

async fn retrain_loop(scheduler: Arc<Scheduler>, first: Instant, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval_at(first, scheduler.config.retrain_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = scheduler.run_retrain().await;
                log::info!("Retrain finished: {:?}", report);
            }
            _ = shutdown.changed() => break,
        }
    }
    log::info!("Retrain loop stopped");
}

/// Running job loops
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop both loops after any in-flight job finishes
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                log::error!("Scheduler task ended abnormally: {}", e);
            }
        }
    }
}
