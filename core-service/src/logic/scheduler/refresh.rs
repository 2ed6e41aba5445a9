//! Refresh job - score every student once

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use super::worker::{BatchAccumulator, RefreshReport, StudentWorkUnit, UnitContext, UnitError, UnitOutcome};
use super::SchedulerError;

/// Run one refresh pass over every student in the event store.
///
/// Units run on the blocking pool, at most `max_workers` at a time. A unit
/// failure is recorded and the batch continues; an unreachable event store
/// stops dispatch and fails the whole batch.
pub async fn run_refresh(
    ctx: Arc<UnitContext>,
    max_workers: usize,
    as_of: DateTime<Utc>,
) -> Result<RefreshReport, SchedulerError> {
    if !ctx.predictor.is_ready() {
        log::warn!("Refresh skipped: no active model");
        let now = Utc::now();
        return Ok(RefreshReport {
            started_at: now,
            finished_at: now,
            students: 0,
            persisted: 0,
            tier_changes: 0,
            failures: Vec::new(),
            model_unavailable: true,
        });
    }

    let events = Arc::clone(&ctx.events);
    let student_ids = tokio::task::spawn_blocking(move || events.student_ids()).await??;

    log::info!("Refreshing {} students with {} workers", student_ids.len(), max_workers);

    let mut acc = BatchAccumulator::new(student_ids.len());
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let abort = Arc::new(AtomicBool::new(false));
    let mut tasks = JoinSet::new();

    for student_id in student_ids {
        if abort.load(Ordering::SeqCst) {
            break;
        }
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| SchedulerError::Join(e.to_string()))?;

        let ctx = Arc::clone(&ctx);
        let abort = Arc::clone(&abort);
        let unit = StudentWorkUnit::new(student_id, as_of);

        tasks.spawn_blocking(move || {
            let _permit = permit;
            if abort.load(Ordering::SeqCst) {
                return (unit.student_id, Err(UnitError::Skipped));
            }
            let result = unit.run(&ctx);
            if matches!(&result, Err(e) if e.is_global()) {
                abort.store(true, Ordering::SeqCst);
            }
            (unit.student_id, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        record_joined(&mut acc, joined);
    }

    let report = acc.finish()?;
    log::info!(
        "Refresh done: {} of {} persisted, {} failed, {} tier changes",
        report.persisted, report.students, report.failed(), report.tier_changes
    );
    Ok(report)
}

fn record_joined(
    acc: &mut BatchAccumulator,
    joined: Result<(String, Result<UnitOutcome, UnitError>), JoinError>,
) {
    match joined {
        Ok((student_id, result)) => acc.record(&student_id, result),
        Err(e) => {
            log::error!("Refresh worker panicked: {}", e);
            acc.record_failure("<unknown>", format!("worker panicked: {}", e));
        }
    }
}
