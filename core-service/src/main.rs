//! Dropout Risk Engine - Main Entry Point
//!
//! Modes:
//! - `run` (default): periodic refresh and retrain until Ctrl-C
//! - `refresh`: one refresh pass
//! - `retrain`: one retrain pass
//! - `status`: active model, artifacts and tier counts as JSON
//! - `assess <student_id>`: current risk and top factors, nothing stored
//! - `label <student_id> <retained|dropped_out>`: append a training example

use std::sync::Arc;

use anyhow::{bail, Context};

use dropout_risk_core::constants::{APP_NAME, APP_VERSION};
use dropout_risk_core::logic::alerts::LogAlertGateway;
use dropout_risk_core::logic::dataset::{DatasetWriter, DropoutLabel};
use dropout_risk_core::logic::predictions::{PredictionStore, SqlitePredictionStore};
use dropout_risk_core::logic::sources::{DatasetLabelSource, JsonlEventStore};
use dropout_risk_core::{EngineConfig, ModelRegistry, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = args.first().cloned().unwrap_or_else(|| "run".to_string());
    let config = EngineConfig::from_env();

    log::info!("Starting {} v{} ({})", APP_NAME, APP_VERSION, mode);
    log::info!("Data directory: {}", config.data_dir.display());

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;

    let registry = Arc::new(
        ModelRegistry::open(&config.registry_path(), config.promotion_threshold)
            .context("opening model registry")?,
    );
    let predictions = Arc::new(
        SqlitePredictionStore::open(config.predictions_path()).context("opening prediction store")?,
    );

    let scheduler = Arc::new(Scheduler::new(
        config.clone(),
        Arc::new(JsonlEventStore::new(config.students_path())),
        Arc::new(DatasetLabelSource::new(config.dataset_dir())),
        Arc::clone(&registry),
        predictions.clone(),
        Arc::new(LogAlertGateway),
    ));

    match mode.as_str() {
        "run" => {
            let handle = scheduler.start();
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            log::info!("Shutting down...");
            handle.shutdown().await;
        }
        "refresh" => {
            let report = scheduler.run_refresh().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "retrain" => {
            let report = scheduler.run_retrain().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "status" => {
            let status = serde_json::json!({
                "predictor": scheduler.predictor().status(),
                "artifacts": registry.list()?,
                "risk_summary": predictions.risk_summary()?,
                "predictions": predictions.count()?,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "assess" => {
            let student_id = args.get(1).context("usage: assess <student_id>")?;
            let assessment = scheduler.assess_student(student_id)?;
            println!("{}", serde_json::to_string_pretty(&assessment)?);
        }
        "label" => {
            let (Some(student_id), Some(label)) = (args.get(1), args.get(2)) else {
                bail!("usage: label <student_id> <retained|dropped_out>");
            };
            let label: DropoutLabel = label.parse().map_err(anyhow::Error::msg)?;
            let writer = DatasetWriter::from_path(config.dataset_dir()).context("opening dataset")?;
            let example = scheduler.record_label(&writer, student_id, label)?;
            println!("{}", serde_json::to_string_pretty(&example)?);
        }
        other => bail!(
            "unknown mode {:?} (expected run, refresh, retrain, status, assess or label)",
            other
        ),
    }

    Ok(())
}
