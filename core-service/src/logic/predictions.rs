//! Prediction Store - append-only prediction history
//!
//! Lưu lịch sử dự đoán; không bao giờ sửa hay xoá.
//! The latest row per student is that student's current tier.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::model::{Prediction, RiskTier};

// ============================================================================
// ERRORS & TYPES
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

/// Students per current tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl RiskSummary {
    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }

    fn add(&mut self, tier: RiskTier, n: usize) {
        match tier {
            RiskTier::Low => self.low += n,
            RiskTier::Medium => self.medium += n,
            RiskTier::High => self.high += n,
        }
    }
}

pub trait PredictionStore: Send + Sync {
    fn append(&self, prediction: &Prediction) -> Result<(), StoreError>;

    /// Most recent prediction for the student
    fn latest(&self, student_id: &str) -> Result<Option<Prediction>, StoreError>;

    /// All predictions for the student, oldest first
    fn history(&self, student_id: &str) -> Result<Vec<Prediction>, StoreError>;

    fn risk_summary(&self) -> Result<RiskSummary, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}

// ============================================================================
// SQLITE
// ============================================================================

pub fn default_predictions_path(data_dir: &Path) -> PathBuf {
    data_dir.join("predictions.db")
}

const PREDICTION_COLUMNS: &str =
    "id, student_id, artifact_id, model_version, probability, tier, confidence, explanation, created_at";

pub struct SqlitePredictionStore {
    conn: Mutex<Connection>,
}

impl SqlitePredictionStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS predictions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                student_id TEXT NOT NULL,
                artifact_id TEXT NOT NULL,
                model_version TEXT NOT NULL,
                probability REAL NOT NULL,
                tier TEXT NOT NULL,
                confidence REAL NOT NULL,
                explanation TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_predictions_student
                ON predictions(student_id, seq DESC);
            ",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn parse_row(row: &Row<'_>) -> rusqlite::Result<RawPrediction> {
        Ok(RawPrediction {
            id: row.get(0)?,
            student_id: row.get(1)?,
            artifact_id: row.get(2)?,
            model_version: row.get(3)?,
            probability: row.get(4)?,
            tier: row.get(5)?,
            confidence: row.get(6)?,
            explanation: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl PredictionStore for SqlitePredictionStore {
    fn append(&self, prediction: &Prediction) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            &format!("INSERT INTO predictions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)", PREDICTION_COLUMNS),
            params![
                prediction.id.to_string(),
                prediction.student_id,
                prediction.artifact_id.to_string(),
                prediction.model_version,
                prediction.probability,
                prediction.tier.as_str(),
                prediction.confidence,
                serde_json::to_string(&prediction.explanation)?,
                prediction.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn latest(&self, student_id: &str) -> Result<Option<Prediction>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM predictions WHERE student_id = ?1 ORDER BY seq DESC LIMIT 1",
            PREDICTION_COLUMNS
        );
        let raw = conn.query_row(&sql, params![student_id], Self::parse_row).optional()?;
        raw.map(RawPrediction::into_prediction).transpose()
    }

    fn history(&self, student_id: &str) -> Result<Vec<Prediction>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM predictions WHERE student_id = ?1 ORDER BY seq ASC",
            PREDICTION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![student_id], Self::parse_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawPrediction::into_prediction).collect()
    }

    fn risk_summary(&self) -> Result<RiskSummary, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r"
            SELECT p.tier, COUNT(*) FROM predictions p
            WHERE p.seq = (SELECT MAX(seq) FROM predictions WHERE student_id = p.student_id)
            GROUP BY p.tier
            ",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut summary = RiskSummary::default();
        for (tier, n) in rows {
            let tier = RiskTier::parse(&tier).ok_or_else(|| StoreError::Storage(format!("unknown tier {}", tier)))?;
            summary.add(tier, n as usize);
        }
        Ok(summary)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

struct RawPrediction {
    id: String,
    student_id: String,
    artifact_id: String,
    model_version: String,
    probability: f64,
    tier: String,
    confidence: f64,
    explanation: String,
    created_at: String,
}

impl RawPrediction {
    fn into_prediction(self) -> Result<Prediction, StoreError> {
        let bad = |reason: String| StoreError::Storage(format!("prediction row {}: {}", self.id, reason));

        Ok(Prediction {
            id: Uuid::parse_str(&self.id).map_err(|e| bad(e.to_string()))?,
            artifact_id: Uuid::parse_str(&self.artifact_id).map_err(|e| bad(e.to_string()))?,
            tier: RiskTier::parse(&self.tier).ok_or_else(|| bad(format!("unknown tier {}", self.tier)))?,
            explanation: serde_json::from_str(&self.explanation)?,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| bad(e.to_string()))?,
            student_id: self.student_id,
            model_version: self.model_version,
            probability: self.probability,
            confidence: self.confidence,
        })
    }
}
