//! SQLite artifact storage
//!
//! Model and scaler blobs live in the same row. A partial unique index on
//! `active` keeps at most one active artifact at the database level.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::logic::features::layout::FEATURE_VERSION;
use crate::logic::model::Algorithm;
use super::types::{ArtifactCandidate, ArtifactSummary, EvaluationMetrics, ModelArtifact};
use super::validate::{compute_checksum, RegistryError};

/// Registry database under a data root
pub fn default_registry_path(data_dir: &Path) -> PathBuf {
    data_dir.join("registry.db")
}

const ARTIFACT_COLUMNS: &str = "id, version, algorithm, metrics, feature_version, layout_hash, \
     model_blob, scaler_blob, checksum, active, created_at";

pub struct ArtifactStore {
    conn: Mutex<Connection>,
}

impl ArtifactStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, RegistryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, RegistryError> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS artifacts (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                version TEXT NOT NULL,
                algorithm TEXT NOT NULL,
                metrics TEXT NOT NULL,
                feature_version INTEGER NOT NULL,
                layout_hash INTEGER NOT NULL,
                model_blob BLOB NOT NULL,
                scaler_blob BLOB NOT NULL,
                checksum TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_artifacts_single_active
                ON artifacts(active) WHERE active = 1;
            ",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Store a candidate as a new inactive artifact with the next version
    pub fn insert_candidate(&self, candidate: &ArtifactCandidate) -> Result<ModelArtifact, RegistryError> {
        let model_blob = candidate.model.to_bytes()?;
        let scaler_blob = candidate.scaler.to_bytes()?;
        let id = Uuid::new_v4();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let earlier: i64 = tx.query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))?;
        let artifact = ModelArtifact {
            id,
            version: format!("{}.{}.0", FEATURE_VERSION, earlier),
            algorithm: candidate.algorithm,
            metrics: candidate.metrics,
            feature_version: candidate.feature_version,
            layout_hash: candidate.layout_hash,
            checksum: compute_checksum(&id, &model_blob, &scaler_blob),
            model_blob,
            scaler_blob,
            active: false,
            created_at: Utc::now(),
        };

        tx.execute(
            &format!("INSERT INTO artifacts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)", ARTIFACT_COLUMNS),
            params![
                artifact.id.to_string(),
                artifact.version,
                artifact.algorithm.as_str(),
                serde_json::to_string(&artifact.metrics)?,
                i64::from(artifact.feature_version),
                i64::from(artifact.layout_hash),
                artifact.model_blob,
                artifact.scaler_blob,
                artifact.checksum,
                artifact.active,
                artifact.created_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        log::debug!("Stored artifact {} ({})", artifact.id, artifact.version);
        Ok(artifact)
    }

    /// Make `id` the only active artifact. Returns the previously active id.
    pub fn activate(&self, id: Uuid) -> Result<Option<Uuid>, RegistryError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let exists: i64 = tx.query_row("SELECT COUNT(*) FROM artifacts WHERE id = ?1", params![id.to_string()], |row| row.get(0))?;
        if exists == 0 {
            return Err(RegistryError::NotFound(id));
        }

        let previous: Option<String> = tx
            .query_row("SELECT id FROM artifacts WHERE active = 1", [], |row| row.get(0))
            .optional()?;

        tx.execute("UPDATE artifacts SET active = 0 WHERE active = 1", [])?;
        tx.execute("UPDATE artifacts SET active = 1 WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;

        Ok(previous.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    pub fn get(&self, id: Uuid) -> Result<Option<ModelArtifact>, RegistryError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM artifacts WHERE id = ?1", ARTIFACT_COLUMNS);
        let raw = conn.query_row(&sql, params![id.to_string()], RawArtifact::from_row).optional()?;
        raw.map(RawArtifact::into_artifact).transpose()
    }

    pub fn active(&self) -> Result<Option<ModelArtifact>, RegistryError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM artifacts WHERE active = 1", ARTIFACT_COLUMNS);
        let raw = conn.query_row(&sql, [], RawArtifact::from_row).optional()?;
        raw.map(RawArtifact::into_artifact).transpose()
    }

    /// All artifacts, oldest first
    pub fn list(&self) -> Result<Vec<ArtifactSummary>, RegistryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM artifacts ORDER BY seq ASC", ARTIFACT_COLUMNS))?;
        let rows = stmt
            .query_map([], RawArtifact::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|raw| raw.into_artifact().map(|a| ArtifactSummary::from(&a)))
            .collect()
    }

    pub fn count_active(&self) -> Result<usize, RegistryError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM artifacts WHERE active = 1", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    #[cfg(test)]
    pub(crate) fn corrupt_model_blob(&self, id: Uuid) -> Result<(), RegistryError> {
        let conn = self.conn.lock();
        conn.execute("UPDATE artifacts SET model_blob = X'00' WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }
}

/// Column values before parsing
struct RawArtifact {
    id: String,
    version: String,
    algorithm: String,
    metrics: String,
    feature_version: i64,
    layout_hash: i64,
    model_blob: Vec<u8>,
    scaler_blob: Vec<u8>,
    checksum: String,
    active: bool,
    created_at: String,
}

impl RawArtifact {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version: row.get(1)?,
            algorithm: row.get(2)?,
            metrics: row.get(3)?,
            feature_version: row.get(4)?,
            layout_hash: row.get(5)?,
            model_blob: row.get(6)?,
            scaler_blob: row.get(7)?,
            checksum: row.get(8)?,
            active: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_artifact(self) -> Result<ModelArtifact, RegistryError> {
        let bad = |reason: String| RegistryError::Storage(format!("artifact row {}: {}", self.id, reason));

        let id = Uuid::parse_str(&self.id).map_err(|e| bad(e.to_string()))?;
        let algorithm = Algorithm::parse(&self.algorithm).ok_or_else(|| bad(format!("unknown algorithm {}", self.algorithm)))?;
        let metrics: EvaluationMetrics = serde_json::from_str(&self.metrics)?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| bad(e.to_string()))?;
        let feature_version = u8::try_from(self.feature_version).map_err(|e| bad(e.to_string()))?;
        let layout_hash = u32::try_from(self.layout_hash).map_err(|e| bad(e.to_string()))?;

        Ok(ModelArtifact {
            id,
            version: self.version,
            algorithm,
            metrics,
            feature_version,
            layout_hash,
            model_blob: self.model_blob,
            scaler_blob: self.scaler_blob,
            checksum: self.checksum,
            active: self.active,
            created_at,
        })
    }
}
