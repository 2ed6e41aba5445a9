//! Data Sources - event store and training labels
//!
//! The engine only reads student records. `EventStore` and `LabelSource`
//! are the seams; JSONL files and in-memory maps are the bundled adapters.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::logic::dataset::{read_examples, TrainingExample};
use crate::logic::features::StudentHistory;

// ============================================================================
// ERRORS & TRAITS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventStoreError {
    /// The store as a whole cannot be read; aborts a batch
    #[error("event store unreachable: {0}")]
    Unreachable(String),

    #[error("student {0} not found")]
    NotFound(String),

    /// One student's records cannot be decoded
    #[error("corrupt records for {student_id}: {reason}")]
    Corrupt { student_id: String, reason: String },
}

impl EventStoreError {
    /// Whether the failure concerns the whole store rather than one student
    pub fn is_global(&self) -> bool {
        matches!(self, EventStoreError::Unreachable(_))
    }
}

pub trait EventStore: Send + Sync {
    fn student_ids(&self) -> Result<Vec<String>, EventStoreError>;

    fn history(&self, student_id: &str) -> Result<StudentHistory, EventStoreError>;
}

pub trait LabelSource: Send + Sync {
    fn labeled_examples(&self) -> Result<Vec<TrainingExample>, EventStoreError>;
}

// ============================================================================
// JSONL ADAPTERS
// ============================================================================

/// Id reported for a line whose `student_id` cannot be read
pub fn unreadable_line_id(line_no: usize) -> String {
    format!("line {}", line_no)
}

/// One `StudentHistory` JSON object per line.
///
/// `student_ids` reads and indexes the whole file once; `history` is served
/// from that index. A repeated id keeps its last line. A line without a
/// readable id is listed as `line N` and fails as `Corrupt`.
pub struct JsonlEventStore {
    path: PathBuf,
    index: RwLock<Option<BTreeMap<String, Result<StudentHistory, String>>>>,
}

impl JsonlEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file. Returns ids in first-seen order.
    fn reindex(&self) -> Result<Vec<String>, EventStoreError> {
        let file = File::open(&self.path)
            .map_err(|e| EventStoreError::Unreachable(format!("{}: {}", self.path.display(), e)))?;

        let mut order = Vec::new();
        let mut index = BTreeMap::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| EventStoreError::Unreachable(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let (id, parsed) = match line_student_id(&line) {
                Some(id) => {
                    let parsed = serde_json::from_str::<StudentHistory>(&line).map_err(|e| e.to_string());
                    (id, parsed)
                }
                None => {
                    let id = unreadable_line_id(n + 1);
                    log::warn!("{}:{} has no readable student_id", self.path.display(), n + 1);
                    (id, Err("no readable student_id".to_string()))
                }
            };
            if index.insert(id.clone(), parsed).is_some() {
                log::warn!("{}: duplicate student {}, keeping line {}", self.path.display(), id, n + 1);
            } else {
                order.push(id);
            }
        }

        *self.index.write() = Some(index);
        Ok(order)
    }
}

/// `student_id` of a line, even when the rest of it does not parse
fn line_student_id(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value.get("student_id")?.as_str().map(str::to_string)
}

impl EventStore for JsonlEventStore {
    fn student_ids(&self) -> Result<Vec<String>, EventStoreError> {
        self.reindex()
    }

    fn history(&self, student_id: &str) -> Result<StudentHistory, EventStoreError> {
        if self.index.read().is_none() {
            self.reindex()?;
        }
        let guard = self.index.read();
        let entry = guard
            .as_ref()
            .and_then(|index| index.get(student_id))
            .ok_or_else(|| EventStoreError::NotFound(student_id.to_string()))?;

        entry.clone().map_err(|reason| EventStoreError::Corrupt {
            student_id: student_id.to_string(),
            reason,
        })
    }
}

/// Labeled examples from a dataset directory
pub struct DatasetLabelSource {
    dir: PathBuf,
}

impl DatasetLabelSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LabelSource for DatasetLabelSource {
    fn labeled_examples(&self) -> Result<Vec<TrainingExample>, EventStoreError> {
        read_examples(&self.dir)
            .map(|load| load.examples)
            .map_err(|e| EventStoreError::Unreachable(format!("{}: {}", self.dir.display(), e)))
    }
}

// ============================================================================
// IN-MEMORY ADAPTERS
// ============================================================================

#[derive(Default)]
pub struct InMemoryEventStore {
    histories: RwLock<BTreeMap<String, StudentHistory>>,
    unreachable: AtomicBool,
}

impl InMemoryEventStore {
    pub fn new(histories: impl IntoIterator<Item = StudentHistory>) -> Self {
        let store = Self::default();
        for h in histories {
            store.insert(h);
        }
        store
    }

    pub fn insert(&self, history: StudentHistory) {
        self.histories.write().insert(history.student_id.clone(), history);
    }

    /// Simulate an outage
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), EventStoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(EventStoreError::Unreachable("in-memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl EventStore for InMemoryEventStore {
    fn student_ids(&self) -> Result<Vec<String>, EventStoreError> {
        self.check_reachable()?;
        Ok(self.histories.read().keys().cloned().collect())
    }

    fn history(&self, student_id: &str) -> Result<StudentHistory, EventStoreError> {
        self.check_reachable()?;
        self.histories
            .read()
            .get(student_id)
            .cloned()
            .ok_or_else(|| EventStoreError::NotFound(student_id.to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryLabelSource {
    examples: RwLock<Vec<TrainingExample>>,
}

impl InMemoryLabelSource {
    pub fn new(examples: Vec<TrainingExample>) -> Self {
        Self { examples: RwLock::new(examples) }
    }

    pub fn replace(&self, examples: Vec<TrainingExample>) {
        *self.examples.write() = examples;
    }
}

impl LabelSource for InMemoryLabelSource {
    fn labeled_examples(&self) -> Result<Vec<TrainingExample>, EventStoreError> {
        Ok(self.examples.read().clone())
    }
}
