use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;

use crate::logic::dataset::record::{DatasetRecord, TrainingExample};

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

pub struct DatasetWriter {
    file: Mutex<Option<File>>,
    base_dir: PathBuf,
}

impl DatasetWriter {
    pub fn from_path(base_dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            file: Mutex::new(None),
            base_dir,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Append one labeled example. Rotates to a new file past `MAX_FILE_SIZE`.
    pub fn append(&self, example: &TrainingExample) -> io::Result<()> {
        let mut file_guard = self.file.lock();

        if file_guard.is_none() {
            let reopened = match latest_file(&self.base_dir)? {
                Some(path) => {
                    let f = OpenOptions::new().create(true).append(true).open(&path)?;
                    if f.metadata()?.len() < MAX_FILE_SIZE { Some(f) } else { None }
                }
                None => None,
            };
            *file_guard = Some(match reopened {
                Some(f) => f,
                None => self.create_new_file()?,
            });
        }

        let should_rotate = match file_guard.as_ref() {
            Some(f) => f.metadata()?.len() >= MAX_FILE_SIZE,
            None => false,
        };
        if should_rotate {
            *file_guard = Some(self.create_new_file()?);
        }

        if let Some(file) = file_guard.as_mut() {
            let json = serde_json::to_string(&DatasetRecord::from(example))?;
            writeln!(file, "{}", json)?;
        }

        Ok(())
    }

    fn create_new_file(&self) -> io::Result<File> {
        let now = Utc::now();
        // timestamp format: YYYY-MM-DD-HHMMSS-micros, sorts chronologically
        let filename = format!("dataset-{}.jsonl", now.format("%Y-%m-%d-%H%M%S-%6f"));
        OpenOptions::new().create(true).append(true).open(self.base_dir.join(filename))
    }
}

/// Result of reading a dataset directory
#[derive(Debug, Default)]
pub struct DatasetLoad {
    pub examples: Vec<TrainingExample>,
    /// Lines that failed to parse or carry another feature layout
    pub skipped: usize,
}

/// Read every `.jsonl` file under `dir`, oldest first
pub fn read_examples(dir: &Path) -> io::Result<DatasetLoad> {
    let mut load = DatasetLoad::default();
    if !dir.exists() {
        return Ok(load);
    }

    for path in jsonl_files(dir)? {
        let reader = BufReader::new(File::open(&path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DatasetRecord>(&line).ok().and_then(|r| r.to_example()) {
                Some(example) => load.examples.push(example),
                None => load.skipped += 1,
            }
        }
    }

    if load.skipped > 0 {
        log::warn!("Skipped {} unusable dataset lines in {}", load.skipped, dir.display());
    }
    Ok(load)
}

fn jsonl_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "jsonl"))
        .collect::<Vec<_>>();
    // Sort by filename (timestamp ensures order)
    entries.sort();
    Ok(entries)
}

fn latest_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    Ok(jsonl_files(dir)?.pop())
}
