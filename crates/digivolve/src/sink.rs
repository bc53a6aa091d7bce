use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::EvolutionRecord;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SinkError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SinkError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Accumulates records for a run and saves the whole set on demand.
#[derive(Debug)]
pub struct CheckpointSink {
    path: PathBuf,
    records: Vec<EvolutionRecord>,
}

impl CheckpointSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = EvolutionRecord>) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[EvolutionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites the output file with every record collected so far.
    pub fn checkpoint(&self) -> Result<(), SinkError> {
        write_records(&self.path, &self.records)?;
        log::debug!(
            "Checkpointed {} record(s) to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Writes `records` as pretty JSON, replacing `path` in one rename so readers
/// never see a half written file.
pub fn write_records(path: &Path, records: &[EvolutionRecord]) -> Result<(), SinkError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| SinkError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(records)?;
    let tmp = temp_path(path);
    fs::write(&tmp, json).map_err(|e| SinkError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| SinkError::io(path, e))?;
    Ok(())
}

pub fn read_records(path: &Path) -> Result<Vec<EvolutionRecord>, SinkError> {
    let json = fs::read_to_string(path).map_err(|e| SinkError::io(path, e))?;
    Ok(serde_json::from_str(&json)?)
}
