use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::types::{Entity, Stage};

const NAME_COLUMNS: [&str; 2] = ["name", "name_en"];
const STAGE_COLUMN: &str = "stage";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed input: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
}

/// Loads entities from a CSV file, keeping file order.
pub fn load_entities(path: impl AsRef<Path>) -> Result<Vec<Entity>, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    log::debug!("Loading entities from {}", path.display());
    read_entities(file)
}

pub fn read_entities<R: Read>(reader: R) -> Result<Vec<Entity>, LoadError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = reader.headers()?.clone();
    let name_idx = NAME_COLUMNS
        .iter()
        .find_map(|col| headers.iter().position(|h| h == *col))
        .ok_or_else(|| LoadError::MissingColumn(NAME_COLUMNS.join(" or ")))?;
    let stage_idx = headers.iter().position(|h| h == STAGE_COLUMN);

    let mut entities = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let name = record.get(name_idx).unwrap_or_default();
        if name.is_empty() {
            log::warn!("Skipping row {} with an empty name", line + 2);
            continue;
        }
        let stage = stage_idx
            .and_then(|idx| record.get(idx))
            .and_then(Stage::parse);
        entities.push(Entity::new(name, stage));
    }

    Ok(entities)
}
