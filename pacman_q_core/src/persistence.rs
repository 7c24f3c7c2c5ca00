//! Serialization of the learned Q-table and the episode score history.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    q_table::{ActionValues, QTable},
    state::State,
};

/// Represents errors that can occur while saving or loading learning state.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize learning state: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("Failed to deserialize learning state: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Unsupported learning state version: {found}. Expected {expected}")]
    Version { found: u32, expected: u32 },
}

/// On-disk form of the learning state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SavedLearning {
    version: u32,
    rows: Vec<(State, ActionValues)>,
    history: Vec<f64>,
}

impl SavedLearning {
    const VERSION: u32 = 1;
}

/// Encodes the table's rows and the score history as one MessagePack blob.
pub fn serialize(table: &QTable, history: &[f64]) -> Result<Vec<u8>, PersistenceError> {
    let saved = SavedLearning {
        version: SavedLearning::VERSION,
        rows: table
            .rows()
            .map(|(state, values)| (state.clone(), *values))
            .collect(),
        history: history.to_vec(),
    };
    Ok(rmp_serde::to_vec_named(&saved)?)
}

/// Decodes a blob written by [`serialize`].
///
/// Hyper-parameters are not part of the blob; the returned table uses the
/// ones given here.
pub fn deserialize(
    bytes: &[u8],
    learning_rate: f64,
    discount_factor: f64,
) -> Result<(QTable, Vec<f64>), PersistenceError> {
    let saved: SavedLearning = rmp_serde::from_slice(bytes)?;
    if saved.version != SavedLearning::VERSION {
        return Err(PersistenceError::Version {
            found: saved.version,
            expected: SavedLearning::VERSION,
        });
    }
    let mut table = QTable::new(learning_rate, discount_factor);
    table.replace_rows(saved.rows);
    Ok((table, saved.history))
}

/// Writes the learning state to `path`, going through a sibling temp file.
pub fn save_to_file<P: AsRef<Path>>(
    path: P,
    table: &QTable,
    history: &[f64],
) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    let bytes = serialize(table, history)?;
    let staging = path.with_extension("partial");
    fs::write(&staging, bytes).map_err(|source| PersistenceError::Io {
        path: staging.clone(),
        source,
    })?;
    fs::rename(&staging, path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), states = table.len(), episodes = history.len(), "learning state saved");
    Ok(())
}

/// Reads the learning state from `path`.
///
/// A missing file is not an error: it yields `Ok(None)`.
pub fn load_from_file<P: AsRef<Path>>(
    path: P,
    learning_rate: f64,
    discount_factor: f64,
) -> Result<Option<(QTable, Vec<f64>)>, PersistenceError> {
    let path = path.as_ref();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no saved learning state, starting fresh");
            return Ok(None);
        }
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let (table, history) = deserialize(&bytes, learning_rate, discount_factor)?;
    info!(path = %path.display(), states = table.len(), episodes = history.len(), "learning state loaded");
    Ok(Some((table, history)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, map::Tile};

    fn sample_table() -> QTable {
        let mut table = QTable::new(0.2, 0.95);
        let a = State {
            vision: vec![Tile::Wall, Tile::Empty, Tile::OutOfBounds],
            pellet_distances: Some([1, 2, 3, 4]),
            ghost_distances: Some([0, 0, 7, 0]),
        };
        let b = State {
            vision: vec![Tile::PowerPellet],
            pellet_distances: None,
            ghost_distances: None,
        };
        table.update(&a, Action::Down, 1000.0, &b);
        table.update(&b, Action::Left, -0.1 / 3.0, &a);
        table
    }

    #[test]
    fn test_blob_roundtrip_is_exact() {
        let table = sample_table();
        let history = vec![12.5, -20_000.0, 1.0 / 3.0];
        let bytes = serialize(&table, &history).unwrap();
        let (loaded, loaded_history) = deserialize(&bytes, 0.2, 0.95).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded_history, history);
    }

    #[test]
    fn test_wrong_version_rejected() {
        let saved = SavedLearning {
            version: 99,
            rows: vec![],
            history: vec![],
        };
        let bytes = rmp_serde::to_vec_named(&saved).unwrap();
        assert!(matches!(
            deserialize(&bytes, 0.2, 0.95),
            Err(PersistenceError::Version {
                found: 99,
                expected: 1
            })
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            deserialize(b"not a blob", 0.2, 0.95),
            Err(PersistenceError::Decode(_))
        ));
    }
}
