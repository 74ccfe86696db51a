use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::classifier::ModelSnapshot;
use crate::config::ClassifierConfig;

/// Snapshot layout version written by this build.
pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("No snapshot at {0:?}")]
    NotFound(PathBuf),
    #[error("Corrupt snapshot: {0}")]
    CorruptState(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Tokenizer and scoring settings the counts were produced with.
///
/// Counts are only meaningful under the tokenizer that produced them, so the
/// settings travel with the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub smoothing: f64,
    pub min_token_length: usize,
    pub stop_words: BTreeSet<String>,
}

impl From<&ClassifierConfig> for ModelSettings {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            smoothing: config.smoothing,
            min_token_length: config.min_token_length,
            stop_words: config.stop_words.iter().map(|w| w.to_lowercase()).collect(),
        }
    }
}

impl From<ModelSettings> for ClassifierConfig {
    fn from(settings: ModelSettings) -> Self {
        Self {
            smoothing: settings.smoothing,
            min_token_length: settings.min_token_length,
            stop_words: settings.stop_words.into_iter().collect(),
        }
    }
}

/// A verified snapshot as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredModel {
    pub settings: ModelSettings,
    pub model: ModelSnapshot,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    checksum: String,
    settings: ModelSettings,
    model: ModelSnapshot,
}

#[derive(Serialize)]
struct Checksummed<'a> {
    settings: &'a ModelSettings,
    model: &'a ModelSnapshot,
}

fn checksum(settings: &ModelSettings, model: &ModelSnapshot) -> Result<String, SnapshotError> {
    let bytes = serde_json::to_vec(&Checksummed { settings, model })
        .map_err(|e| SnapshotError::CorruptState(format!("Failed to encode model: {}", e)))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Reads and writes the model snapshot file.
///
/// The file is JSON carrying a format version, the [`ModelSettings`], the
/// model counts and a SHA-256 of the canonically encoded settings and counts. Writes go to a temporary file in the
/// same directory which is then renamed over the target, so a crash leaves
/// either the old snapshot or the new one.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, model: &ModelSnapshot, settings: &ModelSettings) -> Result<(), SnapshotError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            checksum: checksum(settings, model)?,
            settings: settings.clone(),
            model: model.clone(),
        };
        let bytes = serde_json::to_vec(&file)
            .map_err(|e| SnapshotError::CorruptState(format!("Failed to encode snapshot: {}", e)))?;

        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(&bytes)?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(&self.path).map_err(|e| e.error)?;

        log::debug!(
            "Wrote snapshot to {:?} ({} bytes, {} classes)",
            self.path,
            bytes.len(),
            model.classes.len()
        );
        Ok(())
    }

    /// Loads and verifies the snapshot.
    ///
    /// # Errors
    /// - `NotFound` when no snapshot has been written yet
    /// - `CorruptState` when the file cannot be decoded, has an unknown
    ///   version, fails its checksum, or breaks the model invariants
    /// - `Io` for any other read failure
    pub fn load(&self) -> Result<StoredModel, SnapshotError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let file: SnapshotFile = serde_json::from_slice(&bytes)
            .map_err(|e| SnapshotError::CorruptState(format!("Failed to decode {:?}: {}", self.path, e)))?;

        if file.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::CorruptState(format!(
                "Unsupported snapshot version {} (expected {})",
                file.version, SNAPSHOT_VERSION
            )));
        }

        let actual = checksum(&file.settings, &file.model)?;
        if actual != file.checksum {
            return Err(SnapshotError::CorruptState(format!(
                "Checksum mismatch: expected {}, got {}",
                file.checksum, actual
            )));
        }

        file.model.validate().map_err(SnapshotError::CorruptState)?;
        Ok(StoredModel {
            settings: file.settings,
            model: file.model,
        })
    }
}
