//! Apply records persisted as a JSON file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::{ApplyRecord, LoadResult, StateError, StateStore};

/// Layout version of the state file; other versions load as corrupted.
const STATE_FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    /// Seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<u64>,
    records: Vec<ApplyRecord>,
}

/// Keeps the records `teardown` needs in a single JSON file.
///
/// Saves go through a sibling `<file>.tmp` that is renamed over the state
/// file, so a crash mid-save leaves the previous records readable.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn write_atomically(path: &Path, file: &StateFile) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(file).map_err(StateError::Serialize)?;
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(StateError::Write)?;
            }
            _ => {}
        }
        let staging = Self::staging_path(path);
        std::fs::write(&staging, json).map_err(StateError::Write)?;
        std::fs::rename(&staging, path).map_err(StateError::Write)
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> LoadResult {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return LoadResult::NotFound,
            Err(e) => {
                return LoadResult::Corrupted {
                    reason: format!("Failed to read file: {e}"),
                };
            }
        };

        match serde_json::from_str::<StateFile>(&json) {
            Ok(file) if file.version == STATE_FILE_VERSION => LoadResult::Loaded(file.records),
            Ok(file) => LoadResult::Corrupted {
                reason: format!(
                    "Incompatible version: expected {STATE_FILE_VERSION}, got {}",
                    file.version
                ),
            },
            Err(e) => LoadResult::Corrupted {
                reason: format!("Invalid JSON: {e}"),
            },
        }
    }

    async fn save(&self, records: &[ApplyRecord]) -> Result<(), StateError> {
        let path = self.path.clone();
        let file = StateFile {
            version: STATE_FILE_VERSION,
            saved_at: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .ok()
                .map(|elapsed| elapsed.as_secs()),
            records: records.to_vec(),
        };

        tokio::task::spawn_blocking(move || Self::write_atomically(&path, &file))
            .await
            .map_err(StateError::Task)?
    }
}
