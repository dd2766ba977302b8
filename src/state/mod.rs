//! Persistence of applied objects between `apply` and `teardown` runs.
//!
//! This module provides abstractions for storing and retrieving the
//! [`ApplyRecord`]s of a scenario so objects left in place with `--keep`
//! (or stranded by an interrupted run) can be removed later.

mod file;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

pub use file::FileStateStore;

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::AppliedObject;
use crate::engine::ApplyResult;
use crate::network::PlatformKind;

/// Outcome of applying one scenario endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRecord {
    /// Endpoint name from the scenario.
    pub endpoint: String,
    /// Platform the endpoint was applied to.
    pub platform: PlatformKind,
    /// What the engine reported.
    pub result: ApplyResult,
}

impl ApplyRecord {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, platform: PlatformKind, result: ApplyResult) -> Self {
        Self {
            endpoint: endpoint.into(),
            platform,
            result,
        }
    }
}

/// Every object still recorded, in the order it was created.
#[must_use]
pub fn applied_objects(records: &[ApplyRecord]) -> Vec<AppliedObject> {
    records
        .iter()
        .flat_map(|r| r.result.applied_objects.iter().cloned())
        .collect()
}

/// Result of loading state from persistent storage.
///
/// Explicitly models all valid states to avoid ambiguity:
/// - Successfully loaded previous records
/// - No previous state exists
/// - State exists but is corrupted/unreadable
#[derive(Debug, Clone)]
pub enum LoadResult {
    /// Successfully loaded previously saved records.
    Loaded(Vec<ApplyRecord>),

    /// No state file exists.
    NotFound,

    /// State file exists but could not be parsed.
    Corrupted {
        /// Reason for corruption (for logging/debugging).
        reason: String,
    },
}

impl LoadResult {
    /// Returns the loaded records, or an empty vec for `NotFound`/`Corrupted`.
    #[must_use]
    pub fn into_records(self) -> Vec<ApplyRecord> {
        match self {
            Self::Loaded(records) => records,
            Self::NotFound | Self::Corrupted { .. } => Vec::new(),
        }
    }

    /// Returns `true` if state was successfully loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// Errors that can occur during state persistence operations.
///
/// Only covers write-side errors; read-side issues are modeled
/// as [`LoadResult`] variants.
#[derive(Debug, Error)]
pub enum StateError {
    /// Failed to write the state file.
    #[error("Failed to write state file: {0}")]
    Write(#[source] io::Error),

    /// Failed to serialize state to JSON.
    #[error("Failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The blocking write task did not complete.
    #[error("State write task failed: {0}")]
    Task(#[source] tokio::task::JoinError),
}

/// Abstraction for persisting apply records between program runs.
///
/// Implementations should:
/// - Use atomic writes so a crash never leaves a half-written file
/// - Handle missing files gracefully (return `LoadResult::NotFound`)
/// - Degrade gracefully on read errors (return `LoadResult::Corrupted`)
pub trait StateStore: Send + Sync {
    /// Loads previously saved records.
    fn load(&self) -> LoadResult;

    /// Replaces the saved records.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn save(
        &self,
        records: &[ApplyRecord],
    ) -> impl std::future::Future<Output = Result<(), StateError>> + Send;
}

/// Mock state store for testing.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::RwLock;

    /// A mock implementation of [`StateStore`] for testing.
    #[derive(Debug)]
    pub struct MockStateStore {
        load_result: LoadResult,
        saved: RwLock<Option<Vec<ApplyRecord>>>,
    }

    impl MockStateStore {
        /// Creates a mock that returns `LoadResult::Loaded` with the given records.
        #[must_use]
        pub fn with_loaded(records: Vec<ApplyRecord>) -> Self {
            Self {
                load_result: LoadResult::Loaded(records),
                saved: RwLock::new(None),
            }
        }

        /// Creates a mock that returns `LoadResult::NotFound`.
        #[must_use]
        pub fn not_found() -> Self {
            Self {
                load_result: LoadResult::NotFound,
                saved: RwLock::new(None),
            }
        }

        /// Creates a mock that returns `LoadResult::Corrupted`.
        #[must_use]
        pub fn corrupted(reason: impl Into<String>) -> Self {
            Self {
                load_result: LoadResult::Corrupted {
                    reason: reason.into(),
                },
                saved: RwLock::new(None),
            }
        }

        /// Returns the last saved records, if any.
        #[must_use]
        pub fn saved_records(&self) -> Option<Vec<ApplyRecord>> {
            self.saved.read().unwrap().clone()
        }
    }

    impl StateStore for MockStateStore {
        fn load(&self) -> LoadResult {
            self.load_result.clone()
        }

        async fn save(&self, records: &[ApplyRecord]) -> Result<(), StateError> {
            *self.saved.write().unwrap() = Some(records.to_vec());
            Ok(())
        }
    }
}
