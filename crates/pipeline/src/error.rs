use std::path::PathBuf;

use dreamcanvas_core::backend::BackendError;
use dreamcanvas_core::error::CoreError;
use dreamcanvas_store::StoreError;

/// Failure of a generation batch. No partial results accompany it.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The request was rejected before any backend work.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Failure while replaying a stored record.
#[derive(Debug, thiserror::Error)]
pub enum ReproduceError {
    /// The source sidecar could not be read from disk.
    #[error("Source record {path} is unreadable: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    /// The source sidecar was read but does not describe a replayable run.
    #[error("Source record {path} is malformed: {reason}")]
    SourceMalformed { path: PathBuf, reason: String },

    #[error("Reproduction failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Failed to save reproduced record: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by the [`crate::studio::Studio`] facade.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Reproduce(#[from] ReproduceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
