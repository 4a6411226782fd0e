use std::path::PathBuf;

/// Errors from the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sidecar exists but is not a valid metadata document.
    #[error("Malformed sidecar {path}: {source}")]
    MalformedSidecar {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A sidecar could not be serialized.
    #[error("Failed to serialize sidecar: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The image artifact could not be decoded.
    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The image could not be encoded as PNG.
    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    /// A list filter value is unusable.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
