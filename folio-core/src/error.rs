use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the viewport core. None of these are fatal to the process.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to open {path:?}: {source}")]
    DocumentOpen {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{path:?} requires a valid password")]
    Authentication { path: PathBuf },

    #[error("invalid page range {spec:?}: {reason}")]
    InvalidRangeSpec { spec: String, reason: String },

    #[error("document engine failed on page {page}: {source}")]
    GeometryProviderUnavailable {
        page: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("merging needs at least two documents, got {count}")]
    NotEnoughDocuments { count: usize },

    #[error("manual scale {scale} is outside ({min}, {max})")]
    ScaleOutOfRange { scale: f32, min: f32, max: f32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ViewerError {
    pub fn provider(page: usize, source: anyhow::Error) -> Self {
        ViewerError::GeometryProviderUnavailable { page, source }
    }

    pub fn invalid_range(spec: &str, reason: impl Into<String>) -> Self {
        ViewerError::InvalidRangeSpec {
            spec: spec.to_owned(),
            reason: reason.into(),
        }
    }

    /// Whether re-prompting for a password could resolve the failure.
    pub fn is_recoverable_auth(&self) -> bool {
        matches!(self, ViewerError::Authentication { .. })
    }
}

pub type ViewerResult<T> = std::result::Result<T, ViewerError>;
