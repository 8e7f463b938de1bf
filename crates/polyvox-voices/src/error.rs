use crate::profile::VersionId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    /// Sample failed minimal validation (unreadable, empty, unknown format)
    #[error("Invalid voice sample: {0}")]
    InvalidSample(String),

    /// Requested version is absent from the user's history
    #[error("Voice version not found: {0}")]
    VersionNotFound(VersionId),

    #[error("Profile IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Profile store corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
