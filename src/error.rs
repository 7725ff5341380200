//! Error types for GatiSLAM.

use thiserror::Error;

/// GatiSLAM error type.
///
/// Only configuration problems and rejected frames are reported as errors.
/// Degraded-but-recoverable conditions (an optimization that ran out of its
/// iteration budget, a submap too sparse to refine against) are reported as
/// diagnostics on [`crate::engine::FrameSummary`] instead.
#[derive(Error, Debug)]
pub enum SlamError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Frame rejected: {0}")]
    FrameRejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Trajectory parse error: {0}")]
    TrajectoryParse(String),
}

impl From<toml::de::Error> for SlamError {
    fn from(e: toml::de::Error) -> Self {
        SlamError::ConfigInvalid(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SlamError>;
