//! Crate-wide error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the experiment core.
///
/// `Config` is fatal and raised before any run starts. `Persistence` is
/// propagated because a corrupted trial log invalidates resumability.
/// Failures *inside* a training run are not represented here: the run
/// boundary converts them to an infinite objective instead (see
/// `train::TrainLoop::run`).
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no best checkpoint at {0:?}")]
    MissingCheckpoint(PathBuf),

    #[error("search log persistence failed: {0}")]
    Persistence(String),

    #[error("invalid state: {0}")]
    State(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for experiment operations
pub type Result<T> = std::result::Result<T, Error>;
