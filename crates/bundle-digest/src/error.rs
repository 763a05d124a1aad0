//! Error types for bundle-digest

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading build output
#[derive(Error, Debug)]
pub enum BundleError {
    /// A required build artifact is absent
    #[error("Build artifact not found: {0}")]
    MissingArtifact(PathBuf),

    /// Build identifier file is empty
    #[error("Build identifier at {0} is empty")]
    EmptyBuildId(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
