use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure to obtain metadata for a directory. Always recoverable: the
/// directory falls back to filename-only dates.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?} for {dir}")]
    Timeout {
        program: String,
        dir: PathBuf,
        timeout: Duration,
    },

    #[error("no metadata output for {0}")]
    EmptyOutput(PathBuf),

    #[error("unparseable metadata output for {dir}: {source}")]
    Parse {
        dir: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid run configuration, detected before any file is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source directory does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("source is not a directory: {0}")]
    SourceNotDirectory(PathBuf),

    #[error("no allowed extensions configured")]
    NoExtensions,

    #[error("destination {0} is the source directory itself")]
    DestinationIsSource(PathBuf),
}
