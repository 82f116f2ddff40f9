//! Error types for staged execution and external steps.

use std::path::{Path, PathBuf};

/// Errors produced by the staging layer.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("step {step} has empty command")]
    EmptyCommand { step: String },

    #[error("step {step} exited with code {exit_code}: {command}\n{stderr}")]
    ToolFailed {
        step: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("step {step} timed out after {timeout_secs} seconds")]
    Timeout { step: String, timeout_secs: u64 },

    #[error("{step} finished but did not produce {}", path.display())]
    MissingOutput { step: String, path: PathBuf },

    #[error("staged outputs must share one directory: {} and {}", first.display(), other.display())]
    MixedParents { first: PathBuf, other: PathBuf },

    #[error("invalid output path: {}", .0.display())]
    InvalidOutput(PathBuf),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for staging operations.
pub type StageResult<T> = std::result::Result<T, StageError>;

/// Attach the offending path to an `io::Error`.
pub trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> StageResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> StageResult<T> {
        self.map_err(|source| StageError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}
