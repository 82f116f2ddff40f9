//! Error taxonomy for ensemble coordination.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use varens_stage::StageError;

/// Errors produced while grouping, merging or building consensus calls.
#[derive(Debug, thiserror::Error)]
pub enum EnsembleError {
    /// A staged step or external tool failed.
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed interval record at {}:{line}: {text}", path.display())]
    MalformedInterval {
        path: PathBuf,
        line: usize,
        text: String,
    },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnsembleError {
    /// Narrow to a `StageError` for use inside a stage producer.
    pub(crate) fn into_stage(self) -> StageError {
        match self {
            EnsembleError::Stage(stage) => stage,
            EnsembleError::MalformedInterval { ref path, .. } => StageError::Io {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, self.to_string()),
            },
            other => StageError::Serialization(other.to_string()),
        }
    }
}

/// Result type for ensemble operations.
pub type Result<T> = std::result::Result<T, EnsembleError>;

/// Pipeline stage a batch failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Tumor filtering and per-caller multi-sample merging.
    Merge,
    /// Ensemble strategy (merge-and-score or caller recall).
    Consensus,
    /// Truth-set comparison.
    Validation,
    /// Segmentation and copy-number calling.
    CopyNumber,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Merge => "merge",
            PipelineStage::Consensus => "consensus",
            PipelineStage::Validation => "validation",
            PipelineStage::CopyNumber => "copy_number",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failure isolated to a single batch.
#[derive(Debug, thiserror::Error)]
#[error("batch {batch_id} failed during {stage}: {source}")]
pub struct BatchError {
    pub batch_id: String,
    pub stage: PipelineStage,
    #[source]
    pub source: EnsembleError,
}

impl BatchError {
    pub fn new(batch_id: impl Into<String>, stage: PipelineStage, source: EnsembleError) -> Self {
        Self {
            batch_id: batch_id.into(),
            stage,
            source,
        }
    }

    /// Exit code of the failing tool, when the failure came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match &self.source {
            EnsembleError::Stage(StageError::ToolFailed { exit_code, .. }) => Some(*exit_code),
            _ => None,
        }
    }
}
