//! Run report: one entry per batch, written as pretty JSON.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use varens_stage::IoContext;

use crate::error::{BatchError, PipelineStage, Result};

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// Final state of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    Succeeded,
    Failed {
        stage: PipelineStage,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
}

impl From<&BatchError> for BatchStatus {
    fn from(err: &BatchError) -> Self {
        BatchStatus::Failed {
            stage: err.stage,
            error: err.source.to_string(),
            exit_code: err.exit_code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub samples: Vec<String>,
    #[serde(flatten)]
    pub status: BatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensemble_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bed_file: Option<PathBuf>,
    /// sha256 of the ensemble file as published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_number_rds: Option<PathBuf>,
    /// True when the ensemble file was reused from an earlier run.
    pub cached: bool,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.status == BatchStatus::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub batches: Vec<BatchReport>,
    /// Samples returned without an ensemble result because they did not qualify.
    pub pass_through: Vec<String>,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            batches: Vec::new(),
            pass_through: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn failed(&self) -> impl Iterator<Item = &BatchReport> {
        self.batches.iter().filter(|b| !b.succeeded())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).at(path)?;
        Ok(())
    }
}

/// Hex sha256 of a file's bytes.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).at(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).at(path)?;
    Ok(hex::encode(hasher.finalize()))
}
