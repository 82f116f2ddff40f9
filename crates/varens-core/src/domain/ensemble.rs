//! Consensus results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::sample::{CallResult, ENSEMBLE_CALLER};

/// Where a truth-set comparison left its results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub truth_set: PathBuf,
    pub grading_dir: PathBuf,
    pub summary_file: PathBuf,
}

/// The consensus callset for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// Merged call file. Always exists once the result is returned.
    pub vrn_file: PathBuf,

    /// Callable regions; `None` rather than a dangling path when not produced.
    pub bed_file: Option<PathBuf>,

    /// Attached after truth-set comparison.
    pub validate: Option<ValidationSummary>,
}

impl EnsembleResult {
    pub fn new(vrn_file: impl Into<PathBuf>, bed_file: Option<PathBuf>) -> Self {
        Self {
            vrn_file: vrn_file.into(),
            bed_file,
            validate: None,
        }
    }

    pub fn caller(&self) -> &'static str {
        ENSEMBLE_CALLER
    }

    /// Form injected at the front of each member sample's results.
    pub fn to_call_result(&self) -> CallResult {
        CallResult {
            caller: ENSEMBLE_CALLER.to_string(),
            vrn_file: Some(self.vrn_file.clone()),
            vrn_file_batch: None,
            bed_file: self.bed_file.clone(),
            validate: self.validate.clone(),
        }
    }
}
