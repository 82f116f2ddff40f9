//! Samples and the per-caller results attached to them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::EnsembleConfig;
use crate::domain::ensemble::ValidationSummary;

/// Caller identity given to consensus results.
pub const ENSEMBLE_CALLER: &str = "ensemble";

/// Output of one caller for one sample. Never modified once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    /// Name of the caller that produced this result.
    pub caller: String,

    /// Per-sample call file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrn_file: Option<PathBuf>,

    /// Call file shared by the whole batch (joint or paired calling).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrn_file_batch: Option<PathBuf>,

    /// Regions the calls are restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bed_file: Option<PathBuf>,

    /// Truth-set comparison, when one was run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<ValidationSummary>,
}

impl CallResult {
    pub fn new(caller: impl Into<String>, vrn_file: impl Into<PathBuf>) -> Self {
        Self {
            caller: caller.into(),
            vrn_file: Some(vrn_file.into()),
            vrn_file_batch: None,
            bed_file: None,
            validate: None,
        }
    }

    /// A result entry for a caller that produced no per-sample file.
    pub fn without_file(caller: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            vrn_file: None,
            vrn_file_batch: None,
            bed_file: None,
            validate: None,
        }
    }

    pub fn with_batch_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.vrn_file_batch = Some(path.into());
        self
    }

    /// Whether any real result file is attached.
    pub fn has_result_file(&self) -> bool {
        self.vrn_file.is_some() || self.vrn_file_batch.is_some()
    }
}

/// A sample as handed over by the upstream pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unique sample identity; also the VCF sample column name.
    pub name: String,

    /// Explicit batch membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,

    /// Phenotype tag such as `tumor` or `normal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phenotype: Option<String>,

    /// Results in caller order.
    #[serde(default)]
    pub calls: Vec<CallResult>,

    /// Alignment file used for caller-based recall.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_bam: Option<PathBuf>,

    /// Ensemble settings; `None` means no consensus was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensemble: Option<EnsembleConfig>,

    /// Normalized coverage bins for copy-number calling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_bins: Option<PathBuf>,
}

impl Sample {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batch: None,
            phenotype: None,
            calls: Vec::new(),
            work_bam: None,
            ensemble: None,
            normalized_bins: None,
        }
    }

    pub fn with_batch(mut self, batch: impl Into<String>) -> Self {
        self.batch = Some(batch.into());
        self
    }

    pub fn with_phenotype(mut self, phenotype: impl Into<String>) -> Self {
        self.phenotype = Some(phenotype.into());
        self
    }

    pub fn with_call(mut self, call: CallResult) -> Self {
        self.calls.push(call);
        self
    }

    pub fn with_bam(mut self, bam: impl Into<PathBuf>) -> Self {
        self.work_bam = Some(bam.into());
        self
    }

    pub fn with_ensemble(mut self, ensemble: EnsembleConfig) -> Self {
        self.ensemble = Some(ensemble);
        self
    }

    pub fn with_normalized_bins(mut self, bins: impl Into<PathBuf>) -> Self {
        self.normalized_bins = Some(bins.into());
        self
    }

    /// Tumor-like phenotypes (`tumor`, `Tumor-relapse`, ...).
    pub fn is_tumor(&self) -> bool {
        self.phenotype
            .as_deref()
            .map(|p| p.to_ascii_lowercase().starts_with("tumor"))
            .unwrap_or(false)
    }

    /// Default grouping predicate: ensemble configured, more than one result,
    /// and at least one result with an actual file.
    ///
    /// The normal half of a tumor/normal pair can carry the ensemble setting
    /// without owning any call files; it does not qualify.
    pub fn has_ensemble(&self) -> bool {
        self.ensemble.is_some()
            && self.calls.len() > 1
            && self.calls.iter().any(CallResult::has_result_file)
    }

    pub fn alignment(&self) -> Option<&Path> {
        self.work_bam.as_deref()
    }
}
