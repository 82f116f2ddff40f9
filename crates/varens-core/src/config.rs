//! Pipeline and ensemble configuration.
//!
//! `PipelineConfig` is read from YAML once per run. `EnsembleConfig` travels
//! with each sample and selects the consensus strategy for its batch.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use varens_stage::IoContext;

use crate::error::{EnsembleError, Result};

/// How a batch's per-caller files become one consensus callset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ConsensusStrategy {
    /// Write a merge specification and let the scoring tool combine calls.
    MergeAndScore,
    /// Re-call every candidate site with one designated caller.
    CallerRecall { caller: String },
}

/// Per-sample ensemble settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Selects caller-based recall when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,

    /// Scoring parameters copied into the merge specification verbatim
    /// (`numpass`, `classifiers`, `trusted-pct`, ...).
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

impl EnsembleConfig {
    pub fn recall_with(caller: impl Into<String>) -> Self {
        Self {
            caller: Some(caller.into()),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn strategy(&self) -> ConsensusStrategy {
        match &self.caller {
            Some(caller) => ConsensusStrategy::CallerRecall {
                caller: caller.clone(),
            },
            None => ConsensusStrategy::MergeAndScore,
        }
    }
}

/// Truth set used to grade ensemble calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub truth_vcf: PathBuf,
    /// Reference in the comparison tool's own format.
    pub reference_sdf: PathBuf,
}

/// Program locations for external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub bcftools: String,
    pub java: String,
    pub jvm_opts: Vec<String>,
    pub bcbio_variation_jar: PathBuf,
    pub bcbio_variation_recall: String,
    pub snpeff: String,
    pub rtg: String,
    pub cnvkit: String,
    pub purecn: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            bcftools: "bcftools".to_string(),
            java: "java".to_string(),
            jvm_opts: vec!["-Xms750m".to_string(), "-Xmx2g".to_string()],
            bcbio_variation_jar: PathBuf::from("bcbio.variation.jar"),
            bcbio_variation_recall: "bcbio-variation-recall".to_string(),
            snpeff: "snpEff".to_string(),
            rtg: "rtg".to_string(),
            cnvkit: "cnvkit.py".to_string(),
            purecn: "PureCN.R".to_string(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_num_cores() -> usize {
    1
}

fn default_genome_build() -> String {
    "hg38".to_string()
}

/// Run-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root under which every artifact is written.
    pub work_dir: PathBuf,

    /// Reference sequence passed through to tools.
    pub reference: PathBuf,

    /// Upper bound on batches processed at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Cores handed to multi-threaded tools.
    #[serde(default = "default_num_cores")]
    pub num_cores: usize,

    /// Analysis regions written into the merge specification.
    #[serde(default)]
    pub intervals: Option<PathBuf>,

    /// Truth-set comparison; absent means no validation summary.
    #[serde(default)]
    pub validation: Option<ValidationConfig>,

    /// Effects database; absent skips annotation after recall.
    #[serde(default)]
    pub snpeff_db: Option<String>,

    /// Run copy-number calling for tumor samples after consensus.
    #[serde(default)]
    pub copy_number: bool,

    /// Build name handed to copy-number calling.
    #[serde(default = "default_genome_build")]
    pub genome_build: String,

    #[serde(default)]
    pub tools: ToolPaths,

    /// Per-step timeout in seconds (0 = none).
    #[serde(default)]
    pub step_timeout_secs: u64,

    /// Retries for failed external steps (0 = run once).
    #[serde(default)]
    pub retries: u32,
}

impl PipelineConfig {
    pub fn new(work_dir: impl Into<PathBuf>, reference: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            reference: reference.into(),
            max_concurrent: default_max_concurrent(),
            num_cores: default_num_cores(),
            intervals: None,
            validation: None,
            snpeff_db: None,
            copy_number: false,
            genome_build: default_genome_build(),
            tools: ToolPaths::default(),
            step_timeout_secs: 0,
            retries: 0,
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).at(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(EnsembleError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.num_cores == 0 {
            return Err(EnsembleError::InvalidConfig(
                "num_cores must be at least 1".to_string(),
            ));
        }
        if self.reference.as_os_str().is_empty() {
            return Err(EnsembleError::InvalidConfig(
                "reference must be set".to_string(),
            ));
        }
        Ok(())
    }
}
