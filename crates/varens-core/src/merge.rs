//! Multi-caller merging: one representative call file per caller.
//!
//! For every caller seen in a batch the merger picks exactly one file to feed
//! the consensus step. A caller with a single contributing file uses that
//! file as is. Several files are combined by the multi-sample merge tool into
//! a path keyed by batch and caller. Tumor samples contribute a copy reduced
//! to their own column and to PASS or unfiltered records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use varens_stage::StepExecutor;

use crate::domain::Batch;
use crate::error::Result;
use crate::paths::{tumor_only_path, BatchLayout};
use crate::toolbox::{staged_step, Toolbox};

/// Per-caller contributing files in caller order, plus alignment files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerFileSet {
    callers: Vec<String>,
    files: HashMap<String, Vec<PathBuf>>,
    alignments: Vec<PathBuf>,
}

impl CallerFileSet {
    pub fn builder() -> CallerFileSetBuilder {
        CallerFileSetBuilder::default()
    }

    /// Callers with at least one file, first-seen order.
    pub fn callers(&self) -> &[String] {
        &self.callers
    }

    pub fn files(&self, caller: &str) -> &[PathBuf] {
        self.files.get(caller).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct alignment files, first-seen order.
    pub fn alignments(&self) -> &[PathBuf] {
        &self.alignments
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.callers.iter().map(|c| (c.as_str(), self.files(c)))
    }

    /// Every contributing file across callers.
    pub fn all_files(&self) -> Vec<&Path> {
        self.iter()
            .flat_map(|(_, files)| files.iter().map(PathBuf::as_path))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.callers.is_empty()
    }
}

/// Accumulates contributions; `build` freezes them into a `CallerFileSet`.
#[derive(Debug, Default)]
pub struct CallerFileSetBuilder {
    callers: Vec<String>,
    files: HashMap<String, Vec<PathBuf>>,
    alignments: Vec<PathBuf>,
}

impl CallerFileSetBuilder {
    /// Fix the caller's position without contributing a file.
    pub fn declare(&mut self, caller: &str) -> &mut Self {
        if !self.files.contains_key(caller) {
            self.callers.push(caller.to_string());
            self.files.insert(caller.to_string(), Vec::new());
        }
        self
    }

    /// Add a file for `caller`. Repeats of the same path are ignored.
    pub fn add_file(&mut self, caller: &str, file: impl Into<PathBuf>) -> &mut Self {
        self.declare(caller);
        let file = file.into();
        if let Some(files) = self.files.get_mut(caller) {
            if !files.contains(&file) {
                files.push(file);
            }
        }
        self
    }

    pub fn add_alignment(&mut self, bam: impl Into<PathBuf>) -> &mut Self {
        let bam = bam.into();
        if !self.alignments.contains(&bam) {
            self.alignments.push(bam);
        }
        self
    }

    /// Callers left without files are dropped.
    pub fn build(self) -> CallerFileSet {
        let Self {
            callers,
            mut files,
            alignments,
        } = self;
        files.retain(|_, f| !f.is_empty());
        let callers = callers
            .into_iter()
            .filter(|c| files.contains_key(c))
            .collect();
        CallerFileSet {
            callers,
            files,
            alignments,
        }
    }
}

/// The file chosen to stand for one caller in the consensus step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerRepresentative {
    pub caller: String,
    pub file: PathBuf,
    /// True when produced by the multi-sample merge tool.
    pub merged: bool,
}

/// Merger output, in caller order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergedCalls {
    pub representatives: Vec<CallerRepresentative>,
    pub alignments: Vec<PathBuf>,
}

impl MergedCalls {
    pub fn caller_names(&self) -> Vec<&str> {
        self.representatives
            .iter()
            .map(|r| r.caller.as_str())
            .collect()
    }

    pub fn files(&self) -> Vec<&Path> {
        self.representatives.iter().map(|r| r.file.as_path()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.representatives.is_empty()
    }
}

/// Collects and merges one batch's per-caller files.
pub struct MultiCallerMerger<'a> {
    toolbox: &'a Toolbox,
    executor: &'a dyn StepExecutor,
    layout: &'a BatchLayout,
}

impl<'a> MultiCallerMerger<'a> {
    pub fn new(toolbox: &'a Toolbox, executor: &'a dyn StepExecutor, layout: &'a BatchLayout) -> Self {
        Self {
            toolbox,
            executor,
            layout,
        }
    }

    /// Gather contributing files, tumor-filtering where needed.
    pub async fn collect(&self, batch: &Batch) -> Result<CallerFileSet> {
        let mut builder = CallerFileSet::builder();
        for sample in batch.samples() {
            if let Some(bam) = sample.alignment() {
                builder.add_alignment(bam);
            }
            for call in &sample.calls {
                builder.declare(&call.caller);
                let Some(vrn_file) = call.vrn_file.as_deref() else {
                    continue;
                };
                let file = if sample.is_tumor() {
                    self.tumor_only(vrn_file, &sample.name).await?
                } else {
                    vrn_file.to_path_buf()
                };
                builder.add_file(&call.caller, file);
            }
        }
        Ok(builder.build())
    }

    async fn tumor_only(&self, vrn_file: &Path, sample: &str) -> Result<PathBuf> {
        let out = tumor_only_path(vrn_file);
        let outcome = staged_step(self.executor, &out, &[vrn_file], |tx| {
            self.toolbox.select_tumor_calls(vrn_file, sample, tx)
        })
        .await?;
        debug!(sample, output = %out.display(), cached = outcome.cached, "tumor-only calls");
        Ok(out)
    }

    /// Pick one representative per caller, merging where a caller has several files.
    pub async fn merge(&self, files: &CallerFileSet) -> Result<MergedCalls> {
        let mut representatives = Vec::with_capacity(files.callers().len());
        for (caller, inputs) in files.iter() {
            let representative = match inputs {
                [single] => CallerRepresentative {
                    caller: caller.to_string(),
                    file: single.clone(),
                    merged: false,
                },
                _ => {
                    let out = self.layout.multisample(caller);
                    let outcome = staged_step(self.executor, &out, inputs, |tx| {
                        self.toolbox.multisample_merge(inputs, tx)
                    })
                    .await?;
                    info!(
                        batch_id = %self.layout.batch_id(),
                        caller,
                        inputs = inputs.len(),
                        cached = outcome.cached,
                        "multi-sample merge"
                    );
                    CallerRepresentative {
                        caller: caller.to_string(),
                        file: out,
                        merged: true,
                    }
                }
            };
            representatives.push(representative);
        }
        Ok(MergedCalls {
            representatives,
            alignments: files.alignments().to_vec(),
        })
    }

    /// `collect` then `merge`.
    pub async fn run(&self, batch: &Batch) -> Result<(CallerFileSet, MergedCalls)> {
        let files = self.collect(batch).await?;
        let merged = self.merge(&files).await?;
        Ok((files, merged))
    }
}
