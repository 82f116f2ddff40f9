//! Consensus building for one batch.
//!
//! Two strategies, picked from the batch's ensemble settings:
//!
//! - merge-and-score: write a merge specification, then let the scoring tool
//!   combine the representative files. Some tool versions finish without
//!   writing the final file; the consensus-filtered intermediate in the tool's
//!   `prep` directory is used instead. A combined-regions BED from the same
//!   directory becomes the batch's callable regions.
//! - caller recall: re-call all candidate sites with one caller, then run the
//!   effects annotation pass when a database is configured.
//!
//! A batch whose representative files hold no records gets an empty callset
//! and no tool is run. Every output is produced through the stage engine
//! keyed on `<base>/<batch>-ensemble.vcf`, so reruns reuse finished work.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use varens_stage::{
    link_or_copy, run_stage, run_step, Artifact, IoContext, StageError, StageResult, StepExecutor,
};

use crate::config::{ConsensusStrategy, EnsembleConfig, PipelineConfig};
use crate::domain::{EnsembleResult, ValidationSummary};
use crate::error::Result;
use crate::merge::MergedCalls;
use crate::obs;
use crate::paths::{tool_work_dir, BatchLayout};
use crate::toolbox::{staged_step, steps, Toolbox};
use crate::vcf;

const CFILTER_SUFFIX: &str = "-cfilter.vcf";
const MULTICOMBINE_SUFFIX: &str = "-multicombine.bed";
const SUMMARY_FILE: &str = "summary.txt";

/// Document handed to the scoring tool.
#[derive(Debug, Serialize)]
struct MergeSpec<'a> {
    ensemble: &'a BTreeMap<String, serde_yaml::Value>,
    names: Vec<&'a str>,
    #[serde(rename = "prep-inputs")]
    prep_inputs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    intervals: Option<PathBuf>,
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().at(path)?;
    Ok(cwd.join(path))
}

/// First file in `dir` whose name ends with `suffix`, by name order.
fn find_by_suffix(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().ends_with(suffix))
        })
        .collect();
    found.sort();
    found.into_iter().next()
}

/// A zero-byte output counts as missing.
fn require_nonempty(step: &str, tx_output: &Path, final_output: &Path) -> StageResult<()> {
    if Artifact::new(tx_output).is_nonempty() {
        Ok(())
    } else {
        Err(StageError::MissingOutput {
            step: step.to_string(),
            path: final_output.to_path_buf(),
        })
    }
}

/// `prep` directories the scoring tool may have used, most specific first.
fn prep_dirs(tx_output: &Path, final_output: &Path) -> [PathBuf; 2] {
    [
        tool_work_dir(tx_output).join("prep"),
        tool_work_dir(final_output).join("prep"),
    ]
}

/// What `ConsensusBuilder::build` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusOutcome {
    pub result: EnsembleResult,
    /// No input had a record; the result is an empty callset.
    pub degenerate: bool,
    /// The ensemble file was already fresh and no tool ran for it.
    pub cached: bool,
}

impl ConsensusOutcome {
    fn new(result: EnsembleResult, cached: bool) -> Self {
        Self {
            result,
            degenerate: false,
            cached,
        }
    }
}

/// Builds the consensus callset for one batch.
pub struct ConsensusBuilder<'a> {
    config: &'a PipelineConfig,
    toolbox: &'a Toolbox,
    executor: &'a dyn StepExecutor,
    layout: &'a BatchLayout,
}

impl<'a> ConsensusBuilder<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        toolbox: &'a Toolbox,
        executor: &'a dyn StepExecutor,
        layout: &'a BatchLayout,
    ) -> Self {
        Self {
            config,
            toolbox,
            executor,
            layout,
        }
    }

    /// Produce the batch's `EnsembleResult` from the merged representatives.
    ///
    /// Validation is not run here; see [`ConsensusBuilder::validate`].
    pub async fn build(&self, ensemble: &EnsembleConfig, merged: &MergedCalls) -> Result<ConsensusOutcome> {
        let inputs = merged.files();
        if !vcf::any_has_variants(&inputs)? {
            return self.empty_callset(&inputs).await;
        }

        match ensemble.strategy() {
            ConsensusStrategy::MergeAndScore => self.merge_and_score(ensemble, merged).await,
            ConsensusStrategy::CallerRecall { caller } => {
                self.caller_recall(&caller, merged).await
            }
        }
    }

    async fn empty_callset(&self, inputs: &[&Path]) -> Result<ConsensusOutcome> {
        let out = self.layout.ensemble_vcf();
        let outcome = run_stage(&out, inputs, |tx| async move { vcf::write_empty_vcf(&tx) }).await?;
        obs::emit_consensus_degenerate(self.layout.batch_id(), &out);
        Ok(ConsensusOutcome {
            result: EnsembleResult::new(out, None),
            degenerate: true,
            cached: outcome.cached,
        })
    }

    /// Write the merge specification unless an identical one is already fresh.
    ///
    /// A document rendered differently from the one on disk (other callers or
    /// parameters) replaces it, so the ensemble file keyed on it goes stale.
    pub async fn write_merge_spec(&self, ensemble: &EnsembleConfig, merged: &MergedCalls) -> Result<PathBuf> {
        let out = self.layout.merge_spec();
        let intervals = self.config.intervals.as_deref().map(absolute).transpose()?;
        let spec = MergeSpec {
            ensemble: &ensemble.params,
            names: merged.caller_names(),
            prep_inputs: false,
            intervals,
        };
        let text = serde_yaml::to_string(&spec)?;
        let on_disk = fs::read_to_string(&out).ok();
        if on_disk.is_some_and(|current| current != text) {
            debug!(batch_id = %self.layout.batch_id(), "merge specification changed, rewriting");
            fs::remove_file(&out).at(&out)?;
        }
        let inputs: Vec<&Path> = self.config.intervals.iter().map(PathBuf::as_path).collect();
        run_stage(&out, &inputs, |tx| async move { fs::write(&tx, text).at(&tx) }).await?;
        Ok(out)
    }

    async fn merge_and_score(&self, ensemble: &EnsembleConfig, merged: &MergedCalls) -> Result<ConsensusOutcome> {
        let merge_spec = self.write_merge_spec(ensemble, merged).await?;
        let out = self.layout.ensemble_vcf();
        let bed = self.layout.callregions_bed();
        let tmp_dir = self.layout.tmp_dir();
        fs::create_dir_all(&tmp_dir).at(&tmp_dir)?;

        let inputs = merged.files();
        let mut keyed_on = inputs.clone();
        keyed_on.push(merge_spec.as_path());
        let mut regions_found = false;
        let outcome = run_stage(&out, &keyed_on, |tx| {
            let (out, bed, merge_spec, tmp_dir, inputs) = (&out, &bed, &merge_spec, &tmp_dir, &inputs);
            let regions_found = &mut regions_found;
            async move {
                let spec = self.toolbox.variant_ensemble(
                    merge_spec,
                    &self.config.reference,
                    &tx,
                    inputs,
                    tmp_dir,
                    self.layout.base(),
                );
                run_step(self.executor, &spec).await?;

                let prep = prep_dirs(&tx, out);
                if !Artifact::new(&tx).is_nonempty() {
                    if tx.exists() {
                        fs::remove_file(&tx).at(&tx)?;
                    }
                    let fallback = prep
                        .iter()
                        .find_map(|dir| find_by_suffix(dir, CFILTER_SUFFIX))
                        .ok_or_else(|| StageError::MissingOutput {
                            step: steps::ENSEMBLE_SCORING.to_string(),
                            path: out.clone(),
                        })?;
                    info!(
                        batch_id = %self.layout.batch_id(),
                        fallback = %fallback.display(),
                        "scoring output missing, using consensus-filtered calls"
                    );
                    link_or_copy(&fallback, &tx)?;
                    require_nonempty(steps::ENSEMBLE_SCORING, &tx, out)?;
                }

                if let Some(regions) = prep.iter().find_map(|dir| find_by_suffix(dir, MULTICOMBINE_SUFFIX)) {
                    let src = regions.as_path();
                    run_stage(bed, &[src], |tx_bed| async move { link_or_copy(src, &tx_bed) })
                        .await?;
                    *regions_found = true;
                }
                Ok::<(), StageError>(())
            }
        })
        .await?;

        obs::emit_consensus_built(self.layout.batch_id(), "merge_and_score", &out, outcome.cached);
        // A fresh run that found no regions must not report a bed left by an earlier run.
        let bed_file = if outcome.cached {
            bed.exists().then_some(bed)
        } else if regions_found {
            Some(bed)
        } else {
            if bed.exists() {
                fs::remove_file(&bed).at(&bed)?;
            }
            None
        };
        Ok(ConsensusOutcome::new(EnsembleResult::new(out, bed_file), outcome.cached))
    }

    async fn caller_recall(&self, caller: &str, merged: &MergedCalls) -> Result<ConsensusOutcome> {
        let out = self.layout.ensemble_vcf();
        let inputs = merged.files();
        let outcome = run_stage(&out, &inputs, |tx| {
            let (out, inputs) = (&out, &inputs);
            async move {
                let spec = self.toolbox.ensemble_recall(
                    caller,
                    &tx,
                    &self.config.reference,
                    inputs,
                    &merged.alignments,
                );
                run_step(self.executor, &spec).await?;
                require_nonempty(steps::ENSEMBLE_RECALL, &tx, out)
            }
        })
        .await?;
        obs::emit_consensus_built(self.layout.batch_id(), "caller_recall", &out, outcome.cached);

        let vrn_file = match self.config.snpeff_db.as_deref() {
            Some(db) => {
                let annotated = self.layout.effects_vcf(&out);
                staged_step(self.executor, &annotated, &[&out], |tx| {
                    self.toolbox.effects(db, &out, tx)
                })
                .await?;
                annotated
            }
            None => {
                debug!(batch_id = %self.layout.batch_id(), "no effects database, skipping annotation");
                out
            }
        };
        Ok(ConsensusOutcome::new(EnsembleResult::new(vrn_file, None), outcome.cached))
    }

    /// Compare `result` against the configured truth set.
    ///
    /// Returns `None` without running anything when no truth set is
    /// configured.
    pub async fn validate(&self, result: &EnsembleResult) -> Result<Option<ValidationSummary>> {
        let Some(validation) = &self.config.validation else {
            return Ok(None);
        };
        let grading_dir = self.layout.validation_dir();
        let inputs = [result.vrn_file.as_path(), validation.truth_vcf.as_path()];
        staged_step(self.executor, &grading_dir, &inputs, |tx| {
            self.toolbox.truth_comparison(
                &validation.truth_vcf,
                &result.vrn_file,
                &validation.reference_sdf,
                tx,
            )
        })
        .await?;
        Ok(Some(ValidationSummary {
            truth_set: validation.truth_vcf.clone(),
            summary_file: grading_dir.join(SUMMARY_FILE),
            grading_dir,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolPaths;
    use crate::merge::CallerRepresentative;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use varens_stage::fakes::{touch_outputs, ScriptedExecutor, FAKE_VCF};

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn merged_from(files: &[(&str, PathBuf)]) -> MergedCalls {
        MergedCalls {
            representatives: files
                .iter()
                .map(|(caller, file)| CallerRepresentative {
                    caller: caller.to_string(),
                    file: file.clone(),
                    merged: false,
                })
                .collect(),
            alignments: vec![PathBuf::from("/b/s1.bam")],
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        config: PipelineConfig,
        toolbox: Toolbox,
        layout: BatchLayout,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(dir.path(), "/ref/hg38.fa");
        let layout = BatchLayout::new(dir.path(), "fam1");
        Fixture {
            toolbox: Toolbox::new(ToolPaths::default(), 2, 0),
            dir,
            config,
            layout,
        }
    }

    fn calls(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_degenerate_batch_writes_empty_vcf_without_steps() {
        let fx = fixture();
        let a = calls(fx.dir.path(), "a.vcf", vcf::EMPTY_VCF);
        let b = calls(fx.dir.path(), "b.vcf", vcf::EMPTY_VCF);
        let exec = ScriptedExecutor::succeeding();
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        let outcome = builder
            .build(&EnsembleConfig::default(), &merged_from(&[("gatk", a), ("freebayes", b)]))
            .await
            .unwrap();

        assert!(outcome.degenerate);
        let result = outcome.result;
        assert_eq!(result.vrn_file, fx.layout.ensemble_vcf());
        assert!(result.bed_file.is_none());
        assert_eq!(fs::read_to_string(&result.vrn_file).unwrap(), vcf::EMPTY_VCF);
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_merge_spec_lists_callers_and_params() {
        let fx = fixture();
        let exec = ScriptedExecutor::succeeding();
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);
        let ensemble = EnsembleConfig::default().with_param("numpass", 2);
        let merged = merged_from(&[("gatk", "/c/a.vcf".into()), ("freebayes", "/c/b.vcf".into())]);

        let path = builder.write_merge_spec(&ensemble, &merged).await.unwrap();

        let doc: serde_yaml::Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(path, fx.layout.merge_spec());
        assert_eq!(doc["names"][0].as_str(), Some("gatk"));
        assert_eq!(doc["names"][1].as_str(), Some("freebayes"));
        assert_eq!(doc["prep-inputs"].as_bool(), Some(false));
        assert_eq!(doc["ensemble"]["numpass"].as_u64(), Some(2));
        assert!(doc.get("intervals").is_none());
    }

    #[tokio::test]
    async fn test_scoring_fallback_uses_cfilter_intermediate() {
        let fx = fixture();
        let a = calls(fx.dir.path(), "a.vcf", FAKE_VCF);
        let exec = ScriptedExecutor::new(|spec| {
            if spec.name == steps::ENSEMBLE_SCORING {
                let prep = tool_work_dir(spec.produces[0].path()).join("prep");
                fs::create_dir_all(&prep).unwrap();
                fs::write(prep.join("fam1-cfilter.vcf"), FAKE_VCF).unwrap();
            }
            Ok(0)
        });
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        let result = builder
            .build(&EnsembleConfig::default(), &merged_from(&[("gatk", a)]))
            .await
            .unwrap()
            .result;

        assert_eq!(fs::read_to_string(&result.vrn_file).unwrap(), FAKE_VCF);
        assert!(result.bed_file.is_none());
    }

    #[tokio::test]
    async fn test_scoring_without_any_output_is_missing_output() {
        let fx = fixture();
        let a = calls(fx.dir.path(), "a.vcf", FAKE_VCF);
        let exec = ScriptedExecutor::new(|_| Ok(0));
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        let err = builder
            .build(&EnsembleConfig::default(), &merged_from(&[("gatk", a)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            crate::error::EnsembleError::Stage(StageError::MissingOutput { .. })
        ));
        assert!(!fx.layout.ensemble_vcf().exists());
    }

    #[tokio::test]
    async fn test_merge_spec_is_rewritten_when_callers_or_params_change() {
        let fx = fixture();
        let exec = ScriptedExecutor::succeeding();
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);
        let both = merged_from(&[("gatk", "/c/a.vcf".into()), ("freebayes", "/c/b.vcf".into())]);
        let gatk_only = merged_from(&[("gatk", "/c/a.vcf".into())]);

        builder
            .write_merge_spec(&EnsembleConfig::default().with_param("numpass", 2), &both)
            .await
            .unwrap();
        let path = builder
            .write_merge_spec(&EnsembleConfig::default().with_param("numpass", 1), &gatk_only)
            .await
            .unwrap();

        let doc: serde_yaml::Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["names"].as_sequence().map(Vec::len), Some(1));
        assert_eq!(doc["names"][0].as_str(), Some("gatk"));
        assert_eq!(doc["ensemble"]["numpass"].as_u64(), Some(1));
    }

    #[tokio::test]
    async fn test_changed_params_rescore_a_published_batch() {
        let fx = fixture();
        let a = calls(fx.dir.path(), "a.vcf", FAKE_VCF);
        let merged = merged_from(&[("gatk", a)]);
        let exec = ScriptedExecutor::new(|spec| {
            touch_outputs(spec)?;
            Ok(0)
        });
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        builder
            .build(&EnsembleConfig::default().with_param("numpass", 2), &merged)
            .await
            .unwrap();
        let again = builder
            .build(&EnsembleConfig::default().with_param("numpass", 2), &merged)
            .await
            .unwrap();
        assert!(again.cached);

        // Only the specification can be newer than the published file now.
        set_mtime(&merged.representatives[0].file, SystemTime::now() - Duration::from_secs(120));
        set_mtime(&fx.layout.ensemble_vcf(), SystemTime::now() - Duration::from_secs(60));

        let changed = builder
            .build(&EnsembleConfig::default().with_param("numpass", 1), &merged)
            .await
            .unwrap();

        assert!(!changed.cached);
        assert_eq!(exec.count(steps::ENSEMBLE_SCORING), 2);
    }

    #[tokio::test]
    async fn test_empty_scoring_output_falls_back_to_cfilter() {
        let fx = fixture();
        let a = calls(fx.dir.path(), "a.vcf", FAKE_VCF);
        let exec = ScriptedExecutor::new(|spec| {
            if spec.name == steps::ENSEMBLE_SCORING {
                let out = spec.produces[0].path();
                fs::write(out, "").unwrap();
                let prep = tool_work_dir(out).join("prep");
                fs::create_dir_all(&prep).unwrap();
                fs::write(prep.join("fam1-cfilter.vcf"), FAKE_VCF).unwrap();
            }
            Ok(0)
        });
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        let result = builder
            .build(&EnsembleConfig::default(), &merged_from(&[("gatk", a)]))
            .await
            .unwrap()
            .result;

        assert_eq!(fs::read_to_string(&result.vrn_file).unwrap(), FAKE_VCF);
    }

    #[tokio::test]
    async fn test_empty_scoring_output_without_fallback_is_not_published() {
        let fx = fixture();
        let a = calls(fx.dir.path(), "a.vcf", FAKE_VCF);
        let exec = ScriptedExecutor::new(|spec| {
            if spec.name == steps::ENSEMBLE_SCORING {
                fs::write(spec.produces[0].path(), "").unwrap();
            }
            Ok(0)
        });
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        let err = builder
            .build(&EnsembleConfig::default(), &merged_from(&[("gatk", a)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            crate::error::EnsembleError::Stage(StageError::MissingOutput { .. })
        ));
        assert!(!fx.layout.ensemble_vcf().exists());
    }

    #[tokio::test]
    async fn test_rerun_without_regions_drops_stale_bed() {
        let fx = fixture();
        let a = calls(fx.dir.path(), "a.vcf", FAKE_VCF);
        let merged = merged_from(&[("gatk", a.clone())]);
        let write_bed = Arc::new(AtomicBool::new(true));
        let scripted_bed = Arc::clone(&write_bed);
        let exec = ScriptedExecutor::new(move |spec| {
            touch_outputs(spec)?;
            if spec.name == steps::ENSEMBLE_SCORING && scripted_bed.load(Ordering::SeqCst) {
                let prep = tool_work_dir(spec.produces[0].path()).join("prep");
                fs::create_dir_all(&prep).unwrap();
                fs::write(prep.join("fam1-multicombine.bed"), "chr1\t0\t1000\n").unwrap();
            }
            Ok(0)
        });
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        let first = builder.build(&EnsembleConfig::default(), &merged).await.unwrap();
        assert_eq!(first.result.bed_file, Some(fx.layout.callregions_bed()));

        write_bed.store(false, Ordering::SeqCst);
        set_mtime(&fx.layout.ensemble_vcf(), SystemTime::now() - Duration::from_secs(60));
        set_mtime(&a, SystemTime::now());
        let second = builder.build(&EnsembleConfig::default(), &merged).await.unwrap();

        assert!(!second.cached);
        assert!(second.result.bed_file.is_none());
        assert!(!fx.layout.callregions_bed().exists());
    }

    #[tokio::test]
    async fn test_empty_recall_output_is_missing_output() {
        let fx = fixture();
        let a = calls(fx.dir.path(), "a.vcf", FAKE_VCF);
        let exec = ScriptedExecutor::new(|spec| {
            if spec.name == steps::ENSEMBLE_RECALL {
                fs::write(spec.produces[0].path(), "").unwrap();
            }
            Ok(0)
        });
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        let err = builder
            .build(&EnsembleConfig::recall_with("freebayes"), &merged_from(&[("gatk", a)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            crate::error::EnsembleError::Stage(StageError::MissingOutput { .. })
        ));
        assert!(!fx.layout.ensemble_vcf().exists());
        assert_eq!(exec.count(steps::EFFECTS), 0);
    }

    #[tokio::test]
    async fn test_recall_annotates_when_database_configured() {
        let mut fx = fixture();
        fx.config.snpeff_db = Some("GRCh38.86".to_string());
        let a = calls(fx.dir.path(), "a.vcf", FAKE_VCF);
        let exec = ScriptedExecutor::succeeding();
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        let result = builder
            .build(&EnsembleConfig::recall_with("freebayes"), &merged_from(&[("gatk", a)]))
            .await
            .unwrap()
            .result;

        assert_eq!(result.vrn_file, fx.layout.effects_vcf(&fx.layout.ensemble_vcf()));
        assert!(result.bed_file.is_none());
        assert_eq!(exec.count(steps::ENSEMBLE_RECALL), 1);
        assert_eq!(exec.count(steps::EFFECTS), 1);
        let recall = &exec.calls()[0];
        assert_eq!(recall.command.last().map(String::as_str), Some("/b/s1.bam"));
    }

    #[tokio::test]
    async fn test_recall_without_database_skips_annotation() {
        let fx = fixture();
        let a = calls(fx.dir.path(), "a.vcf", FAKE_VCF);
        let exec = ScriptedExecutor::succeeding();
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        let result = builder
            .build(&EnsembleConfig::recall_with("freebayes"), &merged_from(&[("gatk", a)]))
            .await
            .unwrap()
            .result;

        assert_eq!(result.vrn_file, fx.layout.ensemble_vcf());
        assert_eq!(exec.count(steps::EFFECTS), 0);
    }

    #[tokio::test]
    async fn test_validate_is_none_without_truth_set() {
        let fx = fixture();
        let exec = ScriptedExecutor::succeeding();
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);
        let result = EnsembleResult::new(fx.layout.ensemble_vcf(), None);

        assert!(builder.validate(&result).await.unwrap().is_none());
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_validate_grades_into_batch_dir() {
        let mut fx = fixture();
        let truth = calls(fx.dir.path(), "truth.vcf", FAKE_VCF);
        fx.config.validation = Some(crate::config::ValidationConfig {
            truth_vcf: truth.clone(),
            reference_sdf: PathBuf::from("/ref/hg38.sdf"),
        });
        let out = fx.layout.ensemble_vcf();
        fs::create_dir_all(out.parent().unwrap()).unwrap();
        fs::write(&out, FAKE_VCF).unwrap();
        let exec = ScriptedExecutor::new(|spec| {
            touch_outputs(spec)?;
            Ok(0)
        });
        let builder = ConsensusBuilder::new(&fx.config, &fx.toolbox, &exec, &fx.layout);

        let summary = builder
            .validate(&EnsembleResult::new(&out, None))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.truth_set, truth);
        assert_eq!(summary.grading_dir, fx.layout.validation_dir());
        assert!(summary.summary_file.exists());
    }
}
