//! Batch pipeline: grouping, then merge and consensus per batch.
//!
//! Each batch runs as its own tokio task; a semaphore caps how many run at
//! once. Stages inside a batch are sequential. A batch that fails is reported
//! and its samples are returned unchanged, without stopping other batches.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::Instrument;
use varens_stage::{ProcessExecutor, RetryingExecutor, StepExecutor};

use crate::config::PipelineConfig;
use crate::consensus::ConsensusBuilder;
use crate::copy_number::{run_copy_number, CopyNumberArtifactSet};
use crate::domain::{Batch, EnsembleResult, Sample};
use crate::error::{BatchError, EnsembleError, PipelineStage};
use crate::grouping::group_by_batches;
use crate::merge::{MergedCalls, MultiCallerMerger};
use crate::obs;
use crate::paths::BatchLayout;
use crate::report::{file_digest, BatchReport, BatchStatus, RunReport};
use crate::toolbox::Toolbox;

const RETRY_BACKOFF_MS: u64 = 500;

/// Everything a successful batch produced.
#[derive(Debug, Clone)]
pub struct BatchSuccess {
    pub ensemble: EnsembleResult,
    pub merged: MergedCalls,
    /// The ensemble file was already fresh.
    pub cached: bool,
    pub copy_number: Option<CopyNumberArtifactSet>,
}

/// Result of one batch task, with the batch handed back.
#[derive(Debug)]
pub struct BatchOutcome {
    pub batch: Batch,
    pub result: Result<BatchSuccess, BatchError>,
    pub duration_ms: u64,
}

impl BatchOutcome {
    fn report(&self) -> BatchReport {
        let samples = self.batch.sample_names().into_iter().map(String::from).collect();
        let mut report = BatchReport {
            batch_id: self.batch.id().to_string(),
            samples,
            status: BatchStatus::Succeeded,
            ensemble_file: None,
            bed_file: None,
            output_digest: None,
            validation_dir: None,
            copy_number_rds: None,
            cached: false,
            duration_ms: self.duration_ms,
        };
        match &self.result {
            Ok(success) => {
                let ensemble = &success.ensemble;
                report.output_digest = file_digest(&ensemble.vrn_file).ok();
                report.ensemble_file = Some(ensemble.vrn_file.clone());
                report.bed_file = ensemble.bed_file.clone();
                report.validation_dir = ensemble.validate.as_ref().map(|v| v.grading_dir.clone());
                report.copy_number_rds = success.copy_number.as_ref().map(|c| c.rds.clone());
                report.cached = success.cached;
            }
            Err(err) => report.status = BatchStatus::from(err),
        }
        report
    }

    /// Member samples, with the ensemble result first when there is one.
    fn into_samples(self) -> Vec<Sample> {
        match self.result {
            Ok(success) => inject_ensemble(self.batch.into_samples(), &success.ensemble),
            Err(_) => self.batch.into_samples(),
        }
    }
}

fn inject_ensemble(samples: Vec<Sample>, ensemble: &EnsembleResult) -> Vec<Sample> {
    let call = ensemble.to_call_result();
    samples
        .into_iter()
        .map(|mut sample| {
            sample.calls.insert(0, call.clone());
            sample
        })
        .collect()
}

/// Samples out, plus the report of how each batch went.
#[derive(Debug)]
pub struct RunOutput {
    pub samples: Vec<Sample>,
    pub report: RunReport,
}

/// Shared, cheaply clonable pipeline handle.
#[derive(Clone)]
pub struct EnsemblePipeline {
    config: Arc<PipelineConfig>,
    toolbox: Arc<Toolbox>,
    executor: Arc<dyn StepExecutor>,
}

impl EnsemblePipeline {
    pub fn new(config: PipelineConfig, executor: Arc<dyn StepExecutor>) -> Self {
        let toolbox = Toolbox::from_config(&config);
        Self {
            config: Arc::new(config),
            toolbox: Arc::new(toolbox),
            executor,
        }
    }

    /// Pipeline running real processes, retried per `config.retries`.
    pub fn with_processes(config: PipelineConfig) -> Self {
        let executor: Arc<dyn StepExecutor> = if config.retries > 0 {
            Arc::new(RetryingExecutor::new(
                ProcessExecutor,
                config.retries,
                RETRY_BACKOFF_MS,
            ))
        } else {
            Arc::new(ProcessExecutor)
        };
        Self::new(config, executor)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Merge, build consensus, validate and (optionally) call copy number for one batch.
    pub async fn combine_calls(&self, batch: &Batch) -> Result<BatchSuccess, BatchError> {
        let batch_id = batch.id();
        let fail = |stage: PipelineStage| move |source: EnsembleError| BatchError::new(batch_id, stage, source);
        let layout = BatchLayout::new(&self.config.work_dir, batch_id);
        let executor = self.executor.as_ref();

        let ensemble_config = batch.ensemble_config().cloned().ok_or_else(|| {
            fail(PipelineStage::Consensus)(EnsembleError::InvalidConfig(format!(
                "batch {batch_id} has no ensemble settings"
            )))
        })?;

        let merger = MultiCallerMerger::new(&self.toolbox, executor, &layout);
        let (files, merged) = merger.run(batch).await.map_err(fail(PipelineStage::Merge))?;
        obs::emit_batch_started(batch_id, batch.samples().len(), files.callers());

        let builder = ConsensusBuilder::new(&self.config, &self.toolbox, executor, &layout);
        let consensus = builder
            .build(&ensemble_config, &merged)
            .await
            .map_err(fail(PipelineStage::Consensus))?;
        let mut ensemble = consensus.result;

        if !consensus.degenerate {
            ensemble.validate = builder
                .validate(&ensemble)
                .await
                .map_err(fail(PipelineStage::Validation))?;
        }

        let copy_number = if self.config.copy_number {
            let annotated = Batch::new(
                batch_id,
                inject_ensemble(batch.samples().to_vec(), &ensemble),
            );
            run_copy_number(
                &self.config.work_dir,
                &self.config.genome_build,
                &annotated,
                &self.toolbox,
                executor,
            )
            .await
            .map_err(fail(PipelineStage::CopyNumber))?
        } else {
            None
        };

        Ok(BatchSuccess {
            ensemble,
            merged,
            cached: consensus.cached,
            copy_number,
        })
    }

    /// Group `samples`, process every batch concurrently and reassemble.
    ///
    /// Output order: batch members in batch first-seen order, each with the
    /// ensemble result at the front of its calls, then the pass-through
    /// samples in their original order.
    ///
    /// # Panics
    ///
    /// On inconsistent batch keys; see [`group_by_batches`].
    pub async fn combine_calls_parallel(&self, samples: Vec<Sample>) -> RunOutput {
        let mut report = RunReport::start();
        let run_id = report.run_id.to_string();
        let grouping = group_by_batches(samples, Sample::has_ensemble);
        let (batches, extras) = grouping.into_parts();
        report.pass_through = extras.iter().map(|s| s.name.clone()).collect();
        obs::emit_run_started(&run_id, batches.len(), extras.len());

        let run_span = obs::run_span(&run_id);
        let sem = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut tasks = Vec::with_capacity(batches.len());
        for batch in batches {
            let pipeline = self.clone();
            let sem = Arc::clone(&sem);
            let span = run_span.in_scope(|| obs::batch_span(batch.id()));
            tasks.push(tokio::spawn(
                async move {
                    let _permit = sem.acquire_owned().await.ok();
                    let started = Instant::now();
                    let result = pipeline.combine_calls(&batch).await;
                    let duration_ms = started.elapsed().as_millis() as u64;
                    match &result {
                        Ok(success) => obs::emit_batch_finished(
                            batch.id(),
                            &success.ensemble.vrn_file,
                            success.cached,
                            duration_ms,
                        ),
                        Err(err) => obs::emit_batch_failed(err),
                    }
                    BatchOutcome {
                        batch,
                        result,
                        duration_ms,
                    }
                }
                .instrument(span),
            ));
        }

        let mut out = Vec::new();
        for joined in join_all(tasks).await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                // Batch tasks are never aborted, so a join error is a panic
                // (or runtime shutdown) and is re-raised here.
                Err(err) => match err.try_into_panic() {
                    Ok(payload) => std::panic::resume_unwind(payload),
                    Err(err) => panic!("batch task cancelled: {err}"),
                },
            };
            report.batches.push(outcome.report());
            out.extend(outcome.into_samples());
        }
        out.extend(extras);

        report.finish();
        let failed = report.failed().count();
        obs::emit_run_finished(
            &run_id,
            report.batches.len() - failed,
            failed,
            report.duration_ms(),
        );
        RunOutput {
            samples: out,
            report,
        }
    }
}
