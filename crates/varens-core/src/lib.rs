//! varens core library
//!
//! Ensemble coordination of variant calls: batch grouping, per-caller
//! merging, consensus building and the per-batch pipeline tying them
//! together. Every external step runs through `varens-stage`, so reruns skip
//! finished work.

pub mod config;
pub mod consensus;
pub mod copy_number;
pub mod domain;
pub mod error;
pub mod grouping;
pub mod intervals;
pub mod merge;
pub mod obs;
pub mod paths;
pub mod pipeline;
pub mod report;
pub mod telemetry;
pub mod toolbox;
pub mod vcf;

pub use config::{ConsensusStrategy, EnsembleConfig, PipelineConfig, ToolPaths, ValidationConfig};
pub use consensus::{ConsensusBuilder, ConsensusOutcome};
pub use copy_number::{
    paired_tumor_normal, run_copy_number, segment_normalized, CopyNumberArtifactSet,
    CopyNumberPlots, TumorNormalPair,
};
pub use domain::{Batch, CallResult, EnsembleResult, Sample, ValidationSummary, ENSEMBLE_CALLER};
pub use error::{BatchError, EnsembleError, PipelineStage, Result};
pub use grouping::{group_by_batches, BatchGrouping};
pub use intervals::{
    remove_overlaps, resolve_overlaps, IntervalReader, IntervalRecord, ResolveOverlaps,
    ResolveOverlapsExt,
};
pub use merge::{CallerFileSet, CallerFileSetBuilder, CallerRepresentative, MergedCalls, MultiCallerMerger};
pub use obs::{
    batch_span, emit_batch_failed, emit_batch_finished, emit_batch_started,
    emit_consensus_built, emit_consensus_degenerate, emit_run_finished, emit_run_started,
    run_span,
};
pub use paths::BatchLayout;
pub use pipeline::{BatchOutcome, BatchSuccess, EnsemblePipeline, RunOutput};
pub use report::{file_digest, BatchReport, BatchStatus, RunReport};
pub use telemetry::init_tracing;
pub use toolbox::{staged_step, steps, Toolbox};
