//! Structured lifecycle events for runs and batches.
//!
//! Every batch task runs inside a `varens.batch` span carrying `batch_id`, so
//! stage events emitted by the engine inherit it. Events are emitted at
//! `info!` unless noted; filter with `RUST_LOG`.

use tracing::{info, warn, Span};

use crate::error::BatchError;

/// Span for one batch task. Attach with `Instrument::instrument`; an entered
/// guard must not be held across `.await`.
pub fn batch_span(batch_id: &str) -> Span {
    tracing::info_span!("varens.batch", batch_id = %batch_id)
}

/// Run-scoped span for the whole pipeline invocation.
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("varens.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, batches: usize, pass_through: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        batches = batches,
        pass_through = pass_through,
    );
}

pub fn emit_run_finished(run_id: &str, succeeded: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        succeeded = succeeded,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Batch entered the merge stage with these callers.
pub fn emit_batch_started(batch_id: &str, samples: usize, callers: &[String]) {
    info!(
        event = "batch.started",
        batch_id = %batch_id,
        samples = samples,
        callers = %callers.join(","),
    );
}

pub fn emit_batch_finished(batch_id: &str, output: &std::path::Path, cached: bool, duration_ms: u64) {
    info!(
        event = "batch.finished",
        batch_id = %batch_id,
        output = %output.display(),
        cached = cached,
        duration_ms = duration_ms,
    );
}

/// Batch failed; logged at warn since other batches keep running.
pub fn emit_batch_failed(err: &BatchError) {
    warn!(
        event = "batch.failed",
        batch_id = %err.batch_id,
        stage = %err.stage,
        exit_code = ?err.exit_code(),
        error = %err.source,
    );
}

/// No input had a record; an empty callset was written instead.
pub fn emit_consensus_degenerate(batch_id: &str, output: &std::path::Path) {
    info!(
        event = "consensus.degenerate",
        batch_id = %batch_id,
        output = %output.display(),
    );
}

pub fn emit_consensus_built(batch_id: &str, strategy: &str, output: &std::path::Path, cached: bool) {
    info!(
        event = "consensus.built",
        batch_id = %batch_id,
        strategy = %strategy,
        output = %output.display(),
        cached = cached,
    );
}
