//! varens stage - idempotent staged execution
//!
//! Provides the primitives every artifact-producing step is built on:
//! - `Artifact`: a path plus its freshness check against declared inputs
//! - `run_stage` / `run_stage_set`: skip fresh outputs, otherwise produce into
//!   a transaction directory and publish by rename
//! - `StepExecutor`: the narrow capability used to run external tools

pub mod artifact;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod retry;
pub mod runner;
pub mod step;

// Re-export key types
pub use artifact::Artifact;
pub use engine::{link_or_copy, run_stage, run_stage_set, StageOutcome};
pub use error::{IoContext, StageError, StageResult};
pub use retry::RetryingExecutor;
pub use runner::{run_step, ProcessExecutor, StepExecutor, StepResult};
pub use step::{Produces, StepSpec};
