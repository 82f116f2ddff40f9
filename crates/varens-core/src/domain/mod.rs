//! Domain model: samples, their call results, batches and ensemble outputs.

pub mod batch;
pub mod ensemble;
pub mod sample;

pub use batch::Batch;
pub use ensemble::{EnsembleResult, ValidationSummary};
pub use sample::{CallResult, Sample, ENSEMBLE_CALLER};
