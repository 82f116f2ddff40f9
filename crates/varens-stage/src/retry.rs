//! Opt-in retry for flaky external tools.
//!
//! The staging engine never retries on its own. Callers that know a tool is
//! flaky wrap their executor in `RetryingExecutor`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::StageResult;
use crate::runner::{StepExecutor, StepResult};
use crate::step::StepSpec;

/// Retries failed steps with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryingExecutor<E> {
    inner: E,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl<E: StepExecutor> RetryingExecutor<E> {
    /// `max_retries` = 0 runs each step once.
    pub fn new(inner: E, max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            inner,
            max_retries,
            backoff_base_ms,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

#[async_trait]
impl<E: StepExecutor> StepExecutor for RetryingExecutor<E> {
    async fn execute(&self, spec: &StepSpec) -> StageResult<StepResult> {
        let mut attempt = 0;
        loop {
            let outcome = self.inner.execute(spec).await;
            let failed = match &outcome {
                Ok(result) => !result.passed(),
                Err(_) => true,
            };
            if !failed || attempt >= self.max_retries {
                return outcome;
            }
            warn!(step = %spec.name, attempt = attempt + 1, "step failed, retrying");
            tokio::time::sleep(self.backoff(attempt)).await;
            attempt += 1;
        }
    }
}
