//! In-memory fakes for the step executor (testing only)
//!
//! `ScriptedExecutor` records every step it is asked to run and answers with a
//! scripted exit code instead of spawning a process.

use std::fs;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{IoContext, StageResult};
use crate::runner::{StepExecutor, StepResult};
use crate::step::{Produces, StepSpec};

/// Content written for every file a fake step declares. It has one record so
/// downstream "has any records" checks see real data.
pub const FAKE_VCF: &str = "##fileformat=VCFv4.2\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t100\t.\tA\tT\t50\tPASS\t.\n";

type Handler = dyn Fn(&StepSpec) -> StageResult<i32> + Send + Sync;

/// Step executor driven by a closure.
pub struct ScriptedExecutor {
    calls: Mutex<Vec<StepSpec>>,
    handler: Box<Handler>,
}

impl ScriptedExecutor {
    /// The handler returns the exit code for each step.
    pub fn new(handler: impl Fn(&StepSpec) -> StageResult<i32> + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Every step succeeds and writes its declared outputs.
    pub fn succeeding() -> Self {
        Self::new(|spec| {
            touch_outputs(spec)?;
            Ok(0)
        })
    }

    /// Steps named `step` exit 1 without output; everything else succeeds.
    pub fn failing_on(step: impl Into<String>) -> Self {
        let step = step.into();
        Self::new(move |spec| {
            if spec.name == step {
                return Ok(1);
            }
            touch_outputs(spec)?;
            Ok(0)
        })
    }

    /// All steps run so far, in order.
    pub fn calls(&self) -> Vec<StepSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of steps run with the given name.
    pub fn count(&self, step: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == step)
            .count()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, spec: &StepSpec) -> StageResult<StepResult> {
        self.calls.lock().unwrap().push(spec.clone());
        let exit_code = (self.handler)(spec)?;
        Ok(StepResult {
            step_name: spec.name.clone(),
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                format!("{} failed", spec.name)
            },
            duration_ms: 0,
            success: exit_code == 0,
        })
    }
}

/// Materialize every declared output of `spec` with placeholder content.
pub fn touch_outputs(spec: &StepSpec) -> StageResult<()> {
    for output in &spec.produces {
        match output {
            Produces::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).at(parent)?;
                }
                fs::write(path, FAKE_VCF).at(path)?;
            }
            Produces::Dir(path) => {
                fs::create_dir_all(path).at(path)?;
                let summary = path.join("summary.txt");
                fs::write(&summary, "Threshold  True-pos  False-pos  False-neg\n").at(&summary)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_touches_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("merged.vcf.gz");
        let exec = ScriptedExecutor::succeeding();
        let spec = StepSpec::new("multisample_merge", vec!["bcftools".to_string()])
            .produces_file(&out);

        let result = exec.execute(&spec).await.unwrap();

        assert!(result.passed());
        assert_eq!(exec.count("multisample_merge"), 1);
        assert_eq!(fs::read_to_string(&out).unwrap(), FAKE_VCF);
    }

    #[tokio::test]
    async fn failing_on_named_step() {
        let exec = ScriptedExecutor::failing_on("scoring");
        let ok = StepSpec::new("merge", vec!["x".to_string()]);
        let bad = StepSpec::new("scoring", vec!["y".to_string()]);

        assert!(exec.execute(&ok).await.unwrap().passed());
        assert!(!exec.execute(&bad).await.unwrap().passed());
        assert_eq!(exec.calls().len(), 2);
    }
}
