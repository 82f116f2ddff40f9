//! Argument vectors for the external collaborators.
//!
//! Each `Toolbox` method returns a `StepSpec` with a fixed command line and
//! the outputs it will write. `staged_step` runs one such spec under the
//! stage marker.

use std::path::{Path, PathBuf};

use varens_stage::{run_stage, run_step, StageOutcome, StageResult, StepExecutor, StepSpec};

use crate::config::{PipelineConfig, ToolPaths};

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn args<P: AsRef<Path>>(paths: &[P]) -> impl Iterator<Item = String> + '_ {
    paths.iter().map(|p| arg(p.as_ref()))
}

/// Step names, shared by logs, errors and test fakes.
pub mod steps {
    pub const TUMOR_FILTER: &str = "tumor_filter";
    pub const MULTISAMPLE_MERGE: &str = "multisample_merge";
    pub const ENSEMBLE_SCORING: &str = "ensemble_scoring";
    pub const ENSEMBLE_RECALL: &str = "ensemble_recall";
    pub const EFFECTS: &str = "effects";
    pub const VALIDATION: &str = "validation";
    pub const SEGMENTATION: &str = "segmentation";
    pub const COPY_NUMBER: &str = "copy_number";
}

/// Builds commands from configured program paths.
#[derive(Debug, Clone)]
pub struct Toolbox {
    tools: ToolPaths,
    num_cores: usize,
    timeout_secs: u64,
}

impl Toolbox {
    pub fn new(tools: ToolPaths, num_cores: usize, timeout_secs: u64) -> Self {
        Self {
            tools,
            num_cores: num_cores.max(1),
            timeout_secs,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.tools.clone(),
            config.num_cores,
            config.step_timeout_secs,
        )
    }

    fn step(&self, name: &str, command: Vec<String>) -> StepSpec {
        StepSpec::new(name, command).with_timeout(self.timeout_secs)
    }

    fn output_format(output: &Path) -> &'static str {
        if output.extension().is_some_and(|e| e == "gz") {
            "z"
        } else {
            "v"
        }
    }

    /// Keep only `sample`'s column and PASS or missing-filter records.
    pub fn select_tumor_calls(&self, input: &Path, sample: &str, output: &Path) -> StepSpec {
        let command = vec![
            self.tools.bcftools.clone(),
            "view".to_string(),
            "-s".to_string(),
            sample.to_string(),
            "-f".to_string(),
            "PASS,.".to_string(),
            "-O".to_string(),
            Self::output_format(output).to_string(),
            "-o".to_string(),
            arg(output),
            arg(input),
        ];
        self.step(steps::TUMOR_FILTER, command).produces_file(output)
    }

    /// Combine single-sample files from one caller into a multi-sample file.
    pub fn multisample_merge<P: AsRef<Path>>(&self, inputs: &[P], output: &Path) -> StepSpec {
        let mut command = vec![
            self.tools.bcftools.clone(),
            "merge".to_string(),
            "--threads".to_string(),
            self.num_cores.to_string(),
            "-O".to_string(),
            Self::output_format(output).to_string(),
            "-o".to_string(),
            arg(output),
        ];
        command.extend(args(inputs));
        self.step(steps::MULTISAMPLE_MERGE, command).produces_file(output)
    }

    /// Merge-and-score ensemble run. The tool resolves intermediates relative
    /// to `working_dir` and writes its scratch files to `<output stem>-work`.
    pub fn variant_ensemble<P: AsRef<Path>>(
        &self,
        merge_spec: &Path,
        reference: &Path,
        output: &Path,
        inputs: &[P],
        tmp_dir: &Path,
        working_dir: &Path,
    ) -> StepSpec {
        let mut command = vec![self.tools.java.clone()];
        command.extend(self.tools.jvm_opts.iter().cloned());
        command.push(format!("-Djava.io.tmpdir={}", arg(tmp_dir)));
        command.extend([
            "-jar".to_string(),
            arg(&self.tools.bcbio_variation_jar),
            "variant-ensemble".to_string(),
            arg(merge_spec),
            arg(reference),
            arg(output),
        ]);
        command.extend(args(inputs));
        self.step(steps::ENSEMBLE_SCORING, command)
            .in_dir(working_dir)
            .produces_file(output)
    }

    /// Re-call candidate sites from every input with one caller.
    pub fn ensemble_recall<P: AsRef<Path>, B: AsRef<Path>>(
        &self,
        caller: &str,
        output: &Path,
        reference: &Path,
        inputs: &[P],
        alignments: &[B],
    ) -> StepSpec {
        let mut command = vec![
            self.tools.bcbio_variation_recall.clone(),
            "ensemble".to_string(),
            format!("--cores={}", self.num_cores),
            format!("--caller={caller}"),
            arg(output),
            arg(reference),
        ];
        command.extend(args(inputs));
        command.extend(args(alignments));
        self.step(steps::ENSEMBLE_RECALL, command).produces_file(output)
    }

    /// Effects annotation; the tool writes VCF to stdout.
    pub fn effects(&self, database: &str, input: &Path, output: &Path) -> StepSpec {
        let command = vec![
            self.tools.snpeff.clone(),
            "eff".to_string(),
            "-noStats".to_string(),
            "-i".to_string(),
            "vcf".to_string(),
            "-o".to_string(),
            "vcf".to_string(),
            database.to_string(),
            arg(input),
        ];
        self.step(steps::EFFECTS, command).stdout_to(output)
    }

    /// Grade calls against a truth set into `output_dir`.
    pub fn truth_comparison(
        &self,
        truth: &Path,
        calls: &Path,
        reference_sdf: &Path,
        output_dir: &Path,
    ) -> StepSpec {
        let command = vec![
            self.tools.rtg.clone(),
            "vcfeval".to_string(),
            "--threads".to_string(),
            self.num_cores.to_string(),
            "-b".to_string(),
            arg(truth),
            "-c".to_string(),
            arg(calls),
            "-t".to_string(),
            arg(reference_sdf),
            "-o".to_string(),
            arg(output_dir),
        ];
        self.step(steps::VALIDATION, command).produces_dir(output_dir)
    }

    /// Segment normalized coverage bins.
    pub fn segment(&self, bins: &Path, output: &Path) -> StepSpec {
        let command = vec![
            self.tools.cnvkit.clone(),
            "segment".to_string(),
            "-p".to_string(),
            self.num_cores.to_string(),
            "-o".to_string(),
            arg(output),
            arg(bins),
        ];
        self.step(steps::SEGMENTATION, command).produces_file(output)
    }

    /// Purity/ploidy-aware copy-number calling from pre-segmented inputs.
    ///
    /// Outputs are named from `out_base`; `produces` lists every one.
    pub fn copy_number(&self, request: &CopyNumberRequest<'_>, produces: &[PathBuf]) -> StepSpec {
        let mut command = vec![
            self.tools.purecn.clone(),
            "--seed".to_string(),
            "42".to_string(),
            "--out".to_string(),
            arg(request.out_base),
            "--rds".to_string(),
            format!("{}.rds", arg(request.out_base)),
            "--sampleid".to_string(),
            request.sample.to_string(),
            "--genome".to_string(),
            request.genome.to_string(),
            "--vcf".to_string(),
            arg(request.vcf),
            "--tumor".to_string(),
            arg(request.bins),
            "--segfile".to_string(),
            arg(request.segments),
            "--funsegmentation".to_string(),
            "Hclust".to_string(),
            "--maxnonclonal".to_string(),
            "0.3".to_string(),
        ];
        if self.num_cores > 1 {
            command.push("--cores".to_string());
            command.push(self.num_cores.to_string());
        }
        produces
            .iter()
            .fold(self.step(steps::COPY_NUMBER, command), |spec, p| {
                spec.produces_file(p)
            })
    }
}

/// Run the step built by `build` unless `output` is fresh against `inputs`.
///
/// `build` receives the transaction path and must point the tool at it.
pub async fn staged_step<O, P, F>(
    executor: &dyn StepExecutor,
    output: O,
    inputs: &[P],
    build: F,
) -> StageResult<StageOutcome>
where
    O: AsRef<Path>,
    P: AsRef<Path>,
    F: FnOnce(&Path) -> StepSpec,
{
    run_stage(output, inputs, |tx_path| async move {
        let spec = build(&tx_path);
        run_step(executor, &spec).await.map(|_| ())
    })
    .await
}

/// Inputs to a copy-number run.
#[derive(Debug, Clone, Copy)]
pub struct CopyNumberRequest<'a> {
    pub out_base: &'a Path,
    pub sample: &'a str,
    pub genome: &'a str,
    pub vcf: &'a Path,
    pub bins: &'a Path,
    pub segments: &'a Path,
}
