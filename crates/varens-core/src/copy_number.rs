//! Copy-number calling from pre-segmented coverage bins.
//!
//! The tumor sample's normalized bins are cleaned of overlapping intervals,
//! segmented, then handed to the purity/ploidy-aware caller together with its
//! somatic calls. The caller writes a fixed family of files next to each
//! other; they are staged as one set so a partial run publishes nothing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use varens_stage::{run_stage_set, run_step, StepExecutor};

use crate::domain::{Batch, Sample};
use crate::error::{EnsembleError, Result};
use crate::intervals::remove_overlaps;
use crate::toolbox::{staged_step, CopyNumberRequest, Toolbox};

/// Plots written by the copy-number caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyNumberPlots {
    pub chromosomes: PathBuf,
    pub local_optima: PathBuf,
    pub segmentation: PathBuf,
    pub summary: PathBuf,
}

/// Every file of one copy-number run, under `<work>/structural/<sample>/purecn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyNumberArtifactSet {
    pub out_base: PathBuf,
    pub plot: CopyNumberPlots,
    pub summary: PathBuf,
    pub dnacopy: PathBuf,
    pub genes: PathBuf,
    pub log: PathBuf,
    pub loh: PathBuf,
    pub rds: PathBuf,
    pub variants: PathBuf,
}

impl CopyNumberArtifactSet {
    pub fn work_dir(work_dir: &Path, sample: &str) -> PathBuf {
        work_dir.join("structural").join(sample).join("purecn")
    }

    pub fn for_sample(work_dir: &Path, sample: &str) -> Self {
        Self::with_base(Self::work_dir(work_dir, sample).join(format!("{sample}-purecn")))
    }

    fn with_base(out_base: PathBuf) -> Self {
        let base = out_base.to_string_lossy().into_owned();
        let file = |ext: &str| PathBuf::from(format!("{base}{ext}"));
        Self {
            plot: CopyNumberPlots {
                chromosomes: file("_chromosomes.pdf"),
                local_optima: file("_local_optima.pdf"),
                segmentation: file("_segmentation.pdf"),
                summary: file(".pdf"),
            },
            summary: file(".csv"),
            dnacopy: file("_dnacopy.seg"),
            genes: file("_genes.csv"),
            log: file(".log"),
            loh: file("_loh.csv"),
            rds: file(".rds"),
            variants: file("_variants.csv"),
            out_base,
        }
    }

    /// All files, plots first.
    pub fn all_files(&self) -> Vec<&Path> {
        vec![
            &self.plot.chromosomes,
            &self.plot.local_optima,
            &self.plot.segmentation,
            &self.plot.summary,
            &self.summary,
            &self.dnacopy,
            &self.genes,
            &self.log,
            &self.loh,
            &self.rds,
            &self.variants,
        ]
        .into_iter()
        .map(PathBuf::as_path)
        .collect()
    }

    /// The same set with every file moved under `dir`.
    fn rebased(&self, dir: &Path) -> Self {
        let name = self.out_base.file_name().map(PathBuf::from).unwrap_or_default();
        Self::with_base(dir.join(name))
    }
}

/// Tumor sample of a batch and its matched normal, if any.
#[derive(Debug, Clone, Copy)]
pub struct TumorNormalPair<'a> {
    pub tumor: &'a Sample,
    pub normal: Option<&'a Sample>,
}

/// First tumor sample plus the first non-tumor sample. `None` without a tumor.
pub fn paired_tumor_normal(batch: &Batch) -> Option<TumorNormalPair<'_>> {
    let tumor = batch.samples().iter().find(|s| s.is_tumor())?;
    let normal = batch.samples().iter().find(|s| !s.is_tumor());
    Some(TumorNormalPair { tumor, normal })
}

/// Build name the copy-number caller understands (UCSC naming for human builds).
fn caller_genome(build: &str) -> &str {
    match build {
        "GRCh37" | "hg19" => "hg19",
        other => other,
    }
}

/// Remove overlapping bins and segment them.
///
/// Returns the cleaned bins file and `<work_dir>/cnvkit/<sample>.seg`.
pub async fn segment_normalized(
    cnr_file: &Path,
    work_dir: &Path,
    sample: &str,
    toolbox: &Toolbox,
    executor: &dyn StepExecutor,
) -> Result<(PathBuf, PathBuf)> {
    let cnvkit_dir = work_dir.join("cnvkit");
    let cleaned = remove_overlaps(cnr_file, &cnvkit_dir).await?;
    let seg_file = cnvkit_dir.join(format!("{sample}.seg"));
    staged_step(executor, &seg_file, &[&cleaned], |tx| toolbox.segment(&cleaned, tx)).await?;
    Ok((cleaned, seg_file))
}

/// Run copy-number calling for a batch's tumor sample.
///
/// Skips (returns `None`) when the batch has no tumor, the tumor has no
/// normalized bins, or it has no call file to classify.
pub async fn run_copy_number(
    work_dir: &Path,
    genome_build: &str,
    batch: &Batch,
    toolbox: &Toolbox,
    executor: &dyn StepExecutor,
) -> Result<Option<CopyNumberArtifactSet>> {
    let Some(pair) = paired_tumor_normal(batch) else {
        info!(batch_id = %batch.id(), samples = %batch.sample_names().join(" "), "no tumor sample, skipping copy number");
        return Ok(None);
    };
    let tumor = pair.tumor;
    let Some(bins) = tumor.normalized_bins.as_deref() else {
        info!(sample = %tumor.name, "no normalized bins, skipping copy number");
        return Ok(None);
    };
    let Some(vcf) = tumor.calls.iter().find_map(|c| c.vrn_file.as_deref()) else {
        info!(sample = %tumor.name, "no somatic calls, skipping copy number");
        return Ok(None);
    };

    let cn_dir = CopyNumberArtifactSet::work_dir(work_dir, &tumor.name);
    let artifacts = CopyNumberArtifactSet::for_sample(work_dir, &tumor.name);
    let outputs = artifacts.all_files();
    let outcomes = run_stage_set(&outputs, &[bins], |tx_dir| {
        let (cn_dir, artifacts) = (&cn_dir, &artifacts);
        async move {
            let (cleaned, segments) =
                segment_normalized(bins, cn_dir, &tumor.name, toolbox, executor)
                    .await
                    .map_err(EnsembleError::into_stage)?;
            let tx_set = artifacts.rebased(&tx_dir);
            let request = CopyNumberRequest {
                out_base: &tx_set.out_base,
                sample: &tumor.name,
                genome: caller_genome(genome_build),
                vcf,
                bins: &cleaned,
                segments: &segments,
            };
            let produces: Vec<PathBuf> = tx_set.all_files().into_iter().map(Path::to_path_buf).collect();
            let spec = toolbox.copy_number(&request, &produces);
            run_step(executor, &spec).await.map(|_| ())
        }
    })
    .await?;

    info!(
        sample = %tumor.name,
        normal = ?pair.normal.map(|n| n.name.as_str()),
        cached = outcomes.iter().all(|o| o.cached),
        "copy number calling"
    );
    Ok(Some(artifacts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolPaths;
    use crate::domain::CallResult;
    use crate::toolbox::steps;
    use varens_stage::fakes::{ScriptedExecutor, FAKE_VCF};

    #[test]
    fn test_artifact_set_layout() {
        let set = CopyNumberArtifactSet::for_sample(Path::new("/work"), "T1");
        let dir = Path::new("/work/structural/T1/purecn");
        assert_eq!(set.out_base, dir.join("T1-purecn"));
        assert_eq!(set.plot.summary, dir.join("T1-purecn.pdf"));
        assert_eq!(set.plot.local_optima, dir.join("T1-purecn_local_optima.pdf"));
        assert_eq!(set.rds, dir.join("T1-purecn.rds"));
        assert_eq!(set.dnacopy, dir.join("T1-purecn_dnacopy.seg"));
        assert_eq!(set.all_files().len(), 11);
        assert!(set.all_files().iter().all(|f| f.parent() == Some(dir)));
    }

    #[test]
    fn test_pairing_picks_tumor_and_normal() {
        let batch = Batch::new(
            "p1",
            vec![
                Sample::new("N").with_phenotype("normal"),
                Sample::new("T").with_phenotype("tumor"),
            ],
        );
        let pair = paired_tumor_normal(&batch).unwrap();
        assert_eq!(pair.tumor.name, "T");
        assert_eq!(pair.normal.map(|n| n.name.as_str()), Some("N"));

        let germline = Batch::new("g1", vec![Sample::new("N").with_phenotype("normal")]);
        assert!(paired_tumor_normal(&germline).is_none());
    }

    #[test]
    fn test_caller_genome_uses_ucsc_names_for_grch37() {
        assert_eq!(caller_genome("GRCh37"), "hg19");
        assert_eq!(caller_genome("hg38"), "hg38");
    }

    #[tokio::test]
    async fn test_skips_without_bins() {
        let dir = tempfile::tempdir().unwrap();
        let batch = Batch::new(
            "p1",
            vec![Sample::new("T")
                .with_phenotype("tumor")
                .with_call(CallResult::new("mutect", "/c/T.vcf"))],
        );
        let exec = ScriptedExecutor::succeeding();
        let toolbox = Toolbox::new(ToolPaths::default(), 1, 0);

        let out = run_copy_number(dir.path(), "hg38", &batch, &toolbox, &exec)
            .await
            .unwrap();

        assert!(out.is_none());
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_segments_then_calls_and_publishes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let bins = dir.path().join("T.cnr");
        std::fs::write(&bins, "chromosome\tstart\tend\tlog2\nchr1\t1\t100\t0.1\nchr1\t50\t200\t0.2\n").unwrap();
        let vcf = dir.path().join("T.vcf");
        std::fs::write(&vcf, FAKE_VCF).unwrap();
        let batch = Batch::new(
            "p1",
            vec![Sample::new("T")
                .with_phenotype("tumor")
                .with_normalized_bins(&bins)
                .with_call(CallResult::new("mutect", &vcf))],
        );
        let exec = ScriptedExecutor::succeeding();
        let toolbox = Toolbox::new(ToolPaths::default(), 4, 0);

        let set = run_copy_number(dir.path(), "GRCh37", &batch, &toolbox, &exec)
            .await
            .unwrap()
            .unwrap();

        assert!(set.all_files().iter().all(|f| f.exists()));
        assert_eq!(exec.count(steps::SEGMENTATION), 1);
        assert_eq!(exec.count(steps::COPY_NUMBER), 1);
        let cn = exec
            .calls()
            .into_iter()
            .find(|s| s.name == steps::COPY_NUMBER)
            .unwrap();
        assert!(cn.command.windows(2).any(|w| w == ["--genome", "hg19"]));
        assert!(cn.command.windows(2).any(|w| w == ["--cores", "4"]));
        let cleaned = CopyNumberArtifactSet::work_dir(dir.path(), "T").join("cnvkit/T-nooverlaps.cnr");
        assert_eq!(
            std::fs::read_to_string(cleaned).unwrap(),
            "chromosome\tstart\tend\tlog2\nchr1\t50\t200\t0.2\n"
        );

        let again = run_copy_number(dir.path(), "GRCh37", &batch, &toolbox, &exec)
            .await
            .unwrap();
        assert!(again.is_some());
        assert_eq!(exec.count(steps::COPY_NUMBER), 1);
    }
}
