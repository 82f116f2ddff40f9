//! Staged execution: skip fresh outputs, otherwise produce then publish.
//!
//! Producers never write to the final path. They receive a path inside a
//! transaction directory created next to the output, and the result is moved
//! into place with a rename only after the producer returns `Ok`. If the
//! producer fails the transaction directory is removed with everything in it,
//! so a later run can never mistake a half-written file for a cached one.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::artifact::Artifact;
use crate::error::{IoContext, StageError, StageResult};

const TX_PREFIX: &str = ".varens-tx-";

/// Outcome of a staged operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// The published (or already present) artifact.
    pub artifact: Artifact,

    /// True when the producer was skipped because the artifact was fresh.
    pub cached: bool,
}

impl StageOutcome {
    fn cached(artifact: Artifact) -> Self {
        Self {
            artifact,
            cached: true,
        }
    }

    fn produced(artifact: Artifact) -> Self {
        Self {
            artifact,
            cached: false,
        }
    }

    pub fn path(&self) -> &Path {
        self.artifact.path()
    }
}

/// Produce `output` from `inputs` unless it is already fresh.
///
/// `producer` receives the transaction path it must write to. The path has
/// the same file name as `output` but lives in a temporary sibling directory.
/// Producers may call `run_stage` themselves for sub-artifacts.
pub async fn run_stage<O, P, F, Fut>(
    output: O,
    inputs: &[P],
    producer: F,
) -> StageResult<StageOutcome>
where
    O: AsRef<Path>,
    P: AsRef<Path>,
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = StageResult<()>>,
{
    let output = output.as_ref();
    let artifact = Artifact::new(output);
    if artifact.is_fresh_against(inputs) {
        debug!(event = "stage.cached", output = %output.display());
        return Ok(StageOutcome::cached(artifact));
    }

    let (parent, file_name) = split_output(output)?;
    let tx_dir = transaction_dir(parent)?;
    let tx_path = tx_dir.path().join(file_name);

    producer(tx_path.clone()).await?;

    publish(&tx_path, output, "producer")?;
    info!(event = "stage.published", output = %output.display());
    Ok(StageOutcome::produced(artifact))
}

/// Produce several sibling outputs with a single producer invocation.
///
/// All outputs must live in the same directory. `producer` receives the
/// transaction directory and must write every output there under its own file
/// name. The set is a cache hit only if every output is fresh.
pub async fn run_stage_set<O, P, F, Fut>(
    outputs: &[O],
    inputs: &[P],
    producer: F,
) -> StageResult<Vec<StageOutcome>>
where
    O: AsRef<Path>,
    P: AsRef<Path>,
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = StageResult<()>>,
{
    let Some(first) = outputs.first() else {
        return Ok(Vec::new());
    };

    let artifacts: Vec<Artifact> = outputs.iter().map(|o| Artifact::new(o.as_ref())).collect();
    if artifacts.iter().all(|a| a.is_fresh_against(inputs)) {
        debug!(event = "stage.cached", outputs = artifacts.len(), first = %first.as_ref().display());
        return Ok(artifacts.into_iter().map(StageOutcome::cached).collect());
    }

    let (parent, _) = split_output(first.as_ref())?;
    let mut names = Vec::with_capacity(outputs.len());
    for output in outputs {
        let (other_parent, name) = split_output(output.as_ref())?;
        if other_parent != parent {
            return Err(StageError::MixedParents {
                first: first.as_ref().to_path_buf(),
                other: output.as_ref().to_path_buf(),
            });
        }
        names.push(name.to_path_buf());
    }

    let tx_dir = transaction_dir(parent)?;
    producer(tx_dir.path().to_path_buf()).await?;

    // Check everything before moving anything so a short producer publishes nothing.
    for name in &names {
        let tx_path = tx_dir.path().join(name);
        if fs::symlink_metadata(&tx_path).is_err() {
            return Err(StageError::MissingOutput {
                step: "producer".to_string(),
                path: parent.join(name),
            });
        }
    }
    for (name, artifact) in names.iter().zip(&artifacts) {
        publish(&tx_dir.path().join(name), artifact.path(), "producer")?;
    }
    info!(event = "stage.published", outputs = artifacts.len(), first = %first.as_ref().display());
    Ok(artifacts.into_iter().map(StageOutcome::produced).collect())
}

/// Hard-link `src` to `dst`, falling back to a copy across filesystems.
pub fn link_or_copy(src: &Path, dst: &Path) -> StageResult<()> {
    if fs::symlink_metadata(dst).is_ok() {
        fs::remove_file(dst).at(dst)?;
    }
    if fs::hard_link(src, dst).is_err() {
        fs::copy(src, dst).at(src)?;
    }
    Ok(())
}

fn split_output(output: &Path) -> StageResult<(&Path, &Path)> {
    let file_name = output
        .file_name()
        .ok_or_else(|| StageError::InvalidOutput(output.to_path_buf()))?;
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok((parent, Path::new(file_name)))
}

fn transaction_dir(parent: &Path) -> StageResult<TempDir> {
    fs::create_dir_all(parent).at(parent)?;
    tempfile::Builder::new()
        .prefix(TX_PREFIX)
        .tempdir_in(parent)
        .at(parent)
}

fn publish(tx_path: &Path, output: &Path, step: &str) -> StageResult<()> {
    let meta = fs::symlink_metadata(tx_path).map_err(|_| StageError::MissingOutput {
        step: step.to_string(),
        path: output.to_path_buf(),
    })?;
    // rename(2) refuses to replace a non-empty directory.
    if meta.is_dir() && output.is_dir() {
        fs::remove_dir_all(output).at(output)?;
    }
    fs::rename(tx_path, output).at(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tx_leftovers(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TX_PREFIX))
            .count()
    }

    #[tokio::test]
    async fn producer_writes_to_transaction_path() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("fam1-ensemble.vcf");
        let seen = std::sync::Mutex::new(None);

        let outcome = run_stage(&output, &[] as &[PathBuf], |tx| {
            *seen.lock().unwrap() = Some(tx.clone());
            async move { fs::write(&tx, b"##fileformat=VCFv4.2\n").at(&tx) }
        })
        .await
        .unwrap();

        let tx = seen.into_inner().unwrap().unwrap();
        assert_ne!(tx, output);
        assert_eq!(tx.file_name(), output.file_name());
        assert!(!outcome.cached);
        assert_eq!(fs::read(&output).unwrap(), b"##fileformat=VCFv4.2\n");
        assert_eq!(tx_leftovers(dir.path()), 0);
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ensemble").join("fam1").join("out.vcf");

        run_stage(&output, &[] as &[PathBuf], |tx| async move {
            fs::write(&tx, b"x").at(&tx)
        })
        .await
        .unwrap();

        assert!(output.exists());
    }

    #[tokio::test]
    async fn producer_success_without_output_is_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.vcf");

        let err = run_stage(&output, &[] as &[PathBuf], |_tx| async { Ok(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::MissingOutput { .. }));
        assert!(!output.exists());
        assert_eq!(tx_leftovers(dir.path()), 0);
    }

    #[tokio::test]
    async fn nested_stages_compose() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner.bed");
        let outer = dir.path().join("outer.bed");
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            run_stage(&outer, &[] as &[PathBuf], |tx| {
                let inner = inner.clone();
                let calls = &calls;
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    run_stage(&inner, &[] as &[PathBuf], |itx| async move {
                        fs::write(&itx, b"chr1\t1\t2\n").at(&itx)
                    })
                    .await?;
                    fs::copy(&inner, &tx).at(&tx)?;
                    Ok(())
                }
            })
            .await
            .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read(&outer).unwrap(), b"chr1\t1\t2\n");
    }

    #[tokio::test]
    async fn directory_outputs_are_published_and_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("vcfeval");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("stale.txt"), b"old").unwrap();
        let input = dir.path().join("calls.vcf");
        fs::write(&input, b"x").unwrap();
        fs::File::options()
            .write(true)
            .open(&input)
            .unwrap()
            .set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(30))
            .unwrap();

        run_stage(&output, &[&input], |tx| async move {
            fs::create_dir_all(&tx).at(&tx)?;
            fs::write(tx.join("summary.txt"), b"new").at(&tx)
        })
        .await
        .unwrap();

        assert!(output.join("summary.txt").exists());
        assert!(!output.join("stale.txt").exists());
    }

    #[tokio::test]
    async fn stage_set_publishes_every_output() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = vec![dir.path().join("s1-purecn.rds"), dir.path().join("s1-purecn.csv")];

        let outcomes = run_stage_set(&outputs, &[] as &[PathBuf], |tx_dir| async move {
            fs::write(tx_dir.join("s1-purecn.rds"), b"rds").at(&tx_dir)?;
            fs::write(tx_dir.join("s1-purecn.csv"), b"csv").at(&tx_dir)
        })
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.cached && o.artifact.exists()));

        let again = run_stage_set(&outputs, &[] as &[PathBuf], |_tx| async {
            Err(StageError::Serialization("producer must not run for a fresh set".to_string()))
        })
        .await
        .unwrap();
        assert!(again.iter().all(|o| o.cached));
    }

    #[tokio::test]
    async fn stage_set_publishes_nothing_when_an_output_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = vec![dir.path().join("a.seg"), dir.path().join("b.seg")];

        let err = run_stage_set(&outputs, &[] as &[PathBuf], |tx_dir| async move {
            fs::write(tx_dir.join("a.seg"), b"seg").at(&tx_dir)
        })
        .await
        .unwrap_err();

        assert!(matches!(err, StageError::MissingOutput { .. }));
        assert!(!outputs[0].exists());
        assert!(!outputs[1].exists());
    }

    #[tokio::test]
    async fn stage_set_rejects_mixed_directories() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = vec![dir.path().join("a.seg"), dir.path().join("sub").join("b.seg")];

        let err = run_stage_set(&outputs, &[] as &[PathBuf], |_tx| async { Ok(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::MixedParents { .. }));
    }

    #[test]
    fn link_or_copy_replaces_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("x-cfilter.vcf");
        let dst = dir.path().join("fam1-ensemble.vcf");
        fs::write(&src, b"new").unwrap();
        fs::write(&dst, b"old").unwrap();

        link_or_copy(&src, &dst).unwrap();

        assert_eq!(fs::read(&dst).unwrap(), b"new");
    }
}
