//! Deterministic artifact naming.
//!
//! Every path is a function of the work directory, the batch id and the
//! caller or stage name. Concurrent batch tasks therefore never share a path.

use std::path::{Path, PathBuf};

const COMPRESSED_EXTS: &[&str] = &[".gz", ".bz2", ".zst"];
const TUMOR_ONLY_TAG: &str = "_tumorOnly_noFilteredCalls";

/// Split a file name into stem and extension, keeping compression suffixes
/// together with the real extension (`a.bed.gz` -> `("a", ".bed.gz")`).
pub fn split_ext_plus(name: &str) -> (&str, &str) {
    fn split_last(name: &str) -> (&str, &str) {
        match name.rfind('.') {
            Some(idx) if idx > 0 => name.split_at(idx),
            _ => (name, ""),
        }
    }

    let (stem, ext) = split_last(name);
    if COMPRESSED_EXTS.contains(&ext) {
        let (inner_stem, inner_ext) = split_last(stem);
        if !inner_ext.is_empty() {
            return (inner_stem, &name[inner_stem.len()..]);
        }
    }
    (stem, ext)
}

/// Path of the tumor-only, PASS-filtered copy of a call file.
///
/// `x.vcf.gz` -> `x_tumorOnly_noFilteredCalls.vcf.gz`; names without `.vcf`
/// get the tag and `.vcf.gz` appended. The copy sits next to the original.
pub fn tumor_only_path(original: &Path) -> PathBuf {
    let name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let derived = if name.contains(".vcf") {
        name.replace(".vcf", &format!("{TUMOR_ONLY_TAG}.vcf"))
    } else {
        format!("{name}{TUMOR_ONLY_TAG}.vcf.gz")
    };
    original.with_file_name(derived)
}

/// `<dir>/<stem><suffix><ext>` for a file name split with `split_ext_plus`.
pub fn with_suffix(path: &Path, dir: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_ext_plus(&name);
    dir.join(format!("{stem}{suffix}{ext}"))
}

/// Scratch directory a tool derives from its output name (`<out stem>-work`).
pub fn tool_work_dir(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, _) = split_ext_plus(&name);
    output.with_file_name(format!("{stem}-work"))
}

fn path_safe(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// Artifact layout for one batch under `<work>/ensemble/<batch>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    batch_id: String,
    base: PathBuf,
}

impl BatchLayout {
    pub fn new(work_dir: &Path, batch_id: &str) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            base: work_dir.join("ensemble").join(path_safe(batch_id)),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn prefix(&self) -> String {
        path_safe(&self.batch_id)
    }

    pub fn ensemble_vcf(&self) -> PathBuf {
        self.base.join(format!("{}-ensemble.vcf", self.prefix()))
    }

    pub fn callregions_bed(&self) -> PathBuf {
        self.base.join(format!("{}-callregions.bed", self.prefix()))
    }

    pub fn merge_spec(&self) -> PathBuf {
        self.base
            .join("config")
            .join(format!("{}-ensemble.yaml", self.prefix()))
    }

    pub fn multisample(&self, caller: &str) -> PathBuf {
        self.base
            .join("multisample")
            .join(format!("{}-{}.vcf.gz", self.prefix(), path_safe(caller)))
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.base.join("tmp")
    }

    pub fn validation_dir(&self) -> PathBuf {
        self.base
            .join("validate")
            .join(format!("{}-vcfeval", self.prefix()))
    }

    /// Annotated copy of a recall output.
    pub fn effects_vcf(&self, input: &Path) -> PathBuf {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (stem, _) = split_ext_plus(&name);
        self.base.join(format!("{stem}-effects.vcf"))
    }
}
