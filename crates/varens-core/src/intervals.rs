//! Overlap removal for sorted interval files.
//!
//! Segmentation tools reject inputs with overlapping bins. The resolver is a
//! single left-to-right pass holding one pending record: when the next record
//! starts before the pending one ends on the same chromosome, the pending
//! record is dropped. Only adjacent pairs are compared, so in a run of
//! mutually overlapping records the last one survives. Input order is kept;
//! unsorted files are neither rejected nor reordered.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use varens_stage::{run_stage, IoContext, StageError};

use crate::error::{EnsembleError, Result};
use crate::paths::with_suffix;

const NO_OVERLAPS_SUFFIX: &str = "-nooverlaps";

/// One interval line. `line` holds the original text, extra columns included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalRecord {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub line: String,
}

impl IntervalRecord {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        let chrom = chrom.into();
        let line = format!("{chrom}\t{start}\t{end}");
        Self {
            chrom,
            start,
            end,
            line,
        }
    }

    /// Parse `chrom<TAB>start<TAB>end[<TAB>...]`. `None` for anything else.
    pub fn parse(line: &str) -> Option<Self> {
        let mut cols = line.split('\t');
        let chrom = cols.next().filter(|c| !c.is_empty())?;
        let start = cols.next()?.trim().parse().ok()?;
        let end = cols.next()?.trim().parse().ok()?;
        Some(Self {
            chrom: chrom.to_string(),
            start,
            end,
            line: line.to_string(),
        })
    }

    /// Whether `next` starts before this record ends on the same chromosome.
    pub fn overlapped_by(&self, next: &IntervalRecord) -> bool {
        self.chrom == next.chrom && self.end > next.start
    }
}

/// Iterator adapter that drops every record overlapped by its successor.
pub struct ResolveOverlaps<I> {
    inner: I,
    pending: Option<IntervalRecord>,
}

impl<I> ResolveOverlaps<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            pending: None,
        }
    }
}

impl<I> Iterator for ResolveOverlaps<I>
where
    I: Iterator<Item = Result<IntervalRecord>>,
{
    type Item = Result<IntervalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let incoming = match self.inner.next() {
                Some(Ok(record)) => record,
                Some(Err(err)) => return Some(Err(err)),
                None => return self.pending.take().map(Ok),
            };
            let Some(previous) = self.pending.replace(incoming) else {
                continue;
            };
            if self
                .pending
                .as_ref()
                .is_some_and(|current| previous.overlapped_by(current))
            {
                debug!(
                    chrom = %previous.chrom,
                    start = previous.start,
                    end = previous.end,
                    "dropping overlapped interval"
                );
                continue;
            }
            return Some(Ok(previous));
        }
    }
}

/// `.resolve_overlaps()` on any fallible record stream.
pub trait ResolveOverlapsExt: Iterator<Item = Result<IntervalRecord>> + Sized {
    fn resolve_overlaps(self) -> ResolveOverlaps<Self> {
        ResolveOverlaps::new(self)
    }
}

impl<I: Iterator<Item = Result<IntervalRecord>>> ResolveOverlapsExt for I {}

/// In-memory form of the resolver.
pub fn resolve_overlaps(records: impl IntoIterator<Item = IntervalRecord>) -> Vec<IntervalRecord> {
    records
        .into_iter()
        .map(Ok)
        .resolve_overlaps()
        .filter_map(Result::ok)
        .collect()
}

/// Streaming reader for interval files.
///
/// Lines before the first record that do not parse as intervals are kept as
/// header. After the first record, an unparseable non-blank line is an error.
pub struct IntervalReader<R> {
    lines: Lines<R>,
    path: PathBuf,
    line_no: usize,
    header: Vec<String>,
    first: Option<IntervalRecord>,
}

impl IntervalReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).at(path)?;
        Self::new(BufReader::new(file), path)
    }
}

impl<R: BufRead> IntervalReader<R> {
    pub fn new(reader: R, path: &Path) -> Result<Self> {
        let mut this = Self {
            lines: reader.lines(),
            path: path.to_path_buf(),
            line_no: 0,
            header: Vec::new(),
            first: None,
        };
        for line in this.lines.by_ref() {
            this.line_no += 1;
            let line = line.at(path)?;
            if let Some(record) = IntervalRecord::parse(&line) {
                this.first = Some(record);
                break;
            }
            this.header.push(line);
        }
        Ok(this)
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }
}

impl<R: BufRead> Iterator for IntervalReader<R> {
    type Item = Result<IntervalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(first) = self.first.take() {
            return Some(Ok(first));
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(StageError::Io {
                        path: self.path.clone(),
                        source,
                    }
                    .into()))
                }
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(IntervalRecord::parse(&line).ok_or_else(|| {
                EnsembleError::MalformedInterval {
                    path: self.path.clone(),
                    line: self.line_no,
                    text: line,
                }
            }));
        }
    }
}

fn write_without_overlaps(in_file: &Path, out_file: &Path) -> Result<()> {
    let reader = IntervalReader::open(in_file)?;
    let mut out = BufWriter::new(File::create(out_file).at(out_file)?);
    for line in reader.header() {
        writeln!(out, "{line}").at(out_file)?;
    }
    let mut kept = 0usize;
    for record in reader.resolve_overlaps() {
        writeln!(out, "{}", record?.line).at(out_file)?;
        kept += 1;
    }
    out.flush().at(out_file)?;
    debug!(input = %in_file.display(), kept, "wrote non-overlapping intervals");
    Ok(())
}

/// Write `<out_dir>/<stem>-nooverlaps<ext>` unless it is already fresh.
pub async fn remove_overlaps(in_file: &Path, out_dir: &Path) -> Result<PathBuf> {
    let out_file = with_suffix(in_file, out_dir, NO_OVERLAPS_SUFFIX);
    run_stage(&out_file, &[in_file], |tx_path| async move {
        write_without_overlaps(in_file, &tx_path).map_err(EnsembleError::into_stage)
    })
    .await?;
    Ok(out_file)
}
