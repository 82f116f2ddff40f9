//! Minimal call-file checks.
//!
//! Call files are opaque to this crate. The only content questions asked are
//! "does it hold at least one record line" and "write an empty but valid
//! file". Plain and (b)gzipped files are both accepted; compression is
//! detected from the magic bytes, not the name.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use varens_stage::{IoContext, StageResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Header of an empty VCF: enough for downstream tools to accept it.
pub const EMPTY_VCF: &str = "##fileformat=VCFv4.2\n\
##source=varens\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

fn open_text(path: &Path) -> StageResult<Box<dyn BufRead>> {
    let mut magic = [0u8; 2];
    let mut head = File::open(path).at(path)?;
    let read = head.read(&mut magic).at(path)?;
    let file = File::open(path).at(path)?;
    if read == 2 && magic == GZIP_MAGIC {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Whether the file contains any non-header, non-blank line.
///
/// Stops at the first record, so large files are not read in full.
pub fn has_variants(path: &Path) -> StageResult<bool> {
    let reader = open_text(path)?;
    for line in reader.lines() {
        let line = line.at(path)?;
        if !line.starts_with('#') && !line.trim().is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// True if any of `paths` has a record.
pub fn any_has_variants<P: AsRef<Path>>(paths: &[P]) -> StageResult<bool> {
    for path in paths {
        if has_variants(path.as_ref())? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Write a header-only VCF.
pub fn write_empty_vcf(path: &Path) -> StageResult<()> {
    std::fs::write(path, EMPTY_VCF).at(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn header_only_file_has_no_variants() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.vcf");
        write_empty_vcf(&path).unwrap();
        assert!(!has_variants(&path).unwrap());
    }

    #[test]
    fn zero_byte_file_has_no_variants() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.vcf");
        std::fs::write(&path, b"").unwrap();
        assert!(!has_variants(&path).unwrap());
    }

    #[test]
    fn record_line_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.vcf");
        std::fs::write(&path, format!("{EMPTY_VCF}chr1\t100\t.\tA\tG\t30\tPASS\t.\n")).unwrap();
        assert!(has_variants(&path).unwrap());
    }

    #[test]
    fn gzipped_records_are_detected_regardless_of_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.vcf");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(format!("{EMPTY_VCF}chr2\t5\t.\tC\tT\t10\tPASS\t.\n").as_bytes())
            .unwrap();
        std::fs::write(&path, enc.finish().unwrap()).unwrap();
        assert!(has_variants(&path).unwrap());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(has_variants(&dir.path().join("nope.vcf")).is_err());
    }

    #[test]
    fn any_has_variants_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("a.vcf");
        let full = dir.path().join("b.vcf");
        write_empty_vcf(&empty).unwrap();
        std::fs::write(&full, "chr1\t1\t.\tA\tC\t1\t.\t.\n").unwrap();
        assert!(!any_has_variants(&[&empty]).unwrap());
        assert!(any_has_variants(&[&empty, &full]).unwrap());
    }
}
