//! Reference data discovery.
//!
//! Probes a data directory for ClinVar reference material in a fixed
//! priority order and hands back the best usable source. A candidate that
//! exists but fails to parse is logged and skipped, so a corrupt download
//! degrades to the next format instead of aborting.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::ClinLensError;
use crate::Result;

use super::summary::load_summary;
use super::types::ClinVarEntry;

/// File names probed under the data directory, in priority order.
pub const CLINVAR_VCF: &str = "clinvar.vcf";
pub const SUMMARY_TXT: &str = "variant_summary.txt";
pub const CLINVAR_VCF_GZ: &str = "clinvar.vcf.gz";
pub const CLINVAR_TBI: &str = "clinvar.vcf.gz.tbi";
pub const SUMMARY_TXT_GZ: &str = "variant_summary.txt.gz";

/// A usable reference data source, selected by [`ReferenceDataLoader`].
#[derive(Debug)]
pub enum ReferenceSource {
    /// Plain-text ClinVar VCF; queried via an in-memory position map.
    UncompressedVcf { vcf: PathBuf },
    /// BGZF-compressed ClinVar VCF with its tabix index; queried via
    /// random access.
    CompressedVcf { vcf: PathBuf, index: PathBuf },
    /// `variant_summary` export, fully parsed into memory.
    Summary {
        path: PathBuf,
        entries: HashMap<String, ClinVarEntry>,
    },
}

impl ReferenceSource {
    /// Human-readable source name for logs and diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::UncompressedVcf { .. } => "uncompressed VCF",
            Self::CompressedVcf { .. } => "tabix-indexed VCF",
            Self::Summary { .. } => "variant summary",
        }
    }

    /// Path of the primary data file behind this source.
    pub fn path(&self) -> &Path {
        match self {
            Self::UncompressedVcf { vcf } => vcf,
            Self::CompressedVcf { vcf, .. } => vcf,
            Self::Summary { path, .. } => path,
        }
    }
}

/// Finds and validates reference data under a directory.
#[derive(Debug, Clone)]
pub struct ReferenceDataLoader {
    data_dir: PathBuf,
}

impl ReferenceDataLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Try each source format in priority order:
    ///
    /// 1. `clinvar.vcf`
    /// 2. `variant_summary.txt`
    /// 3. `clinvar.vcf.gz` + `clinvar.vcf.gz.tbi`
    /// 4. `variant_summary.txt.gz`
    ///
    /// A missing candidate falls through silently; one that exists but
    /// fails validation falls through with a warning. If nothing is
    /// usable, the error lists every path that was probed and absent.
    pub fn load(&self) -> Result<ReferenceSource> {
        self.load_excluding(&[])
    }

    /// Like [`Self::load`], but skips candidates whose data file is
    /// listed. Lets the driver resume the chain when a source that probed
    /// clean still fails at index initialization.
    pub fn load_excluding(&self, exclude: &[PathBuf]) -> Result<ReferenceSource> {
        let mut missing = Vec::new();

        let vcf = self.data_dir.join(CLINVAR_VCF);
        if exclude.contains(&vcf) {
            log::debug!("excluding {}", vcf.display());
        } else if vcf.exists() {
            match validate_vcf_header(&vcf, false) {
                Ok(()) => return Ok(ReferenceSource::UncompressedVcf { vcf }),
                Err(e) => log::warn!("skipping {}: {}", vcf.display(), e),
            }
        } else {
            missing.push(vcf);
        }

        let summary = self.data_dir.join(SUMMARY_TXT);
        if exclude.contains(&summary) {
            log::debug!("excluding {}", summary.display());
        } else if summary.exists() {
            match load_summary(&summary) {
                Ok(entries) => {
                    return Ok(ReferenceSource::Summary {
                        path: summary,
                        entries,
                    })
                }
                Err(e) => log::warn!("skipping {}: {}", summary.display(), e),
            }
        } else {
            missing.push(summary);
        }

        let vcf_gz = self.data_dir.join(CLINVAR_VCF_GZ);
        let tbi = self.data_dir.join(CLINVAR_TBI);
        if exclude.contains(&vcf_gz) {
            log::debug!("excluding {}", vcf_gz.display());
        } else if vcf_gz.exists() && tbi.exists() {
            match validate_vcf_header(&vcf_gz, true).and_then(|()| validate_tbi_magic(&tbi)) {
                Ok(()) => {
                    return Ok(ReferenceSource::CompressedVcf {
                        vcf: vcf_gz,
                        index: tbi,
                    })
                }
                Err(e) => log::warn!("skipping {}: {}", vcf_gz.display(), e),
            }
        } else {
            if !vcf_gz.exists() {
                missing.push(vcf_gz);
            }
            if !tbi.exists() {
                missing.push(tbi);
            }
        }

        let summary_gz = self.data_dir.join(SUMMARY_TXT_GZ);
        if exclude.contains(&summary_gz) {
            log::debug!("excluding {}", summary_gz.display());
        } else if summary_gz.exists() {
            match load_summary(&summary_gz) {
                Ok(entries) => {
                    return Ok(ReferenceSource::Summary {
                        path: summary_gz,
                        entries,
                    })
                }
                Err(e) => log::warn!("skipping {}: {}", summary_gz.display(), e),
            }
        } else {
            missing.push(summary_gz);
        }

        Err(ClinLensError::ReferenceDataUnavailable { missing })
    }
}

/// Sniff the first line of a (possibly gzipped) VCF for the
/// `##fileformat=VCF` marker.
fn validate_vcf_header(path: &Path, gzipped: bool) -> Result<()> {
    let file = File::open(path)?;
    let first_line = if gzipped {
        read_first_line(BufReader::new(MultiGzDecoder::new(file)))?
    } else {
        read_first_line(BufReader::new(file))?
    };
    if first_line.starts_with("##fileformat=VCF") {
        Ok(())
    } else {
        Err(ClinLensError::ReferenceParse {
            source_format: "vcf".to_string(),
            msg: format!("{} does not start with a VCF header", path.display()),
        })
    }
}

fn read_first_line<R: BufRead>(mut reader: R) -> Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line).map_err(|e| {
        // Decompression errors surface here for truncated gzip data.
        ClinLensError::ReferenceParse {
            source_format: "vcf".to_string(),
            msg: e.to_string(),
        }
    })?;
    Ok(line)
}

/// Tabix indexes are gzipped and open with the magic bytes `TBI\x01`.
fn validate_tbi_magic(path: &Path) -> Result<()> {
    let file = File::open(path)?;
    let mut decoder = MultiGzDecoder::new(file);
    let mut magic = [0u8; 4];
    decoder
        .read_exact(&mut magic)
        .map_err(|e| ClinLensError::ReferenceParse {
            source_format: "tabix".to_string(),
            msg: format!("{}: {}", path.display(), e),
        })?;
    if &magic == b"TBI\x01" {
        Ok(())
    } else {
        Err(ClinLensError::ReferenceParse {
            source_format: "tabix".to_string(),
            msg: format!("{} has bad magic {:?}", path.display(), magic),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    const VCF_BODY: &str = "##fileformat=VCFv4.3\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

    fn gz_bytes(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_missing_everything() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReferenceDataLoader::new(dir.path()).load().unwrap_err();
        match err {
            ClinLensError::ReferenceDataUnavailable { missing } => {
                assert_eq!(missing.len(), 5);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_prefers_uncompressed_vcf() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLINVAR_VCF), VCF_BODY).unwrap();
        std::fs::write(
            dir.path().join(SUMMARY_TXT),
            "#AlleleID\tGeneSymbol\tClinicalSignificance\tRS# (dbSNP)\tPhenotypeList\n",
        )
        .unwrap();
        let source = ReferenceDataLoader::new(dir.path()).load().unwrap();
        assert!(matches!(source, ReferenceSource::UncompressedVcf { .. }));
    }

    #[test]
    fn test_corrupt_vcf_falls_through_to_summary() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLINVAR_VCF), "not a vcf\n").unwrap();
        std::fs::write(
            dir.path().join(SUMMARY_TXT),
            "#AlleleID\tGeneSymbol\tClinicalSignificance\tRS# (dbSNP)\tPhenotypeList\n1\tBRCA2\tPathogenic\t123\tcancer\n",
        )
        .unwrap();
        let source = ReferenceDataLoader::new(dir.path()).load().unwrap();
        match source {
            ReferenceSource::Summary { entries, .. } => {
                assert!(entries.contains_key("rs123"));
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_load_excluding_resumes_chain() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLINVAR_VCF), VCF_BODY).unwrap();
        std::fs::write(
            dir.path().join(SUMMARY_TXT),
            "#AlleleID\tGeneSymbol\tClinicalSignificance\tRS# (dbSNP)\tPhenotypeList\n1\tBRCA2\tPathogenic\t123\tcancer\n",
        )
        .unwrap();
        let loader = ReferenceDataLoader::new(dir.path());

        let first = loader.load().unwrap();
        assert!(matches!(first, ReferenceSource::UncompressedVcf { .. }));

        // A driver that failed to build an index over the VCF resumes the
        // chain without it.
        let resumed = loader
            .load_excluding(&[first.path().to_path_buf()])
            .unwrap();
        assert!(matches!(resumed, ReferenceSource::Summary { .. }));
    }

    #[test]
    fn test_compressed_vcf_requires_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLINVAR_VCF_GZ), gz_bytes(VCF_BODY.as_bytes())).unwrap();
        // No .tbi next to it, and nothing else present either.
        let err = ReferenceDataLoader::new(dir.path()).load().unwrap_err();
        assert!(matches!(
            err,
            ClinLensError::ReferenceDataUnavailable { .. }
        ));
    }

    #[test]
    fn test_compressed_vcf_with_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLINVAR_VCF_GZ), gz_bytes(VCF_BODY.as_bytes())).unwrap();
        std::fs::write(dir.path().join(CLINVAR_TBI), gz_bytes(b"TBI\x01rest")).unwrap();
        let source = ReferenceDataLoader::new(dir.path()).load().unwrap();
        assert!(matches!(source, ReferenceSource::CompressedVcf { .. }));
    }

    #[test]
    fn test_bad_tbi_magic_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLINVAR_VCF_GZ), gz_bytes(VCF_BODY.as_bytes())).unwrap();
        std::fs::write(dir.path().join(CLINVAR_TBI), gz_bytes(b"XXXX")).unwrap();
        std::fs::write(
            dir.path().join(SUMMARY_TXT_GZ),
            gz_bytes(b"#AlleleID\tGeneSymbol\tClinicalSignificance\tRS# (dbSNP)\tPhenotypeList\n"),
        )
        .unwrap();
        let source = ReferenceDataLoader::new(dir.path()).load().unwrap();
        assert!(matches!(source, ReferenceSource::Summary { .. }));
    }
}
