//! Error types for clinlens.
//!
//! The taxonomy distinguishes terminal, user-visible failures (no valid
//! genotype records, no reference data at all) from per-format failures
//! that the reference loader absorbs by falling through to the next
//! candidate source.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for clinlens operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClinLensError {
    /// Genotype parsing produced zero valid records. Carries the detected
    /// delimiter and column mapping so the caller can explain what was tried.
    #[error("no valid genotype records (delimiter {delimiter:?}, columns {columns}, {skipped} lines skipped)")]
    NoValidRecords {
        delimiter: char,
        columns: String,
        skipped: usize,
    },

    /// The input could not be recognized as any supported genotype format.
    #[error("format detection failed: {msg}")]
    FormatDetection { msg: String },

    /// No candidate reference format had all of its required files present.
    #[error("reference data unavailable; missing files: {}", format_missing(missing))]
    ReferenceDataUnavailable { missing: Vec<PathBuf> },

    /// A reference source's files exist but could not be parsed. The loader
    /// treats this as non-fatal and falls through to the next format.
    #[error("failed to parse {source_format} reference data: {msg}")]
    ReferenceParse { source_format: String, msg: String },

    /// A positional query against the index backend failed.
    #[error("index query failed: {msg}")]
    IndexQuery { msg: String },

    /// The query worker did not finish loading its reference data in time.
    #[error("query worker initialization timed out after {seconds}s")]
    WorkerInitTimeout { seconds: u64 },

    /// The query worker has been torn down; no further queries are possible.
    #[error("query worker is no longer running")]
    WorkerGone,

    /// IO error (for file operations).
    #[error("IO error: {msg}")]
    Io { msg: String },

    /// JSON serialization error.
    #[error("JSON error: {msg}")]
    Json { msg: String },
}

fn format_missing(missing: &[PathBuf]) -> String {
    missing
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ClinLensError {
    /// Whether the loader may fall through to the next reference format
    /// after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClinLensError::ReferenceParse { .. } | ClinLensError::WorkerInitTimeout { .. }
        )
    }
}

impl From<std::io::Error> for ClinLensError {
    fn from(err: std::io::Error) -> Self {
        ClinLensError::Io {
            msg: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ClinLensError {
    fn from(err: serde_json::Error) -> Self {
        ClinLensError::Json {
            msg: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_in_message() {
        let err = ClinLensError::ReferenceDataUnavailable {
            missing: vec![
                PathBuf::from("data/clinvar.vcf.gz"),
                PathBuf::from("data/variant_summary.txt"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("clinvar.vcf.gz"));
        assert!(msg.contains("variant_summary.txt"));
    }

    #[test]
    fn test_recoverable() {
        let parse = ClinLensError::ReferenceParse {
            source_format: "compressed VCF".to_string(),
            msg: "truncated".to_string(),
        };
        assert!(parse.is_recoverable());

        let timeout = ClinLensError::WorkerInitTimeout { seconds: 30 };
        assert!(timeout.is_recoverable());

        let unavailable = ClinLensError::ReferenceDataUnavailable { missing: vec![] };
        assert!(!unavailable.is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClinLensError = io_err.into();
        assert!(matches!(err, ClinLensError::Io { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_no_valid_records_diagnostics() {
        let err = ClinLensError::NoValidRecords {
            delimiter: '\t',
            columns: "rsid=0, genotype=3".to_string(),
            skipped: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("rsid=0"));
    }
}
