//! clinlens: genomic variant annotation engine
//!
//! Annotates a consumer genotype export (delimited text, possibly
//! gzip-wrapped) with clinical-significance data from a local ClinVar
//! reference file set, which may be present in any of four container
//! formats.
//!
//! # Example
//!
//! ```no_run
//! use clinlens::{detect, AnnotationSession, ReferenceDataLoader, WorkerBackedIndex};
//! use std::path::Path;
//!
//! # fn main() -> clinlens::Result<()> {
//! let (_, records) = detect(Path::new("genome_export.txt"))?;
//!
//! let source = ReferenceDataLoader::new("reference_data").load()?;
//! let index = WorkerBackedIndex::start(source)?;
//! let mut session = AnnotationSession::new(Box::new(index));
//! let annotated = session.annotate(&records)?;
//! println!("{} variants annotated", annotated.len());
//! # Ok(())
//! # }
//! ```

pub mod annotate;
pub mod clinvar;
pub mod config;
pub mod error;
pub mod genotype;
pub mod index;
#[cfg(feature = "parallel")]
pub mod parallel;
pub mod vcf;

// Re-export commonly used types
pub use annotate::{AnnotatedVariant, AnnotationSession, QueryCache};
pub use clinvar::loader::{ReferenceDataLoader, ReferenceSource};
pub use clinvar::types::{ClinVarEntry, ClinicalSignificance};
pub use config::ClinLensConfig;
pub use error::ClinLensError;
pub use genotype::detector::detect;
pub use genotype::GenotypeRecord;
pub use index::{Backend, InMemoryIndex, VariantIndex, WorkerBackedIndex};
pub use vcf::record::VcfRecord;

/// Result type alias for clinlens operations
pub type Result<T> = std::result::Result<T, ClinLensError>;
