//! ClinVar reference data: types, parsers, and source discovery.

pub mod loader;
pub mod summary;
pub mod types;

pub use loader::{ReferenceDataLoader, ReferenceSource};
pub use summary::{load_summary, parse_summary, MAX_SUMMARY_ENTRIES};
pub use types::{ClinVarEntry, ClinicalSignificance};
