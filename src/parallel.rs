//! Parallel processing support.
//!
//! Parallel variants of genotype parsing and annotation using rayon.
//! Enable with the `parallel` feature.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "parallel")]
//! # fn main() -> clinlens::Result<()> {
//! use clinlens::parallel::annotate_parallel;
//! use clinlens::{GenotypeRecord, InMemoryIndex};
//! use std::collections::HashMap;
//!
//! let index = InMemoryIndex::from_summary(HashMap::new());
//! let records = vec![
//!     GenotypeRecord::new("rs429358", "19", "44908684", "CT").unwrap(),
//! ];
//! let annotated = annotate_parallel(&index, &records)?;
//! assert_eq!(annotated.len(), records.len());
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "parallel"))]
//! # fn main() {}
//! ```

use rayon::prelude::*;

use crate::annotate::AnnotatedVariant;
use crate::genotype::GenotypeRecord;
use crate::index::VariantIndex;
use crate::Result;

/// Parse genotype lines in parallel against a fixed, already-detected
/// layout. Order is preserved; unparseable lines yield `None`.
pub fn parse_records_parallel(
    lines: &[String],
    parse: impl Fn(&str) -> Option<GenotypeRecord> + Sync,
) -> Vec<Option<GenotypeRecord>> {
    lines.par_iter().map(|line| parse(line)).collect()
}

/// Annotate records in parallel against a shareable index.
///
/// Order is preserved. There is no cross-record cache here; the backend
/// must be cheap enough per lookup (in-memory) to not need one. Worker-
/// backed indexes serialize their queries internally, so they gain
/// nothing from this path.
pub fn annotate_parallel<I: VariantIndex + Sync>(
    index: &I,
    records: &[GenotypeRecord],
) -> Result<Vec<AnnotatedVariant>> {
    records
        .par_iter()
        .map(|record| {
            let mut found = None;
            if !record.rsid.is_empty() {
                found = index.lookup_by_rsid(&record.rsid)?;
            }
            if found.is_none() && record.pos > 0 {
                let candidates = index.lookup_by_position(&record.chrom, record.pos)?;
                found = crate::annotate::resolve_candidate(record, candidates);
            }
            Ok(crate::annotate::join_entry(record, found))
        })
        .collect()
}
