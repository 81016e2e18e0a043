//! Annotation: joining genotype records against the reference index.

pub mod cache;
pub mod genes;

pub use cache::{CacheStats, QueryCache, CACHE_CAPACITY};
pub use genes::associated_genes;

use serde::{Deserialize, Serialize};

use crate::clinvar::{ClinVarEntry, ClinicalSignificance};
use crate::genotype::GenotypeRecord;
use crate::index::{Backend, VariantIndex};
use crate::Result;

/// Records processed between progress callbacks.
pub const BATCH_SIZE: usize = 100;

/// One genotype record joined with whatever the reference knew about it.
///
/// Output is full-length: every input record produces exactly one
/// annotated variant, with `matched == false` and default fields when the
/// reference had nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedVariant {
    pub rsid: String,
    pub chrom: String,
    pub pos: u64,
    pub genotype: String,
    pub significance: ClinicalSignificance,
    pub conditions: Vec<String>,
    pub gene: Option<String>,
    /// Genes the curated condition table ties to this variant's
    /// conditions, beyond the reference's own gene symbol.
    pub associated_genes: Vec<String>,
    pub matched: bool,
}

impl AnnotatedVariant {
    fn unmatched(record: &GenotypeRecord) -> Self {
        Self {
            rsid: record.rsid.clone(),
            chrom: record.chrom.clone(),
            pos: record.pos,
            genotype: record.genotype.clone(),
            significance: ClinicalSignificance::Unknown,
            conditions: Vec::new(),
            gene: None,
            associated_genes: Vec::new(),
            matched: false,
        }
    }

    fn from_entry(record: &GenotypeRecord, entry: ClinVarEntry) -> Self {
        let mut associated: Vec<String> = Vec::new();
        for condition in &entry.conditions {
            for gene in associated_genes(condition) {
                if !associated.iter().any(|g| g == gene) {
                    associated.push((*gene).to_string());
                }
            }
        }
        // When the reference row names a condition but no gene, the
        // curated condition table can still supply one.
        let gene = entry.gene.clone().or_else(|| associated.first().cloned());
        Self {
            rsid: record.rsid.clone(),
            chrom: record.chrom.clone(),
            pos: record.pos,
            genotype: record.genotype.clone(),
            significance: entry.significance,
            conditions: entry.conditions,
            gene,
            associated_genes: associated,
            matched: true,
        }
    }
}

/// Join a record with its resolved entry, if any.
pub fn join_entry(record: &GenotypeRecord, found: Option<ClinVarEntry>) -> AnnotatedVariant {
    match found {
        Some(entry) => AnnotatedVariant::from_entry(record, entry),
        None => AnnotatedVariant::unmatched(record),
    }
}

/// Pick from positional candidates: prefer an exact rsID match, then an
/// exact position match, then the first candidate.
pub fn resolve_candidate(
    record: &GenotypeRecord,
    candidates: Vec<ClinVarEntry>,
) -> Option<ClinVarEntry> {
    if !record.rsid.is_empty() {
        if let Some(hit) = candidates.iter().find(|c| c.rsid == record.rsid) {
            return Some(hit.clone());
        }
    }
    if let Some(hit) = candidates.iter().find(|c| c.pos == Some(record.pos)) {
        return Some(hit.clone());
    }
    candidates.into_iter().next()
}

/// Cache key for one record: the chrom:pos pair when the position is
/// known, the marker ID otherwise.
fn cache_key(record: &GenotypeRecord) -> String {
    if record.pos > 0 {
        format!("{}:{}", record.chrom, record.pos)
    } else {
        record.rsid.clone()
    }
}

/// Owns an index backend and a lookup cache for the lifetime of one
/// annotation run. Dropping the session tears down the backend, including
/// any worker thread behind it.
pub struct AnnotationSession {
    index: Box<dyn VariantIndex>,
    cache: QueryCache,
}

impl AnnotationSession {
    pub fn new(index: Box<dyn VariantIndex>) -> Self {
        Self {
            index,
            cache: QueryCache::new(),
        }
    }

    pub fn backend(&self) -> Backend {
        self.index.backend()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Annotate every record, in input order.
    pub fn annotate(&mut self, records: &[GenotypeRecord]) -> Result<Vec<AnnotatedVariant>> {
        self.annotate_with_progress(records, |_, _, _| {})
    }

    /// Annotate with a progress callback, invoked after each batch of
    /// [`BATCH_SIZE`] records with `(processed, message, total)`.
    pub fn annotate_with_progress<F>(
        &mut self,
        records: &[GenotypeRecord],
        mut progress: F,
    ) -> Result<Vec<AnnotatedVariant>>
    where
        F: FnMut(usize, &str, usize),
    {
        let total = records.len();
        let mut out = Vec::with_capacity(total);
        for chunk in records.chunks(BATCH_SIZE) {
            for record in chunk {
                out.push(self.annotate_one(record)?);
            }
            progress(out.len(), "annotating variants", total);
        }
        Ok(out)
    }

    fn annotate_one(&mut self, record: &GenotypeRecord) -> Result<AnnotatedVariant> {
        let key = cache_key(record);
        let resolved = match self.cache.get(&key) {
            Some(cached) => cached,
            None => {
                let mut found = None;
                if !record.rsid.is_empty() {
                    found = self.index.lookup_by_rsid(&record.rsid)?;
                }
                if found.is_none() && record.pos > 0 {
                    let candidates = self.index.lookup_by_position(&record.chrom, record.pos)?;
                    found = resolve_candidate(record, candidates);
                }
                self.cache.insert(key, found.clone());
                found
            }
        };
        Ok(join_entry(record, resolved))
    }
}
