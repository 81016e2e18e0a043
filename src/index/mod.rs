//! Variant lookup backends.
//!
//! A [`VariantIndex`] answers rsID and positional queries against loaded
//! ClinVar data. The backend depends on what reference material was found:
//! tabix-indexed VCFs get random access through the query worker, while
//! plain VCFs and summary exports are held in memory.

pub mod tabix;
pub mod worker;

pub use tabix::{query_vcf_lines, Chunk, TabixIndex, VirtualOffset};
pub use worker::{QueryWorker, WorkerBackedIndex};

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::clinvar::{ClinVarEntry, ClinicalSignificance};
use crate::vcf::{parse_record, toggle_chr_prefix};
use crate::Result;

/// Positional search half-window when records come from random access;
/// the index narrows candidates, so the window stays tight.
pub const WINDOW_COMPRESSED_BP: u64 = 10;

/// Positional search half-window for in-memory scans, where a wider net
/// costs nothing extra.
pub const WINDOW_UNCOMPRESSED_BP: u64 = 25;

/// Which lookup strategy a [`VariantIndex`] is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Random access through a tabix index.
    Indexed,
    /// Full scan of reference data held in memory.
    Scan,
}

/// Query interface over loaded reference data.
pub trait VariantIndex: Send {
    /// Find the entry for an rsID, if the reference knows it.
    fn lookup_by_rsid(&self, rsid: &str) -> Result<Option<ClinVarEntry>>;

    /// Find entries near a genomic position. Both chr-prefixed and bare
    /// chromosome names are tried.
    fn lookup_by_position(&self, chrom: &str, pos: u64) -> Result<Vec<ClinVarEntry>>;

    fn backend(&self) -> Backend;
}

/// Extract a reference entry from a ClinVar VCF data line.
///
/// The rsID comes from the ID column when it carries an `rs` prefix,
/// otherwise from `INFO/RS`. Lines with neither are unusable for rsID
/// lookup and return `None`.
pub fn entry_from_vcf_line(line: &str) -> Option<ClinVarEntry> {
    let record = parse_record(line, &[])?;

    let rsid = match record.id.as_deref() {
        Some(id) if id.starts_with("rs") => id.to_string(),
        _ => format!("rs{}", record.info.get_str("RS")?),
    };

    let significance = record
        .info
        .get_str("CLNSIG")
        .map(|s| ClinicalSignificance::normalize(&s))
        .unwrap_or_default();

    // CLNDN packs condition names with underscores for spaces and pipes
    // between conditions.
    let conditions = record
        .info
        .get_str("CLNDN")
        .map(|raw| {
            raw.split(['|', ','])
                .map(|c| c.replace('_', " "))
                .filter(|c| {
                    !c.is_empty() && c != "not provided" && c != "not specified"
                })
                .collect()
        })
        .unwrap_or_default();

    // GENEINFO is "SYMBOL:GeneID" pairs; the first symbol is enough.
    let gene = record
        .info
        .get_str("GENEINFO")
        .and_then(|g| g.split(':').next().map(|s| s.to_string()))
        .filter(|g| !g.is_empty());

    Some(ClinVarEntry {
        rsid,
        significance,
        conditions,
        gene,
        chrom: Some(record.chrom),
        pos: Some(record.pos),
    })
}

/// Reference data held entirely in memory, queried by scan.
pub struct InMemoryIndex {
    by_rsid: HashMap<String, ClinVarEntry>,
    by_position: HashMap<String, BTreeMap<u64, Vec<ClinVarEntry>>>,
}

impl InMemoryIndex {
    fn from_entries(entries: impl IntoIterator<Item = ClinVarEntry>) -> Self {
        let mut by_rsid = HashMap::new();
        let mut by_position: HashMap<String, BTreeMap<u64, Vec<ClinVarEntry>>> = HashMap::new();
        for entry in entries {
            if let (Some(chrom), Some(pos)) = (entry.chrom.clone(), entry.pos) {
                by_position
                    .entry(chrom)
                    .or_default()
                    .entry(pos)
                    .or_default()
                    .push(entry.clone());
            }
            by_rsid.entry(entry.rsid.clone()).or_insert(entry);
        }
        Self {
            by_rsid,
            by_position,
        }
    }

    /// Build from parsed `variant_summary` entries.
    pub fn from_summary(entries: HashMap<String, ClinVarEntry>) -> Self {
        Self::from_entries(entries.into_values())
    }

    /// Build by scanning a ClinVar VCF, plain or gzipped (by magic bytes).
    pub fn from_vcf_path(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let peeked = reader.fill_buf()?;
        let gzipped = peeked.len() >= 2 && peeked[0] == 0x1f && peeked[1] == 0x8b;
        if gzipped {
            Self::from_vcf_reader(BufReader::new(MultiGzDecoder::new(reader)), path)
        } else {
            Self::from_vcf_reader(reader, path)
        }
    }

    fn from_vcf_reader<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.starts_with('#') {
                continue;
            }
            if let Some(entry) = entry_from_vcf_line(&line) {
                entries.push(entry);
            }
        }
        log::info!("loaded {} reference entries from {}", entries.len(), path.display());
        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.by_rsid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rsid.is_empty()
    }
}

impl VariantIndex for InMemoryIndex {
    fn lookup_by_rsid(&self, rsid: &str) -> Result<Option<ClinVarEntry>> {
        Ok(self.by_rsid.get(rsid).cloned())
    }

    fn lookup_by_position(&self, chrom: &str, pos: u64) -> Result<Vec<ClinVarEntry>> {
        let start = pos.saturating_sub(WINDOW_UNCOMPRESSED_BP);
        let end = pos + WINDOW_UNCOMPRESSED_BP;
        let mut out = Vec::new();
        for name in [chrom.to_string(), toggle_chr_prefix(chrom)] {
            if let Some(positions) = self.by_position.get(&name) {
                for (_, entries) in positions.range(start..=end) {
                    out.extend(entries.iter().cloned());
                }
            }
        }
        Ok(out)
    }

    fn backend(&self) -> Backend {
        Backend::Scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_from_vcf_line() {
        let line = "1\t55516888\trs429358\tT\tC\t.\t.\tCLNSIG=Pathogenic;CLNDN=Alzheimer_disease|not_provided;GENEINFO=APOE:348";
        let entry = entry_from_vcf_line(line).unwrap();
        assert_eq!(entry.rsid, "rs429358");
        assert_eq!(entry.significance, ClinicalSignificance::Pathogenic);
        assert_eq!(entry.conditions, vec!["Alzheimer disease"]);
        assert_eq!(entry.gene.as_deref(), Some("APOE"));
        assert_eq!(entry.chrom.as_deref(), Some("1"));
        assert_eq!(entry.pos, Some(55516888));
    }

    #[test]
    fn test_entry_rsid_from_info() {
        // ClinVar's VCF puts its VariationID in the ID column; the rsID
        // lives in INFO/RS as a bare number.
        let line = "1\t100\t12345\tA\tG\t.\t.\tRS=671;CLNSIG=Benign";
        let entry = entry_from_vcf_line(line).unwrap();
        assert_eq!(entry.rsid, "rs671");
    }

    #[test]
    fn test_entry_without_rsid_skipped() {
        let line = "1\t100\t12345\tA\tG\t.\t.\tCLNSIG=Benign";
        assert!(entry_from_vcf_line(line).is_none());
    }

    fn sample_index() -> InMemoryIndex {
        InMemoryIndex::from_entries(vec![
            ClinVarEntry {
                rsid: "rs1".to_string(),
                significance: ClinicalSignificance::Pathogenic,
                conditions: vec![],
                gene: None,
                chrom: Some("1".to_string()),
                pos: Some(1000),
            },
            ClinVarEntry {
                rsid: "rs2".to_string(),
                significance: ClinicalSignificance::Benign,
                conditions: vec![],
                gene: None,
                chrom: Some("chr2".to_string()),
                pos: Some(5000),
            },
        ])
    }

    #[test]
    fn test_lookup_by_rsid() {
        let index = sample_index();
        assert!(index.lookup_by_rsid("rs1").unwrap().is_some());
        assert!(index.lookup_by_rsid("rs999").unwrap().is_none());
    }

    #[test]
    fn test_lookup_by_position_window() {
        let index = sample_index();
        assert_eq!(index.lookup_by_position("1", 1020).unwrap().len(), 1);
        assert!(index.lookup_by_position("1", 1030).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_by_position_chr_prefix_toggle() {
        let index = sample_index();
        // Stored as "chr2", queried as "2".
        let hits = index.lookup_by_position("2", 5000).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rsid, "rs2");
    }
}
