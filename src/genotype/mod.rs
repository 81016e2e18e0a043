//! Consumer genotype files: record type and format detection.

pub mod detector;

pub use detector::{
    describe_columns, detect, detect_from_reader, select_archive_member, DetectedFormat,
};

use serde::{Deserialize, Serialize};

use crate::vcf::{FieldValue, VcfRecord};

/// One genotyped marker from a consumer file.
///
/// Construction goes through [`GenotypeRecord::new`], which enforces the
/// field invariants; a record that exists is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenotypeRecord {
    /// Marker ID, usually a dbSNP rsID ("rs429358") but vendor-internal
    /// IDs ("i3003137") also occur. Empty when the source file has no
    /// marker column.
    pub rsid: String,
    /// Chromosome as reported by the vendor ("1".."22", "X", "Y", "MT").
    /// Empty when unknown.
    pub chrom: String,
    /// 1-based position, 0 when unknown.
    pub pos: u64,
    /// Called alleles, uppercased ("AG", "TT", "--" for no-calls).
    pub genotype: String,
}

impl GenotypeRecord {
    /// Build a record, normalizing and validating the raw fields.
    ///
    /// A record must carry a genotype from the allele alphabet `ACGTDI-`
    /// plus at least one usable identity: a marker ID, or a chromosome
    /// together with a positive position. Anything less returns `None`.
    pub fn new(rsid: &str, chrom: &str, pos: &str, genotype: &str) -> Option<Self> {
        let rsid = rsid.trim();
        let chrom = chrom.trim().trim_start_matches("chr");
        let pos: u64 = pos.trim().parse().unwrap_or(0);
        if rsid.is_empty() && (chrom.is_empty() || pos == 0) {
            return None;
        }
        let genotype = genotype.trim().to_uppercase();
        if genotype.is_empty()
            || !genotype
                .chars()
                .all(|c| matches!(c, 'A' | 'C' | 'G' | 'T' | 'D' | 'I' | '-'))
        {
            return None;
        }
        Some(Self {
            rsid: rsid.to_string(),
            chrom: chrom.to_string(),
            pos,
            genotype,
        })
    }

    /// True when the marker was not called ("--" or all dashes).
    pub fn is_no_call(&self) -> bool {
        self.genotype.chars().all(|c| c == '-')
    }

    /// Convert to a VCF record for export. The reference base is unknown
    /// from consumer data, so REF is `N`, the called alleles become ALT
    /// candidates, and the verbatim call is kept in `INFO/GENOTYPE`.
    pub fn to_vcf_record(&self, sample_name: &str) -> VcfRecord {
        let mut alternate: Vec<String> = Vec::new();
        for allele in self.genotype.chars() {
            let allele = allele.to_string();
            if matches!(allele.as_str(), "A" | "C" | "G" | "T") && !alternate.contains(&allele) {
                alternate.push(allele);
            }
        }

        let mut record = VcfRecord::new(
            self.chrom.clone(),
            self.pos,
            "N".to_string(),
            alternate.clone(),
        )
        .with_id(&self.rsid)
        .with_info("GENOTYPE", FieldValue::Value(self.genotype.clone()));

        // Allele indices: 0 is REF; each distinct ALT is 1-based in order.
        let gt = if self.is_no_call() {
            "./.".to_string()
        } else {
            self.genotype
                .chars()
                .map(|c| {
                    alternate
                        .iter()
                        .position(|a| a == &c.to_string())
                        .map(|i| (i + 1).to_string())
                        .unwrap_or_else(|| ".".to_string())
                })
                .collect::<Vec<_>>()
                .join("/")
        };
        record.format = Some(vec!["GT".to_string()]);
        record.samples.insert(
            sample_name.to_string(),
            [("GT".to_string(), Some(FieldValue::Value(gt)))]
                .into_iter()
                .collect(),
        );
        record
    }
}
