//! Parser for ClinVar's `variant_summary.txt` tab-separated export.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::ClinLensError;
use crate::Result;

use super::types::{ClinVarEntry, ClinicalSignificance};

/// Cap on loaded entries. The full export is tens of millions of rows;
/// summary mode is a degraded fallback, not a complete index.
pub const MAX_SUMMARY_ENTRIES: usize = 10_000;

/// Columns we need, by their exact header names in the export.
const COL_RSID: &str = "RS# (dbSNP)";
const COL_SIGNIFICANCE: &str = "ClinicalSignificance";
const COL_PHENOTYPES: &str = "PhenotypeList";
const COL_GENE: &str = "GeneSymbol";
const COL_CHROM: &str = "Chromosome";
const COL_START: &str = "Start";
const COL_ASSEMBLY: &str = "Assembly";

/// Load entries from a `variant_summary.txt` or `variant_summary.txt.gz`
/// file, keyed by rsID. Rows without a dbSNP rsID are skipped, and at most
/// [`MAX_SUMMARY_ENTRIES`] distinct rsIDs are kept.
pub fn load_summary(path: &Path) -> Result<HashMap<String, ClinVarEntry>> {
    let file = File::open(path)?;
    let is_gzip = path.extension().is_some_and(|e| e == "gz");
    if is_gzip {
        parse_summary(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        parse_summary(BufReader::new(file))
    }
}

/// Parse the export from any reader. The header row is located by
/// scanning for the line whose first cell is `AlleleID` (with or without
/// a `#` prefix); columns are then resolved by exact name. Only the rsID
/// column is required, since it keys the result map.
pub fn parse_summary<R: Read>(reader: BufReader<R>) -> Result<HashMap<String, ClinVarEntry>> {
    let mut lines = reader.lines();
    let header = loop {
        match lines.next() {
            Some(line) => {
                let line = line?;
                let first = line.split('\t').next().unwrap_or("");
                if first.trim_start_matches('#').trim() == "AlleleID" {
                    break line;
                }
            }
            None => {
                return Err(ClinLensError::ReferenceParse {
                    source_format: "variant_summary".to_string(),
                    msg: "no AlleleID header row found".to_string(),
                })
            }
        }
    };

    let columns = resolve_columns(&header)?;
    let mut entries: HashMap<String, ClinVarEntry> = HashMap::new();

    for line in lines {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();

        // Prefer GRCh38 coordinates when the export carries both builds.
        if let Some(assembly) = columns.assembly.and_then(|i| fields.get(i)) {
            if !assembly.is_empty() && *assembly != "GRCh38" {
                continue;
            }
        }

        let Some(raw_rsid) = fields.get(columns.rsid) else {
            continue;
        };
        // The column holds a bare number, or "-1" when no rsID exists.
        if raw_rsid.is_empty() || *raw_rsid == "-1" || *raw_rsid == "-" {
            continue;
        }
        let rsid = if raw_rsid.starts_with("rs") {
            raw_rsid.to_string()
        } else {
            format!("rs{}", raw_rsid)
        };

        if entries.contains_key(&rsid) {
            continue;
        }
        if entries.len() >= MAX_SUMMARY_ENTRIES {
            log::warn!(
                "variant summary truncated at {} entries",
                MAX_SUMMARY_ENTRIES
            );
            break;
        }

        let significance = columns
            .significance
            .and_then(|i| fields.get(i))
            .map(|s| ClinicalSignificance::normalize(s))
            .unwrap_or_default();
        let conditions = columns
            .phenotypes
            .and_then(|i| fields.get(i))
            .map(|s| split_phenotypes(s))
            .unwrap_or_default();
        let gene = columns
            .gene
            .and_then(|i| fields.get(i))
            .filter(|g| !g.is_empty() && **g != "-")
            .map(|g| g.to_string());
        let chrom = columns
            .chrom
            .and_then(|i| fields.get(i))
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string());
        let pos = columns
            .start
            .and_then(|i| fields.get(i))
            .and_then(|p| p.parse().ok());

        entries.insert(
            rsid.clone(),
            ClinVarEntry {
                rsid,
                significance,
                conditions,
                gene,
                chrom,
                pos,
            },
        );
    }

    Ok(entries)
}

struct SummaryColumns {
    rsid: usize,
    significance: Option<usize>,
    phenotypes: Option<usize>,
    gene: Option<usize>,
    chrom: Option<usize>,
    start: Option<usize>,
    assembly: Option<usize>,
}

fn resolve_columns(header: &str) -> Result<SummaryColumns> {
    let names: Vec<&str> = header
        .trim_start_matches('#')
        .split('\t')
        .map(|n| n.trim())
        .collect();
    let find = |name: &str| names.iter().position(|n| *n == name);

    let significance = find(COL_SIGNIFICANCE);
    let phenotypes = find(COL_PHENOTYPES);
    let gene = find(COL_GENE);
    let chrom = find(COL_CHROM);
    let start = find(COL_START);
    let assembly = find(COL_ASSEMBLY);
    for (name, col) in [
        (COL_SIGNIFICANCE, significance),
        (COL_PHENOTYPES, phenotypes),
        (COL_GENE, gene),
        (COL_CHROM, chrom),
        (COL_START, start),
        (COL_ASSEMBLY, assembly),
    ] {
        if col.is_none() {
            log::warn!("variant summary is missing column {:?}", name);
        }
    }

    // The rsID column keys the result map, so there is no parsing
    // without it.
    let rsid = find(COL_RSID).ok_or_else(|| ClinLensError::ReferenceParse {
        source_format: "variant_summary".to_string(),
        msg: format!("missing required column {:?}", COL_RSID),
    })?;

    Ok(SummaryColumns {
        rsid,
        significance,
        phenotypes,
        gene,
        chrom,
        start,
        assembly,
    })
}

/// PhenotypeList entries are `|`- or `;`-separated; placeholder names are
/// dropped.
fn split_phenotypes(raw: &str) -> Vec<String> {
    raw.split(['|', ';'])
        .map(|p| p.trim().replace('_', " "))
        .filter(|p| !p.is_empty() && p != "-" && p != "not provided" && p != "not specified")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    const HEADER: &str = "#AlleleID\tType\tName\tGeneID\tGeneSymbol\tClinicalSignificance\tRS# (dbSNP)\tPhenotypeList\tAssembly\tChromosome\tStart";

    fn parse(body: &str) -> HashMap<String, ClinVarEntry> {
        let text = format!("{}\n{}", HEADER, body);
        parse_summary(BufReader::new(text.as_bytes())).unwrap()
    }

    #[test]
    fn test_parse_basic_row() {
        let entries = parse(
            "15041\tsingle nucleotide variant\tNM_000059.4:c.1A>G\t675\tBRCA2\tPathogenic\t397507419\tBreast-ovarian cancer|not provided\tGRCh38\t13\t32316461",
        );
        let entry = &entries["rs397507419"];
        assert_eq!(entry.significance, ClinicalSignificance::Pathogenic);
        assert_eq!(entry.gene.as_deref(), Some("BRCA2"));
        assert_eq!(entry.conditions, vec!["Breast-ovarian cancer"]);
        assert_eq!(entry.chrom.as_deref(), Some("13"));
        assert_eq!(entry.pos, Some(32316461));
    }

    #[test]
    fn test_skips_rows_without_rsid() {
        let entries = parse(
            "1\tsnv\tx\t1\tGENE\tBenign\t-1\tcond\tGRCh38\t1\t100\n2\tsnv\ty\t1\tGENE\tBenign\t123\tcond\tGRCh38\t1\t200",
        );
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("rs123"));
    }

    #[test]
    fn test_skips_non_grch38_rows() {
        let entries = parse(
            "1\tsnv\tx\t1\tGENE\tBenign\t123\tcond\tGRCh37\t1\t100\n1\tsnv\tx\t1\tGENE\tBenign\t123\tcond\tGRCh38\t1\t200",
        );
        assert_eq!(entries["rs123"].pos, Some(200));
    }

    #[test]
    fn test_first_row_wins_per_rsid() {
        let entries = parse(
            "1\tsnv\tx\t1\tGENE\tPathogenic\t55\tcond\tGRCh38\t1\t100\n2\tsnv\ty\t1\tGENE\tBenign\t55\tcond\tGRCh38\t1\t100",
        );
        assert_eq!(
            entries["rs55"].significance,
            ClinicalSignificance::Pathogenic
        );
    }

    #[test]
    fn test_missing_rsid_column_errors() {
        let text = "AlleleID\tGeneSymbol\tPhenotypeList\nrow";
        let err = parse_summary(BufReader::new(text.as_bytes())).unwrap_err();
        assert!(matches!(err, ClinLensError::ReferenceParse { .. }));
    }

    #[test]
    fn test_missing_named_columns_default_null() {
        // Everything except the rsID key column is absent; rows still load
        // with default fields.
        let text = "#AlleleID\tRS# (dbSNP)\n1\t123";
        let entries = parse_summary(BufReader::new(text.as_bytes())).unwrap();
        let entry = &entries["rs123"];
        assert_eq!(entry.significance, ClinicalSignificance::Unknown);
        assert!(entry.conditions.is_empty());
        assert!(entry.gene.is_none());
        assert!(entry.chrom.is_none());
    }

    #[test]
    fn test_header_found_after_preamble() {
        let text = format!(
            "## variant_summary export\n## generated 2026-08\n{}\n1\tsnv\tx\t1\tBRCA2\tPathogenic\t123\tcond\tGRCh38\t1\t100",
            HEADER
        );
        let entries = parse_summary(BufReader::new(text.as_bytes())).unwrap();
        assert_eq!(entries["rs123"].gene.as_deref(), Some("BRCA2"));
    }

    #[test]
    fn test_empty_file_errors() {
        let err = parse_summary(BufReader::new("".as_bytes())).unwrap_err();
        assert!(matches!(err, ClinLensError::ReferenceParse { .. }));
    }
}
