//! Format detection and parsing for consumer genotype exports.
//!
//! Vendors ship raw data in slightly different tabular shapes: 23andMe
//! uses tab-separated columns with `#` comment lines, AncestryDNA splits
//! the genotype across two allele columns, others use CSV. Detection
//! infers the delimiter and column roles from the data itself rather than
//! trusting file extensions.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::ClinLensError;
use crate::vcf::{parse_header, parse_record, FieldValue, VcfRecord};
use crate::Result;

use super::GenotypeRecord;

/// Candidate delimiters, in tie-break priority order.
const DELIMITERS: [char; 4] = ['\t', ',', ';', ' '];

/// Lines sampled for delimiter scoring and column inference.
const SAMPLE_LINES: usize = 30;

/// Columns considered during content-pattern inference.
const SAMPLE_COLUMNS: usize = 10;

/// Matches required before a column is assigned a role by content.
const PATTERN_THRESHOLD: usize = 5;

/// Records parsed per progress chunk.
const CHUNK_SIZE: usize = 5000;

/// Header cell aliases, matched case-insensitively after trimming.
const RSID_ALIASES: [&str; 8] = ["rsid", "rs#", "rs_id", "snp", "snp_id", "id", "name", "marker"];
const CHROM_ALIASES: [&str; 3] = ["chromosome", "chrom", "chr"];
const POS_ALIASES: [&str; 4] = ["position", "pos", "location", "coordinate"];
const GENOTYPE_ALIASES: [&str; 5] = ["genotype", "result", "alleles", "call", "allele1"];

/// Resolved layout of a genotype file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedFormat {
    pub delimiter: char,
    pub has_header: bool,
    /// Column indexes for (rsid, chrom, pos, genotype). A role is `None`
    /// when the file does not carry that column.
    pub columns: [Option<usize>; 4],
    /// Second allele column for vendors that split the genotype.
    pub allele2_column: Option<usize>,
    /// True when the input was a VCF export rather than a delimited table.
    pub vcf: bool,
}

/// Parse a genotype file from disk. Gzip is detected by magic bytes, not
/// extension.
pub fn detect(path: &Path) -> Result<(DetectedFormat, Vec<GenotypeRecord>)> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let peeked = reader.fill_buf()?;
    let gzipped = peeked.len() >= 2 && peeked[0] == 0x1f && peeked[1] == 0x8b;
    if gzipped {
        detect_from_reader(BufReader::new(MultiGzDecoder::new(reader)))
    } else {
        detect_from_reader(reader)
    }
}

/// Parse a genotype file from any reader.
pub fn detect_from_reader<R: Read>(reader: BufReader<R>) -> Result<(DetectedFormat, Vec<GenotypeRecord>)> {
    let mut raw = Vec::new();
    for line in reader.lines() {
        raw.push(line?);
    }

    // VCF exports carry their own signature; route them through the VCF
    // codec before comment stripping eats the header.
    if raw
        .iter()
        .any(|l| l.starts_with("##fileformat=VCF") || l.starts_with("#CHROM\t"))
    {
        return detect_vcf(&raw);
    }

    let lines: Vec<String> = raw
        .into_iter()
        .filter(|l| !l.starts_with('#') && !l.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return Err(ClinLensError::FormatDetection {
            msg: "file contains no data lines".to_string(),
        });
    }

    let sample: Vec<&str> = lines.iter().take(SAMPLE_LINES).map(|l| l.as_str()).collect();
    let delimiter = score_delimiter(&sample).ok_or_else(|| ClinLensError::FormatDetection {
        msg: "no delimiter yields a consistent table of 3+ columns".to_string(),
    })?;

    let header_cells: Vec<String> = split_line(&lines[0], delimiter);
    let format = match match_header(&header_cells) {
        Some((columns, allele2_column)) => DetectedFormat {
            delimiter,
            has_header: true,
            columns,
            allele2_column,
            vcf: false,
        },
        None => {
            let data_sample: Vec<Vec<String>> = sample
                .iter()
                .map(|l| split_line(l, delimiter))
                .collect();
            DetectedFormat {
                delimiter,
                has_header: false,
                columns: infer_columns(&data_sample).map(Some),
                allele2_column: None,
                vcf: false,
            }
        }
    };

    let data_lines = if format.has_header { &lines[1..] } else { &lines[..] };
    let mut records = Vec::with_capacity(data_lines.len());
    let mut skipped = 0usize;

    for chunk in data_lines.chunks(CHUNK_SIZE) {
        for line in chunk {
            match parse_line(line, &format) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        log::debug!("parsed {} genotype records so far", records.len());
    }

    if records.is_empty() {
        return Err(ClinLensError::NoValidRecords {
            delimiter: format.delimiter,
            columns: describe_columns(&format.columns),
            skipped,
        });
    }
    if skipped > 0 {
        log::warn!("skipped {} malformed genotype lines", skipped);
    }
    Ok((format, records))
}

/// Parse a VCF-style genotype export.
///
/// The marker ID, contig and position come from the fixed columns; the
/// genotype string comes from the first sample's GT field with allele
/// indexes resolved against REF/ALT. Sites-only files (no sample columns
/// or no GT key) yield no-call genotypes.
fn detect_vcf(lines: &[String]) -> Result<(DetectedFormat, Vec<GenotypeRecord>)> {
    let header = parse_header(lines.iter().filter(|l| l.starts_with('#')).map(|l| l.as_str()));
    // Only the first sample matters for a personal export.
    let sample_names: Vec<String> = header.samples.iter().take(1).cloned().collect();

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for line in lines {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        match parse_record(line, &sample_names).and_then(|r| vcf_genotype_record(&r, &sample_names))
        {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    let format = DetectedFormat {
        delimiter: '\t',
        has_header: true,
        // CHROM, POS and ID occupy fixed VCF columns.
        columns: [Some(2), Some(0), Some(1), None],
        allele2_column: None,
        vcf: true,
    };
    if records.is_empty() {
        return Err(ClinLensError::NoValidRecords {
            delimiter: format.delimiter,
            columns: "vcf".to_string(),
            skipped,
        });
    }
    if skipped > 0 {
        log::warn!("skipped {} malformed VCF lines", skipped);
    }
    Ok((format, records))
}

fn vcf_genotype_record(record: &VcfRecord, sample_names: &[String]) -> Option<GenotypeRecord> {
    let gt = sample_names
        .first()
        .and_then(|name| record.samples.get(name))
        .and_then(|fields| fields.get("GT"))
        .and_then(|v| v.as_ref());
    let genotype = match gt {
        Some(FieldValue::Value(gt)) => genotype_from_gt(gt, record),
        _ => "--".to_string(),
    };
    GenotypeRecord::new(
        record.id.as_deref().unwrap_or(""),
        &record.chrom,
        &record.pos.to_string(),
        &genotype,
    )
}

/// Resolve a GT string like `0/1` to allele letters against REF/ALT.
///
/// Missing alleles (`.`) become `-`; indel alleles collapse to the
/// consumer-array convention of `I` (longer than REF) or `D`.
fn genotype_from_gt(gt: &str, record: &VcfRecord) -> String {
    let mut out = String::new();
    for token in gt.split(['/', '|']) {
        let allele = token.parse::<usize>().ok().and_then(|i| {
            if i == 0 {
                Some(record.reference.as_str())
            } else {
                record.alternate.get(i - 1).map(|a| a.as_str())
            }
        });
        out.push(match allele {
            None => '-',
            Some(a) if a.len() < record.reference.len() => 'D',
            Some(a) if a.len() > record.reference.len() => 'I',
            Some(a) => a.chars().next().unwrap_or('-'),
        });
    }
    out
}

/// Render the column mapping for errors and the `detect` subcommand.
pub fn describe_columns(columns: &[Option<usize>; 4]) -> String {
    let show = |c: &Option<usize>| c.map_or("-".to_string(), |i| i.to_string());
    let [r, c, p, g] = columns;
    format!(
        "rsid={}, chrom={}, pos={}, genotype={}",
        show(r),
        show(c),
        show(p),
        show(g)
    )
}

fn split_line(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .map(|c| c.trim().trim_matches('"').to_string())
        .collect()
}

/// Pick the delimiter whose column counts are most self-consistent.
///
/// For each candidate, the modal column count across the sample must be at
/// least 3; the candidate whose modal count covers the most lines wins.
/// Ties go to the earlier candidate, so TAB beats comma.
pub fn score_delimiter(sample: &[&str]) -> Option<char> {
    let mut best: Option<(char, usize)> = None;
    for delimiter in DELIMITERS {
        let counts: Vec<usize> = sample
            .iter()
            .map(|l| l.split(delimiter).count())
            .collect();
        let Some(&modal) = counts.iter().max_by_key(|&&c| {
            counts.iter().filter(|&&x| x == c).count()
        }) else {
            continue;
        };
        if modal < 3 {
            continue;
        }
        let coverage = counts.iter().filter(|&&c| c == modal).count();
        if best.map_or(true, |(_, s)| coverage > s) {
            best = Some((delimiter, coverage));
        }
    }
    best.map(|(d, _)| d)
}

/// Match header cells against the role aliases. A row counts as a header
/// when it supplies the marker ID together with either a genotype column
/// or a chromosome and position pair.
fn match_header(cells: &[String]) -> Option<([Option<usize>; 4], Option<usize>)> {
    let lowered: Vec<String> = cells.iter().map(|c| c.to_lowercase()).collect();
    let find = |aliases: &[&str]| {
        lowered
            .iter()
            .position(|c| aliases.contains(&c.as_str()))
    };

    let rsid = find(&RSID_ALIASES)?;
    let chrom = find(&CHROM_ALIASES);
    let pos = find(&POS_ALIASES);
    let genotype = find(&GENOTYPE_ALIASES);
    if genotype.is_none() && (chrom.is_none() || pos.is_none()) {
        return None;
    }

    let allele2 = lowered.iter().position(|c| c == "allele2");
    Some(([Some(rsid), chrom, pos, genotype], allele2))
}

fn is_rsid_like(cell: &str) -> bool {
    let rest = cell.strip_prefix("rs").or_else(|| cell.strip_prefix('i'));
    rest.is_some_and(|r| !r.is_empty() && r.chars().all(|c| c.is_ascii_digit()))
}

fn is_chrom_like(cell: &str) -> bool {
    let bare = cell.strip_prefix("chr").unwrap_or(cell);
    match bare {
        "X" | "Y" | "MT" | "M" | "x" | "y" => true,
        n => n.parse::<u8>().is_ok_and(|v| (1..=22).contains(&v)),
    }
}

fn is_pos_like(cell: &str) -> bool {
    !cell.is_empty() && cell.chars().all(|c| c.is_ascii_digit())
}

fn is_genotype_like(cell: &str) -> bool {
    !cell.is_empty()
        && cell.len() <= 2
        && cell
            .chars()
            .all(|c| matches!(c.to_ascii_uppercase(), 'A' | 'C' | 'G' | 'T' | 'D' | 'I' | '-'))
}

/// Infer column roles from cell contents when no header matched.
///
/// Each of the first [`SAMPLE_COLUMNS`] columns is scored against each
/// role's pattern over the sample lines; a role binds to its best-scoring
/// column above [`PATTERN_THRESHOLD`]. If any role stays unbound, all four
/// fall back to the positional default 0..=3.
pub fn infer_columns(sample: &[Vec<String>]) -> [usize; 4] {
    let width = sample
        .iter()
        .map(|row| row.len())
        .max()
        .unwrap_or(0)
        .min(SAMPLE_COLUMNS);

    let score = |pred: fn(&str) -> bool, col: usize| -> usize {
        sample
            .iter()
            .filter_map(|row| row.get(col))
            .filter(|cell| pred(cell))
            .count()
    };

    let mut assigned: [Option<usize>; 4] = [None; 4];
    let preds: [fn(&str) -> bool; 4] = [is_rsid_like, is_chrom_like, is_pos_like, is_genotype_like];
    for (role, pred) in preds.iter().enumerate() {
        let mut best: Option<(usize, usize)> = None;
        for col in 0..width {
            if assigned.contains(&Some(col)) {
                continue;
            }
            let s = score(*pred, col);
            if s > PATTERN_THRESHOLD && best.map_or(true, |(_, bs)| s > bs) {
                best = Some((col, s));
            }
        }
        assigned[role] = best.map(|(col, _)| col);
    }

    match assigned {
        [Some(r), Some(c), Some(p), Some(g)] => [r, c, p, g],
        _ => [0, 1, 2, 3],
    }
}

fn parse_line(line: &str, format: &DetectedFormat) -> Option<GenotypeRecord> {
    let cells = split_line(line, format.delimiter);
    let get = |i: Option<usize>| {
        i.and_then(|i| cells.get(i))
            .map(|s| s.as_str())
            .unwrap_or("")
    };

    let [rsid, chrom, pos, genotype] = format.columns;
    let genotype_value = match format.allele2_column {
        // AncestryDNA-style split alleles ("A" + "G" -> "AG"); a pair of
        // zeroes is that vendor's no-call.
        Some(a2) => {
            let pair = format!("{}{}", get(genotype), get(Some(a2)));
            if pair == "00" {
                "--".to_string()
            } else {
                pair
            }
        }
        None => get(genotype).to_string(),
    };

    GenotypeRecord::new(get(rsid), get(chrom), get(pos), &genotype_value)
}

/// Choose the genotype data member from an archive listing.
///
/// Consumer downloads often arrive zipped with a single data file plus
/// readme clutter; the largest `.txt`/`.csv`/`.tsv` member wins.
pub fn select_archive_member<'a>(members: &'a [(String, u64)]) -> Option<&'a str> {
    members
        .iter()
        .filter(|(name, _)| {
            let lower = name.to_lowercase();
            !lower.contains("readme")
                && (lower.ends_with(".txt") || lower.ends_with(".csv") || lower.ends_with(".tsv"))
        })
        .max_by_key(|(_, size)| *size)
        .map(|(name, _)| name.as_str())
}
