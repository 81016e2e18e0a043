//! VCF record representation.
//!
//! Provides the in-memory shape of one VCF data line, with an INFO map that
//! preserves key insertion order so that serialization is stable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An INFO or per-sample field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Flag (presence indicates true)
    Flag,
    /// Single value, kept as text
    Value(String),
    /// Comma-separated list of values
    List(Vec<String>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Flag => Ok(()),
            FieldValue::Value(v) => write!(f, "{}", v),
            FieldValue::List(vs) => write!(f, "{}", vs.join(",")),
        }
    }
}

/// Ordered key-value map for INFO fields.
///
/// VCF tooling conventionally keeps INFO keys in their original order, and
/// round-tripping a record must not reshuffle them, so this is a thin
/// wrapper over a `Vec` of pairs rather than a hash map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InfoMap(Vec<(String, FieldValue)>);

impl InfoMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert a key, replacing any existing value but keeping the key's
    /// original position.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a key as a display string (lists join with commas).
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }

    /// Iterate pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A single VCF record representing one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VcfRecord {
    /// Chromosome/contig name (e.g., "chr1", "1", "X", "MT")
    pub chrom: String,

    /// 1-based position of the first base in the reference allele
    pub pos: u64,

    /// Variant identifier (e.g., rsID), None if "."
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Reference allele
    pub reference: String,

    /// Alternate allele(s); empty when the ALT column is "."
    pub alternate: Vec<String>,

    /// Phred-scaled quality score, None if "."
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f32>,

    /// Filter entries, None if "."
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<String>>,

    /// INFO field key-value pairs, insertion-ordered
    #[serde(default)]
    pub info: InfoMap,

    /// FORMAT keys, in column order, when sample columns are present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Vec<String>>,

    /// Per-sample data keyed by sample name
    #[serde(default)]
    pub samples: HashMap<String, HashMap<String, Option<FieldValue>>>,
}

impl VcfRecord {
    /// Create a new VCF record with minimal required fields.
    pub fn new(chrom: String, pos: u64, reference: String, alternate: Vec<String>) -> Self {
        Self {
            chrom,
            pos,
            id: None,
            reference,
            alternate,
            quality: None,
            filter: None,
            info: InfoMap::new(),
            format: None,
            samples: HashMap::new(),
        }
    }

    /// Create a VCF record for a SNV.
    pub fn snv(chrom: &str, pos: u64, reference: char, alternate: char) -> Self {
        Self::new(
            chrom.to_string(),
            pos,
            reference.to_string(),
            vec![alternate.to_string()],
        )
    }

    /// Set the variant ID (e.g., rsID).
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Add an INFO field.
    pub fn with_info(mut self, key: &str, value: FieldValue) -> Self {
        self.info.insert(key, value);
        self
    }

    /// Get the end position (1-based, inclusive) of the reference allele.
    pub fn end_pos(&self) -> u64 {
        self.pos + self.reference.len() as u64 - 1
    }

    /// Normalize chromosome name: add "chr" prefix if missing.
    pub fn normalized_chrom(&self) -> String {
        if self.chrom.starts_with("chr") {
            self.chrom.clone()
        } else {
            format!("chr{}", self.chrom)
        }
    }

    /// Get chromosome name without "chr" prefix.
    pub fn bare_chrom(&self) -> &str {
        self.chrom.strip_prefix("chr").unwrap_or(&self.chrom)
    }
}

/// Toggle the "chr" prefix on a chromosome name.
///
/// Genotyping platforms disagree on the prefix, so position lookups try
/// both spellings.
pub fn toggle_chr_prefix(chrom: &str) -> String {
    match chrom.strip_prefix("chr") {
        Some(bare) => bare.to_string(),
        None => format!("chr{}", chrom),
    }
}
