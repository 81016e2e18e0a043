//! ClinVar data types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Normalized clinical significance classification.
///
/// ClinVar reports combined assertions like
/// "Pathogenic/Likely pathogenic"; normalization keeps the most severe
/// component so downstream consumers work with six stable categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ClinicalSignificance {
    /// Pathogenic - variant causes disease
    Pathogenic,
    /// Likely pathogenic - variant probably causes disease
    LikelyPathogenic,
    /// Uncertain significance - insufficient evidence
    UncertainSignificance,
    /// Likely benign - variant probably does not cause disease
    LikelyBenign,
    /// Benign - variant does not cause disease
    Benign,
    /// Unrecognized, conflicting, or absent classification
    #[default]
    Unknown,
}

impl ClinicalSignificance {
    /// Convert to display string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pathogenic => "Pathogenic",
            Self::LikelyPathogenic => "Likely pathogenic",
            Self::UncertainSignificance => "Uncertain significance",
            Self::LikelyBenign => "Likely benign",
            Self::Benign => "Benign",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a pathogenic classification.
    pub fn is_pathogenic(&self) -> bool {
        matches!(self, Self::Pathogenic | Self::LikelyPathogenic)
    }

    /// Check if this is a benign classification.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Benign | Self::LikelyBenign)
    }

    /// Severity rank for combined-assertion resolution. Higher is more
    /// severe; `Unknown` never wins over a recognized category.
    fn severity(&self) -> u8 {
        match self {
            Self::Pathogenic => 5,
            Self::LikelyPathogenic => 4,
            Self::UncertainSignificance => 3,
            Self::LikelyBenign => 2,
            Self::Benign => 1,
            Self::Unknown => 0,
        }
    }

    /// Classify a single assertion token.
    fn classify_token(token: &str) -> Self {
        let t = token.trim().replace('_', " ").to_lowercase();
        // "Conflicting interpretations of pathogenicity" and negated
        // assertions like "not pathogenic" would otherwise match the
        // pathogenic substring test.
        if t.contains("conflicting") || t.contains("not") {
            return Self::Unknown;
        }
        let pathogenic = t.contains("pathogenic");
        let benign = t.contains("benign");
        let likely = t.contains("likely");
        if pathogenic && !benign {
            if likely {
                Self::LikelyPathogenic
            } else {
                Self::Pathogenic
            }
        } else if benign && !pathogenic {
            if likely {
                Self::LikelyBenign
            } else {
                Self::Benign
            }
        } else if t.contains("uncertain") || t == "vus" {
            Self::UncertainSignificance
        } else {
            Self::Unknown
        }
    }

    /// Normalize a raw ClinVar significance string, possibly a combined
    /// assertion (`/`, `;`, `,`, or `|` separated). The most severe
    /// recognized component wins.
    pub fn normalize(raw: &str) -> Self {
        raw.split(['/', ';', ',', '|'])
            .map(Self::classify_token)
            .max_by_key(|s| s.severity())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for ClinicalSignificance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ClinicalSignificance {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::normalize(s))
    }
}

/// A reference entry for one known variant, keyed by rsID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClinVarEntry {
    /// rsID including the "rs" prefix (e.g., "rs429358").
    pub rsid: String,
    /// Normalized clinical significance.
    pub significance: ClinicalSignificance,
    /// Associated condition names, underscores replaced with spaces.
    pub conditions: Vec<String>,
    /// Gene symbol, if known.
    pub gene: Option<String>,
    /// Chromosome the variant sits on.
    pub chrom: Option<String>,
    /// 1-based position.
    pub pos: Option<u64>,
}

impl ClinVarEntry {
    /// Create an entry with just an rsID; everything else defaults.
    pub fn new(rsid: impl Into<String>) -> Self {
        Self {
            rsid: rsid.into(),
            ..Default::default()
        }
    }

    /// Set the significance.
    pub fn with_significance(mut self, significance: ClinicalSignificance) -> Self {
        self.significance = significance;
        self
    }

    /// Set the gene symbol.
    pub fn with_gene(mut self, gene: impl Into<String>) -> Self {
        self.gene = Some(gene.into());
        self
    }

    /// Add a condition name.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }
}
