//! Condition-to-gene associations.
//!
//! A small curated table mapping well-known condition names to the genes
//! most commonly implicated. Used to enrich annotations whose reference
//! entry names a condition but no gene.

/// Condition keyword (matched case-insensitively as a substring) and its
/// associated gene symbols.
const CONDITION_GENES: [(&str, &[&str]); 12] = [
    ("breast-ovarian cancer", &["BRCA1", "BRCA2", "PALB2"]),
    ("breast cancer", &["BRCA1", "BRCA2", "PALB2", "CHEK2"]),
    ("lynch syndrome", &["MLH1", "MSH2", "MSH6", "PMS2"]),
    ("colorectal cancer", &["APC", "MLH1", "MSH2"]),
    ("alzheimer", &["APOE", "PSEN1", "PSEN2", "APP"]),
    ("cystic fibrosis", &["CFTR"]),
    ("hemochromatosis", &["HFE"]),
    ("factor v leiden", &["F5"]),
    ("thrombophilia", &["F5", "F2"]),
    ("familial hypercholesterolemia", &["LDLR", "APOB", "PCSK9"]),
    ("tay-sachs", &["HEXA"]),
    ("sickle cell", &["HBB"]),
];

/// Genes associated with a condition name. The first matching table row
/// wins; unknown conditions return an empty slice.
pub fn associated_genes(condition: &str) -> &'static [&'static str] {
    let lowered = condition.to_lowercase();
    CONDITION_GENES
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, genes)| *genes)
        .unwrap_or(&[])
}
