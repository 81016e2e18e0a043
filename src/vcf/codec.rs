//! VCF v4.3 line codec.
//!
//! Stateless encode/decode of VCF data lines, header structures, and the
//! INFO/FORMAT field grammar, including percent-encoding of the reserved
//! characters `% : ; = , CR LF TAB`.
//!
//! Parsing is lenient: malformed INFO segments are logged and skipped, and
//! record validation is advisory (warn, don't reject) because real-world
//! files routinely violate the spec in small ways.

use std::collections::HashMap;

use super::record::{FieldValue, InfoMap, VcfRecord};

/// Reserved characters and their percent-encodings, per VCF v4.3.
///
/// `%` is listed first so that encoding never double-encodes an already
/// inserted escape.
const PERCENT_TABLE: [(char, &str); 8] = [
    ('%', "%25"),
    (':', "%3A"),
    (';', "%3B"),
    ('=', "%3D"),
    (',', "%2C"),
    ('\r', "%0D"),
    ('\n', "%0A"),
    ('\t', "%09"),
];

/// Percent-encode the reserved characters in a field value. Used for
/// sample-column values, where `:` delimits FORMAT fields.
pub fn encode_special_chars(s: &str) -> String {
    let mut out = s.to_string();
    for (ch, esc) in PERCENT_TABLE {
        if out.contains(ch) {
            out = out.replace(ch, esc);
        }
    }
    out
}

/// Percent-encode for the ID and INFO columns, where `:` carries no
/// special meaning and stays raw (ClinVar writes `GENEINFO=APOE:348`).
fn encode_info_value(s: &str) -> String {
    let mut out = s.to_string();
    for (ch, esc) in PERCENT_TABLE {
        if ch == ':' {
            continue;
        }
        if out.contains(ch) {
            out = out.replace(ch, esc);
        }
    }
    out
}

/// Exact inverse of [`encode_special_chars`]. Unknown escape sequences are
/// left untouched.
pub fn decode_special_chars(s: &str) -> String {
    if !s.contains('%') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(code) = s.get(i + 1..i + 3) {
                let decoded = PERCENT_TABLE
                    .iter()
                    .find(|(_, esc)| esc[1..].eq_ignore_ascii_case(code))
                    .map(|(ch, _)| *ch);
                if let Some(ch) = decoded {
                    out.push(ch);
                    i += 3;
                    continue;
                }
            }
        }
        let ch = s[i..].chars().next().unwrap_or('\u{fffd}');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Parse a VCF INFO column into an ordered key-value map.
///
/// Segments split on `;`; a bare key is a flag, `key=value` otherwise.
/// Values containing `,` become lists. All keys and values are
/// percent-decoded. Malformed segments are logged and skipped.
pub fn parse_info_field(raw: &str) -> InfoMap {
    let mut info = InfoMap::new();
    if raw == "." || raw.is_empty() {
        return info;
    }

    for segment in raw.split(';') {
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((key, _)) if key.is_empty() => {
                log::warn!("skipping malformed INFO segment {:?}", segment);
            }
            Some((key, value)) => {
                let key = decode_special_chars(key);
                if value.contains(',') {
                    let items = value.split(',').map(decode_special_chars).collect();
                    info.insert(key, FieldValue::List(items));
                } else {
                    info.insert(key, FieldValue::Value(decode_special_chars(value)));
                }
            }
            None => {
                info.insert(decode_special_chars(segment), FieldValue::Flag);
            }
        }
    }
    info
}

/// Serialize an INFO map back into column form. An empty map serializes to
/// `"."`.
pub fn serialize_info_field(info: &InfoMap) -> String {
    if info.is_empty() {
        return ".".to_string();
    }
    info.iter()
        .map(|(key, value)| {
            let key = encode_info_value(key);
            match value {
                FieldValue::Flag => key,
                FieldValue::Value(v) => format!("{}={}", key, encode_info_value(v)),
                FieldValue::List(vs) => {
                    let joined = vs
                        .iter()
                        .map(|v| encode_info_value(v))
                        .collect::<Vec<_>>()
                        .join(",");
                    format!("{}={}", key, joined)
                }
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Parse one VCF data line.
///
/// Returns `None` for header lines and for lines with fewer than 8
/// tab-separated fields. Sample columns are populated only when
/// `sample_names` is non-empty and a FORMAT column is present.
pub fn parse_record(line: &str, sample_names: &[String]) -> Option<VcfRecord> {
    if line.starts_with('#') || line.is_empty() {
        return None;
    }
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 8 {
        return None;
    }

    let pos: u64 = match fields[1].parse() {
        Ok(p) => p,
        Err(_) => {
            log::warn!("non-numeric POS {:?}; dropping line", fields[1]);
            return None;
        }
    };

    let id = match fields[2] {
        "." | "" => None,
        v => Some(decode_special_chars(v)),
    };
    let alternate: Vec<String> = match fields[4] {
        "." | "" => Vec::new(),
        v => v.split(',').map(|a| a.to_string()).collect(),
    };
    let quality = match fields[5] {
        "." | "" => None,
        v => v.parse::<f32>().ok(),
    };
    let filter = match fields[6] {
        "." | "" => None,
        v => Some(v.split(';').map(|f| f.to_string()).collect()),
    };
    let info = parse_info_field(fields[7]);

    let mut format = None;
    let mut samples = HashMap::new();
    if !sample_names.is_empty() && fields.len() > 9 {
        let keys: Vec<String> = fields[8].split(':').map(|k| k.to_string()).collect();
        for (i, name) in sample_names.iter().enumerate() {
            let Some(column) = fields.get(9 + i) else {
                break;
            };
            let mut values: HashMap<String, Option<FieldValue>> = HashMap::new();
            for (key, raw) in keys.iter().zip(column.split(':')) {
                let value = if raw == "." {
                    None
                } else if key == "GT" {
                    // Genotype strings are preserved verbatim; phased
                    // separators and allele indices are meaningful.
                    Some(FieldValue::Value(raw.to_string()))
                } else if raw.contains(',') {
                    Some(FieldValue::List(
                        raw.split(',').map(decode_special_chars).collect(),
                    ))
                } else {
                    Some(FieldValue::Value(decode_special_chars(raw)))
                };
                values.insert(key.clone(), value);
            }
            samples.insert(name.clone(), values);
        }
        format = Some(keys);
    }

    Some(VcfRecord {
        chrom: fields[0].to_string(),
        pos,
        id,
        reference: fields[3].to_string(),
        alternate,
        quality,
        filter,
        info,
        format,
        samples,
    })
}

/// FORMAT key ordering for serialization: `GT` first if present, then all
/// remaining keys in their first-seen order.
fn ordered_format_keys(record: &VcfRecord) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    if let Some(format) = &record.format {
        for key in format {
            if key == "GT" {
                keys.insert(0, key.clone());
            } else if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    } else if !record.samples.is_empty() {
        // No stored FORMAT order; fall back to a deterministic ordering.
        let mut rest: Vec<String> = record
            .samples
            .values()
            .flat_map(|m| m.keys().cloned())
            .filter(|k| k != "GT")
            .collect();
        rest.sort();
        rest.dedup();
        let has_gt = record.samples.values().any(|m| m.contains_key("GT"));
        if has_gt {
            keys.push("GT".to_string());
        }
        keys.extend(rest);
    }
    keys
}

/// Serialize a record back into a VCF data line. `sample_names` fixes the
/// column order of sample data.
pub fn serialize_record(record: &VcfRecord, sample_names: &[String]) -> String {
    let mut fields = vec![
        record.chrom.clone(),
        record.pos.to_string(),
        record
            .id
            .as_deref()
            .map(encode_info_value)
            .unwrap_or_else(|| ".".to_string()),
        record.reference.clone(),
        if record.alternate.is_empty() {
            ".".to_string()
        } else {
            record.alternate.join(",")
        },
        record
            .quality
            .map(|q| q.to_string())
            .unwrap_or_else(|| ".".to_string()),
        record
            .filter
            .as_ref()
            .map(|f| f.join(";"))
            .unwrap_or_else(|| ".".to_string()),
        serialize_info_field(&record.info),
    ];

    let keys = ordered_format_keys(record);
    if !keys.is_empty() && !sample_names.is_empty() {
        fields.push(keys.join(":"));
        for name in sample_names {
            let sample = record.samples.get(name);
            let column = keys
                .iter()
                .map(|key| match sample.and_then(|s| s.get(key)) {
                    Some(Some(FieldValue::Value(v))) if key == "GT" => v.clone(),
                    Some(Some(FieldValue::Value(v))) => encode_special_chars(v),
                    Some(Some(FieldValue::List(vs))) => vs
                        .iter()
                        .map(|v| encode_special_chars(v))
                        .collect::<Vec<_>>()
                        .join(","),
                    Some(Some(FieldValue::Flag)) | Some(None) | None => ".".to_string(),
                })
                .collect::<Vec<_>>()
                .join(":");
            fields.push(column);
        }
    }

    fields.join("\t")
}

/// A structured header entry (`##INFO`, `##FORMAT`, `##FILTER`, `##ALT`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldDef {
    pub id: String,
    pub number: Option<String>,
    pub ty: Option<String>,
    pub description: Option<String>,
}

/// A `##contig` header entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ContigDef {
    pub id: String,
    pub length: Option<u64>,
}

/// Parsed VCF header.
#[derive(Debug, Clone, Default)]
pub struct VcfHeader {
    /// Value of the `##fileformat` line (e.g., "VCFv4.3")
    pub fileformat: String,
    pub contigs: Vec<ContigDef>,
    pub info: Vec<FieldDef>,
    pub format: Vec<FieldDef>,
    pub filters: Vec<FieldDef>,
    pub alts: Vec<FieldDef>,
    /// Sample names from the `#CHROM` row
    pub samples: Vec<String>,
    /// Unrecognized `##` lines, kept verbatim without the `##` prefix
    pub other: Vec<String>,
}

/// Parse a VCF header from its lines (everything up to and including the
/// `#CHROM` row).
pub fn parse_header<'a>(lines: impl IntoIterator<Item = &'a str>) -> VcfHeader {
    let mut header = VcfHeader::default();

    for line in lines {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("##") {
            let Some((key, value)) = rest.split_once('=') else {
                header.other.push(rest.to_string());
                continue;
            };
            match key {
                "fileformat" => header.fileformat = value.to_string(),
                "contig" => {
                    if let Some(kvs) = parse_structured_value(value) {
                        let id = kv_get(&kvs, "ID").unwrap_or_default();
                        if !id.is_empty() {
                            let length = kv_get(&kvs, "length").and_then(|l| l.parse().ok());
                            header.contigs.push(ContigDef { id, length });
                        }
                    }
                }
                "INFO" | "FORMAT" | "FILTER" | "ALT" => {
                    if let Some(def) = parse_field_def(value) {
                        match key {
                            "INFO" => header.info.push(def),
                            "FORMAT" => header.format.push(def),
                            "FILTER" => header.filters.push(def),
                            _ => header.alts.push(def),
                        }
                    } else {
                        log::warn!("unparseable ##{} header entry: {}", key, value);
                    }
                }
                _ => header.other.push(rest.to_string()),
            }
        } else if line.starts_with("#CHROM") {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() > 9 {
                header.samples = fields[9..].iter().map(|s| s.to_string()).collect();
            }
        }
    }
    header
}

fn parse_field_def(value: &str) -> Option<FieldDef> {
    let kvs = parse_structured_value(value)?;
    let id = kv_get(&kvs, "ID")?;
    Some(FieldDef {
        id,
        number: kv_get(&kvs, "Number"),
        ty: kv_get(&kvs, "Type"),
        description: kv_get(&kvs, "Description"),
    })
}

fn kv_get(kvs: &[(String, String)], key: &str) -> Option<String> {
    kvs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

/// Tokenize a bracket-delimited `<K=V,...>` header value.
///
/// Commas inside double quotes do not split, and `\"` / `\\` escapes inside
/// quoted strings are honored.
fn parse_structured_value(value: &str) -> Option<Vec<(String, String)>> {
    let start = value.find('<')?;
    let end = value.rfind('>')?;
    if end <= start {
        return None;
    }
    let inner = &value[start + 1..end];

    let mut pairs = Vec::new();
    let mut token = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let flush = |token: &mut String, pairs: &mut Vec<(String, String)>| {
        if token.is_empty() {
            return;
        }
        if let Some((k, v)) = token.split_once('=') {
            let v = v.trim_matches('"');
            pairs.push((k.to_string(), v.to_string()));
        }
        token.clear();
    };

    for ch in inner.chars() {
        if escaped {
            token.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => {
                in_quotes = !in_quotes;
                token.push(ch);
            }
            ',' if !in_quotes => flush(&mut token, &mut pairs),
            _ => token.push(ch),
        }
    }
    flush(&mut token, &mut pairs);
    Some(pairs)
}

/// Outcome of advisory record validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Symbolic ALT allele IDs recognized without warning.
const SYMBOLIC_ALTS: [&str; 6] = ["DEL", "INS", "DUP", "INV", "CNV", "BND"];

fn is_valid_contig_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('*') || name.starts_with('=') {
        return false;
    }
    name.chars().all(|c| {
        !c.is_whitespace() && !matches!(c, '\\' | ',' | '"' | '\'' | '(' | ')' | '{' | '}' | '<' | '>')
    })
}

fn is_base_sequence(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| matches!(c, 'A' | 'C' | 'G' | 'T' | 'N' | 'a' | 'c' | 'g' | 't' | 'n'))
}

fn is_valid_alt(alt: &str) -> bool {
    if alt == "*" || alt == "." {
        return true;
    }
    if let Some(inner) = alt.strip_prefix('<').and_then(|a| a.strip_suffix('>')) {
        // Known symbolic IDs plus subtyped forms like <DUP:TANDEM>; any
        // non-empty angle-bracket ID is accepted.
        let base = inner.split(':').next().unwrap_or("");
        return !inner.is_empty() && (SYMBOLIC_ALTS.contains(&base) || !base.is_empty());
    }
    // Breakend replacement strings carry brackets and a mate position.
    if alt.contains('[') || alt.contains(']') {
        return true;
    }
    is_base_sequence(alt)
}

/// Validate a record against the VCF v4.3 field grammars.
///
/// Non-throwing: a record that fails validation is still usable; callers
/// decide whether to warn or drop.
pub fn validate_record(record: &VcfRecord) -> Validation {
    let mut errors = Vec::new();

    if !is_valid_contig_name(&record.chrom) {
        errors.push(format!("invalid contig name {:?}", record.chrom));
    }
    if record.pos == 0 {
        errors.push("POS must be >= 1".to_string());
    }
    if !is_base_sequence(&record.reference) {
        errors.push(format!("REF {:?} is not a base sequence", record.reference));
    }
    for alt in &record.alternate {
        if !is_valid_alt(alt) {
            errors.push(format!("invalid ALT allele {:?}", alt));
        }
    }

    Validation {
        is_valid: errors.is_empty(),
        errors,
    }
}
