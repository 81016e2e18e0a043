//! Tabix (.tbi) index reader and BGZF-backed region queries.
//!
//! A tabix index is a gzipped binary file: magic `TBI\x01`, header
//! integers, NUL-separated sequence names, then per-sequence hierarchical
//! bins (each a list of chunks bounded by BGZF virtual offsets) and a
//! 16kb-resolution linear index. All integers are little-endian.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::ClinLensError;
use crate::Result;

const TBI_MAGIC: &[u8; 4] = b"TBI\x01";

/// Tabix uses fixed binning parameters (5 levels above 16kb leaves).
const MIN_SHIFT: u32 = 14;
const METADATA_BIN: u32 = 37450;

/// A BGZF virtual offset: the high 48 bits address the start of a
/// compressed block, the low 16 bits an offset inside its decompressed
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Byte offset of the compressed block in the file.
    pub fn coffset(&self) -> u64 {
        self.0 >> 16
    }

    /// Offset within the decompressed block.
    pub fn uoffset(&self) -> u64 {
        self.0 & 0xffff
    }
}

/// A half-open range of file data, in virtual offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}

#[derive(Debug, Default)]
struct TabixReference {
    bins: HashMap<u32, Vec<Chunk>>,
    /// Linear index: smallest virtual offset of any record overlapping
    /// each 16kb window.
    intervals: Vec<VirtualOffset>,
}

/// Parsed tabix index.
#[derive(Debug)]
pub struct TabixIndex {
    names: Vec<String>,
    ref_map: HashMap<String, usize>,
    refs: Vec<TabixReference>,
}

impl TabixIndex {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = MultiGzDecoder::new(BufReader::new(file));
        Self::parse(&mut reader).map_err(|e| match e {
            ClinLensError::Io { msg } => ClinLensError::ReferenceParse {
                source_format: "tabix".to_string(),
                msg: format!("{}: {}", path.display(), msg),
            },
            other => other,
        })
    }

    /// Parse an index from an already-decompressed byte stream.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != TBI_MAGIC {
            return Err(ClinLensError::ReferenceParse {
                source_format: "tabix".to_string(),
                msg: format!("bad magic {:?}", magic),
            });
        }

        let n_ref = read_i32(reader)?;
        // format, col_seq, col_beg, col_end, meta, skip
        for _ in 0..6 {
            read_i32(reader)?;
        }
        let l_nm = read_i32(reader)?;
        if n_ref < 0 || l_nm < 0 {
            return Err(ClinLensError::ReferenceParse {
                source_format: "tabix".to_string(),
                msg: format!("negative header field (n_ref={}, l_nm={})", n_ref, l_nm),
            });
        }

        let mut name_bytes = vec![0u8; l_nm as usize];
        reader.read_exact(&mut name_bytes)?;
        let names: Vec<String> = name_bytes
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();

        let mut refs = Vec::with_capacity(n_ref as usize);
        for _ in 0..n_ref {
            let mut reference = TabixReference::default();

            let n_bin = read_i32(reader)?;
            for _ in 0..n_bin.max(0) {
                let bin_id = read_u32(reader)?;
                let n_chunk = read_i32(reader)?;
                if bin_id == METADATA_BIN {
                    // Pseudo-bin: record span and counts, not real chunks.
                    for _ in 0..n_chunk.max(0) {
                        read_u64(reader)?;
                        read_u64(reader)?;
                    }
                    continue;
                }
                let mut chunks = Vec::with_capacity(n_chunk.max(0) as usize);
                for _ in 0..n_chunk.max(0) {
                    chunks.push(Chunk {
                        start: VirtualOffset::from_raw(read_u64(reader)?),
                        end: VirtualOffset::from_raw(read_u64(reader)?),
                    });
                }
                reference.bins.insert(bin_id, chunks);
            }

            let n_intv = read_i32(reader)?;
            for _ in 0..n_intv.max(0) {
                reference
                    .intervals
                    .push(VirtualOffset::from_raw(read_u64(reader)?));
            }
            refs.push(reference);
        }

        let ref_map = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();

        Ok(Self {
            names,
            ref_map,
            refs,
        })
    }

    /// Sequence names indexed, in file order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ref_map.contains_key(name)
    }

    /// Chunks that may hold records overlapping `[start, end)` (0-based,
    /// half-open). Returns `None` when the sequence is not indexed.
    pub fn chunks(&self, name: &str, start: u32, end: u32) -> Option<Vec<Chunk>> {
        let reference = self.refs.get(*self.ref_map.get(name)?)?;

        let min_offset = reference
            .intervals
            .get((start >> MIN_SHIFT) as usize)
            .copied()
            .unwrap_or(VirtualOffset::from_raw(0));

        let mut chunks: Vec<Chunk> = reg2bins(start, end)
            .into_iter()
            .flat_map(|bin| reference.bins.get(&bin).into_iter().flatten().copied())
            .filter(|c| c.end > min_offset)
            .collect();
        chunks.sort_by_key(|c| c.start);
        Some(merge_chunks(&chunks))
    }
}

/// Bin IDs overlapping `[beg, end)` under the fixed tabix scheme.
fn reg2bins(beg: u32, end: u32) -> Vec<u32> {
    let mut bins = vec![0u32];
    if beg >= end {
        return bins;
    }
    let end = end - 1;
    for (offset, shift) in [(1, 26), (9, 23), (73, 20), (585, 17), (4681, 14)] {
        for bin in (offset + (beg >> shift))..=(offset + (end >> shift)) {
            bins.push(bin);
        }
    }
    bins
}

fn merge_chunks(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::new();
    for chunk in chunks {
        match merged.last_mut() {
            Some(last) if chunk.start <= last.end => {
                if chunk.end > last.end {
                    last.end = chunk.end;
                }
            }
            _ => merged.push(*chunk),
        }
    }
    merged
}

/// Read the VCF data lines overlapping `[start, end]` (1-based, inclusive)
/// on `chrom` from a BGZF-compressed file, using the index's chunks.
///
/// Each chunk is resolved by seeking to its block offset, decompressing
/// forward, and skipping the intra-block offset. Scanning stops early once
/// a record past `end` is seen, since VCFs are position-sorted.
pub fn query_vcf_lines(
    vcf_path: &Path,
    index: &TabixIndex,
    chrom: &str,
    start: u64,
    end: u64,
) -> Result<Vec<String>> {
    let zero_start = start.saturating_sub(1) as u32;
    let Some(chunks) = index.chunks(chrom, zero_start, end as u32) else {
        return Ok(Vec::new());
    };

    let mut lines = Vec::new();
    for chunk in chunks {
        let mut file = File::open(vcf_path)?;
        file.seek(SeekFrom::Start(chunk.start.coffset()))?;
        let mut decoder = BufReader::new(MultiGzDecoder::new(BufReader::new(file)));

        let mut skip = vec![0u8; chunk.start.uoffset() as usize];
        if !skip.is_empty() {
            decoder.read_exact(&mut skip).map_err(|e| ClinLensError::IndexQuery {
                msg: format!("seek into block failed: {}", e),
            })?;
        }

        let mut line = String::new();
        loop {
            line.clear();
            let n = decoder.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let mut fields = line.split('\t');
            let (Some(rec_chrom), Some(rec_pos)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Ok(pos) = rec_pos.parse::<u64>() else {
                continue;
            };
            if rec_chrom != chrom {
                continue;
            }
            if pos > end {
                break;
            }
            if pos >= start {
                lines.push(line.trim_end().to_string());
            }
        }
    }
    lines.dedup();
    Ok(lines)
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_virtual_offset_split() {
        let v = VirtualOffset::from_raw((123 << 16) | 456);
        assert_eq!(v.coffset(), 123);
        assert_eq!(v.uoffset(), 456);
    }

    #[test]
    fn test_reg2bins_levels() {
        let bins = reg2bins(0, 1);
        // One bin per level, root included.
        assert_eq!(bins, vec![0, 1, 9, 73, 585, 4681]);

        let bins = reg2bins(16384, 16385);
        assert!(bins.contains(&4682));
    }

    #[test]
    fn test_reg2bins_empty_region() {
        assert_eq!(reg2bins(100, 100), vec![0]);
    }

    #[test]
    fn test_merge_chunks() {
        let c = |s: u64, e: u64| Chunk {
            start: VirtualOffset::from_raw(s),
            end: VirtualOffset::from_raw(e),
        };
        let merged = merge_chunks(&[c(100, 200), c(150, 250), c(300, 400)]);
        assert_eq!(merged, vec![c(100, 250), c(300, 400)]);
    }

    /// Build a minimal single-reference index body.
    fn synthetic_tbi(name: &str, bin_id: u32, chunk: (u64, u64)) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(TBI_MAGIC);
        buf.extend_from_slice(&1i32.to_le_bytes()); // n_ref
        buf.extend_from_slice(&2i32.to_le_bytes()); // format: VCF
        buf.extend_from_slice(&1i32.to_le_bytes()); // col_seq
        buf.extend_from_slice(&2i32.to_le_bytes()); // col_beg
        buf.extend_from_slice(&0i32.to_le_bytes()); // col_end
        buf.extend_from_slice(&(b'#' as i32).to_le_bytes()); // meta
        buf.extend_from_slice(&0i32.to_le_bytes()); // skip
        let mut nm = name.as_bytes().to_vec();
        nm.push(0);
        buf.extend_from_slice(&(nm.len() as i32).to_le_bytes());
        buf.extend_from_slice(&nm);
        buf.extend_from_slice(&1i32.to_le_bytes()); // n_bin
        buf.extend_from_slice(&bin_id.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes()); // n_chunk
        buf.extend_from_slice(&chunk.0.to_le_bytes());
        buf.extend_from_slice(&chunk.1.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes()); // n_intv
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf
    }

    #[test]
    fn test_parse_synthetic_index() {
        let bytes = synthetic_tbi("1", 4681, (0, 1 << 16));
        let index = TabixIndex::parse(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(index.names(), ["1"]);
        assert!(index.contains("1"));
        assert!(!index.contains("chr1"));

        let chunks = index.chunks("1", 100, 200).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start.as_raw(), 0);

        assert!(index.chunks("2", 100, 200).is_none());
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let err = TabixIndex::parse(&mut Cursor::new(b"BAI\x01rest".to_vec())).unwrap_err();
        assert!(matches!(err, ClinLensError::ReferenceParse { .. }));
    }

    #[test]
    fn test_query_vcf_lines_gzip_single_block() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let body = "##fileformat=VCFv4.3\n\
                    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
                    1\t100\trs1\tA\tG\t.\t.\tCLNSIG=Pathogenic\n\
                    1\t150\trs2\tC\tT\t.\t.\tCLNSIG=Benign\n\
                    1\t900\trs3\tG\tA\t.\t.\tCLNSIG=Benign\n";
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body.as_bytes()).unwrap();
        let gz = encoder.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let vcf_path = dir.path().join("clinvar.vcf.gz");
        std::fs::write(&vcf_path, gz).unwrap();

        // Single gzip member starting at file offset 0; uoffset 0 means
        // the scan starts at the header, which the chrom filter skips.
        let tbi = synthetic_tbi("1", 4681, (0, 1 << 16));
        let index = TabixIndex::parse(&mut Cursor::new(tbi)).unwrap();

        let lines = query_vcf_lines(&vcf_path, &index, "1", 90, 200).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("rs1"));
        assert!(lines[1].contains("rs2"));
    }
}
