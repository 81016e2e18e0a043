//! Dedicated query worker thread.
//!
//! Reference data loading and lookups run on one OS thread that owns the
//! loaded index outright; callers talk to it over channels with
//! correlation IDs. This keeps multi-gigabyte reference state off the
//! caller's stack and makes teardown explicit.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clinvar::{ClinVarEntry, ReferenceSource};
use crate::error::ClinLensError;
use crate::vcf::toggle_chr_prefix;
use crate::Result;

use super::tabix::{query_vcf_lines, TabixIndex};
use super::{entry_from_vcf_line, Backend, InMemoryIndex, VariantIndex, WINDOW_COMPRESSED_BP};

/// Seconds the caller waits for the worker to finish loading reference
/// data before giving up.
pub const INIT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug)]
enum WorkerRequest {
    LookupRsid { message_id: u64, rsid: String },
    LookupPosition {
        message_id: u64,
        chrom: String,
        pos: u64,
    },
    Shutdown,
}

#[derive(Debug)]
enum WorkerReply {
    Ready { backend: Backend, entries: usize },
    InitFailed { msg: String },
    Rsid {
        message_id: u64,
        result: Option<ClinVarEntry>,
    },
    Position {
        message_id: u64,
        result: Vec<ClinVarEntry>,
    },
    Failed { message_id: u64, msg: String },
}

/// What the worker thread actually holds.
enum WorkerMode {
    Indexed { vcf: PathBuf, index: TabixIndex },
    Scan(InMemoryIndex),
}

impl WorkerMode {
    fn build(source: ReferenceSource) -> Result<Self> {
        match source {
            ReferenceSource::CompressedVcf { vcf, index } => {
                match TabixIndex::from_path(&index) {
                    Ok(index) => Ok(Self::Indexed { vcf, index }),
                    // A broken index only costs random access; the
                    // compressed VCF itself is still linearly readable.
                    Err(e) => {
                        log::warn!(
                            "unusable tabix index {}: {}; scanning {} instead",
                            index.display(),
                            e,
                            vcf.display()
                        );
                        Ok(Self::Scan(InMemoryIndex::from_vcf_path(&vcf)?))
                    }
                }
            }
            ReferenceSource::UncompressedVcf { vcf } => {
                Ok(Self::Scan(InMemoryIndex::from_vcf_path(&vcf)?))
            }
            ReferenceSource::Summary { entries, .. } => {
                Ok(Self::Scan(InMemoryIndex::from_summary(entries)))
            }
        }
    }

    fn backend(&self) -> Backend {
        match self {
            Self::Indexed { .. } => Backend::Indexed,
            Self::Scan(_) => Backend::Scan,
        }
    }

    fn entries(&self) -> usize {
        match self {
            Self::Indexed { .. } => 0,
            Self::Scan(index) => index.len(),
        }
    }

    fn lookup_rsid(&self, rsid: &str) -> Result<Option<ClinVarEntry>> {
        match self {
            // Tabix indexes by position only; rsID misses here are
            // resolved by the caller's positional fallback.
            Self::Indexed { .. } => Ok(None),
            Self::Scan(index) => index.lookup_by_rsid(rsid),
        }
    }

    fn lookup_position(&self, chrom: &str, pos: u64) -> Result<Vec<ClinVarEntry>> {
        match self {
            Self::Indexed { vcf, index } => {
                let start = pos.saturating_sub(WINDOW_COMPRESSED_BP);
                let end = pos + WINDOW_COMPRESSED_BP;
                let mut out = Vec::new();
                for name in [chrom.to_string(), toggle_chr_prefix(chrom)] {
                    if !index.contains(&name) {
                        continue;
                    }
                    for line in query_vcf_lines(vcf, index, &name, start, end)? {
                        if let Some(entry) = entry_from_vcf_line(&line) {
                            out.push(entry);
                        }
                    }
                }
                Ok(out)
            }
            Self::Scan(index) => index.lookup_by_position(chrom, pos),
        }
    }
}

fn worker_loop(
    source: ReferenceSource,
    requests: Receiver<WorkerRequest>,
    replies: Sender<WorkerReply>,
) {
    let mode = match WorkerMode::build(source) {
        Ok(mode) => {
            let _ = replies.send(WorkerReply::Ready {
                backend: mode.backend(),
                entries: mode.entries(),
            });
            mode
        }
        Err(e) => {
            let _ = replies.send(WorkerReply::InitFailed { msg: e.to_string() });
            return;
        }
    };

    while let Ok(request) = requests.recv() {
        let reply = match request {
            WorkerRequest::Shutdown => break,
            WorkerRequest::LookupRsid { message_id, rsid } => {
                match mode.lookup_rsid(&rsid) {
                    Ok(result) => WorkerReply::Rsid { message_id, result },
                    Err(e) => WorkerReply::Failed {
                        message_id,
                        msg: e.to_string(),
                    },
                }
            }
            WorkerRequest::LookupPosition {
                message_id,
                chrom,
                pos,
            } => match mode.lookup_position(&chrom, pos) {
                Ok(result) => WorkerReply::Position { message_id, result },
                Err(e) => WorkerReply::Failed {
                    message_id,
                    msg: e.to_string(),
                },
            },
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
    log::debug!("query worker shutting down");
}

/// Handle to the query worker thread.
#[derive(Debug)]
pub struct QueryWorker {
    requests: Sender<WorkerRequest>,
    // One in-flight transaction at a time; correlation IDs guard against
    // stale replies after a caller abandons a slow request.
    replies: Mutex<Receiver<WorkerReply>>,
    next_id: AtomicU64,
    backend: Backend,
    handle: Option<JoinHandle<()>>,
}

impl QueryWorker {
    /// Spawn the worker and wait for it to load the given source. Fails
    /// with [`ClinLensError::WorkerInitTimeout`] if loading takes longer
    /// than [`INIT_TIMEOUT_SECS`].
    pub fn start(source: ReferenceSource) -> Result<Self> {
        let (req_tx, req_rx) = mpsc::channel();
        let (rep_tx, rep_rx) = mpsc::channel();

        let describe = source.describe();
        let handle = thread::Builder::new()
            .name("clinlens-query".to_string())
            .spawn(move || worker_loop(source, req_rx, rep_tx))
            .map_err(|e| ClinLensError::Io { msg: e.to_string() })?;

        match rep_rx.recv_timeout(Duration::from_secs(INIT_TIMEOUT_SECS)) {
            Ok(WorkerReply::Ready { backend, entries }) => {
                log::info!(
                    "query worker ready ({}, {} entries preloaded)",
                    describe,
                    entries
                );
                Ok(Self {
                    requests: req_tx,
                    replies: Mutex::new(rep_rx),
                    next_id: AtomicU64::new(1),
                    backend,
                    handle: Some(handle),
                })
            }
            Ok(WorkerReply::InitFailed { msg }) => Err(ClinLensError::ReferenceParse {
                source_format: describe.to_string(),
                msg,
            }),
            Ok(other) => Err(ClinLensError::IndexQuery {
                msg: format!("unexpected init reply {:?}", other),
            }),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ClinLensError::WorkerInitTimeout {
                seconds: INIT_TIMEOUT_SECS,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ClinLensError::WorkerGone),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    fn transact(&self, request: WorkerRequest, message_id: u64) -> Result<WorkerReply> {
        let replies = self
            .replies
            .lock()
            .map_err(|_| ClinLensError::WorkerGone)?;
        self.requests
            .send(request)
            .map_err(|_| ClinLensError::WorkerGone)?;
        loop {
            let reply = replies.recv().map_err(|_| ClinLensError::WorkerGone)?;
            let id = match &reply {
                WorkerReply::Rsid { message_id, .. }
                | WorkerReply::Position { message_id, .. }
                | WorkerReply::Failed { message_id, .. } => *message_id,
                _ => continue,
            };
            if id != message_id {
                log::debug!("discarding stale reply {}", id);
                continue;
            }
            if let WorkerReply::Failed { msg, .. } = reply {
                return Err(ClinLensError::IndexQuery { msg });
            }
            return Ok(reply);
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Drop for QueryWorker {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// [`VariantIndex`] implementation backed by a [`QueryWorker`].
#[derive(Debug)]
pub struct WorkerBackedIndex {
    worker: QueryWorker,
}

impl WorkerBackedIndex {
    pub fn start(source: ReferenceSource) -> Result<Self> {
        Ok(Self {
            worker: QueryWorker::start(source)?,
        })
    }
}

impl VariantIndex for WorkerBackedIndex {
    fn lookup_by_rsid(&self, rsid: &str) -> Result<Option<ClinVarEntry>> {
        let message_id = self.worker.next_id();
        let reply = self.worker.transact(
            WorkerRequest::LookupRsid {
                message_id,
                rsid: rsid.to_string(),
            },
            message_id,
        )?;
        match reply {
            WorkerReply::Rsid { result, .. } => Ok(result),
            other => Err(ClinLensError::IndexQuery {
                msg: format!("mismatched reply {:?}", other),
            }),
        }
    }

    fn lookup_by_position(&self, chrom: &str, pos: u64) -> Result<Vec<ClinVarEntry>> {
        let message_id = self.worker.next_id();
        let reply = self.worker.transact(
            WorkerRequest::LookupPosition {
                message_id,
                chrom: chrom.to_string(),
                pos,
            },
            message_id,
        )?;
        match reply {
            WorkerReply::Position { result, .. } => Ok(result),
            other => Err(ClinLensError::IndexQuery {
                msg: format!("mismatched reply {:?}", other),
            }),
        }
    }

    fn backend(&self) -> Backend {
        self.worker.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinvar::ClinicalSignificance;

    fn scan_source(dir: &std::path::Path) -> ReferenceSource {
        let vcf = dir.join("clinvar.vcf");
        std::fs::write(
            &vcf,
            "##fileformat=VCFv4.3\n\
             #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
             1\t1000\trs1\tA\tG\t.\t.\tCLNSIG=Pathogenic;GENEINFO=BRCA2:675\n\
             2\t5000\trs2\tC\tT\t.\t.\tCLNSIG=Benign\n",
        )
        .unwrap();
        ReferenceSource::UncompressedVcf { vcf }
    }

    #[test]
    fn test_worker_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let index = WorkerBackedIndex::start(scan_source(dir.path())).unwrap();
        assert_eq!(index.backend(), Backend::Scan);

        let entry = index.lookup_by_rsid("rs1").unwrap().unwrap();
        assert_eq!(entry.significance, ClinicalSignificance::Pathogenic);
        assert_eq!(entry.gene.as_deref(), Some("BRCA2"));

        assert!(index.lookup_by_rsid("rs404").unwrap().is_none());

        let hits = index.lookup_by_position("chr2", 5010).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rsid, "rs2");
    }

    #[test]
    fn test_truncated_index_degrades_to_scan() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let gz = |data: &[u8]| {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        };

        let dir = tempfile::tempdir().unwrap();
        let vcf = dir.path().join("clinvar.vcf.gz");
        std::fs::write(
            &vcf,
            gz(b"##fileformat=VCFv4.3\n\
                #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
                1\t1000\trs1\tA\tG\t.\t.\tCLNSIG=Pathogenic;GENEINFO=BRCA2:675\n"),
        )
        .unwrap();
        let tbi = dir.path().join("clinvar.vcf.gz.tbi");
        // Valid magic, body cut off mid-header.
        std::fs::write(&tbi, gz(b"TBI\x01\x02")).unwrap();

        let index =
            WorkerBackedIndex::start(ReferenceSource::CompressedVcf { vcf, index: tbi }).unwrap();
        assert_eq!(index.backend(), Backend::Scan);
        let entry = index.lookup_by_rsid("rs1").unwrap().unwrap();
        assert_eq!(entry.gene.as_deref(), Some("BRCA2"));
    }

    #[test]
    fn test_worker_init_failure_surfaces() {
        let source = ReferenceSource::UncompressedVcf {
            vcf: PathBuf::from("/nonexistent/clinvar.vcf"),
        };
        let err = WorkerBackedIndex::start(source).unwrap_err();
        assert!(matches!(err, ClinLensError::ReferenceParse { .. }));
    }

    #[test]
    fn test_worker_drop_joins_thread() {
        let dir = tempfile::tempdir().unwrap();
        let index = WorkerBackedIndex::start(scan_source(dir.path())).unwrap();
        drop(index); // must not hang
    }
}
