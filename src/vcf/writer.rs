//! VCF output writer.

use std::io::{self, Write};

use chrono::Local;

use super::codec::serialize_record;
use super::record::VcfRecord;

/// Writes a minimal VCF v4.3 document: a fixed header followed by data
/// lines in insertion order.
pub struct VcfWriter<W: Write> {
    inner: W,
    sample_names: Vec<String>,
    contigs: Vec<String>,
    header_written: bool,
    source: String,
}

impl<W: Write> VcfWriter<W> {
    pub fn new(inner: W, sample_names: Vec<String>) -> Self {
        Self {
            inner,
            sample_names,
            contigs: Vec::new(),
            header_written: false,
            source: format!("clinlens-{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Declare the contigs to list in the header, in output order. The
    /// names must match the CHROM values of the records written.
    pub fn with_contigs(mut self, contigs: Vec<String>) -> Self {
        self.contigs = contigs;
        self
    }

    /// Write the header lines. Called automatically by the first
    /// [`write_record`](Self::write_record).
    pub fn write_header(&mut self) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        writeln!(self.inner, "##fileformat=VCFv4.3")?;
        writeln!(self.inner, "##fileDate={}", Local::now().format("%Y%m%d"))?;
        writeln!(self.inner, "##source={}", self.source)?;
        for contig in &self.contigs {
            writeln!(self.inner, "##contig=<ID={}>", contig)?;
        }
        writeln!(
            self.inner,
            "##INFO=<ID=GENOTYPE,Number=1,Type=String,Description=\"Reported genotype alleles\">"
        )?;
        writeln!(
            self.inner,
            "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">"
        )?;
        write!(self.inner, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;
        if !self.sample_names.is_empty() {
            write!(self.inner, "\tFORMAT")?;
            for name in &self.sample_names {
                write!(self.inner, "\t{}", name)?;
            }
        }
        writeln!(self.inner)?;
        self.header_written = true;
        Ok(())
    }

    pub fn write_record(&mut self, record: &VcfRecord) -> io::Result<()> {
        self.write_header()?;
        writeln!(self.inner, "{}", serialize_record(record, &self.sample_names))
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
