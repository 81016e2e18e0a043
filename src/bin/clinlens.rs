//! clinlens CLI
//!
//! Command-line interface for annotating consumer genotype files against
//! local ClinVar reference data.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clinlens::annotate::{AnnotatedVariant, AnnotationSession};
use clinlens::clinvar::ReferenceDataLoader;
use clinlens::config::ClinLensConfig;
use clinlens::genotype::{self, GenotypeRecord};
use clinlens::index::WorkerBackedIndex;
use clinlens::vcf::{FieldValue, VcfWriter};
use clinlens::ClinLensError;

#[derive(Parser)]
#[command(name = "clinlens")]
#[command(author, version, about = "Annotate consumer genotype files with ClinVar data")]
#[command(
    long_about = "Detect the format of a consumer genotype export (23andMe,
AncestryDNA, and similar), look each marker up in local ClinVar reference
data, and write annotated output.

Examples:
  clinlens annotate genome.txt --data-dir /var/lib/clinvar
  clinlens annotate genome.txt.gz -f vcf -o annotated.vcf
  clinlens detect genome.csv"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate a genotype file against ClinVar reference data
    Annotate {
        /// Input genotype file (plain or gzipped)
        input: PathBuf,

        /// Directory holding reference data (clinvar.vcf[.gz], variant_summary.txt[.gz])
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short = 'f', long, default_value = "json", value_parser = ["json", "vcf", "tsv"])]
        format: String,

        /// Sample name for VCF output
        #[arg(long)]
        sample_name: Option<String>,

        /// Only emit variants with a reference match
        #[arg(long)]
        matched_only: bool,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Detect and report the layout of a genotype file without annotating
    Detect {
        /// Input genotype file (plain or gzipped)
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Annotate {
            input,
            data_dir,
            output,
            format,
            sample_name,
            matched_only,
            no_progress,
        } => cmd_annotate(
            input,
            data_dir,
            output,
            &format,
            sample_name,
            matched_only,
            no_progress,
        ),
        Commands::Detect { input } => cmd_detect(input),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_detect(input: PathBuf) -> clinlens::Result<()> {
    let (format, records) = genotype::detect(&input)?;
    if format.vcf {
        println!("layout:     VCF export");
    }
    let delimiter = match format.delimiter {
        '\t' => "TAB".to_string(),
        ' ' => "SPACE".to_string(),
        d => d.to_string(),
    };
    println!("delimiter:  {}", delimiter);
    println!("header:     {}", if format.has_header { "yes" } else { "no" });
    println!("columns:    {}", genotype::describe_columns(&format.columns));
    if let Some(a2) = format.allele2_column {
        println!("allele2:    column {}", a2);
    }
    println!("records:    {}", records.len());
    let no_calls = records.iter().filter(|r| r.is_no_call()).count();
    println!("no-calls:   {}", no_calls);
    Ok(())
}

fn cmd_annotate(
    input: PathBuf,
    data_dir: Option<PathBuf>,
    output: Option<PathBuf>,
    format: &str,
    sample_name: Option<String>,
    matched_only: bool,
    no_progress: bool,
) -> clinlens::Result<()> {
    let config = ClinLensConfig::load().unwrap_or_default();
    let data_dir = data_dir
        .or(config.data_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let sample_name = sample_name
        .or(config.sample_name)
        .unwrap_or_else(|| "SAMPLE".to_string());
    let matched_only = matched_only || config.matched_only;

    let (_, records) = genotype::detect(&input)?;
    log::info!("parsed {} genotype records from {}", records.len(), input.display());

    let loader = ReferenceDataLoader::new(&data_dir);
    let mut exclude: Vec<PathBuf> = Vec::new();
    let index = loop {
        let source = loader.load_excluding(&exclude)?;
        log::info!("using {} reference data", source.describe());
        let path = source.path().to_path_buf();
        match WorkerBackedIndex::start(source) {
            Ok(index) => break index,
            // Init failure is terminal for this format only; resume the
            // loader chain at the next candidate.
            Err(e) if e.is_recoverable() => {
                log::warn!("{}; trying the next reference format", e);
                exclude.push(path);
            }
            Err(e) => return Err(e),
        }
    };
    let mut session = AnnotationSession::new(Box::new(index));

    let bar = if no_progress {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(records.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let annotated = session.annotate_with_progress(&records, |processed, message, _| {
        bar.set_message(message.to_string());
        bar.set_position(processed as u64);
    })?;
    bar.finish_and_clear();

    let stats = session.cache_stats();
    log::info!(
        "annotated {} variants (cache hit rate {:.1}%)",
        annotated.len(),
        stats.hit_rate()
    );

    let annotated: Vec<AnnotatedVariant> = if matched_only {
        annotated.into_iter().filter(|v| v.matched).collect()
    } else {
        annotated
    };

    let writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    match format {
        "json" => write_json(writer, &annotated)?,
        "vcf" => write_vcf(writer, &annotated, &sample_name)?,
        _ => write_tsv(writer, &annotated)?,
    }
    Ok(())
}

fn write_json(writer: Box<dyn Write>, annotated: &[AnnotatedVariant]) -> clinlens::Result<()> {
    serde_json::to_writer_pretty(writer, annotated)
        .map_err(|e| ClinLensError::Json { msg: e.to_string() })
}

fn write_tsv(mut writer: Box<dyn Write>, annotated: &[AnnotatedVariant]) -> clinlens::Result<()> {
    writeln!(
        writer,
        "rsid\tchrom\tpos\tgenotype\tsignificance\tgene\tconditions\tassociated_genes\tmatched"
    )?;
    for v in annotated {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            v.rsid,
            v.chrom,
            v.pos,
            v.genotype,
            v.significance,
            v.gene.as_deref().unwrap_or("."),
            if v.conditions.is_empty() {
                ".".to_string()
            } else {
                v.conditions.join("|")
            },
            if v.associated_genes.is_empty() {
                ".".to_string()
            } else {
                v.associated_genes.join("|")
            },
            v.matched,
        )?;
    }
    Ok(())
}

fn write_vcf(
    writer: Box<dyn Write>,
    annotated: &[AnnotatedVariant],
    sample_name: &str,
) -> clinlens::Result<()> {
    let mut contigs: Vec<String> = Vec::new();
    for v in annotated {
        if !v.chrom.is_empty() && !contigs.contains(&v.chrom) {
            contigs.push(v.chrom.clone());
        }
    }
    let mut vcf = VcfWriter::new(writer, vec![sample_name.to_string()]).with_contigs(contigs);
    for v in annotated {
        let record = GenotypeRecord {
            rsid: v.rsid.clone(),
            chrom: v.chrom.clone(),
            pos: v.pos,
            genotype: v.genotype.clone(),
        };
        let mut record = record.to_vcf_record(sample_name);
        if v.matched {
            record.info.insert(
                "CLNSIG",
                FieldValue::Value(v.significance.to_string().replace(' ', "_")),
            );
            if let Some(gene) = &v.gene {
                record.info.insert("GENEINFO", FieldValue::Value(gene.clone()));
            }
            if !v.conditions.is_empty() {
                record.info.insert(
                    "CLNDN",
                    FieldValue::List(
                        v.conditions.iter().map(|c| c.replace(' ', "_")).collect(),
                    ),
                );
            }
        }
        vcf.write_record(&record)?;
    }
    vcf.into_inner()?.flush()?;
    Ok(())
}
