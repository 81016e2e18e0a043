//! End-to-end pipeline tests: genotype file in, annotated variants out.

use std::path::Path;

use clinlens::annotate::AnnotationSession;
use clinlens::{
    detect, Backend, ClinLensError, ClinicalSignificance, ReferenceDataLoader, WorkerBackedIndex,
};

const GENOTYPE_FILE: &str = "\
# This data file generated by a consumer genotyping service\n\
# rsid\tchromosome\tposition\tgenotype\n\
rs429358\t19\t44908684\tCT\n\
rs7412\t19\t44908822\tCC\n\
rs4988235\t2\t135851076\tAG\n\
rs0000001\t1\t1000000\t--\n";

const CLINVAR_VCF: &str = "\
##fileformat=VCFv4.3\n\
##INFO=<ID=CLNSIG,Number=.,Type=String,Description=\"Clinical significance\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
2\t135851076\trs4988235\tG\tA\t.\t.\tCLNSIG=Benign;CLNDN=Lactase_persistence;GENEINFO=MCM6:4175\n\
19\t44908684\trs429358\tT\tC\t.\t.\tCLNSIG=Pathogenic;CLNDN=Alzheimer_disease|not_provided;GENEINFO=APOE:348\n";

fn write_inputs(dir: &Path) -> std::path::PathBuf {
    std::fs::write(dir.join("clinvar.vcf"), CLINVAR_VCF).unwrap();
    let genotype_path = dir.join("genome.txt");
    std::fs::write(&genotype_path, GENOTYPE_FILE).unwrap();
    genotype_path
}

#[test]
fn annotates_genotype_file_against_vcf_reference() {
    let dir = tempfile::tempdir().unwrap();
    let genotype_path = write_inputs(dir.path());

    let (_, records) = detect(&genotype_path).unwrap();
    assert_eq!(records.len(), 4);

    let source = ReferenceDataLoader::new(dir.path()).load().unwrap();
    let index = WorkerBackedIndex::start(source).unwrap();
    let mut session = AnnotationSession::new(Box::new(index));
    assert_eq!(session.backend(), Backend::Scan);

    let annotated = session.annotate(&records).unwrap();

    // Output is full-length and in input order.
    assert_eq!(annotated.len(), 4);
    assert_eq!(annotated[0].rsid, "rs429358");
    assert!(annotated[0].matched);
    assert_eq!(annotated[0].significance, ClinicalSignificance::Pathogenic);
    assert_eq!(annotated[0].gene.as_deref(), Some("APOE"));
    assert_eq!(annotated[0].conditions, vec!["Alzheimer disease"]);
    assert_eq!(annotated[0].genotype, "CT");

    // rs7412 is not in the reference; 138 bp from rs429358 is outside
    // every search window.
    assert!(!annotated[1].matched);
    assert_eq!(annotated[1].significance, ClinicalSignificance::Unknown);

    assert!(annotated[2].matched);
    assert_eq!(annotated[2].significance, ClinicalSignificance::Benign);

    assert!(!annotated[3].matched);
    assert_eq!(annotated[3].genotype, "--");
}

#[test]
fn falls_back_to_summary_reference() {
    let dir = tempfile::tempdir().unwrap();
    let genotype_path = write_inputs(dir.path());
    // Remove the VCF so the loader lands on the summary export.
    std::fs::remove_file(dir.path().join("clinvar.vcf")).unwrap();
    std::fs::write(
        dir.path().join("variant_summary.txt"),
        "#AlleleID\tGeneSymbol\tClinicalSignificance\tRS# (dbSNP)\tPhenotypeList\tAssembly\tChromosome\tStart\n\
         1\tAPOE\tPathogenic/Likely_pathogenic\t429358\tAlzheimer disease\tGRCh38\t19\t44908684\n",
    )
    .unwrap();

    let (_, records) = detect(&genotype_path).unwrap();
    let source = ReferenceDataLoader::new(dir.path()).load().unwrap();
    let index = WorkerBackedIndex::start(source).unwrap();
    let mut session = AnnotationSession::new(Box::new(index));
    let annotated = session.annotate(&records).unwrap();

    assert_eq!(annotated.len(), 4);
    assert!(annotated[0].matched);
    // Combined assertion resolves to the most severe component.
    assert_eq!(annotated[0].significance, ClinicalSignificance::Pathogenic);
    assert!(!annotated[2].matched);
}

#[test]
fn missing_reference_directory_lists_probed_paths() {
    let dir = tempfile::tempdir().unwrap();
    let err = ReferenceDataLoader::new(dir.path()).load().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("clinvar.vcf"));
    assert!(msg.contains("variant_summary.txt"));
    assert!(matches!(
        err,
        ClinLensError::ReferenceDataUnavailable { .. }
    ));
}

#[test]
fn annotated_output_serializes_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let genotype_path = write_inputs(dir.path());

    let (_, records) = detect(&genotype_path).unwrap();
    let source = ReferenceDataLoader::new(dir.path()).load().unwrap();
    let index = WorkerBackedIndex::start(source).unwrap();
    let mut session = AnnotationSession::new(Box::new(index));
    let annotated = session.annotate(&records).unwrap();

    let json = serde_json::to_string(&annotated).unwrap();
    assert!(json.contains("\"rs429358\""));
    assert!(json.contains("\"Pathogenic\""));

    let round: Vec<clinlens::AnnotatedVariant> = serde_json::from_str(&json).unwrap();
    assert_eq!(round, annotated);
}

#[test]
fn gzipped_genotype_input_is_transparent() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(GENOTYPE_FILE.as_bytes()).unwrap();
    let genotype_path = dir.path().join("genome.txt.gz");
    std::fs::write(&genotype_path, encoder.finish().unwrap()).unwrap();

    let (_, records) = detect(&genotype_path).unwrap();
    assert_eq!(records.len(), 4);
}

#[test]
fn session_reuses_cache_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let genotype_path = write_inputs(dir.path());

    let (_, records) = detect(&genotype_path).unwrap();
    let source = ReferenceDataLoader::new(dir.path()).load().unwrap();
    let index = WorkerBackedIndex::start(source).unwrap();
    let mut session = AnnotationSession::new(Box::new(index));

    session.annotate(&records).unwrap();
    session.annotate(&records).unwrap();

    let stats = session.cache_stats();
    // Second pass is answered entirely from cache.
    assert_eq!(stats.hits, 4);
    assert_eq!(stats.misses, 4);
}
