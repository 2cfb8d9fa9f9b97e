//! End-to-end pipeline tests with in-memory collaborators.
//!
//! The fakes read structure straight out of the fixture text, so each test
//! controls classification, extraction and diffs through the files it writes:
//!
//! ```text
//! category: constitucion
//! fecha: 01-02-2020
//! rut: 76.154.106-4
//! ```

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use docket::artifacts::ArtifactWriter;
use docket::cache::OcrCache;
use docket::classify::Category;
use docket::error::CollaboratorError;
use docket::models::{ChangeRecord, DiffResult, FieldRecord, OcrPage};
use docket::pipeline::{Pipeline, PipelineSettings, PipelineStatus, Stage};
use docket::traits::{
    Classification, Collaborators, DocumentClassifier, FieldExtractor, FieldSchema, OcrOutput,
    OcrService, VersionDiffer,
};

// ─── Fakes ──────────────────────────────────────────────────────────

/// Reads bytes as UTF-8; fails on any filename containing `broken`, or on
/// everything when `fail_all` is set.
#[derive(Default)]
struct TextOcr {
    fail_all: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl OcrService for TextOcr {
    fn name(&self) -> &str {
        "text"
    }

    async fn analyze(&self, filename: &str, bytes: &[u8]) -> Result<OcrOutput, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || filename.contains("broken") {
            return Err(CollaboratorError::Unsupported(filename.to_string()));
        }
        let text = String::from_utf8_lossy(bytes).into_owned();
        Ok(OcrOutput {
            pages: vec![OcrPage {
                page_number: 1,
                text: text.clone(),
            }],
            text_raw: text,
            num_pages: 1,
            language: Some("es".into()),
        })
    }
}

fn line_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines()
        .find_map(|l| l.strip_prefix(&format!("{}:", key)))
        .map(str::trim)
}

struct LineClassifier;

#[async_trait]
impl DocumentClassifier for LineClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, CollaboratorError> {
        if text.contains("unclassifiable") {
            return Err(CollaboratorError::Unavailable("model overloaded".into()));
        }
        Ok(Classification {
            category: Category::from_label(line_value(text, "category").unwrap_or("")),
            raw_date: line_value(text, "fecha").map(str::to_string),
        })
    }
}

struct LineExtractor;

#[async_trait]
impl FieldExtractor for LineExtractor {
    async fn extract(
        &self,
        text: &str,
        schema: &FieldSchema,
    ) -> Result<FieldRecord, CollaboratorError> {
        Ok(schema
            .fields
            .iter()
            .filter_map(|f| line_value(text, f).map(|v| (f.clone(), v.to_string())))
            .collect())
    }
}

struct SummaryDiffer;

#[async_trait]
impl VersionDiffer for SummaryDiffer {
    async fn diff(&self, before: &str, after: &str) -> Result<DiffResult, CollaboratorError> {
        let before_date = line_value(before, "fecha").unwrap_or("").to_string();
        let after_date = line_value(after, "fecha").unwrap_or("").to_string();
        Ok(DiffResult {
            changes: vec![ChangeRecord {
                title: "fecha".into(),
                before: before_date.clone(),
                after: after_date.clone(),
            }],
            summary: format!("{} -> {}", before_date, after_date),
        })
    }
}

fn collaborators(ocr: Arc<TextOcr>) -> Collaborators {
    Collaborators {
        ocr,
        classifier: Arc::new(LineClassifier),
        extractor: Arc::new(LineExtractor),
        differ: Arc::new(SummaryDiffer),
    }
}

fn write(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

/// A case folder with three deeds, one publication and one registration.
fn case_folder(root: &Path) -> std::path::PathBuf {
    let folder = root.join("caso_42");
    std::fs::create_dir_all(&folder).unwrap();
    write(
        &folder,
        "escritura_2015.txt",
        "category: constitucion\nfecha: 12-03-2015\nrut: 76.154.106-4\nrazon_social: Comercial Andes Ltda\ndomicilio: Santiago",
    );
    write(
        &folder,
        "modificacion_2019.txt",
        "category: constitucion\nfecha: 01-12-2019\nrazon_social: Comercial Andes SpA\ncapital_pagado: 5000000",
    );
    write(
        &folder,
        "sin_fecha.txt",
        "category: constitucion\nobservaciones: copia simple",
    );
    write(
        &folder,
        "diario_oficial.txt",
        "category: publicacion\nfecha: 20-03-2015\nfecha_publicacion_diario_oficial: 20-03-2015",
    );
    write(
        &folder,
        "registro.txt",
        "category: inscripcion\nfecha: 25-03-2015\ninscripcion_registro_comercio: fojas 123 n 456",
    );
    folder
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_versions_compares_and_reconciles() {
    let tmp = TempDir::new().unwrap();
    let folder = case_folder(tmp.path());
    let pipeline = Pipeline::new(
        collaborators(Arc::new(TextOcr::default())),
        PipelineSettings::default(),
    );

    let state = pipeline.run("caso_42", &folder).await;

    assert!(state.error.is_none(), "unexpected error: {:?}", state.error);
    assert_eq!(state.status, PipelineStatus::Reported);
    assert_eq!(state.ocr_results.len(), 5);

    let chain = &state.versioning_results["constitucion"];
    let order: Vec<(&str, u32)> = chain
        .documents
        .iter()
        .map(|d| (d.filename.as_str(), d.version))
        .collect();
    assert_eq!(
        order,
        vec![
            ("escritura_2015.txt", 1),
            ("modificacion_2019.txt", 2),
            ("sin_fecha.txt", 3)
        ]
    );

    let comparisons = &state.comparison_results["constitucion"];
    let pairs: Vec<(u32, u32)> = comparisons
        .iter()
        .map(|c| (c.from.version, c.to.version))
        .collect();
    assert_eq!(pairs, vec![(1, 2), (2, 3)]);
    assert_eq!(comparisons[0].summary, "12-03-2015 -> 01-12-2019");
    assert!(!state.comparison_results.contains_key("publicacion"));

    let report = state.report_results.expect("report produced");
    assert_eq!(report.header.get("razon_social"), Some("Comercial Andes SpA"));
    assert_eq!(report.header.get("rut"), Some("76.154.106-4"));
    assert_eq!(report.header.provenance["rut"].version, 1);
    assert_eq!(
        report.sections["constitucion"].get("domicilio"),
        Some("Santiago")
    );
    assert_eq!(
        report.sections["capital_social"].get("observaciones"),
        Some("copia simple")
    );
    assert_eq!(
        report.legalizacion.get("inscripcion_registro_comercio"),
        Some("fojas 123 n 456")
    );
    assert_eq!(
        report.legalizacion.get("fecha_publicacion_diario_oficial"),
        Some("20-03-2015")
    );
}

#[tokio::test]
async fn one_failing_document_is_excluded_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let folder = tmp.path().join("caso");
    std::fs::create_dir_all(&folder).unwrap();
    for i in 1..=4 {
        write(
            &folder,
            &format!("doc{}.txt", i),
            &format!("category: constitucion\nfecha: 0{}-01-2020", i),
        );
    }
    write(&folder, "broken.pdf", "%PDF-garbage");

    let pipeline = Pipeline::new(
        collaborators(Arc::new(TextOcr::default())),
        PipelineSettings::default(),
    );
    let state = pipeline.run("caso", &folder).await;

    assert!(state.error.is_none());
    assert_eq!(state.ocr_results.len(), 4);
    assert_eq!(state.excluded.len(), 1);
    assert_eq!(state.excluded[0].filename, "broken.pdf");
    assert_eq!(state.versioning_results["constitucion"].len(), 4);
}

#[tokio::test]
async fn classification_failure_falls_back_to_otros() {
    let tmp = TempDir::new().unwrap();
    let folder = tmp.path().join("caso");
    std::fs::create_dir_all(&folder).unwrap();
    write(&folder, "a.txt", "category: constitucion\nfecha: 01-01-2020");
    write(&folder, "b.txt", "unclassifiable scan");

    let pipeline = Pipeline::new(
        collaborators(Arc::new(TextOcr::default())),
        PipelineSettings::default(),
    );
    let state = pipeline.run("caso", &folder).await;

    assert!(state.error.is_none());
    let otros = &state.versioning_results["otros"];
    assert_eq!(otros.documents[0].filename, "b.txt");
    assert_eq!(otros.documents[0].date, "");
}

#[tokio::test]
async fn total_ocr_failure_stops_at_versioning() {
    let tmp = TempDir::new().unwrap();
    let folder = case_folder(tmp.path());
    let results = tmp.path().join("results");

    let ocr = Arc::new(TextOcr {
        fail_all: true,
        ..Default::default()
    });
    let pipeline = Pipeline::new(collaborators(ocr), PipelineSettings::default())
        .with_artifacts(ArtifactWriter::new(&results));
    let state = pipeline.run("caso_42", &folder).await;

    assert_eq!(state.status, PipelineStatus::Failed(Stage::Versioning));
    let failure = state.error.expect("error recorded");
    assert_eq!(failure.stage, Stage::Versioning);
    assert!(failure.message.contains("missing prerequisite"));
    assert_eq!(state.excluded.len(), 5);
    assert!(state.comparison_results.is_empty());
    assert!(state.report_results.is_none());

    assert!(results.join("caso_42_ocr_results.json").exists());
    assert!(!results.join("caso_42_versioning_results.json").exists());
    assert!(!results.join("caso_42_comparison_results.json").exists());
    assert!(!results.join("caso_42_report_results.json").exists());
}

#[tokio::test]
async fn empty_folder_fails_at_ocr() {
    let tmp = TempDir::new().unwrap();
    let folder = tmp.path().join("vacio");
    std::fs::create_dir_all(&folder).unwrap();
    write(&folder, ".DS_Store", "hidden");

    let pipeline = Pipeline::new(
        collaborators(Arc::new(TextOcr::default())),
        PipelineSettings::default(),
    );
    let state = pipeline.run("vacio", &folder).await;

    let failure = state.error.expect("error recorded");
    assert_eq!(failure.stage, Stage::Ocr);
    assert!(failure.message.contains("no documents"));
    assert!(state.versioning_results.is_empty());
}

#[tokio::test]
async fn missing_folder_fails_at_ocr() {
    let tmp = TempDir::new().unwrap();
    let pipeline = Pipeline::new(
        collaborators(Arc::new(TextOcr::default())),
        PipelineSettings::default(),
    );
    let state = pipeline.run("nope", &tmp.path().join("nope")).await;
    assert_eq!(state.status, PipelineStatus::Failed(Stage::Ocr));
}

#[tokio::test]
async fn every_stage_writes_its_artifact() {
    let tmp = TempDir::new().unwrap();
    let folder = case_folder(tmp.path());
    let results = tmp.path().join("results");

    let pipeline = Pipeline::new(
        collaborators(Arc::new(TextOcr::default())),
        PipelineSettings::default(),
    )
    .with_artifacts(ArtifactWriter::new(&results));
    let state = pipeline.run("caso_42", &folder).await;
    assert!(state.error.is_none());

    for stage in ["ocr", "versioning", "comparison", "report"] {
        let path = results.join(format!("caso_42_{}_results.json", stage));
        let content = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("missing artifact {}: {}", path.display(), e));
        let _: serde_json::Value = serde_json::from_str(&content).unwrap();
    }

    let versioning: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(results.join("caso_42_versioning_results.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        versioning["versions"]["constitucion"]["documents"][0]["filename"],
        "escritura_2015.txt"
    );
}

#[tokio::test]
async fn cached_ocr_is_reused_across_runs() {
    let tmp = TempDir::new().unwrap();
    let folder = case_folder(tmp.path());
    let cache_dir = tmp.path().join("ocr_cache");

    let first_ocr = Arc::new(TextOcr::default());
    let first = Pipeline::new(collaborators(first_ocr.clone()), PipelineSettings::default())
        .with_cache(OcrCache::new(&cache_dir));
    assert!(first.run("caso_42", &folder).await.error.is_none());
    assert_eq!(first_ocr.calls.load(Ordering::SeqCst), 5);

    let second_ocr = Arc::new(TextOcr {
        fail_all: true,
        ..Default::default()
    });
    let second = Pipeline::new(collaborators(second_ocr.clone()), PipelineSettings::default())
        .with_cache(OcrCache::new(&cache_dir));
    let state = second.run("caso_42", &folder).await;

    assert!(state.error.is_none());
    assert_eq!(state.ocr_results.len(), 5);
    assert_eq!(second_ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reruns_are_deterministic() {
    let tmp = TempDir::new().unwrap();
    let folder = case_folder(tmp.path());
    let pipeline = Pipeline::new(
        collaborators(Arc::new(TextOcr::default())),
        PipelineSettings::default(),
    );

    let a = pipeline.run("caso_42", &folder).await;
    let b = pipeline.run("caso_42", &folder).await;
    assert_eq!(a.versioning_results, b.versioning_results);
    assert_eq!(a.comparison_results, b.comparison_results);
    assert_eq!(a.report_results, b.report_results);
}
