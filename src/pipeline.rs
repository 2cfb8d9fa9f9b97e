//! Sequential stage pipeline for one case folder.
//!
//! ```text
//!   Started ──ocr──▶ Ingested ──versioning──▶ Versioned ──comparison──▶ Compared ──report──▶ Reported
//!      │                │                        │                          │
//!      └────────────────┴────────────────────────┴──────────────────────────┴──▶ Failed{stage}
//! ```
//!
//! Each stage reads the current [`ProcessingState`] immutably and returns a
//! [`StageOutput`] or a [`StageError`]. The coordinator applies the output by
//! value, persists the stage artifact, and moves on. The first error is
//! recorded in the state and stops the run; later stages never execute.
//!
//! Per-document collaborator failures are not stage errors: a file whose
//! OCR fails is listed in `excluded`, a document whose classification fails
//! falls into `otros`, and extraction or diff failures leave empty values.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::artifacts::ArtifactWriter;
use crate::cache::{content_hash, OcrCache};
use crate::classify::Category;
use crate::compare::compare_all;
use crate::config::Config;
use crate::error::StageError;
use crate::models::{
    ClassifiedDocument, ComparisonResults, ExcludedDocument, LegalReport, OcrDocument, TextIndex,
    VersioningResults,
};
use crate::ocr::{clean_soft, file_ext};
use crate::partition::partition_by_category;
use crate::report::build_report;
use crate::scan::scan_folder;
use crate::traits::Collaborators;
use crate::versioning::assign_all;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ocr,
    Versioning,
    Comparison,
    Report,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Ocr, Stage::Versioning, Stage::Comparison, Stage::Report];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ocr => "ocr",
            Stage::Versioning => "versioning",
            Stage::Comparison => "comparison",
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "stage", rename_all = "lowercase")]
pub enum PipelineStatus {
    Started,
    Ingested,
    Versioned,
    Compared,
    Reported,
    Failed(Stage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

/// Everything known about one run. Replaced, never mutated in place, as
/// stages complete.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingState {
    pub folder_id: String,
    pub folder_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub status: PipelineStatus,
    pub ocr_results: Vec<OcrDocument>,
    pub excluded: Vec<ExcludedDocument>,
    pub classification_results: Vec<ClassifiedDocument>,
    pub versioning_results: VersioningResults,
    pub comparison_results: ComparisonResults,
    pub report_results: Option<LegalReport>,
    pub error: Option<StageFailure>,
}

impl ProcessingState {
    pub fn new(folder_id: &str, folder_path: &Path) -> Self {
        Self {
            folder_id: folder_id.to_string(),
            folder_path: folder_path.to_path_buf(),
            started_at: Utc::now(),
            status: PipelineStatus::Started,
            ocr_results: Vec::new(),
            excluded: Vec::new(),
            classification_results: Vec::new(),
            versioning_results: VersioningResults::new(),
            comparison_results: ComparisonResults::new(),
            report_results: None,
            error: None,
        }
    }

    /// Fold a stage's output into a new state.
    pub fn apply(self, output: StageOutput) -> Self {
        match output {
            StageOutput::Ocr {
                documents,
                excluded,
            } => Self {
                ocr_results: documents,
                excluded,
                status: PipelineStatus::Ingested,
                ..self
            },
            StageOutput::Versioning {
                classification,
                versions,
            } => Self {
                classification_results: classification,
                versioning_results: versions,
                status: PipelineStatus::Versioned,
                ..self
            },
            StageOutput::Comparison(comparisons) => Self {
                comparison_results: comparisons,
                status: PipelineStatus::Compared,
                ..self
            },
            StageOutput::Report(report) => Self {
                report_results: Some(report),
                status: PipelineStatus::Reported,
                ..self
            },
        }
    }

    /// Record a fatal stage error. Only the first one is kept.
    pub fn fail(self, stage: Stage, message: impl Into<String>) -> Self {
        if self.error.is_some() {
            return self;
        }
        Self {
            status: PipelineStatus::Failed(stage),
            error: Some(StageFailure {
                stage,
                message: message.into(),
            }),
            ..self
        }
    }
}

/// What a stage produces. Serialized as the stage's artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StageOutput {
    Ocr {
        documents: Vec<OcrDocument>,
        excluded: Vec<ExcludedDocument>,
    },
    Versioning {
        classification: Vec<ClassifiedDocument>,
        versions: VersioningResults,
    },
    Comparison(ComparisonResults),
    Report(LegalReport),
}

/// Run-wide knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub exclude_globs: Vec<String>,
    pub compare_categories: Vec<String>,
    pub report_category: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exclude_globs: config.paths.exclude_globs.clone(),
            compare_categories: config.pipeline.compare_categories.clone(),
            report_category: config.pipeline.report_category.clone(),
        }
    }
}

pub struct Pipeline {
    collaborators: Collaborators,
    settings: PipelineSettings,
    artifacts: Option<ArtifactWriter>,
    cache: Option<OcrCache>,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            collaborators,
            settings,
            artifacts: None,
            cache: None,
        }
    }

    pub fn with_artifacts(mut self, writer: ArtifactWriter) -> Self {
        self.artifacts = Some(writer);
        self
    }

    pub fn with_cache(mut self, cache: OcrCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build a pipeline with configured collaborators, artifact directory
    /// and OCR cache.
    pub fn from_config(config: &Config) -> Result<Self> {
        let collaborators = Collaborators::from_config(config)?;
        let mut pipeline = Self::new(collaborators, PipelineSettings::from_config(config))
            .with_artifacts(ArtifactWriter::new(&config.paths.results_dir));
        if config.paths.cache_enabled {
            pipeline = pipeline.with_cache(OcrCache::new(&config.paths.cache_dir));
        }
        Ok(pipeline)
    }

    /// Run every stage in order and return the final state.
    ///
    /// Never returns an error: failures are recorded in
    /// [`ProcessingState::error`].
    pub async fn run(&self, folder_id: &str, folder_path: &Path) -> ProcessingState {
        let mut state = ProcessingState::new(folder_id, folder_path);
        info!(folder = %folder_id, path = %folder_path.display(), "pipeline started");

        for stage in Stage::ALL {
            match self.run_stage(stage, &state).await {
                Ok(output) => {
                    self.persist(&state.folder_id, stage, &output);
                    state = state.apply(output);
                    info!(stage = %stage, "stage complete");
                }
                Err(e) => {
                    error!(stage = %stage, error = %e, "stage failed");
                    state = state.fail(stage, e.to_string());
                    break;
                }
            }
        }

        state
    }

    async fn run_stage(&self, stage: Stage, state: &ProcessingState) -> Result<StageOutput, StageError> {
        match stage {
            Stage::Ocr => self.ocr_stage(state).await,
            Stage::Versioning => self.versioning_stage(state).await,
            Stage::Comparison => self.comparison_stage(state).await,
            Stage::Report => self.report_stage(state).await,
        }
    }

    fn persist(&self, folder_id: &str, stage: Stage, output: &StageOutput) {
        let Some(writer) = &self.artifacts else {
            return;
        };
        match writer.write(folder_id, stage.as_str(), output) {
            Ok(path) => info!(stage = %stage, path = %path.display(), "artifact written"),
            Err(e) => warn!(stage = %stage, error = %e, "failed to write artifact"),
        }
    }

    async fn ocr_stage(&self, state: &ProcessingState) -> Result<StageOutput, StageError> {
        let root = &state.folder_path;
        if !root.is_dir() {
            return Err(StageError::FolderNotFound(root.clone()));
        }

        let files = scan_folder(root, &self.settings.exclude_globs)?;
        if files.is_empty() {
            return Err(StageError::NoDocuments(root.clone()));
        }
        info!(files = files.len(), provider = %self.collaborators.ocr.name(), "running OCR");

        let mut documents = Vec::with_capacity(files.len());
        let mut excluded = Vec::new();

        for file in &files {
            let bytes = match std::fs::read(&file.path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(filename = %file.relative, error = %e, "unreadable file, excluding");
                    excluded.push(ExcludedDocument {
                        filename: file.relative.clone(),
                        reason: format!("read failed: {}", e),
                    });
                    continue;
                }
            };

            let hash = content_hash(&bytes);
            let cached = self.cache.as_ref().and_then(|c| c.load(&hash));
            if let Some(mut doc) = cached {
                doc.filename = file.relative.clone();
                doc.path = file.path.display().to_string();
                documents.push(doc);
                continue;
            }

            let output = match self.collaborators.ocr.analyze(&file.relative, &bytes).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(filename = %file.relative, error = %e, "OCR failed, excluding");
                    excluded.push(ExcludedDocument {
                        filename: file.relative.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let doc = OcrDocument {
                filename: file.relative.clone(),
                path: file.path.display().to_string(),
                file_ext: file_ext(&file.relative),
                filesize: bytes.len() as u64,
                sha256: hash,
                num_pages: output.num_pages,
                language: output.language,
                text: clean_soft(&output.text_raw),
                text_raw: output.text_raw,
                pages: output.pages,
            };
            if let Some(cache) = &self.cache {
                cache.store(&doc);
            }
            documents.push(doc);
        }

        info!(
            processed = documents.len(),
            excluded = excluded.len(),
            "OCR finished"
        );
        Ok(StageOutput::Ocr {
            documents,
            excluded,
        })
    }

    async fn versioning_stage(&self, state: &ProcessingState) -> Result<StageOutput, StageError> {
        if state.ocr_results.is_empty() {
            return Err(StageError::MissingPrerequisite("ocr results"));
        }

        let mut classification = Vec::with_capacity(state.ocr_results.len());
        for doc in &state.ocr_results {
            let (category, raw_date) = match self.collaborators.classifier.classify(&doc.text).await {
                Ok(c) => (c.category, c.raw_date),
                Err(e) => {
                    warn!(filename = %doc.filename, error = %e, "classification failed, using otros");
                    (Category::Otros, None)
                }
            };
            classification.push(ClassifiedDocument {
                filename: doc.filename.clone(),
                category: category.to_string(),
                raw_date,
                extracted_text: doc.text.clone(),
            });
        }

        let versions = assign_all(&partition_by_category(&classification));
        for (category, chain) in &versions {
            info!(category = %category, versions = chain.len(), "version chain assigned");
        }

        Ok(StageOutput::Versioning {
            classification,
            versions,
        })
    }

    async fn comparison_stage(&self, state: &ProcessingState) -> Result<StageOutput, StageError> {
        if state.versioning_results.is_empty() {
            return Err(StageError::MissingPrerequisite("versioning results"));
        }
        let texts = TextIndex::from_ocr(&state.ocr_results);
        let comparisons = compare_all(
            &state.versioning_results,
            &texts,
            self.collaborators.differ.as_ref(),
            &self.settings.compare_categories,
        )
        .await;
        Ok(StageOutput::Comparison(comparisons))
    }

    async fn report_stage(&self, state: &ProcessingState) -> Result<StageOutput, StageError> {
        if state.versioning_results.is_empty() {
            return Err(StageError::MissingPrerequisite("versioning results"));
        }
        let texts = TextIndex::from_ocr(&state.ocr_results);
        let report = build_report(
            &state.versioning_results,
            &texts,
            self.collaborators.extractor.as_ref(),
            &self.settings.report_category,
        )
        .await;
        Ok(StageOutput::Report(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_wins() {
        let state = ProcessingState::new("f", Path::new("/tmp/f"))
            .fail(Stage::Versioning, "first")
            .fail(Stage::Report, "second");
        assert_eq!(state.status, PipelineStatus::Failed(Stage::Versioning));
        let err = state.error.unwrap();
        assert_eq!(err.stage, Stage::Versioning);
        assert_eq!(err.message, "first");
    }

    #[test]
    fn apply_advances_status() {
        let state = ProcessingState::new("f", Path::new("/tmp/f")).apply(StageOutput::Ocr {
            documents: vec![],
            excluded: vec![ExcludedDocument {
                filename: "x.bin".into(),
                reason: "unsupported".into(),
            }],
        });
        assert_eq!(state.status, PipelineStatus::Ingested);
        assert_eq!(state.excluded.len(), 1);

        let state = state.apply(StageOutput::Comparison(ComparisonResults::new()));
        assert_eq!(state.status, PipelineStatus::Compared);
    }

    #[test]
    fn status_serializes_with_stage() {
        let json = serde_json::to_value(PipelineStatus::Failed(Stage::Ocr)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "stage": "ocr"}));
        let json = serde_json::to_value(PipelineStatus::Reported).unwrap();
        assert_eq!(json, serde_json::json!({"status": "reported"}));
    }
}
