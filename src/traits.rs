//! Collaborator interfaces for the external services the pipeline calls.
//!
//! The pipeline never talks to an OCR engine or a language model directly.
//! It goes through four narrow traits:
//!
//! ```text
//!   file bytes ──▶ OcrService::analyze ──▶ text + pages
//!   text ───────▶ DocumentClassifier::classify ──▶ category + date
//!   text ───────▶ FieldExtractor::extract(schema) ──▶ FieldRecord
//!   text, text ─▶ VersionDiffer::diff ──▶ changes + summary
//! ```
//!
//! Implementations normalize malformed service responses into empty values
//! themselves; an `Err` means the call itself failed (network, timeout,
//! unsupported input). [`Collaborators::from_config`] builds the configured
//! implementations, each wrapped once in [`Retrying`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::classify::{Category, KeywordClassifier};
use crate::config::Config;
use crate::error::CollaboratorError;
use crate::llm::{ChatClient, DisabledLlm, LlmClassifier, LlmDiffer, LlmExtractor};
use crate::models::{DiffResult, FieldRecord, OcrPage};
use crate::ocr::{AzureOcr, LocalOcr};
use crate::retry::Retrying;

/// Raw OCR output for one file, before cleaning and hashing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    pub text_raw: String,
    pub pages: Vec<OcrPage>,
    pub num_pages: u32,
    pub language: Option<String>,
}

/// Turns file bytes into text.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Provider identifier used in logs (e.g. `"local"`, `"azure"`).
    fn name(&self) -> &str;

    async fn analyze(&self, filename: &str, bytes: &[u8]) -> Result<OcrOutput, CollaboratorError>;
}

/// Category and principal date of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    /// Normalized `dd-mm-yyyy`, or `None` when the document shows no date.
    pub raw_date: Option<String>,
}

#[async_trait]
pub trait DocumentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, CollaboratorError>;
}

/// A named, ordered list of fields to extract.
///
/// The names carry no meaning to the reconciler; they are only passed
/// through to the extractor and used as keys of the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub fields: Vec<String>,
}

impl FieldSchema {
    pub fn new(name: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Extracts a [`FieldRecord`] for a schema from one document's text.
///
/// Must return a mapping even when nothing is found: absent keys are read
/// as empty values.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        schema: &FieldSchema,
    ) -> Result<FieldRecord, CollaboratorError>;
}

/// Describes what changed between two versions of a document.
#[async_trait]
pub trait VersionDiffer: Send + Sync {
    async fn diff(&self, before: &str, after: &str) -> Result<DiffResult, CollaboratorError>;
}

/// The full set of collaborators a pipeline run needs.
#[derive(Clone)]
pub struct Collaborators {
    pub ocr: Arc<dyn OcrService>,
    pub classifier: Arc<dyn DocumentClassifier>,
    pub extractor: Arc<dyn FieldExtractor>,
    pub differ: Arc<dyn VersionDiffer>,
}

impl Collaborators {
    /// Build collaborators from configuration.
    ///
    /// | Setting | Implementation |
    /// |---------|----------------|
    /// | `ocr.provider = "local"` | [`LocalOcr`] |
    /// | `ocr.provider = "azure"` | [`AzureOcr`] |
    /// | `llm.provider = "disabled"` | [`DisabledLlm`] for extract and diff |
    /// | `llm.provider = "openai" \| "azure"` | [`LlmExtractor`], [`LlmDiffer`] |
    /// | classifier resolves to LLM | [`LlmClassifier`] |
    /// | classifier resolves to keywords | [`KeywordClassifier`] |
    pub fn from_config(config: &Config) -> Result<Self> {
        let ocr_policy = config.ocr_retry_policy();
        let llm_policy = config.llm_retry_policy();

        let ocr: Arc<dyn OcrService> = match config.ocr.provider.as_str() {
            "azure" => Arc::new(Retrying::new(
                AzureOcr::new(&config.ocr).context("Failed to configure Azure OCR")?,
                ocr_policy,
            )),
            _ => Arc::new(Retrying::new(LocalOcr, ocr_policy)),
        };

        let (extractor, differ, llm_classifier): (
            Arc<dyn FieldExtractor>,
            Arc<dyn VersionDiffer>,
            Option<Arc<dyn DocumentClassifier>>,
        ) = if config.llm.is_enabled() {
            let client =
                Arc::new(ChatClient::new(&config.llm).context("Failed to configure LLM client")?);
            (
                Arc::new(Retrying::new(
                    LlmExtractor::new(client.clone(), config.llm.max_chars_doc),
                    llm_policy.clone(),
                )),
                Arc::new(Retrying::new(
                    LlmDiffer::new(client.clone(), config.llm.max_chars_diff),
                    llm_policy.clone(),
                )),
                Some(Arc::new(Retrying::new(
                    LlmClassifier::new(client, config.llm.max_chars_doc),
                    llm_policy,
                ))),
            )
        } else {
            (Arc::new(DisabledLlm), Arc::new(DisabledLlm), None)
        };

        let classifier: Arc<dyn DocumentClassifier> = match llm_classifier {
            Some(llm) if config.classify_with_llm() => llm,
            _ => Arc::new(KeywordClassifier),
        };

        Ok(Self {
            ocr,
            classifier,
            extractor,
            differ,
        })
    }
}
