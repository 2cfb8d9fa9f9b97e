//! Core data models used throughout Docket.
//!
//! These types represent the documents, version chains, reconciled records,
//! and comparisons that flow through the processing pipeline. Everything
//! here is serializable so each stage can persist its output as JSON.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One page of OCR output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    pub page_number: u32,
    pub text: String,
}

/// Text and layout extracted from a single source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrDocument {
    pub filename: String,
    pub path: String,
    pub file_ext: String,
    pub filesize: u64,
    pub sha256: String,
    pub num_pages: u32,
    pub language: Option<String>,
    /// Soft-cleaned text used by every downstream stage.
    pub text: String,
    pub text_raw: String,
    pub pages: Vec<OcrPage>,
}

/// A document dropped from the run by a per-document failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedDocument {
    pub filename: String,
    pub reason: String,
}

/// A document after classification. Immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedDocument {
    pub filename: String,
    pub category: String,
    pub raw_date: Option<String>,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub extracted_text: String,
}

/// A `{filename, date}` pair inside a category bucket.
///
/// `date` is the classifier's raw date, or empty when none was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedEntry {
    pub filename: String,
    pub date: String,
}

/// A document placed at a position in its category's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedDocument {
    pub filename: String,
    pub category: String,
    pub date: String,
    pub version: u32,
}

/// Ordered history of one category, oldest first, versions `1..=N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChain {
    pub category: String,
    pub documents: Vec<VersionedDocument>,
}

impl VersionChain {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The most recent version, if any.
    pub fn latest(&self) -> Option<&VersionedDocument> {
        self.documents.last()
    }

    /// Iterate from the newest version back to version 1.
    pub fn newest_first(&self) -> impl Iterator<Item = &VersionedDocument> {
        self.documents.iter().rev()
    }
}

/// Per-category chains produced by the versioning stage.
pub type VersioningResults = BTreeMap<String, VersionChain>;

/// Field name → extracted value for one document snapshot.
pub type FieldRecord = BTreeMap<String, String>;

/// Where a reconciled field's value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSource {
    pub filename: String,
    pub version: u32,
}

/// Result of reconciling a field set across a version chain.
///
/// `values` always holds exactly the requested fields. A field is empty only
/// when no consulted document produced a value for it. `extraction_failures`
/// separates "nothing found" from "extraction unavailable": when every
/// consulted document failed, `documents_consulted == extraction_failures`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub values: FieldRecord,
    pub provenance: BTreeMap<String, FieldSource>,
    pub documents_consulted: usize,
    pub extraction_failures: usize,
}

impl ReconciledRecord {
    /// A record with every field present and empty.
    pub fn empty<S: AsRef<str>>(fields: &[S]) -> Self {
        Self {
            values: fields
                .iter()
                .map(|f| (f.as_ref().to_string(), String::new()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Fields still empty or whitespace-only.
    pub fn empty_fields(&self) -> Vec<String> {
        self.values
            .iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// One detected difference between two adjacent versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub title: String,
    pub before: String,
    pub after: String,
}

/// Output of the diff collaborator for one pair of texts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub changes: Vec<ChangeRecord>,
    pub summary: String,
}

/// Comparison between version `i` and version `i + 1` of a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub category: String,
    pub from: VersionedDocument,
    pub to: VersionedDocument,
    pub changes: Vec<ChangeRecord>,
    pub summary: String,
}

/// Per-category comparisons produced by the comparison stage.
pub type ComparisonResults = BTreeMap<String, Vec<VersionComparison>>;

/// Final report assembled from reconciled records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegalReport {
    pub report_category: String,
    pub header: ReconciledRecord,
    pub sections: BTreeMap<String, ReconciledRecord>,
    pub legalizacion: ReconciledRecord,
}

/// Lookup from filename to the full OCR text of that document.
///
/// Empty texts are stored as absent so callers only see usable text.
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    texts: HashMap<String, String>,
}

impl TextIndex {
    pub fn from_ocr(docs: &[OcrDocument]) -> Self {
        docs.iter()
            .map(|d| (d.filename.clone(), d.text.clone()))
            .collect()
    }

    pub fn get(&self, filename: &str) -> Option<&str> {
        self.texts.get(filename).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for TextIndex {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            texts: iter
                .into_iter()
                .filter(|(_, text)| !text.trim().is_empty())
                .collect(),
        }
    }
}
