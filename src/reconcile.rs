//! Field reconciliation across a version chain.
//!
//! The newest version decides every field it has a value for. Older
//! versions are consulted newest→oldest and only fill fields that are still
//! empty, so a resolved field is never overwritten by older history.
//!
//! ```text
//!   v3 (newest) ──extract──▶ {a: "X", b: "",  c: ""}
//!   v2          ──extract──▶ {a: "Y", b: "Z", c: ""}   fills b
//!   v1          ──extract──▶ {a: "W", b: "V", c: "U"}  fills c
//!   result                   {a: "X", b: "Z", c: "U"}
//! ```

use tracing::{debug, warn};

use crate::models::{FieldSource, ReconciledRecord, TextIndex, VersionChain};
use crate::traits::{FieldExtractor, FieldSchema};

/// Resolve `schema`'s fields from `chain`, newest-wins with backfill.
///
/// Documents without text are skipped. Each remaining document is sent to
/// the extractor at most once, and the walk stops as soon as no field is
/// empty. Extraction failures are logged and counted in
/// [`ReconciledRecord::extraction_failures`]; they never abort the pass.
pub async fn reconcile_fields(
    chain: &VersionChain,
    texts: &TextIndex,
    schema: &FieldSchema,
    extractor: &dyn FieldExtractor,
) -> ReconciledRecord {
    let mut record = ReconciledRecord::empty(&schema.fields);

    for doc in chain.newest_first() {
        let still_empty = record.empty_fields();
        if still_empty.is_empty() {
            break;
        }

        let Some(text) = texts.get(&doc.filename) else {
            debug!(
                schema = %schema.name,
                filename = %doc.filename,
                "no text available, skipping"
            );
            continue;
        };

        record.documents_consulted += 1;
        let extracted = match extractor.extract(text, schema).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!(
                    schema = %schema.name,
                    filename = %doc.filename,
                    error = %e,
                    "field extraction failed"
                );
                record.extraction_failures += 1;
                continue;
            }
        };

        for field in still_empty {
            let Some(value) = extracted.get(&field) else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            record.values.insert(field.clone(), value.clone());
            record.provenance.insert(
                field,
                FieldSource {
                    filename: doc.filename.clone(),
                    version: doc.version,
                },
            );
        }
    }

    let unresolved = record.empty_fields();
    if record.documents_consulted > 0 && record.documents_consulted == record.extraction_failures {
        warn!(
            schema = %schema.name,
            category = %chain.category,
            "extraction unavailable for every document; fields left empty"
        );
    } else if !unresolved.is_empty() {
        debug!(
            schema = %schema.name,
            category = %chain.category,
            unresolved = ?unresolved,
            "fields still empty after exhausting the chain"
        );
    }

    record
}
