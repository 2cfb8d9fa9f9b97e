//! Legal report assembly.
//!
//! The report is a set of [`ReconciledRecord`]s over fixed field schemas.
//! Header and sections are reconciled across the report category's chain;
//! `legalizacion` is extracted once from the newest document of each of the
//! deed, publication and registration chains joined together.

use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::models::{FieldSource, LegalReport, ReconciledRecord, TextIndex, VersioningResults};
use crate::reconcile::reconcile_fields;
use crate::traits::{FieldExtractor, FieldSchema};

pub const HEADER_FIELDS: &[&str] = &["razon_social", "rut", "nombre_fantasia"];

pub const CONSTITUCION_FIELDS: &[&str] = &[
    "razon_social_anterior",
    "tipo_de_sociedad",
    "domicilio",
    "objeto_social_resumen",
    "fecha_constitucion",
    "fecha_termino",
    "frecuencia_prorroga",
    "en_caso_de_fallecimiento",
];

pub const CAPITAL_FIELDS: &[&str] = &[
    "capital_suscrito",
    "capital_pagado",
    "plazo_para_enterarlo",
    "cierre_ejercicio",
    "responsabilidad_socios",
    "distribucion_utilidades",
    "numero_acciones",
    "observaciones",
];

pub const ADMINISTRACION_FIELDS: &[&str] = &[
    "tipo_administracion",
    "administradores_titulares_num",
    "administradores_suplentes_num",
    "duracion",
    "firmas_requeridas_num",
    "representantes_legales_num",
    "forma_de_actuar",
    "observaciones",
];

pub const LEGALIZACION_FIELDS: &[&str] = &[
    "codigo_escritura",
    "tipo_escritura",
    "digitador",
    "fecha_ingreso",
    "tipo_documento",
    "repertorio",
    "notaria",
    "ciudad_notaria",
    "fecha_notaria",
    "fecha_publicacion_diario_oficial",
    "vigencia_desde",
    "vigencia_hasta",
    "inscripcion_registro_comercio",
    "observacion_inscripcion",
];

/// Chains whose newest text feeds the `legalizacion` extraction, in order.
pub const LEGALIZACION_SOURCES: &[&str] = &["constitucion", "publicacion", "inscripcion"];

const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

pub fn header_schema() -> FieldSchema {
    FieldSchema::new("encabezado", HEADER_FIELDS)
}

/// Schemas reconciled over the report chain. The report keys sections by
/// name, so artifacts list them alphabetically.
pub fn section_schemas() -> Vec<FieldSchema> {
    vec![
        FieldSchema::new("constitucion", CONSTITUCION_FIELDS),
        FieldSchema::new("capital_social", CAPITAL_FIELDS),
        FieldSchema::new("administracion", ADMINISTRACION_FIELDS),
    ]
}

pub fn legalizacion_schema() -> FieldSchema {
    FieldSchema::new("legalizacion", LEGALIZACION_FIELDS)
}

/// Build the report for `report_category`.
///
/// A missing chain for the report category leaves header and sections empty
/// and logs a warning.
pub async fn build_report(
    versioning: &VersioningResults,
    texts: &TextIndex,
    extractor: &dyn FieldExtractor,
    report_category: &str,
) -> LegalReport {
    let header_schema = header_schema();
    let sections_schemas = section_schemas();

    let (header, sections) = match versioning.get(report_category) {
        Some(chain) if !chain.is_empty() => {
            let header = reconcile_fields(chain, texts, &header_schema, extractor).await;
            let mut sections = BTreeMap::new();
            for schema in &sections_schemas {
                let record = reconcile_fields(chain, texts, schema, extractor).await;
                sections.insert(schema.name.clone(), record);
            }
            (header, sections)
        }
        _ => {
            warn!(
                category = %report_category,
                "no version chain for report category; sections left empty"
            );
            let sections = sections_schemas
                .iter()
                .map(|s| (s.name.clone(), ReconciledRecord::empty(&s.fields)))
                .collect();
            (ReconciledRecord::empty(&header_schema.fields), sections)
        }
    };

    let legalizacion = extract_legalizacion(versioning, texts, extractor).await;

    let filled = header.values.values().filter(|v| !v.is_empty()).count()
        + sections
            .values()
            .map(|r| r.values.values().filter(|v| !v.is_empty()).count())
            .sum::<usize>();
    info!(category = %report_category, filled_fields = filled, "report assembled");

    LegalReport {
        report_category: report_category.to_string(),
        header,
        sections,
        legalizacion,
    }
}

/// One extraction over the joined newest texts of [`LEGALIZACION_SOURCES`].
///
/// Every filled field is attributed to the first joined document, since a
/// single call cannot tell which part of the joined text a value came from.
async fn extract_legalizacion(
    versioning: &VersioningResults,
    texts: &TextIndex,
    extractor: &dyn FieldExtractor,
) -> ReconciledRecord {
    let schema = legalizacion_schema();
    let mut record = ReconciledRecord::empty(&schema.fields);

    let sources: Vec<_> = LEGALIZACION_SOURCES
        .iter()
        .filter_map(|category| versioning.get(*category)?.latest())
        .filter_map(|doc| texts.get(&doc.filename).map(|text| (doc, text)))
        .collect();

    let Some((first, _)) = sources.first() else {
        warn!("no source text for legalizacion; fields left empty");
        return record;
    };

    let joined = sources
        .iter()
        .map(|(_, text)| *text)
        .collect::<Vec<_>>()
        .join(SOURCE_SEPARATOR);

    record.documents_consulted = 1;
    match extractor.extract(&joined, &schema).await {
        Ok(extracted) => {
            for field in &schema.fields {
                if let Some(value) = extracted.get(field).filter(|v| !v.trim().is_empty()) {
                    record.values.insert(field.clone(), value.clone());
                    record.provenance.insert(
                        field.clone(),
                        FieldSource {
                            filename: first.filename.clone(),
                            version: first.version,
                        },
                    );
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "legalizacion extraction failed");
            record.extraction_failures = 1;
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::models::{FieldRecord, VersionChain, VersionedDocument};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers every field of the schema with `"<schema>:<text>"`.
    #[derive(Default)]
    struct EchoExtractor {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FieldExtractor for EchoExtractor {
        async fn extract(
            &self,
            text: &str,
            schema: &FieldSchema,
        ) -> Result<FieldRecord, CollaboratorError> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(schema
                .fields
                .iter()
                .map(|f| (f.clone(), format!("{}:{}", schema.name, text)))
                .collect())
        }
    }

    fn chain(category: &str, names: &[&str]) -> VersionChain {
        VersionChain {
            category: category.into(),
            documents: names
                .iter()
                .enumerate()
                .map(|(i, n)| VersionedDocument {
                    filename: n.to_string(),
                    category: category.into(),
                    date: String::new(),
                    version: i as u32 + 1,
                })
                .collect(),
        }
    }

    fn versioning() -> VersioningResults {
        let mut v = VersioningResults::new();
        v.insert("constitucion".into(), chain("constitucion", &["c1", "c2"]));
        v.insert("publicacion".into(), chain("publicacion", &["p1"]));
        v.insert("inscripcion".into(), chain("inscripcion", &["i1", "i2"]));
        v
    }

    fn texts() -> TextIndex {
        ["c1", "c2", "p1", "i1", "i2"]
            .iter()
            .map(|n| (n.to_string(), n.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn sections_come_from_newest_report_version() {
        let extractor = EchoExtractor::default();
        let report = build_report(&versioning(), &texts(), &extractor, "constitucion").await;

        assert_eq!(report.header.get("rut"), Some("encabezado:c2"));
        assert_eq!(
            report.sections["capital_social"].get("capital_pagado"),
            Some("capital_social:c2")
        );
        assert_eq!(
            report.sections.keys().collect::<Vec<_>>(),
            vec!["administracion", "capital_social", "constitucion"]
        );
    }

    #[tokio::test]
    async fn legalizacion_joins_latest_texts_in_order() {
        let extractor = EchoExtractor::default();
        let report = build_report(&versioning(), &texts(), &extractor, "constitucion").await;

        let joined = "c2\n\n---\n\np1\n\n---\n\ni2";
        assert!(extractor.texts.lock().unwrap().iter().any(|t| t == joined));
        assert_eq!(
            report.legalizacion.get("repertorio"),
            Some(format!("legalizacion:{}", joined).as_str())
        );
        assert_eq!(report.legalizacion.provenance["notaria"].filename, "c2");
    }

    #[tokio::test]
    async fn missing_report_chain_gives_empty_sections() {
        let extractor = EchoExtractor::default();
        let report = build_report(&versioning(), &texts(), &extractor, "cedula").await;

        assert_eq!(report.report_category, "cedula");
        assert!(report.header.values.values().all(String::is_empty));
        assert_eq!(report.sections.len(), 3);
        assert!(report.sections["administracion"]
            .values
            .values()
            .all(String::is_empty));
        // legalizacion still uses the other chains
        assert!(!report.legalizacion.get("notaria").unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn no_sources_leave_legalizacion_empty() {
        let extractor = EchoExtractor::default();
        let report =
            build_report(&VersioningResults::new(), &TextIndex::default(), &extractor, "constitucion")
                .await;
        assert_eq!(report.legalizacion.values.len(), LEGALIZACION_FIELDS.len());
        assert!(report.legalizacion.values.values().all(String::is_empty));
        assert!(extractor.texts.lock().unwrap().is_empty());
    }
}
