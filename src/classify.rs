//! Document categories, label parsing, and date normalization.
//!
//! The category vocabulary is closed. Anything a classifier answers outside
//! of it becomes [`Category::Otros`]. Dates are normalized to the
//! zero-padded `dd-mm-yyyy` form the version assigner parses.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::error::CollaboratorError;
use crate::traits::{Classification, DocumentClassifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Constitution deeds, bylaws, amendments and their extracts.
    Constitucion,
    /// Commercial registry entries and validity certificates.
    Inscripcion,
    /// Official gazette publications.
    Publicacion,
    /// Identity documents.
    Cedula,
    Otros,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Constitucion,
        Category::Inscripcion,
        Category::Publicacion,
        Category::Cedula,
        Category::Otros,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Constitucion => "constitucion",
            Category::Inscripcion => "inscripcion",
            Category::Publicacion => "publicacion",
            Category::Cedula => "cedula",
            Category::Otros => "otros",
        }
    }

    /// Parse a free-form label, falling back to [`Category::Otros`].
    ///
    /// Case, accents and surrounding punctuation are ignored. `escritura`
    /// is accepted as a synonym of `constitucion`.
    pub fn from_label(label: &str) -> Self {
        let folded = fold(label);
        let word = folded
            .split(|c: char| !c.is_alphanumeric())
            .find(|w| !w.is_empty())
            .unwrap_or("");
        match word {
            "constitucion" | "escritura" => Category::Constitucion,
            "inscripcion" => Category::Inscripcion,
            "publicacion" => Category::Publicacion,
            "cedula" => Category::Cedula,
            _ => Category::Otros,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase and strip Spanish diacritics.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            other => other,
        })
        .collect()
}

static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\s*[-/.]\s*(\d{1,2})\s*[-/.]\s*(\d{4})\b").expect("valid regex")
});

static LONG_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+de\s+([a-z]+)\s+(?:de|del)\s+(?:ano\s+)?(\d{4})\b")
        .expect("valid regex")
});

fn month_number(name: &str) -> Option<u32> {
    let n = match name {
        "enero" => 1,
        "febrero" => 2,
        "marzo" => 3,
        "abril" => 4,
        "mayo" => 5,
        "junio" => 6,
        "julio" => 7,
        "agosto" => 8,
        "septiembre" | "setiembre" => 9,
        "octubre" => 10,
        "noviembre" => 11,
        "diciembre" => 12,
        _ => return None,
    };
    Some(n)
}

/// Find the first date written in `text` and return it as `dd-mm-yyyy`.
///
/// Accepts `d-m-yyyy`, `d/m/yyyy`, `d.m.yyyy` and the Spanish long form
/// `15 de enero de 2020`. The result is not calendar-checked.
pub fn find_first_date(text: &str) -> Option<String> {
    let folded = fold(text);

    let numeric = NUMERIC_DATE.captures(&folded).map(|c| {
        let start = c.get(0).map(|m| m.start()).unwrap_or(0);
        (start, format_date(&c[1], &c[2], &c[3]))
    });

    let long = LONG_DATE.captures_iter(&folded).find_map(|c| {
        let month = month_number(&c[2])?;
        let start = c.get(0).map(|m| m.start()).unwrap_or(0);
        Some((start, format_date(&c[1], &month.to_string(), &c[3])))
    });

    match (numeric, long) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a.1 } else { b.1 }),
        (Some(a), None) => Some(a.1),
        (None, Some(b)) => Some(b.1),
        (None, None) => None,
    }
}

/// Normalize a classifier's date answer. `NO_FECHA` and blanks give `None`.
pub fn normalize_date(answer: &str) -> Option<String> {
    let trimmed = answer.trim();
    if trimmed.is_empty() || trimmed.to_uppercase().contains("NO_FECHA") {
        return None;
    }
    find_first_date(trimmed)
}

fn format_date(day: &str, month: &str, year: &str) -> String {
    let day: u32 = day.parse().unwrap_or(0);
    let month: u32 = month.parse().unwrap_or(0);
    format!("{:02}-{:02}-{}", day, month, year)
}

const CEDULA_KEYWORDS: &[&str] = &["cedula de identidad", "run:", "registro civil e identificacion"];

const PUBLICACION_KEYWORDS: &[&str] = &["diario oficial", "publicacion", "aviso legal"];

const INSCRIPCION_KEYWORDS: &[&str] = &[
    "registro de comercio",
    "inscripcion",
    "conservador de bienes raices",
    "certificado de vigencia",
    "anotaciones marginales",
    "fojas",
];

const CONSTITUCION_KEYWORDS: &[&str] = &[
    "escritura publica",
    "estatutos",
    "constitucion de sociedad",
    "se constituye",
    "sociedad anonima",
    "sociedad por acciones",
    "responsabilidad limitada",
    "capital suscrito",
    "capital pagado",
    "razon social",
    "objeto social",
    "acta de directorio",
    "modificacion de estatutos",
    "extracto",
];

/// Rule-based classifier used when no language model is configured.
///
/// Checks keyword groups in a fixed precedence (identity documents,
/// publications, registrations, constitution deeds) and takes the first
/// date written in the text.
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn category_of(text: &str) -> Category {
        let folded = fold(text);
        let hit = |keywords: &[&str]| keywords.iter().any(|k| folded.contains(k));

        if hit(CEDULA_KEYWORDS) {
            Category::Cedula
        } else if hit(PUBLICACION_KEYWORDS) {
            Category::Publicacion
        } else if hit(INSCRIPCION_KEYWORDS) {
            Category::Inscripcion
        } else if hit(CONSTITUCION_KEYWORDS) {
            Category::Constitucion
        } else {
            Category::Otros
        }
    }
}

#[async_trait]
impl DocumentClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, CollaboratorError> {
        Ok(Classification {
            category: Self::category_of(text),
            raw_date: find_first_date(text),
        })
    }
}
