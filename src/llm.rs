//! Language-model collaborators.
//!
//! A single [`ChatClient`] talks to an OpenAI-compatible chat completions
//! endpoint (OpenAI or Azure OpenAI). Three thin wrappers turn it into the
//! classifier, field extractor and differ the pipeline needs.
//!
//! # Response normalization
//!
//! Models do not always answer in the requested shape. Each wrapper accepts
//! what it can and falls back to an empty value:
//!
//! - **Classifier**: first word of the answer, folded; unknown → `otros`.
//!   Dates go through [`normalize_date`]; `NO_FECHA` → no date.
//! - **Extractor**: first `{...}` object in the answer (code fences are
//!   ignored). Strings are kept, numbers and booleans are stringified, arrays
//!   are joined with `" | "`, anything else is empty. Unparseable → all
//!   fields empty.
//! - **Differ**: `{"cambios": [{"titulo","antes","despues"}], "resumen"}`,
//!   English keys also accepted. Unparseable → no changes, empty summary.
//!
//! Only transport failures surface as `Err`, so the retry decorator never
//! retries a malformed answer.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::classify::{normalize_date, Category};
use crate::config::LlmConfig;
use crate::error::CollaboratorError;
use crate::models::{ChangeRecord, DiffResult, FieldRecord};
use crate::traits::{
    Classification, DocumentClassifier, FieldExtractor, FieldSchema, VersionDiffer,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Chat completions client for OpenAI or Azure OpenAI.
pub struct ChatClient {
    http: reqwest::Client,
    url: String,
    auth: Auth,
    model: String,
    temperature: f32,
}

enum Auth {
    Bearer(String),
    ApiKey(String),
}

impl ChatClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `llm.model` is unset, if Azure is selected
    /// without `llm.endpoint`, or if the API key variable is missing.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for provider '{}'", config.provider))?;

        let key_var = config.api_key_var();
        let api_key = std::env::var(key_var)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", key_var))?;

        let (url, auth) = match config.provider.as_str() {
            "openai" => {
                let base = config.endpoint.as_deref().unwrap_or(OPENAI_BASE_URL);
                (
                    format!("{}/v1/chat/completions", base.trim_end_matches('/')),
                    Auth::Bearer(api_key),
                )
            }
            "azure" => {
                let endpoint = config
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("llm.endpoint required for Azure"))?;
                let api_version = config
                    .api_version
                    .as_deref()
                    .unwrap_or(DEFAULT_AZURE_API_VERSION);
                (
                    format!(
                        "{}/openai/deployments/{}/chat/completions?api-version={}",
                        endpoint.trim_end_matches('/'),
                        model,
                        api_version
                    ),
                    Auth::ApiKey(api_key),
                )
            }
            other => bail!("Unknown LLM provider: '{}'", other),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            url,
            auth,
            model,
            temperature: config.temperature,
        })
    }

    /// Send a single user message and return the assistant's text.
    pub async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let request = self.http.post(&self.url).json(&body);
        let request = match &self.auth {
            Auth::Bearer(key) => request.header("Authorization", format!("Bearer {}", key)),
            Auth::ApiKey(key) => request.header("api-key", key),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status(status.as_u16(), body_text));
        }

        let json: Value = response.json().await?;
        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CollaboratorError::Malformed("missing choices[0].message.content".into()))
    }
}

/// Stand-in used when `llm.provider = "disabled"`.
///
/// Every call fails with a terminal error, so reconciliation yields empty
/// fields and comparison yields no entries.
pub struct DisabledLlm;

#[async_trait]
impl FieldExtractor for DisabledLlm {
    async fn extract(&self, _: &str, _: &FieldSchema) -> Result<FieldRecord, CollaboratorError> {
        Err(CollaboratorError::Disabled("language model"))
    }
}

#[async_trait]
impl VersionDiffer for DisabledLlm {
    async fn diff(&self, _: &str, _: &str) -> Result<DiffResult, CollaboratorError> {
        Err(CollaboratorError::Disabled("language model"))
    }
}

// ============ Classifier ============

const CLASSIFY_PROMPT: &str = "\
Eres un experto en documentos legales chilenos. Clasifica el documento en UNA de estas categorías según su contenido (no el nombre del archivo):

- constitucion: escrituras de constitución o modificación, extractos, estatutos, actas de directorio o socios.
- inscripcion: inscripciones en el Registro de Comercio, certificados de vigencia, anotaciones marginales.
- publicacion: publicaciones en el Diario Oficial (aunque contengan extractos de constitución) y avisos legales.
- cedula: cédulas de identidad.
- otros: cualquier otro documento.

Responde EXCLUSIVAMENTE con una palabra: constitucion | inscripcion | publicacion | cedula | otros

TEXTO:
----------------
{text}
----------------";

const DATE_PROMPT: &str = "\
Extrae la fecha principal del documento legal (generalmente la fecha de firma o constitución). Ejemplos:
- \"Santiago, 15 de enero de 2020\"
- \"Fecha: 10-03-2019\"

Responde ÚNICAMENTE en formato dd-mm-yyyy. Si no encuentras fecha, responde \"NO_FECHA\".

TEXTO:
----------------
{text}
----------------";

pub struct LlmClassifier {
    client: Arc<ChatClient>,
    max_chars: usize,
}

impl LlmClassifier {
    pub fn new(client: Arc<ChatClient>, max_chars: usize) -> Self {
        Self { client, max_chars }
    }
}

#[async_trait]
impl DocumentClassifier for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, CollaboratorError> {
        let text = truncate_chars(text, self.max_chars);
        let label = self
            .client
            .complete(&CLASSIFY_PROMPT.replace("{text}", text))
            .await?;
        let date = self
            .client
            .complete(&DATE_PROMPT.replace("{text}", text))
            .await?;
        Ok(Classification {
            category: Category::from_label(&label),
            raw_date: normalize_date(&date),
        })
    }
}

// ============ Field extraction ============

pub struct LlmExtractor {
    client: Arc<ChatClient>,
    max_chars: usize,
}

impl LlmExtractor {
    pub fn new(client: Arc<ChatClient>, max_chars: usize) -> Self {
        Self { client, max_chars }
    }

    fn prompt(schema: &FieldSchema, text: &str) -> String {
        let skeleton = schema
            .fields
            .iter()
            .map(|f| format!("  \"{}\": \"\"", f))
            .collect::<Vec<_>>()
            .join(",\n");
        format!(
            "Eres un abogado chileno experto en sociedades. Extrae la sección \"{}\" del documento.\n\
             Responde ÚNICAMENTE con un objeto JSON con exactamente estos campos \
             (si un dato no aparece, usa \"\"):\n{{\n{}\n}}\n\n\
             TEXTO:\n----------------\n{}\n----------------",
            schema.name, skeleton, text
        )
    }
}

#[async_trait]
impl FieldExtractor for LlmExtractor {
    async fn extract(
        &self,
        text: &str,
        schema: &FieldSchema,
    ) -> Result<FieldRecord, CollaboratorError> {
        let prompt = Self::prompt(schema, truncate_chars(text, self.max_chars));
        let answer = self.client.complete(&prompt).await?;
        Ok(parse_field_record(&answer, schema))
    }
}

/// Normalize a model answer into a record over `schema`'s fields.
pub fn parse_field_record(answer: &str, schema: &FieldSchema) -> FieldRecord {
    let object = match extract_json_object(answer) {
        Some(Value::Object(map)) => map,
        _ => {
            warn!(schema = %schema.name, "unparseable extraction answer, treating as empty");
            serde_json::Map::new()
        }
    };

    schema
        .fields
        .iter()
        .map(|field| {
            let value = object.get(field).map(stringify).unwrap_or_default();
            (field.clone(), value)
        })
        .collect()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" | "),
        Value::Null | Value::Object(_) => String::new(),
    }
}

// ============ Diff ============

const DIFF_PROMPT: &str = "\
Eres un experto en documentos legales chilenos. Compara dos versiones de un documento y encuentra las diferencias principales.

Responde ÚNICAMENTE en formato JSON con esta estructura:
{
  \"cambios\": [
    { \"titulo\": \"Descripción del cambio\", \"antes\": \"Texto anterior\", \"despues\": \"Texto nuevo\" }
  ],
  \"resumen\": \"Resumen breve de los cambios principales\"
}

Si no hay cambios significativos, devuelve una lista vacía de cambios.

VERSIÓN ANTERIOR:
----------------
{before}
----------------

VERSIÓN NUEVA:
----------------
{after}
----------------";

pub struct LlmDiffer {
    client: Arc<ChatClient>,
    max_chars: usize,
}

impl LlmDiffer {
    pub fn new(client: Arc<ChatClient>, max_chars: usize) -> Self {
        Self { client, max_chars }
    }

    /// Fill both placeholders in one pass so document text is never rescanned.
    fn prompt(before: &str, after: &str) -> String {
        let (head, rest) = DIFF_PROMPT.split_once("{before}").unwrap_or((DIFF_PROMPT, ""));
        let (middle, tail) = rest.split_once("{after}").unwrap_or((rest, ""));
        let mut prompt = String::with_capacity(DIFF_PROMPT.len() + before.len() + after.len());
        prompt.push_str(head);
        prompt.push_str(before);
        prompt.push_str(middle);
        prompt.push_str(after);
        prompt.push_str(tail);
        prompt
    }
}

#[async_trait]
impl VersionDiffer for LlmDiffer {
    async fn diff(&self, before: &str, after: &str) -> Result<DiffResult, CollaboratorError> {
        let prompt = Self::prompt(
            truncate_chars(before, self.max_chars),
            truncate_chars(after, self.max_chars),
        );
        let answer = self.client.complete(&prompt).await?;
        Ok(parse_diff(&answer))
    }
}

/// Normalize a model answer into a [`DiffResult`].
pub fn parse_diff(answer: &str) -> DiffResult {
    let Some(Value::Object(object)) = extract_json_object(answer) else {
        warn!("unparseable diff answer, treating as no changes");
        return DiffResult::default();
    };

    let field = |item: &Value, keys: &[&str]| {
        keys.iter()
            .find_map(|k| item.get(*k))
            .map(stringify)
            .unwrap_or_default()
    };

    let changes = object
        .get("cambios")
        .or_else(|| object.get("changes"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| ChangeRecord {
                    title: field(item, &["titulo", "title"]),
                    before: field(item, &["antes", "before"]),
                    after: field(item, &["despues", "después", "after"]),
                })
                .collect()
        })
        .unwrap_or_default();

    let summary = object
        .get("resumen")
        .or_else(|| object.get("summary"))
        .map(stringify)
        .unwrap_or_default();

    DiffResult { changes, summary }
}

/// Parse the outermost `{...}` in `answer`, ignoring code fences and prose.
fn extract_json_object(answer: &str) -> Option<Value> {
    let start = answer.find('{')?;
    let end = answer.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&answer[start..=end]).ok()
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
