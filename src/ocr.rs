//! OCR providers and text cleaning.
//!
//! - **[`LocalOcr`]**: no network. Plain text files are read as UTF-8 and
//!   PDFs go through `pdf-extract`. Scanned PDFs without a text layer come
//!   back empty.
//! - **[`AzureOcr`]**: Azure Document Intelligence `prebuilt-read`. Submits
//!   the file, polls the long-running operation and rebuilds per-page text
//!   from the content spans.
//!
//! Both return raw text; [`clean_soft`] produces the text downstream stages
//! see.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::CollaboratorError;
use crate::models::OcrPage;
use crate::traits::{OcrOutput, OcrService};

/// Extensions [`LocalOcr`] reads as UTF-8 text.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

const FORM_FEED: char = '\u{000C}';

/// Trim lines, collapse runs of blank lines to one, and collapse whitespace
/// inside each line to single spaces.
pub fn clean_soft(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut prev_blank = false;
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !prev_blank {
                lines.push(String::new());
            }
            prev_blank = true;
        } else {
            lines.push(collapsed);
            prev_blank = false;
        }
    }
    lines.join("\n").trim().to_string()
}

/// Lowercased extension of `filename`, without the dot.
pub fn file_ext(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Split extracted text into pages on form feeds.
fn pages_from_text(text: &str) -> Vec<OcrPage> {
    text.split(FORM_FEED)
        .map(str::trim)
        .enumerate()
        .filter(|(_, t)| !t.is_empty())
        .map(|(i, t)| OcrPage {
            page_number: i as u32 + 1,
            text: t.to_string(),
        })
        .collect()
}

/// Offline provider for text files and PDFs with a text layer.
pub struct LocalOcr;

#[async_trait]
impl OcrService for LocalOcr {
    fn name(&self) -> &str {
        "local"
    }

    async fn analyze(&self, filename: &str, bytes: &[u8]) -> Result<OcrOutput, CollaboratorError> {
        let ext = file_ext(filename);
        let text_raw = if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            String::from_utf8_lossy(bytes).into_owned()
        } else if ext == "pdf" {
            let owned = bytes.to_vec();
            tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_from_mem(&owned).map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| CollaboratorError::Malformed(format!("PDF task failed: {}", e)))?
            .map_err(|e| CollaboratorError::Malformed(format!("PDF extraction failed: {}", e)))?
        } else {
            return Err(CollaboratorError::Unsupported(filename.to_string()));
        };

        let pages = pages_from_text(&text_raw);
        Ok(OcrOutput {
            num_pages: pages.len().max(1) as u32,
            pages,
            text_raw,
            language: None,
        })
    }
}

/// Azure Document Intelligence client.
pub struct AzureOcr {
    http: reqwest::Client,
    analyze_url: String,
    api_key: String,
    poll_interval: Duration,
}

impl AzureOcr {
    /// # Errors
    ///
    /// Returns an error if `ocr.endpoint` is unset or the API key variable
    /// is missing.
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("ocr.endpoint required for Azure"))?;
        let key_var = config.api_key_var();
        let api_key = std::env::var(key_var)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", key_var))?;

        let analyze_url = format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={}&stringIndexType=unicodeCodePoint",
            endpoint.trim_end_matches('/'),
            config.model,
            config.api_version
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            analyze_url,
            api_key,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    async fn submit(&self, bytes: &[u8]) -> Result<String, CollaboratorError> {
        let body = serde_json::json!({
            "base64Source": base64::engine::general_purpose::STANDARD.encode(bytes),
        });
        let response = self
            .http
            .post(&self.analyze_url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status(status.as_u16(), body_text));
        }

        response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| CollaboratorError::Malformed("missing Operation-Location header".into()))
    }

    async fn poll(&self, operation_url: &str) -> Result<Value, CollaboratorError> {
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .http
                .get(operation_url)
                .header("Ocp-Apim-Subscription-Key", &self.api_key)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let body_text = response.text().await.unwrap_or_default();
                return Err(CollaboratorError::from_status(status.as_u16(), body_text));
            }

            let json: Value = response.json().await?;
            match json.get("status").and_then(Value::as_str) {
                Some("succeeded") => return Ok(json),
                Some("failed") | Some("canceled") => {
                    let detail = json
                        .pointer("/error/message")
                        .and_then(Value::as_str)
                        .unwrap_or("analysis failed");
                    return Err(CollaboratorError::Rejected {
                        status: status.as_u16(),
                        body: detail.to_string(),
                    });
                }
                other => debug!(status = ?other, "analysis still running"),
            }
        }
    }
}

#[async_trait]
impl OcrService for AzureOcr {
    fn name(&self) -> &str {
        "azure"
    }

    async fn analyze(&self, filename: &str, bytes: &[u8]) -> Result<OcrOutput, CollaboratorError> {
        let operation = self.submit(bytes).await?;
        debug!(filename = %filename, "submitted for analysis");
        let json = self.poll(&operation).await?;
        let result = json
            .get("analyzeResult")
            .ok_or_else(|| CollaboratorError::Malformed("missing analyzeResult".into()))?;
        Ok(parse_analyze_result(result))
    }
}

/// Build [`OcrOutput`] from an `analyzeResult` object.
///
/// Page text comes from the page's spans over `content` (code-point
/// offsets), falling back to its lines. The full text is the non-empty
/// pages joined by blank lines, or `content` when no page has text.
pub fn parse_analyze_result(result: &Value) -> OcrOutput {
    let content = result
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let chars: Vec<char> = content.chars().collect();

    let raw_pages = result
        .get("pages")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let pages: Vec<OcrPage> = raw_pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            let page_number = page
                .get("pageNumber")
                .and_then(Value::as_u64)
                .map(|n| n as u32)
                .unwrap_or(i as u32 + 1);
            OcrPage {
                page_number,
                text: page_text(page, &chars),
            }
        })
        .collect();

    let text_raw = if pages.iter().any(|p| !p.text.is_empty()) {
        pages
            .iter()
            .filter(|p| !p.text.is_empty())
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        content.to_string()
    };

    let language = result
        .get("languages")
        .and_then(Value::as_array)
        .and_then(|langs| {
            langs.iter().max_by(|a, b| {
                let conf = |v: &Value| v.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
                conf(a).total_cmp(&conf(b))
            })
        })
        .and_then(|l| l.get("locale"))
        .and_then(Value::as_str)
        .map(str::to_string);

    OcrOutput {
        num_pages: pages.len() as u32,
        pages,
        text_raw,
        language,
    }
}

fn page_text(page: &Value, content: &[char]) -> String {
    let spans = page
        .get("spans")
        .and_then(Value::as_array)
        .filter(|s| !s.is_empty() && !content.is_empty());

    if let Some(spans) = spans {
        let mut text = String::new();
        for span in spans {
            let offset = span.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
            let length = span.get("length").and_then(Value::as_u64).unwrap_or(0) as usize;
            let start = offset.min(content.len());
            let end = offset.saturating_add(length).min(content.len());
            text.extend(&content[start..end]);
        }
        return text.trim().to_string();
    }

    page.get("lines")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.get("content").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}
