//! TOML configuration parsing.
//!
//! Every section is optional. A run without `--config` uses
//! [`Config::default`]: local text extraction, keyword classification and a
//! disabled language model, which is enough to version a folder offline.
//!
//! Secrets are never read from the file; see [`LlmConfig::api_key_var`] and
//! [`OcrConfig::api_key_var`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Reuse OCR output for files whose content hash was seen before.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            results_dir: default_results_dir(),
            cache_dir: default_cache_dir(),
            cache_enabled: true,
            exclude_globs: default_exclude_globs(),
        }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("ocr_cache")
}
fn default_true() -> bool {
    true
}
fn default_exclude_globs() -> Vec<String> {
    vec!["**/.*".to_string(), ".*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_ocr_model")]
    pub model: String,
    #[serde(default = "default_ocr_api_version")]
    pub api_version: String,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: default_ocr_provider(),
            endpoint: None,
            model: default_ocr_model(),
            api_version: default_ocr_api_version(),
            timeout_secs: default_ocr_timeout_secs(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl OcrConfig {
    pub fn api_key_var(&self) -> &'static str {
        "AZURE_DOCUMENT_INTELLIGENCE_API_KEY"
    }
}

fn default_ocr_provider() -> String {
    "local".to_string()
}
fn default_ocr_model() -> String {
    "prebuilt-read".to_string()
}
fn default_ocr_api_version() -> String {
    "2024-11-30".to_string()
}
fn default_ocr_timeout_secs() -> u64 {
    120
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    /// Model name (OpenAI) or deployment name (Azure).
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_chars_doc")]
    pub max_chars_doc: usize,
    #[serde(default = "default_max_chars_diff")]
    pub max_chars_diff: usize,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            endpoint: None,
            api_version: None,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
            max_chars_doc: default_max_chars_doc(),
            max_chars_diff: default_max_chars_diff(),
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn api_key_var(&self) -> &'static str {
        match self.provider.as_str() {
            "azure" => "AZURE_OPENAI_API_KEY",
            _ => "OPENAI_API_KEY",
        }
    }
}

fn default_llm_provider() -> String {
    "disabled".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_chars_doc() -> usize {
    16_000
}
fn default_max_chars_diff() -> usize {
    8_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// `auto` (LLM when enabled, keywords otherwise), `llm`, or `keywords`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
        }
    }
}

fn default_strategy() -> String {
    "auto".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Categories to diff. Empty means every category.
    #[serde(default)]
    pub compare_categories: Vec<String>,
    #[serde(default = "default_report_category")]
    pub report_category: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compare_categories: Vec::new(),
            report_category: default_report_category(),
        }
    }
}

fn default_report_category() -> String {
    "constitucion".to_string()
}

impl Config {
    /// Whether classification should go through the language model.
    pub fn classify_with_llm(&self) -> bool {
        match self.classifier.strategy.as_str() {
            "llm" => true,
            "keywords" => false,
            _ => self.llm.is_enabled(),
        }
    }

    pub fn ocr_retry_policy(&self) -> RetryPolicy {
        self.retry_policy(self.ocr.max_retries, self.ocr.timeout_secs)
    }

    pub fn llm_retry_policy(&self) -> RetryPolicy {
        self.retry_policy(self.llm.max_retries, self.llm.timeout_secs)
    }

    fn retry_policy(&self, max_retries: u32, timeout_secs: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: max_retries + 1,
            initial_delay: Duration::from_millis(self.retry.initial_backoff_ms),
            max_delay: Duration::from_millis(self.retry.max_backoff_ms),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    match config.ocr.provider.as_str() {
        "local" => {}
        "azure" => {
            if config.ocr.endpoint.is_none() {
                bail!("ocr.endpoint must be specified when provider is 'azure'");
            }
        }
        other => bail!(
            "Unknown OCR provider: '{}'. Must be local or azure.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" => {}
        "openai" | "azure" => {
            if config.llm.model.is_none() {
                bail!(
                    "llm.model must be specified when provider is '{}'",
                    config.llm.provider
                );
            }
            if config.llm.provider == "azure" && config.llm.endpoint.is_none() {
                bail!("llm.endpoint must be specified when provider is 'azure'");
            }
        }
        other => bail!(
            "Unknown LLM provider: '{}'. Must be disabled, openai, or azure.",
            other
        ),
    }

    match config.classifier.strategy.as_str() {
        "auto" | "keywords" => {}
        "llm" => {
            if !config.llm.is_enabled() {
                bail!("classifier.strategy = 'llm' requires an enabled [llm] provider");
            }
        }
        other => bail!(
            "Unknown classifier strategy: '{}'. Must be auto, llm, or keywords.",
            other
        ),
    }

    if config.llm.max_chars_doc == 0 || config.llm.max_chars_diff == 0 {
        bail!("llm.max_chars_doc and llm.max_chars_diff must be > 0");
    }

    if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
        bail!("retry.initial_backoff_ms must be <= retry.max_backoff_ms");
    }

    if config.pipeline.report_category.trim().is_empty() {
        bail!("pipeline.report_category must not be empty");
    }

    Ok(())
}
