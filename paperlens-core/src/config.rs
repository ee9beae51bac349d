//! Configuration system for Paperlens.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> CLI overrides.
//! Configuration is loaded from `~/.config/paperlens/config.toml` and/or
//! `paperlens.toml` in the workspace directory.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-level config file.
pub const WORKSPACE_CONFIG_FILE: &str = "paperlens.toml";

/// Field names of the default analytical summary schema.
pub const DEFAULT_SUMMARY_FIELDS: &[&str] = &[
    "empirical",
    "authors",
    "year",
    "topics",
    "keywords",
    "sector",
    "methods",
    "sample_size",
    "data_type",
    "novelty",
    "main_findings",
    "strengths",
    "limitations",
    "practical_relevance",
    "other_details",
];

/// Top-level configuration for a Paperlens run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperlensConfig {
    pub llm: LlmConfig,
    pub paths: PathsConfig,
    pub summary: SummaryConfig,
    pub comparison: ComparisonConfig,
    pub run: RunConfig,
}

impl PaperlensConfig {
    /// Validate every section and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        warnings.extend(self.summary.validate());
        if !(0.0..=2.0).contains(&self.comparison.temperature) {
            warnings.push(format!(
                "comparison.temperature ({}) is outside the typical range 0.0–2.0",
                self.comparison.temperature
            ));
        }
        warnings
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn ensure_runnable(&self) -> Result<(), ConfigError> {
        if self.summary.fields.is_empty() {
            return Err(ConfigError::Invalid {
                message: "summary.fields must list at least one field".to_string(),
            });
        }
        if let Some(bullet) = &self.summary.bullet_field
            && !self.summary.fields.iter().any(|f| f == bullet)
        {
            return Err(ConfigError::Invalid {
                message: format!(
                    "summary.bullet_field '{}' is not one of summary.fields",
                    bullet
                ),
            });
        }
        if self.summary.fields.iter().any(|f| f == "paper_name") {
            return Err(ConfigError::Invalid {
                message: "summary.fields must not contain the reserved name 'paper_name'"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Resolve every relative path in `paths` against `workspace`.
    pub fn resolve_paths(&mut self, workspace: &Path) {
        let paths = &mut self.paths;
        for path in [
            &mut paths.papers_dir,
            &mut paths.parsed_text_dir,
            &mut paths.summary_table,
            &mut paths.comparison_table,
        ] {
            if path.is_relative() {
                *path = workspace.join(&*path);
            }
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai" (or any OpenAI-compatible endpoint) or "anthropic".
    pub provider: String,
    /// Model identifier (e.g., "gpt-4.1-mini").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response. Provider default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Per-request HTTP timeout. The HTTP client default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Cost per 1M input tokens (USD), used for the end-of-run estimate.
    #[serde(default)]
    pub input_cost_per_million: f64,
    /// Cost per 1M output tokens (USD).
    #[serde(default)]
    pub output_cost_per_million: f64,
    /// Retry policy for transient transport errors.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            max_tokens: None,
            request_timeout_secs: None,
            input_cost_per_million: 0.40,
            output_cost_per_million: 1.60,
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.model.trim().is_empty() {
            warnings.push("llm.model is empty; the provider will reject requests".to_string());
        }
        if self.max_tokens == Some(0) {
            warnings.push("llm.max_tokens is 0; responses will be empty".to_string());
        }
        if self.request_timeout_secs == Some(0) {
            warnings.push("llm.request_timeout_secs is 0; every request will time out".to_string());
        }
        if self.retry.backoff_multiplier < 1.0 {
            warnings.push(format!(
                "llm.retry.backoff_multiplier ({}) is below 1.0; backoff will shrink",
                self.retry.backoff_multiplier
            ));
        }
        warnings
    }
}

/// Bounded exponential backoff for transient model-call failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt. 0 disables retry.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned for `*.pdf` files.
    pub papers_dir: PathBuf,
    /// Directory receiving one `<stem>.txt` per extracted paper.
    pub parsed_text_dir: PathBuf,
    /// One row per paper.
    pub summary_table: PathBuf,
    /// One row and column per paper.
    pub comparison_table: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            papers_dir: PathBuf::from("papers"),
            parsed_text_dir: PathBuf::from("parsed_text"),
            summary_table: PathBuf::from("analytical_papers_summary.csv"),
            comparison_table: PathBuf::from("cross_comparison_matrix.csv"),
        }
    }
}

/// Per-paper summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub temperature: f32,
    /// Ordered schema of string fields the model must return.
    pub fields: Vec<String>,
    /// Field written as newline-separated bullet sentences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullet_field: Option<String>,
    /// Truncate paper text to this many bytes before prompting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_chars: Option<usize>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            fields: DEFAULT_SUMMARY_FIELDS.iter().map(|f| f.to_string()).collect(),
            bullet_field: Some("other_details".to_string()),
            max_input_chars: None,
        }
    }
}

impl SummaryConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !(0.0..=2.0).contains(&self.temperature) {
            warnings.push(format!(
                "summary.temperature ({}) is outside the typical range 0.0–2.0",
                self.temperature
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.as_str()) {
                warnings.push(format!("summary.fields lists '{}' more than once", field));
            }
        }
        if self.max_input_chars == Some(0) {
            warnings.push("summary.max_input_chars is 0; the model will see no text".to_string());
        }
        warnings
    }
}

/// Pairwise comparison settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonConfig {
    pub temperature: f32,
    /// Query only `(a, b)` with `a` before `b` and mirror the answer into `(b, a)`.
    #[serde(default)]
    pub mirror_pairs: bool,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            mirror_pairs: false,
        }
    }
}

/// Driver behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Process input files in lexicographic order instead of directory order.
    pub sort_inputs: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { sort_inputs: true }
    }
}

/// Values set on the command line, applied above every other layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub papers_dir: Option<PathBuf>,
    pub mirror_pairs: Option<bool>,
}

impl ConfigOverrides {
    /// Nested form of the set values, e.g. `{"llm": {"model": "..."}}`.
    fn to_value(&self) -> serde_json::Value {
        let mut root = serde_json::Map::new();
        let mut section = |name: &str, key: &str, value: serde_json::Value| {
            let entry = root
                .entry(name.to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if let Some(map) = entry.as_object_mut() {
                map.insert(key.to_string(), value);
            }
        };
        if let Some(model) = &self.model {
            section("llm", "model", model.clone().into());
        }
        if let Some(dir) = &self.papers_dir {
            section("paths", "papers_dir", dir.to_string_lossy().into_owned().into());
        }
        if let Some(mirror) = self.mirror_pairs {
            section("comparison", "mirror_pairs", mirror.into());
        }
        serde_json::Value::Object(root)
    }
}

/// Path of the user-level config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "paperlens", "paperlens")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `PAPERLENS_`)
/// 3. Explicit config file, or workspace-local `paperlens.toml`
/// 4. User config (`~/.config/paperlens/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<PaperlensConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(PaperlensConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    match config_file {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            if let Some(ws) = workspace {
                let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
                if ws_config.exists() {
                    figment = figment.merge(Toml::file(&ws_config));
                }
            }
        }
    }

    // Environment variables (PAPERLENS_LLM__MODEL, PAPERLENS_PATHS__PAPERS_DIR, etc.)
    figment = figment.merge(Env::prefixed("PAPERLENS_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides.to_value()));
    }

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}
