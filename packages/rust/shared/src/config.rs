//! Application configuration for Rewritex.
//!
//! User config lives at `~/.rewritex/rewritex.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RewritexError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "rewritex.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".rewritex";

// ---------------------------------------------------------------------------
// Config structs (matching rewritex.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Article database.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Reference search service.
    #[serde(default)]
    pub search: SearchConfig,

    /// Generative completion service.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Source site ingestion.
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "var/rewritex.db".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// SerpApi-compatible search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Search engine passed to the endpoint.
    #[serde(default = "default_search_engine")]
    pub engine: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Organic results requested per query.
    #[serde(default = "default_result_count")]
    pub result_count: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            engine: default_search_engine(),
            api_key_env: default_search_key_env(),
            result_count: default_result_count(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://serpapi.com/search".into()
}
fn default_search_engine() -> String {
    "google".into()
}
fn default_search_key_env() -> String {
    "SERP_API_KEY".into()
}
fn default_result_count() -> u32 {
    10
}
fn default_search_timeout() -> u64 {
    30
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model identifier used for every rewrite.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Cut reference texts to this many characters before prompting.
    /// Unset sends them whole.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reference_chars: Option<usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_model(),
            api_key_env: default_llm_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            max_reference_chars: None,
        }
    }
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_llm_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Article listing root of the source site.
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Maximum number of articles collected per run.
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            max_articles: default_max_articles(),
        }
    }
}

fn default_listing_url() -> String {
    "https://beyondchats.com/blogs/".into()
}
fn default_max_articles() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.rewritex/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RewritexError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.rewritex/rewritex.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RewritexError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RewritexError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RewritexError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RewritexError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RewritexError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read an API key from the named env var, failing when it is unset or empty.
pub fn resolve_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(RewritexError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
