//! Chat completion client for OpenAI-compatible APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rewritex_shared::{LlmConfig, Result, RewritexError, resolve_api_key};

/// A single system + user exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
}

/// A generative text model that answers one exchange with one text completion.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Connection settings for [`ChatClient`].
#[derive(Debug, Clone)]
pub struct LlmOptions {
    /// API root; requests go to `<base_url>/chat/completions`.
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl LlmOptions {
    /// Build options from the `[llm]` config section, resolving the API key
    /// from the configured environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.clone(),
            api_key: resolve_api_key(&config.api_key_env)?,
            timeout_secs: config.timeout_secs,
        })
    }
}

/// [`CompletionService`] speaking `POST /chat/completions`.
pub struct ChatClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(opts: LlmOptions) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| RewritexError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: opts.base_url.trim_end_matches('/').to_string(),
            api_key: opts.api_key,
        })
    }
}

#[async_trait]
impl CompletionService for ChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let start = std::time::Instant::now();
        let body = ChatRequest {
            model: &request.model,
            messages: [
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "completion request failed");
                RewritexError::Llm(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, error = %error_text, "completion API error");
            return Err(RewritexError::Llm(format!("HTTP {status}: {error_text}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| RewritexError::Llm(format!("invalid completion response: {e}")))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RewritexError::Llm("completion returned no choices".into()))?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis(),
            chars = content.len(),
            "chat completion"
        );
        Ok(content)
    }
}
