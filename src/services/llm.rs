use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::core::cancel::{until_cancelled, CancellationToken};
use crate::core::config::Config;
use crate::core::state::{GenerationRequest, Screenplay};
use crate::services::script;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String, // "openrouter", "openai" or "ollama"
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Models generated against in one fan-out. Empty means "ask" (or `default_model` when
    /// running unattended).
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default = "default_response_healing")]
    pub response_healing: bool,
}

fn default_model() -> String {
    "allenai/olmo-3.1-32b-think:free".to_string()
}

fn default_response_healing() -> bool {
    true
}

/// One generation call against one target (model).
///
/// Implementations must give up promptly once `cancel` fires; the orchestrator ignores
/// anything they return after that point.
#[async_trait]
pub trait ScreenplayGenerator: Send + Sync {
    async fn generate(
        &self,
        target: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<Screenplay>;
}

pub fn create_generator(config: &Config) -> Result<Arc<dyn ScreenplayGenerator>> {
    let llm = &config.llm;
    match llm.provider.as_str() {
        "openrouter" | "openai" => {
            let fallback = if llm.provider == "openrouter" {
                OPENROUTER_BASE_URL
            } else {
                OPENAI_BASE_URL
            };
            let api_key = llm
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .context("API key missing (llm.api_key or OPENROUTER_API_KEY)")?;
            Ok(Arc::new(OpenAIGenerator::new(
                &api_key,
                llm.base_url.as_deref().unwrap_or(fallback),
                llm.provider == "openrouter" && llm.response_healing,
            )))
        }
        "ollama" => Ok(Arc::new(OllamaGenerator::new(
            llm.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL),
        ))),
        _ => Err(anyhow!("Unknown LLM provider: {}", llm.provider)),
    }
}

// --- OpenAI-compatible (OpenRouter, OpenAI) ---

pub struct OpenAIGenerator {
    api_key: String,
    base_url: String,
    response_healing: bool,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(api_key: &str, base_url: &str, response_healing: bool) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            response_healing,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, target: &str, request: &GenerationRequest) -> OpenAIRequest {
        OpenAIRequest {
            model: target.to_string(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: script::system_prompt(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: script::user_prompt(request),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: "screenplay".to_string(),
                    strict: false,
                    schema: script::screenplay_schema(request),
                },
            },
            plugins: if self.response_healing {
                vec![Plugin {
                    id: "response-healing".to_string(),
                }]
            } else {
                Vec::new()
            },
            stream: false,
        }
    }

    async fn send(&self, target: &str, request: &GenerationRequest) -> Result<Screenplay> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(target, request))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("{} API error ({}): {}", target, status, error_text));
        }

        let result: OpenAIResponse = resp.json().await?;
        if let Some(err) = result.error {
            return Err(anyhow!("{} returned error: {}", target, err.message));
        }
        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("{} response empty or missing content", target))?;
        debug!("{} returned {} bytes", target, content.len());
        script::parse_screenplay(&content)
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    plugins: Vec<Plugin>,
    stream: bool,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: Value,
}

#[derive(Serialize)]
struct Plugin {
    id: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    error: Option<OpenAIError>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIError {
    message: String,
}

#[async_trait]
impl ScreenplayGenerator for OpenAIGenerator {
    async fn generate(
        &self,
        target: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<Screenplay> {
        until_cancelled(&cancel, self.send(target, request))
            .await
            .ok_or_else(|| anyhow!("request for {} was cancelled", target))?
    }
}

// --- Ollama ---

pub struct OllamaGenerator {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, target: &str, request: &GenerationRequest) -> Result<Screenplay> {
        let url = format!("{}/api/chat", self.base_url);

        let request_body = OllamaRequest {
            model: target.to_string(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: script::system_prompt(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: script::user_prompt(request),
                },
            ],
            format: script::screenplay_schema(request),
            stream: false,
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Ollama API error: {}", error_text));
        }

        let result: OllamaResponse = resp.json().await?;
        script::parse_screenplay(&result.message.content)
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    format: Value,
    stream: bool,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessageResponse,
}

#[derive(Deserialize)]
struct OllamaMessageResponse {
    content: String,
}

#[async_trait]
impl ScreenplayGenerator for OllamaGenerator {
    async fn generate(
        &self,
        target: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<Screenplay> {
        until_cancelled(&cancel, self.send(target, request))
            .await
            .ok_or_else(|| anyhow!("request for {} was cancelled", target))?
    }
}
