//! OpenAI-compatible chat-completions client
//!
//! Defaults to xAI Grok; set AGENT_LLM_PROVIDER=openai to use OpenAI instead.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::Model;

const MAX_HTTP_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct ChatModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl ChatModelConfig {
    /// Resolve the provider configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let provider = env::var("AGENT_LLM_PROVIDER")
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        let (key_var, base_default, model_default) = if provider == "openai" {
            ("OPENAI_API_KEY", "https://api.openai.com/v1", "gpt-4.1")
        } else {
            ("XAI_API_KEY", "https://api.x.ai/v1", "grok-4-fast-reasoning")
        };

        let api_key = env::var(key_var).unwrap_or_default();
        if api_key.is_empty() {
            return Err(AgentError::ModelResponse(format!(
                "no API key configured, set {}",
                key_var
            )));
        }

        let base_url = if provider == "openai" {
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| base_default.to_string())
        } else {
            env::var("XAI_BASE_URL").unwrap_or_else(|_| base_default.to_string())
        };
        let model = if provider == "openai" {
            env::var("OPENAI_MODEL").unwrap_or_else(|_| model_default.to_string())
        } else {
            env::var("XAI_MODEL").unwrap_or_else(|_| model_default.to_string())
        };

        let temperature = env::var("AGENT_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature,
        })
    }
}

/// Reusable chat-completions client (connection-pooled).
pub struct ChatModel {
    client: Client,
    config: ChatModelConfig,
}

impl ChatModel {
    pub fn new(config: ChatModelConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ChatModelConfig::from_env()?)
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut last_error = None;
        for attempt in 0..MAX_HTTP_RETRIES {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(request)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<ChatResponse>().await.map_err(|e| {
                            error!("Failed to parse chat response: {}", e);
                            AgentError::ModelResponse(format!("chat response parse error: {}", e))
                        });
                    }

                    let transient = status.as_u16() == 429 || status.is_server_error();
                    let body = response.text().await.unwrap_or_default();
                    if !transient {
                        error!(status = %status, "Chat endpoint rejected request");
                        return Err(AgentError::ModelResponse(format!(
                            "chat request failed ({}): {}",
                            status, body
                        )));
                    }
                    warn!(status = %status, attempt, "Transient chat endpoint error");
                    last_error = Some(AgentError::ModelResponse(format!(
                        "chat request failed ({}): {}",
                        status, body
                    )));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Chat request failed");
                    last_error = Some(AgentError::Http(e));
                }
            }

            if attempt + 1 < MAX_HTTP_RETRIES {
                let backoff = Duration::from_millis((1500f64 * 1.5f64.powi(attempt as i32)) as u64);
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AgentError::ModelResponse("chat request produced no response".to_string())
        }))
    }
}

#[async_trait]
impl Model for ChatModel {
    async fn decide(&self, system_prompt: &str, prompt: &str) -> Result<Value> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: format!(
                        "{}\n\nYou must respond with a single JSON object that strictly matches \
                         the schema the prompt describes. Do not include surrounding text or \
                         markdown fences.",
                        system_prompt
                    ),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.config.temperature,
        };

        debug!(model = %self.config.model, "Calling chat completions");
        let response = self.complete(&request).await?;

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(AgentError::ModelResponse(
                "chat endpoint returned no choices".to_string(),
            ));
        }

        serde_json::from_str(strip_code_fences(&content)).map_err(|e| {
            AgentError::ModelResponse(format!("decision is not valid JSON: {}", e))
        })
    }
}

/// Remove a ```json ... ``` fence if the model wrapped its output anyway.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().trim_end_matches('`').trim()
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "grok-4-fast-reasoning".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "Build a long plan for NVDA".to_string(),
            }],
            temperature: 0.0,
        };

        let json = serde_json::to_string(&request);
        assert!(json.is_ok());
        assert!(json.unwrap().contains("Build a long plan for NVDA"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }
}
