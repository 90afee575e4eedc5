//! OpenAI-compatible HTTP provider.
//!
//! Works with any endpoint that speaks the `/chat/completions` wire format
//! (OpenAI, OpenRouter, Ollama, local gateways). The runtime core only
//! depends on the [`LlmProvider`] trait; this adapter exists so the CLI has
//! a live transport out of the box.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ai::provider::{LlmProvider, Result};
use crate::ai::types::{
    CompletionRequest, CompletionResponse, Message, MessageRole, TokenUsage, ToolCall,
    ToolDefinition,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

// ─── Wire types ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

fn to_api_message(message: &Message) -> ApiMessage {
    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };
    ApiMessage {
        role: role.to_string(),
        content: Some(message.content.clone()),
        tool_calls: message
            .tool_calls
            .iter()
            .map(|c| ApiToolCall {
                id: c.id.clone(),
                kind: "function".to_string(),
                function: ApiFunctionCall {
                    name: c.name.clone(),
                    arguments: c.arguments.clone(),
                },
            })
            .collect(),
        tool_call_id: message.tool_call_id.clone(),
    }
}

// ─── Provider ──────────────────────────────────────────────────────────────

pub struct OpenAiCompatibleProvider {
    client: Client,
    api_key: String,
    base_url: String,
    context_window: usize,
}

impl OpenAiCompatibleProvider {
    /// Create a provider for the given endpoint. `api_key` may be empty for
    /// local gateways such as Ollama.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = tokens;
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = ApiRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(to_api_message).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request.tools.clone(),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut http = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            http = http.bearer_auth(&self.api_key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| format!("network error: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {detail}"));
        }

        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| format!("malformed completion response: {e}"))?;

        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| "completion response carried no choices".to_string())?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|c| ToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments: c.function.arguments,
                })
                .collect(),
            model: api.model,
            usage: api.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason,
        })
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}
