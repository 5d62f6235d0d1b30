//! HTTP client for OpenAI-compatible chat-completion endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::LlmConfig;

use super::instruction::{parse_tool_instruction, ToolInstruction};
use super::{ChatMessage, ChatResponse, FunctionCall, LlmClient, LlmError, ToolCall, ToolDefinition};

/// Shown when the model declines every tool without saying anything else.
const NO_TOOL_FALLBACK: &str =
    "I've processed your request. No specific tool was needed, or I couldn't determine one. How else can I help?";

/// Chat-completions client (Together AI by default).
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("toolpilot/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatResponse, LlmError> {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = serde_json::to_value(tools)
                .map_err(|e| LlmError::Malformed(format!("cannot encode tools: {}", e)))?;
            body["tool_choice"] = Value::String("auto".to_string());
        }

        tracing::debug!(model, messages = messages.len(), with_tools = tools.is_some(), "Querying model");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LlmError::Auth(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        decode_response(&text, tools.is_some_and(|t| !t.is_empty()))
    }
}

/// Turn a raw completion body into a [`ChatResponse`].
///
/// Tool calls, native or written as JSON in the text, are only recognized
/// when tools were offered; otherwise the reply is taken as plain text.
fn decode_response(body: &str, tools_offered: bool) -> Result<ChatResponse, LlmError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Malformed(e.to_string()))?;

    let message = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Malformed("response contained no choices".to_string()))?
        .message;

    if !tools_offered {
        return Ok(ChatResponse {
            content: message.content,
            tool_calls: None,
        });
    }

    if let Some(calls) = message.tool_calls.filter(|c| !c.is_empty()) {
        return Ok(ChatResponse {
            content: message.content.filter(|c| !c.trim().is_empty()),
            tool_calls: Some(calls),
        });
    }

    let Some(content) = message.content else {
        return Ok(ChatResponse::default());
    };

    match parse_tool_instruction(&content) {
        Some(ToolInstruction::Call { tool, parameters }) => {
            tracing::debug!(tool = %tool, "Recovered tool instruction from message text");
            Ok(ChatResponse {
                content: None,
                tool_calls: Some(vec![ToolCall {
                    id: format!("call_{}", Uuid::new_v4().simple()),
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: tool,
                        arguments: parameters.to_string(),
                    },
                }]),
            })
        }
        Some(ToolInstruction::NoTool { answer }) => Ok(ChatResponse {
            content: Some(answer.unwrap_or_else(|| NO_TOOL_FALLBACK.to_string())),
            tool_calls: None,
        }),
        None => Ok(ChatResponse {
            content: Some(content),
            tool_calls: None,
        }),
    }
}
