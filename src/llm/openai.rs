use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{FinishReason, LLMClient, LLMError, LLMInput, LLMOutput, Usage};
use crate::session::{MessageContent, MessageRole};
use crate::tool::ToolDefinition;

/// OpenAI API response for chat completions.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

/// An LLM client for OpenAI-compatible chat completion APIs.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
}

impl OpenAIClient {
    /// Creates a new OpenAI client.
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout: Option<Duration>,
        extra_headers: &BTreeMap<String, String>,
    ) -> Result<Self, LLMError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LLMError::AuthError(format!("invalid API key: {}", e)))?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        for (name, value) in extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| LLMError::ApiError(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| LLMError::ApiError(format!("invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let mut client_builder = reqwest::Client::builder().default_headers(headers);

        if let Some(timeout) = timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let client = client_builder.build()?;

        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }

    /// Creates a request builder for chat completions.
    fn chat_completions_request(&self, input: &LLMInput) -> RequestBuilder {
        let tools: Vec<Value> = input.tools.iter().map(Self::tool_to_function).collect();

        let body = ChatRequest {
            model: input.model.clone(),
            messages: Self::build_messages(input),
            tools: if tools.is_empty() { None } else { Some(tools) },
            max_tokens: Some(input.max_tokens),
            temperature: input.temperature,
            stream: false,
        };

        debug!(model = %input.model, tools = input.tools.len(), "Sending request to OpenAI");

        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
    }

    fn tool_to_function(tool: &ToolDefinition) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        })
    }

    /// Builds messages for the API request.
    fn build_messages(input: &LLMInput) -> Vec<Value> {
        let mut messages = Vec::new();

        // Add system prompt
        if !input.system_prompt.is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": input.system_prompt
            }));
        }

        // Add conversation messages
        for msg in &input.messages {
            match msg.role {
                MessageRole::System => {
                    messages.push(serde_json::json!({
                        "role": "system",
                        "content": msg.text()
                    }));
                }
                MessageRole::User => {
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": msg.text()
                    }));
                }
                MessageRole::Assistant => {
                    let tool_calls = msg
                        .tool_calls()
                        .into_iter()
                        .map(|call| {
                            serde_json::json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments
                                }
                            })
                        })
                        .collect::<Vec<_>>();

                    let text = msg.text();
                    if !tool_calls.is_empty() {
                        messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                            "tool_calls": tool_calls
                        }));
                    } else {
                        messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": text
                        }));
                    }
                }
                MessageRole::Tool => {
                    for content in &msg.content {
                        if let MessageContent::ToolResult {
                            tool_call_id,
                            result,
                            is_error: _,
                        } = content
                        {
                            messages.push(serde_json::json!({
                                "role": "tool",
                                "tool_call_id": tool_call_id,
                                "content": result
                            }));
                        }
                    }
                }
            }
        }

        messages
    }

    fn parse_response(response_text: &str) -> Result<LLMOutput, LLMError> {
        let response: ChatCompletionResponse = serde_json::from_str(response_text)
            .map_err(|e| LLMError::InvalidResponse(format!("{}: {}", e, response_text)))?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(LLMError::InvalidResponse(format!(
                "No choices in response. Response: {}",
                response_text
            )));
        };

        let mut content = Vec::new();

        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(MessageContent::Text { text });
            }
        }

        for tool_call in choice.message.tool_calls.unwrap_or_default() {
            let arguments = if tool_call.function.arguments.trim().is_empty() {
                "{}".to_string()
            } else {
                tool_call.function.arguments
            };
            content.push(MessageContent::ToolCall {
                id: tool_call.id,
                name: tool_call.function.name,
                arguments,
            });
        }

        Ok(LLMOutput {
            content,
            finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
            usage: response.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(&self, input: LLMInput) -> Result<LLMOutput, LLMError> {
        let response = self.chat_completions_request(&input).send().await?;
        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| LLMError::InvalidResponse(e.to_string()))?;

        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LLMError::AuthError(response_text));
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(LLMError::RateLimitError(response_text)),
            _ => return Err(LLMError::ApiError(format!("{}: {}", status, response_text))),
        }

        tracing::debug!("LLM response: {}", response_text);
        Self::parse_response(&response_text)
    }
}
