//! OpenAI 兼容 API 后端
//!
//! 直接以 JSON 调用任意 OpenAI 兼容端点的 `/chat/completions`（可配置 base_url），支持函数工具调用。
//! 需要拿到 HTTP 状态码来区分限流（429）与其它失败，故使用 reqwest 而非高层 SDK。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::LlmError;
use crate::llm::{ModelBackend, ModelReply, ModelRequest, ToolCall, ToolSchema, Turn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    /// (prompt, completion, total)
    pub fn get(&self) -> (u64, u64, u64) {
        let p = self.prompt_tokens.load(Ordering::Relaxed);
        let c = self.completion_tokens.load(Ordering::Relaxed);
        (p, c, p + c)
    }
}

/// OpenAI 兼容后端：持有 HTTP 客户端、端点与密钥；模型名由每次请求携带
pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    pub usage: TokenUsage,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: Option<&str>, api_key: &str, timeout: Duration) -> Self {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client ({}), using defaults", e);
                reqwest::Client::new()
            });
        Self {
            client,
            endpoint: format!("{base}/chat/completions"),
            api_key: api_key.to_string(),
            timeout,
            usage: TokenUsage::default(),
        }
    }

    fn request_body(request: &ModelRequest<'_>) -> Value {
        let mut messages = Vec::with_capacity(request.history.len() + 1);
        messages.push(json!({ "role": "system", "content": request.instruction }));
        messages.extend(request.history.iter().map(turn_to_message));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(tool_to_json).collect());
        }
        body
    }
}

fn tool_to_json(tool: &ToolSchema) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn turn_to_message(turn: &Turn) -> Value {
    match turn {
        Turn::User { content } => json!({ "role": "user", "content": content }),
        Turn::System { content } => json!({ "role": "system", "content": content }),
        Turn::ToolResult {
            call_id, content, ..
        } => json!({ "role": "tool", "tool_call_id": call_id, "content": content }),
        Turn::Model(reply) => {
            // 既无文本也无工具调用的 assistant 消息会被拒绝
            let content = match &reply.text {
                None if !reply.has_tool_calls() => Value::String(String::new()),
                text => json!(text),
            };
            let mut msg = json!({ "role": "assistant", "content": content });
            if reply.has_tool_calls() {
                msg["tool_calls"] = reply
                    .tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c
                                    .raw_arguments
                                    .clone()
                                    .unwrap_or_else(|| c.arguments.to_string()),
                            }
                        })
                    })
                    .collect();
            }
            msg
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn parse_reply(response: ChatResponse) -> Result<ModelReply, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;
    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|c| {
            let raw = c.function.arguments;
            if raw.trim().is_empty() {
                return ToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments: json!({}),
                    raw_arguments: None,
                };
            }
            // 模型偶尔给出非法 JSON：原样透传，由工具报告参数错误
            let arguments = serde_json::from_str(&raw).unwrap_or_else(|_| Value::String(raw.clone()));
            ToolCall {
                id: c.id,
                name: c.function.name,
                arguments,
                raw_arguments: Some(raw),
            }
        })
        .collect();
    Ok(ModelReply {
        text: choice.message.content,
        tool_calls,
    })
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelReply, LlmError> {
        let body = Self::request_body(&request);
        tracing::debug!(
            model = request.model,
            tools = request.tools.len(),
            history = request.history.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }
        parse_reply(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_maps_history() {
        let history = vec![
            Turn::user("where is my booking?"),
            Turn::Model(ModelReply::tool_calls(vec![ToolCall {
                id: "call_1".to_string(),
                name: "transfer_to_booking".to_string(),
                arguments: json!({}),
                raw_arguments: None,
            }])),
            Turn::ToolResult {
                call_id: "call_1".to_string(),
                name: "transfer_to_booking".to_string(),
                content: "Transfer to Booking complete.".to_string(),
            },
            Turn::system("continue"),
        ];
        let tools = vec![ToolSchema {
            name: "lookup_reservation".to_string(),
            description: "Look up".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let body = OpenAiCompatBackend::request_body(&ModelRequest {
            model: "gpt-4o-mini",
            instruction: "You are Booking".to_string(),
            tools,
            history: &history,
        });

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], "lookup_reservation");
    }

    #[test]
    fn test_empty_model_reply_sends_empty_content() {
        let history = vec![
            Turn::user("hi"),
            Turn::Model(ModelReply::default()),
            Turn::user("hello?"),
        ];
        let body = OpenAiCompatBackend::request_body(&ModelRequest {
            model: "m",
            instruction: String::new(),
            tools: vec![],
            history: &history,
        });
        let assistant = &body["messages"][2];
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["content"], "");
        assert!(assistant.get("tool_calls").is_none());
    }

    #[test]
    fn test_invalid_arguments_replayed_verbatim() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "lookup_property", "arguments": "{\"name_or_id\": Madrid"}
                    }]
                }
            }]
        });
        let reply = parse_reply(serde_json::from_value(raw).unwrap()).unwrap();
        assert_eq!(
            reply.tool_calls[0].arguments,
            Value::String("{\"name_or_id\": Madrid".to_string())
        );

        let history = vec![Turn::user("Madrid?"), Turn::Model(reply)];
        let body = OpenAiCompatBackend::request_body(&ModelRequest {
            model: "m",
            instruction: String::new(),
            tools: vec![],
            history: &history,
        });
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"name_or_id\": Madrid"
        );
        assert!(body["messages"][2]["content"].is_null());
    }

    #[test]
    fn test_request_body_omits_empty_tools() {
        let body = OpenAiCompatBackend::request_body(&ModelRequest {
            model: "m",
            instruction: String::new(),
            tools: vec![],
            history: &[],
        });
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_reply_with_tool_calls() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "lookup_property", "arguments": "{\"name_or_id\":\"Madrid\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        });
        let parsed: ChatResponse = serde_json::from_value(raw).unwrap();
        let reply = parse_reply(parsed).unwrap();
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].arguments["name_or_id"], "Madrid");
        assert!(reply.text.is_none());
    }

    #[test]
    fn test_parse_reply_without_choices_is_invalid() {
        let parsed: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            parse_reply(parsed),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
