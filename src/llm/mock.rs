//! Mock 后端（无需 API）
//!
//! - MockBackend：回显最后一条用户消息，便于本地跑通整条链路
//! - ScriptedBackend：按顺序回放预设回复，并记录每次收到的请求（测试用）

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::LlmError;
use crate::llm::{ModelBackend, ModelReply, ModelRequest, ToolCall, Turn};

/// 回显后端
#[derive(Debug, Default)]
pub struct MockBackend;

#[async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelReply, LlmError> {
        let last_user = request
            .history
            .iter()
            .rev()
            .find_map(|t| match t {
                Turn::User { content } => Some(content.as_str()),
                _ => None,
            })
            .unwrap_or("(no input)");
        Ok(ModelReply::text(format!("Echo from Mock: {last_user}")))
    }
}

/// 被记录下来的一次请求（拥有所有权的快照）
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub instruction: String,
    pub tool_names: Vec<String>,
    pub history_len: usize,
}

/// 脚本后端：依次弹出预设结果；脚本耗尽后返回 fallback 文本
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    /// 脚本耗尽后一直返回的回复
    exhausted: ModelReply,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<ModelReply, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            exhausted: ModelReply::text("(script exhausted)"),
        }
    }

    /// 每次都返回同一个回复（例如永不结束的工具调用）
    pub fn repeating(reply: ModelReply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            exhausted: reply,
        }
    }

    /// 便捷构造：一次工具调用
    pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ModelReply {
        ModelReply::tool_calls(vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
            raw_arguments: None,
        }])
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelReply, LlmError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(RecordedRequest {
                model: request.model.to_string(),
                instruction: request.instruction.clone(),
                tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
                history_len: request.history.len(),
            });
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(self.exhausted.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_last_user_turn() {
        let history = vec![Turn::user("first"), Turn::user("second")];
        let reply = MockBackend
            .invoke(ModelRequest {
                model: "m",
                instruction: String::new(),
                tools: vec![],
                history: &history,
            })
            .await
            .unwrap();
        assert_eq!(reply.final_text(), Some("Echo from Mock: second"));
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order_and_records() {
        let backend = ScriptedBackend::new(vec![
            Ok(ModelReply::text("one")),
            Err(LlmError::Transport("down".to_string())),
        ]);
        let history = vec![Turn::user("x")];
        let req = || ModelRequest {
            model: "m1",
            instruction: "do it".to_string(),
            tools: vec![],
            history: &history,
        };
        assert_eq!(backend.invoke(req()).await.unwrap().final_text(), Some("one"));
        assert!(backend.invoke(req()).await.is_err());
        assert_eq!(
            backend.invoke(req()).await.unwrap().final_text(),
            Some("(script exhausted)")
        );
        let recorded = backend.requests();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[0].model, "m1");
        assert_eq!(recorded[0].instruction, "do it");
    }
}
