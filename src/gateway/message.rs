//! 传输层消息协议
//!
//! 与具体传输（WebSocket / 终端）无关的 JSON 结构，`type` 字段区分事件。

use serde::{Deserialize, Serialize};

/// 服务端 → 客户端事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 会话已建立
    SessionInit { session_id: String, lang: String },
    /// 最终回复及其作者 Agent
    Message { content: String, agent: String },
    /// 某个 Agent 正在处理（每轮一次）
    Typing { agent: String },
    /// 终止性错误通知（区别于普通回复）
    Error { content: String },
}

impl ServerEvent {
    pub fn message(content: impl Into<String>, agent: impl Into<String>) -> Self {
        ServerEvent::Message {
            content: content.into(),
            agent: agent.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        ServerEvent::Error {
            content: content.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerEvent::Error { .. })
    }
}

/// 客户端 → 服务端消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_event_wire_format() {
        let json = serde_json::to_value(ServerEvent::message("Hola", "Booking")).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["agent"], "Booking");

        let json = serde_json::to_value(ServerEvent::SessionInit {
            session_id: "s".into(),
            lang: "es".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "session_init");
    }

    #[test]
    fn test_client_message_tolerates_missing_field() {
        let msg: ClientMessage = serde_json::from_str("{}").unwrap();
        assert!(msg.message.is_empty());
        let msg: ClientMessage = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(msg.message, "hi");
    }
}
