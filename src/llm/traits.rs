//! 模型后端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / Scripted）实现 ModelBackend：给定系统指令、工具 Schema 与完整历史，
//! 返回一次回复（文本或工具调用请求）。重试由 RetryPolicy 在外层负责，后端自身须可安全重放。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::LlmError;

/// 提供给模型的工具描述
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema（object）
    pub parameters: Value,
}

/// 模型请求的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// 后端分配的调用 ID，工具结果需原样回传
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    /// 后端返回的原始参数文本，回放历史时逐字发回
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_arguments: Option<String>,
}

/// 模型的一次原始回复
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// 去掉首尾空白后的文本；空文本视为无
    pub fn final_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// 会话历史中的一条记录（按角色区分）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// 用户输入
    User { content: String },
    /// 模型原始回复，逐字保留以便多轮工具协议正确
    Model(ModelReply),
    /// 单次工具调用的结果
    ToolResult {
        call_id: String,
        name: String,
        content: String,
    },
    /// 引擎写入的系统提示（如转接后的续答提示）
    System { content: String },
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn::User {
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Turn::System {
            content: content.into(),
        }
    }
}

/// 单轮模型调用的请求
#[derive(Clone, Debug)]
pub struct ModelRequest<'a> {
    pub model: &'a str,
    /// 已完成占位符替换的系统指令
    pub instruction: String,
    pub tools: Vec<ToolSchema>,
    pub history: &'a [Turn],
}

/// 模型后端 trait
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// 后端名称（日志用）
    fn name(&self) -> &str;

    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelReply, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_text_ignores_blank() {
        assert_eq!(ModelReply::text("  hi \n").final_text(), Some("hi"));
        assert_eq!(ModelReply::text("   ").final_text(), None);
        assert_eq!(ModelReply::default().final_text(), None);
    }

    #[test]
    fn test_turn_serializes_with_role_tag() {
        let json = serde_json::to_value(Turn::user("hola")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hola");
    }
}
