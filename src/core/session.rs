//! 会话状态：当前 Agent、有序历史、共享上下文

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::agents::AgentDefinition;
use crate::llm::Turn;

/// 一次逻辑对话
///
/// `history` 在会话存续期间只增不减（仅当回合在第一轮结束前被取消时回退该回合的写入）。
/// `context` 为会话级键值（如 `lang` / `lang_name`），所有 Agent 共享并用于指令占位符。
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: Option<String>,
    pub active_agent: Arc<AgentDefinition>,
    pub history: Vec<Turn>,
    pub context: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// 以生成的稳定 ID 创建会话，从 `start` Agent（通常是路由）开始
    pub fn new(start: Arc<AgentDefinition>, context: HashMap<String, String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), start, context)
    }

    pub fn with_id(
        id: impl Into<String>,
        start: Arc<AgentDefinition>,
        context: HashMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            active_agent: start,
            history: Vec::new(),
            context,
            created_at: Utc::now(),
        }
    }

    pub fn lang(&self) -> &str {
        self.context.get("lang").map(String::as_str).unwrap_or("en")
    }

    pub fn active_agent_name(&self) -> &str {
        &self.active_agent.name
    }
}
