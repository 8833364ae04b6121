//! 错误类型：注册表配置错误、模型后端错误、存储错误、回合错误、管理操作错误
//!
//! 工具级错误（未找到 / 执行失败 / 超时）不在此列：它们在 ToolExecutor 内被吸收为
//! ToolResult 的文本，交给模型自行纠正或致歉。

use std::time::Duration;

use thiserror::Error;

/// 合并后的 Agent 集合不合法；重建失败，旧 Runner 继续服务
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("expected exactly one fallback agent, found {count}: {names:?}")]
    FallbackCount { count: usize, names: Vec<String> },

    #[error("duplicate agent name: {0}")]
    DuplicateName(String),

    #[error("agent name '{0}' is reserved for the router")]
    ReservedName(String),

    #[error("agent name must not be empty")]
    EmptyName,

    #[error("agent '{agent}' yields transfer tool '{tool}', which is not a valid function name")]
    InvalidToolName { agent: String, tool: String },

    #[error("transfer tool '{tool}' would be shared by agents '{first}' and '{second}'")]
    TransferToolCollision {
        tool: String,
        first: String,
        second: String,
    },
}

/// 模型后端错误；RateLimited 由 RetryPolicy 重试，其余立即上抛
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("rate limited (status {status:?}): {message}")]
    RateLimited { status: Option<u16>, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// 错误信息中保留的最大字符数（仅服务端日志可见）
const ERROR_BODY_CHARS: usize = 500;

impl LlmError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// 按 HTTP 状态码与响应体分类：429 或带配额/限流字样的响应视为限流
    pub fn from_status(status: u16, body: &str) -> Self {
        let message: String = body.chars().take(ERROR_BODY_CHARS).collect();
        if status == 429 || looks_rate_limited(body) {
            LlmError::RateLimited {
                status: Some(status),
                message,
            }
        } else {
            LlmError::Http { status, message }
        }
    }
}

/// 限流信号：配额耗尽 / resource exhausted / too many requests
pub(crate) fn looks_rate_limited(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("resource_exhausted")
        || lower.contains("resourceexhausted")
        || lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
}

/// 覆盖记录存储错误（仅 save / delete 会返回；load_all 从不失败）
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("remote store error: {0}")]
    Remote(String),
}

/// 回合级错误：只有取消与会话不存在会上抛，其余失败都降级为用户可读文本
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    #[error("turn cancelled after {rounds_completed} completed round(s)")]
    Cancelled { rounds_completed: usize },

    #[error("unknown session: {0}")]
    UnknownSession(String),
}

/// 管理操作错误：存储失败与重建失败必须可区分
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("agent '{0}' not found")]
    NotFound(String),

    #[error("agent '{0}' already exists")]
    Conflict(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("failed to persist agent config: {0}")]
    Store(#[from] StoreError),

    /// 变更已写入存储，但新的 Agent 集合未能投入使用
    #[error("change was saved but the runner rebuild failed: {0}")]
    Rebuild(#[source] RegistryError),
}
