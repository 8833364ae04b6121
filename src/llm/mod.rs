//! LLM 层：后端抽象、限流重试与实现（OpenAI 兼容 / Mock / Scripted）

pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use mock::{MockBackend, RecordedRequest, ScriptedBackend};
pub use openai::{OpenAiCompatBackend, TokenUsage};
pub use retry::{RetryConfig, RetryPolicy};
pub use traits::{ModelBackend, ModelReply, ModelRequest, ToolCall, ToolSchema, Turn};

use crate::config::AppConfig;

/// 按配置创建模型后端：provider = mock 或未配置 API Key 时退回 MockBackend
pub fn create_backend_from_config(cfg: &AppConfig) -> Arc<dyn ModelBackend> {
    if cfg.llm.provider.eq_ignore_ascii_case("mock") {
        tracing::info!("Using mock model backend");
        return Arc::new(MockBackend);
    }
    match cfg.llm.api_key() {
        Some(key) => {
            tracing::info!(
                "Using OpenAI-compatible backend (default model: {}, base_url: {})",
                cfg.llm.model,
                cfg.llm.base_url.as_deref().unwrap_or("default")
            );
            Arc::new(OpenAiCompatBackend::new(
                cfg.llm.base_url.as_deref(),
                &key,
                Duration::from_secs(cfg.llm.request_timeout_secs),
            ))
        }
        None => {
            tracing::warn!(
                "{} not set, falling back to mock backend (replies will echo input)",
                cfg.llm.api_key_env
            );
            Arc::new(MockBackend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_selected() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        assert_eq!(create_backend_from_config(&cfg).name(), "mock");
    }

    #[test]
    fn test_missing_key_falls_back_to_mock() {
        let mut cfg = AppConfig::default();
        cfg.llm.api_key_env = "CONCIERGE_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        assert_eq!(create_backend_from_config(&cfg).name(), "mock");
    }
}
