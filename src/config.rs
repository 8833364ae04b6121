//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CONCIERGE__*` 覆盖
//! （双下划线表示嵌套，如 `CONCIERGE__LLM__MODEL=gpt-4o-mini`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub engine: EngineSection,
    pub tools: ToolsSection,
    pub store: StoreSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、默认语言
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// 客户端未指定或指定了不支持的语言时使用
    #[serde(default = "default_lang")]
    pub default_lang: String,
}

fn default_app_name() -> String {
    "concierge".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            default_lang: default_lang(),
        }
    }
}

/// [llm] 段：后端选择与单次请求超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai（任意 OpenAI 兼容端点）/ mock
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Agent 未指定 model_ref 时使用的模型
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 存放 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// 单次尝试的超时（秒），与重试预算无关
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl LlmSection {
    /// 从 api_key_env 指定的环境变量读取 Key；为空视为未配置
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

/// [engine] 段：回合预算与限流重试
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// 单个回合内最多的模型调用轮数
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 首次重试前的等待（毫秒），之后每次翻倍
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_max_rounds() -> usize {
    6
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    10_000
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// [store] 段：Agent 覆盖记录的存放位置
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// local（本地 JSON 文件）/ blob（HTTP 对象存储）/ memory
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// blob 后端的对象 URL（GET 读取、PUT 写入）
    pub object_url: Option<String>,
    /// 存放 blob Bearer Token 的环境变量名
    pub token_env: Option<String>,
}

fn default_store_backend() -> String {
    "local".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("config/agent_configs.json")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
            object_url: None,
            token_env: None,
        }
    }
}

/// [server] 段：监听地址、管理接口密钥、会话过期、审计日志
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// 为空时管理接口不鉴权（仅限开发环境）
    #[serde(default)]
    pub admin_api_key: String,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// 设置后以 JSON Lines 追加写入会话审计事件
    pub audit_log: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_session_timeout_secs() -> u64 {
    3600
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            admin_api_key: String::new(),
            session_timeout_secs: default_session_timeout_secs(),
            audit_log: None,
        }
    }
}

impl AppConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.engine.max_retries,
            base_delay: Duration::from_millis(self.engine.retry_base_delay_ms),
            attempt_timeout: Duration::from_secs(self.llm.request_timeout_secs),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.tool_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.server.session_timeout_secs)
    }
}

/// 从 config 目录加载配置，环境变量 CONCIERGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CONCIERGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CONCIERGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.max_rounds, 6);
        assert_eq!(cfg.engine.max_retries, 2);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.llm.request_timeout_secs, 60);
        assert_eq!(cfg.app.default_lang, "en");
        assert_eq!(cfg.store.backend, "local");
        let retry = cfg.retry_config();
        assert_eq!(retry.base_delay, Duration::from_secs(10));
        assert_eq!(retry.attempt_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_explicit_file_overrides_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[engine]\nmax_rounds = 3\n\n[store]\nbackend = \"memory\"\n\n[server]\nadmin_api_key = \"k\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.engine.max_rounds, 3);
        // 未写出的键保持默认
        assert_eq!(cfg.engine.max_retries, 2);
        assert_eq!(cfg.store.backend, "memory");
        assert_eq!(cfg.server.admin_api_key, "k");
    }
}
