//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! 工具返回 ToolOutcome：普通值、转接（Handoff）或携带会话上下文增量的值；
//! ToolExecutor 在调用时加超时并把失败吸收为给模型看的文本。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::llm::ToolSchema;

/// 工具执行结果（由工具返回，执行器据此生成 ToolResult）
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// 普通返回值，原样交给模型
    Value(String),
    /// 请求把会话转交给指定 Agent
    Handoff { agent: String, note: Option<String> },
    /// 返回值 + 写入会话上下文的键值
    Update {
        value: String,
        context: HashMap<String, String>,
    },
}

impl ToolOutcome {
    pub fn value(v: impl Into<String>) -> Self {
        ToolOutcome::Value(v.into())
    }

    /// 将可序列化结构转为 JSON 文本返回
    pub fn json(v: &impl Serialize) -> Self {
        ToolOutcome::Value(serde_json::to_string(v).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}")))
    }
}

/// 工具可见的调用上下文：会话 ID 与会话上下文快照
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: String,
    pub vars: HashMap<String, String>,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, vars: HashMap<String, String>) -> Self {
        Self {
            session_id: session_id.into(),
            vars,
        }
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型调用时使用的函数名）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 中的文本会作为错误值交给模型
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome, String>;
}

/// 生成提供给模型的工具描述
pub fn schema_of(tool: &dyn Tool) -> ToolSchema {
    ToolSchema {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }
}

/// 由参数结构体推导 JSON Schema（去掉 $schema / title 等模型端不需要的键）
pub fn params_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// 把模型给出的参数反序列化为结构体；失败时给出可读的错误
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, String> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| format!("invalid arguments for {tool}: {e}"))
}

/// 管理端展示的工具信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// 是否会被自动加入每个 Agent 的工具集
    pub always_included: bool,
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，支持 register / get / tool_names
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置工具目录：转接回路由 + 预订 / 房源 / 工单 / 帮助中心
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register(crate::tools::TransferTool::to_router());
        crate::tools::booking::register(&mut registry);
        crate::tools::property::register(&mut registry);
        crate::tools::incident::register(&mut registry, crate::tools::IncidentStore::seeded());
        crate::tools::help_center::register(&mut registry);
        registry
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!("Tool '{}' registered twice, keeping the latest", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 按名称排序
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 供管理端选择的工具列表
    pub fn list_available_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                always_included: tool.name() == crate::tools::ROUTER_TRANSFER_TOOL,
            })
            .collect()
    }
}
