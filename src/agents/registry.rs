//! Agent 注册表：内置定义 + 存储覆盖 → 合并后的可路由集合
//!
//! 合并规则：
//! - 内置 Agent 按字段应用覆盖（覆盖缺省的字段沿用内置值），保持内置顺序
//! - 没有对应内置的覆盖记录生成新的 Agent（按名称排序追加），未设置的字段取默认值
//! - 工具按名解析，未知工具名告警后丢弃；transfer_to_triage 总会被补上
//! - 校验：恰好一个 fallback、名称非空且唯一、不得占用路由名、转接工具名合法且不冲突

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::agents::{AgentDefinition, ROUTER_NAME};
use crate::core::RegistryError;
use crate::store::{ConfigStore, OverrideRecord};
use crate::tools::{
    checked_transfer_tool_name, transfer_tool_name, Tool, ToolRegistry, TransferTool,
    ROUTER_TRANSFER_TOOL,
};

/// 合并前的 Agent 描述：工具仍是名称
#[derive(Debug, Clone, PartialEq)]
pub struct AgentBlueprint {
    pub name: String,
    pub routing_hint: String,
    pub instruction: String,
    pub model_ref: Option<String>,
    pub is_fallback: bool,
    pub tools: Vec<String>,
}

impl AgentBlueprint {
    /// 仅由覆盖记录生成的 Agent 的默认值
    fn synthetic(record: &OverrideRecord) -> Self {
        let name = record.name.trim().to_string();
        Self {
            routing_hint: record.routing_hint.clone().unwrap_or_default(),
            instruction: record.instruction.clone().unwrap_or_else(|| {
                format!(
                    "You are {name}, an assistant for a long-stay apartment platform. \
                     Always respond in {{lang_name}}. For anything outside your scope, call \
                     {ROUTER_TRANSFER_TOOL} immediately."
                )
            }),
            model_ref: record.model_ref.clone(),
            is_fallback: record.is_fallback.unwrap_or(false),
            tools: record.tools.clone().unwrap_or_default(),
            name,
        }
    }

    fn apply(&mut self, record: &OverrideRecord) {
        if let Some(v) = &record.routing_hint {
            self.routing_hint = v.clone();
        }
        if let Some(v) = &record.instruction {
            self.instruction = v.clone();
        }
        if let Some(v) = &record.model_ref {
            self.model_ref = Some(v.clone());
        }
        if let Some(v) = record.is_fallback {
            self.is_fallback = v;
        }
        if let Some(v) = &record.tools {
            self.tools = v.clone();
        }
    }
}

/// 合并后的有效描述，附带来源信息（管理端展示用）
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveAgent {
    pub blueprint: AgentBlueprint,
    /// "builtin" 或覆盖记录的来源标记
    pub source: String,
    pub has_builtin: bool,
}

/// mergedAgents() 的结果：专家（发现顺序）+ 唯一的 fallback
#[derive(Debug, Clone)]
pub struct MergedAgents {
    pub specialists: Vec<Arc<AgentDefinition>>,
    pub fallback: Arc<AgentDefinition>,
}

impl MergedAgents {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<AgentDefinition>> {
        self.specialists.iter().chain(std::iter::once(&self.fallback))
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<AgentDefinition>> {
        self.iter().find(|a| a.name == name)
    }
}

/// Agent 注册表
pub struct AgentRegistry {
    builtins: Vec<AgentBlueprint>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ConfigStore>,
    default_model: String,
}

impl AgentRegistry {
    pub fn new(
        builtins: Vec<AgentBlueprint>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ConfigStore>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            builtins,
            tools,
            store,
            default_model: default_model.into(),
        }
    }

    /// 使用编译期内置的 Agent 列表
    pub fn with_builtins(
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ConfigStore>,
        default_model: impl Into<String>,
    ) -> Self {
        Self::new(super::builtin::builtin_agents(), tools, store, default_model)
    }

    pub fn builtins(&self) -> &[AgentBlueprint] {
        &self.builtins
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.iter().any(|b| b.name == name)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// 读取存储并合并；存储读取失败时只剩内置 Agent
    pub async fn merged_agents(&self) -> Result<MergedAgents, RegistryError> {
        let overrides = self.store.load_all().await;
        self.merge(&overrides)
    }

    /// 计算每个 Agent 的有效字段（不解析工具、不校验）
    pub fn effective_agents(&self, overrides: &BTreeMap<String, OverrideRecord>) -> Vec<EffectiveAgent> {
        let mut out = Vec::with_capacity(self.builtins.len() + overrides.len());
        for builtin in &self.builtins {
            let mut blueprint = builtin.clone();
            let source = match overrides.get(&builtin.name) {
                Some(record) => {
                    blueprint.apply(record);
                    record_source(record)
                }
                None => "builtin".to_string(),
            };
            out.push(EffectiveAgent {
                blueprint,
                source,
                has_builtin: true,
            });
        }
        for (key, record) in overrides {
            if self.is_builtin(key) {
                continue;
            }
            if record.name != *key {
                tracing::warn!(
                    "Override stored under '{}' carries name '{}', using the key",
                    key,
                    record.name
                );
            }
            let mut record = record.clone();
            record.name = key.clone();
            out.push(EffectiveAgent {
                blueprint: AgentBlueprint::synthetic(&record),
                source: record_source(&record),
                has_builtin: false,
            });
        }
        out
    }

    /// 纯函数式合并：给定覆盖记录，生成并校验合并后的 Agent 集合
    pub fn merge(&self, overrides: &BTreeMap<String, OverrideRecord>) -> Result<MergedAgents, RegistryError> {
        let blueprints: Vec<AgentBlueprint> = self
            .effective_agents(overrides)
            .into_iter()
            .map(|e| e.blueprint)
            .collect();
        validate(&blueprints)?;

        let mut specialists = Vec::new();
        let mut fallback = None;
        for bp in blueprints {
            let tools = self.resolve_tools(&bp.name, &bp.tools);
            let agent = Arc::new(AgentDefinition {
                model_ref: bp.model_ref.unwrap_or_else(|| self.default_model.clone()),
                name: bp.name,
                routing_hint: bp.routing_hint,
                instruction: bp.instruction,
                is_fallback: bp.is_fallback,
                tools,
            });
            if agent.is_fallback {
                fallback = Some(agent);
            } else {
                specialists.push(agent);
            }
        }
        // validate 已保证恰好一个 fallback
        let fallback = fallback.ok_or(RegistryError::FallbackCount {
            count: 0,
            names: Vec::new(),
        })?;

        tracing::debug!(
            "Merged {} specialist(s) + fallback '{}'",
            specialists.len(),
            fallback.name
        );
        Ok(MergedAgents {
            specialists,
            fallback,
        })
    }

    fn resolve_tools(&self, agent: &str, names: &[String]) -> Vec<Arc<dyn Tool>> {
        let mut seen = HashSet::new();
        let mut tools: Vec<Arc<dyn Tool>> = Vec::with_capacity(names.len() + 1);
        for name in names.iter().map(|n| n.trim()) {
            if name.is_empty() || !seen.insert(name) {
                continue;
            }
            match self.tools.get(name) {
                Some(tool) => tools.push(tool),
                None => tracing::warn!("Agent '{}' lists unknown tool '{}', dropping it", agent, name),
            }
        }
        if !tools.iter().any(|t| t.name() == ROUTER_TRANSFER_TOOL) {
            let router_tool = self
                .tools
                .get(ROUTER_TRANSFER_TOOL)
                .unwrap_or_else(|| Arc::new(TransferTool::to_router()));
            tools.push(router_tool);
        }
        tools
    }
}

fn record_source(record: &OverrideRecord) -> String {
    if record.source.trim().is_empty() {
        "override".to_string()
    } else {
        record.source.clone()
    }
}

fn validate(agents: &[AgentBlueprint]) -> Result<(), RegistryError> {
    let mut names = HashSet::new();
    // 转接工具名 → 占用它的 Agent；路由名预先占位
    let mut transfer_names: HashMap<String, &str> =
        HashMap::from([(transfer_tool_name(ROUTER_NAME), ROUTER_NAME)]);

    for agent in agents {
        if agent.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if agent.name.eq_ignore_ascii_case(ROUTER_NAME) {
            return Err(RegistryError::ReservedName(agent.name.clone()));
        }
        if !names.insert(agent.name.as_str()) {
            return Err(RegistryError::DuplicateName(agent.name.clone()));
        }
        let Some(tool) = checked_transfer_tool_name(&agent.name) else {
            return Err(RegistryError::InvalidToolName {
                agent: agent.name.clone(),
                tool: transfer_tool_name(&agent.name),
            });
        };
        if let Some(first) = transfer_names.get(&tool) {
            return Err(RegistryError::TransferToolCollision {
                tool,
                first: first.to_string(),
                second: agent.name.clone(),
            });
        }
        transfer_names.insert(tool, agent.name.as_str());
    }

    let fallbacks: Vec<String> = agents
        .iter()
        .filter(|a| a.is_fallback)
        .map(|a| a.name.clone())
        .collect();
    if fallbacks.len() != 1 {
        return Err(RegistryError::FallbackCount {
            count: fallbacks.len(),
            names: fallbacks,
        });
    }
    Ok(())
}
