//! 管理服务：Agent 覆盖记录的增删改查 + 显式重建
//!
//! 与传输无关，HTTP 层只做鉴权与序列化。每次变更先写存储再重建 Runner；
//! 重建失败返回 AdminError::Rebuild（变更已保存但未生效），与存储失败区分。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agents::{EffectiveAgent, OverrideRecord, ROUTER_NAME};
use crate::core::{AdminError, RunnerHandle};
use crate::tools::{checked_transfer_tool_name, transfer_tool_name, ToolInfo, MAX_TOOL_NAME_LEN};

/// 管理端展示的 Agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentView {
    pub name: String,
    pub routing_hint: String,
    pub instruction: String,
    /// 有效模型（未设置时为默认模型）
    pub model: String,
    pub is_fallback: bool,
    pub tools: Vec<String>,
    /// builtin / local / blob / memory / override
    pub source: String,
    pub has_builtin: bool,
    pub transfer_tool: String,
}

/// 新建 Agent 请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAgent {
    pub name: String,
    #[serde(default)]
    pub routing_hint: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub is_fallback: Option<bool>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
}

/// 字段级补丁；缺省字段保持不变
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatchAgent {
    #[serde(default)]
    pub routing_hint: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub is_fallback: Option<bool>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
}

impl PatchAgent {
    fn is_empty(&self) -> bool {
        self.routing_hint.is_none()
            && self.instruction.is_none()
            && self.model.is_none()
            && self.is_fallback.is_none()
            && self.tools.is_none()
    }

    fn into_record(self, name: &str) -> OverrideRecord {
        OverrideRecord {
            name: name.to_string(),
            routing_hint: self.routing_hint,
            instruction: self.instruction,
            model_ref: self.model,
            is_fallback: self.is_fallback,
            tools: self.tools,
            ..Default::default()
        }
    }
}

/// 重建结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildReport {
    pub generation: u64,
    pub agents: Vec<String>,
}

pub struct AdminService {
    runner: Arc<RunnerHandle>,
}

impl AdminService {
    pub fn new(runner: Arc<RunnerHandle>) -> Self {
        Self { runner }
    }

    /// 合并视图：内置（含有效字段）+ 仅存在于覆盖中的 Agent
    pub async fn list_agents(&self) -> Vec<AgentView> {
        let registry = self.runner.registry();
        let overrides = registry.store().load_all().await;
        registry
            .effective_agents(&overrides)
            .into_iter()
            .map(|e| self.view(e))
            .collect()
    }

    pub async fn get_agent(&self, name: &str) -> Result<AgentView, AdminError> {
        self.list_agents()
            .await
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| AdminError::NotFound(name.to_string()))
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.runner.registry().tools().list_available_tools()
    }

    pub async fn create_agent(&self, req: CreateAgent) -> Result<AgentView, AdminError> {
        let name = req.name.trim().to_string();
        validate_name(&name)?;
        self.validate_tools(req.tools.as_deref())?;

        let registry = self.runner.registry();
        if registry.is_builtin(&name) || registry.store().load_all().await.contains_key(&name) {
            return Err(AdminError::Conflict(name));
        }

        let record = OverrideRecord {
            name: name.clone(),
            routing_hint: req.routing_hint,
            instruction: req.instruction,
            model_ref: req.model,
            is_fallback: req.is_fallback,
            tools: req.tools,
            ..Default::default()
        };
        registry.store().save(record).await?;
        tracing::info!("Admin created agent '{}'", name);

        self.rebuild_after_change().await?;
        self.get_agent(&name).await
    }

    pub async fn update_agent(&self, name: &str, patch: PatchAgent) -> Result<AgentView, AdminError> {
        if patch.is_empty() {
            return Err(AdminError::Invalid("no fields to update".to_string()));
        }
        self.validate_tools(patch.tools.as_deref())?;

        let registry = self.runner.registry();
        let overrides = registry.store().load_all().await;
        let mut record = match overrides.get(name) {
            Some(existing) => existing.clone(),
            None if registry.is_builtin(name) => OverrideRecord::named(name),
            None => return Err(AdminError::NotFound(name.to_string())),
        };
        record.apply_patch(&patch.into_record(name));
        registry.store().save(record).await?;
        tracing::info!("Admin updated agent '{}'", name);

        self.rebuild_after_change().await?;
        self.get_agent(name).await
    }

    /// 删除覆盖：内置 Agent 恢复默认，仅覆盖的 Agent 被移除
    pub async fn delete_override(&self, name: &str) -> Result<(), AdminError> {
        let registry = self.runner.registry();
        if !registry.store().delete(name).await? {
            return Err(AdminError::NotFound(name.to_string()));
        }
        tracing::info!(
            "Admin deleted override '{}' ({})",
            name,
            if registry.is_builtin(name) { "reverted to built-in" } else { "agent removed" }
        );
        self.rebuild_after_change().await?;
        Ok(())
    }

    /// 显式重建
    pub async fn rebuild(&self) -> Result<RebuildReport, AdminError> {
        let runner = self.runner.rebuild().await.map_err(AdminError::Rebuild)?;
        Ok(RebuildReport {
            generation: runner.generation,
            agents: runner.tree.agents().map(|a| a.name.clone()).collect(),
        })
    }

    async fn rebuild_after_change(&self) -> Result<(), AdminError> {
        self.runner.rebuild().await.map_err(AdminError::Rebuild)?;
        Ok(())
    }

    fn validate_tools(&self, tools: Option<&[String]>) -> Result<(), AdminError> {
        let catalog = self.runner.registry().tools();
        let unknown: Vec<&str> = tools
            .unwrap_or_default()
            .iter()
            .filter(|t| !catalog.contains(t))
            .map(String::as_str)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(AdminError::Invalid(format!("unknown tool(s): {}", unknown.join(", "))))
        }
    }

    fn view(&self, e: EffectiveAgent) -> AgentView {
        let bp = e.blueprint;
        AgentView {
            transfer_tool: transfer_tool_name(&bp.name),
            model: bp
                .model_ref
                .unwrap_or_else(|| self.runner.registry().default_model().to_string()),
            name: bp.name,
            routing_hint: bp.routing_hint,
            instruction: bp.instruction,
            is_fallback: bp.is_fallback,
            tools: bp.tools,
            source: e.source,
            has_builtin: e.has_builtin,
        }
    }
}

fn validate_name(name: &str) -> Result<(), AdminError> {
    if name.is_empty() {
        return Err(AdminError::Invalid("agent name must not be empty".to_string()));
    }
    if name.eq_ignore_ascii_case(ROUTER_NAME) {
        return Err(AdminError::Invalid(format!("'{ROUTER_NAME}' is reserved for the router")));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' ') {
        return Err(AdminError::Invalid(format!(
            "invalid agent name '{name}': use ASCII letters, digits, spaces, '-' or '_'"
        )));
    }
    if checked_transfer_tool_name(name).is_none() {
        return Err(AdminError::Invalid(format!(
            "agent name '{name}' does not yield a usable transfer tool name (max {MAX_TOOL_NAME_LEN} chars)"
        )));
    }
    Ok(())
}
