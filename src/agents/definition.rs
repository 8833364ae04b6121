//! Agent 定义与覆盖记录
//!
//! AgentDefinition 在一次合并中构造完成后不再修改，以 Arc 共享；
//! OverrideRecord 是存储里的部分字段覆盖（或一个全新的 Agent）。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::llm::ToolSchema;
use crate::tools::{schema_of, Tool};

/// 一个可路由的 Agent
#[derive(Clone)]
pub struct AgentDefinition {
    pub name: String,
    /// 路由指令中使用的一行范围描述
    pub routing_hint: String,
    /// 指令模板，`{key}` 占位符由会话上下文替换
    pub instruction: String,
    pub model_ref: String,
    pub is_fallback: bool,
    /// 有序、无重复
    pub tools: Vec<Arc<dyn Tool>>,
}

impl fmt::Debug for AgentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("name", &self.name)
            .field("routing_hint", &self.routing_hint)
            .field("model_ref", &self.model_ref)
            .field("is_fallback", &self.is_fallback)
            .field("tools", &self.tool_names())
            .finish()
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static placeholder regex"))
}

/// 替换 `{key}`；上下文中没有的键保持原样
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &Captures| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

impl AgentDefinition {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| schema_of(t.as_ref())).collect()
    }

    pub fn render_instruction(&self, vars: &HashMap<String, String>) -> String {
        render_template(&self.instruction, vars)
    }
}

/// 存储中的一条覆盖记录；除 name 外的字段缺省表示沿用内置值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, rename = "model", alias = "model_ref", skip_serializing_if = "Option::is_none")]
    pub model_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fallback: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// 记录来源（local / blob / memory），由存储在写入时标注
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OverrideRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 另一条记录中已设置的字段覆盖到本记录上
    pub fn apply_patch(&mut self, patch: &OverrideRecord) {
        if patch.routing_hint.is_some() {
            self.routing_hint = patch.routing_hint.clone();
        }
        if patch.instruction.is_some() {
            self.instruction = patch.instruction.clone();
        }
        if patch.model_ref.is_some() {
            self.model_ref = patch.model_ref.clone();
        }
        if patch.is_fallback.is_some() {
            self.is_fallback = patch.is_fallback;
        }
        if patch.tools.is_some() {
            self.tools = patch.tools.clone();
        }
    }

    /// 比较两条记录中由操作员设置的字段（忽略 source / updated_at）
    pub fn same_fields(&self, other: &OverrideRecord) -> bool {
        self.name == other.name
            && self.routing_hint == other.routing_hint
            && self.instruction == other.instruction
            && self.model_ref == other.model_ref
            && self.is_fallback == other.is_fallback
            && self.tools == other.tools
    }
}
