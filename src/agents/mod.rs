//! Agent 层：定义、内置注册表、合并注册表、路由构建与 Agent 树

pub mod builtin;
pub mod definition;
pub mod registry;
pub mod router;
pub mod tree;

pub use builtin::{builtin_agents, AgentSpec, BUILTIN_AGENTS};
pub use definition::{render_template, AgentDefinition, OverrideRecord};
pub use registry::{AgentBlueprint, AgentRegistry, EffectiveAgent, MergedAgents};
pub use router::{routing_instruction, RouterBuilder};
pub use tree::AgentTree;

/// 路由 Agent 的名称（保留名）
pub const ROUTER_NAME: &str = "Triage";
