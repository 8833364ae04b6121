//! 可路由的 Agent 树：路由 + 专家 + fallback
//!
//! 一次重建的产物，构造后只读。转接目标与会话的 active_agent 都必须在同一棵树中解析。

use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::{AgentDefinition, MergedAgents};

#[derive(Debug, Clone)]
pub struct AgentTree {
    router: Arc<AgentDefinition>,
    specialists: Vec<Arc<AgentDefinition>>,
    fallback: Arc<AgentDefinition>,
    by_name: HashMap<String, Arc<AgentDefinition>>,
}

impl AgentTree {
    pub fn new(router: AgentDefinition, merged: MergedAgents) -> Self {
        let router = Arc::new(router);
        let mut by_name = HashMap::with_capacity(merged.specialists.len() + 2);
        by_name.insert(router.name.clone(), router.clone());
        for agent in merged.iter() {
            by_name.insert(agent.name.clone(), agent.clone());
        }
        Self {
            router,
            specialists: merged.specialists,
            fallback: merged.fallback,
            by_name,
        }
    }

    pub fn router(&self) -> &Arc<AgentDefinition> {
        &self.router
    }

    pub fn specialists(&self) -> &[Arc<AgentDefinition>] {
        &self.specialists
    }

    pub fn fallback(&self) -> &Arc<AgentDefinition> {
        &self.fallback
    }

    /// 按名称查找（含路由）
    pub fn find(&self, name: &str) -> Option<Arc<AgentDefinition>> {
        self.by_name.get(name).cloned()
    }

    /// 路由之外的 Agent（专家在前，fallback 最后）
    pub fn agents(&self) -> impl Iterator<Item = &Arc<AgentDefinition>> {
        self.specialists.iter().chain(std::iter::once(&self.fallback))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
