//! 组件构建器：统一的启动装配逻辑
//!
//! 终端与 Web 两个入口共用：按配置创建工具目录、覆盖存储、模型后端、注册表、Runner、
//! 编排引擎、审计落点，最后组装成 ChatService 与 AdminService。测试可替换任一部件。

use std::sync::Arc;

use crate::admin::AdminService;
use crate::agents::{AgentRegistry, RouterBuilder};
use crate::config::AppConfig;
use crate::core::{EngineConfig, OrchestrationEngine, RegistryError, RunnerHandle};
use crate::gateway::ChatService;
use crate::llm::{create_backend_from_config, ModelBackend};
use crate::observability::{AuditSink, JsonlAuditSink, TracingAuditSink};
use crate::store::{create_store_from_config, ConfigStore};
use crate::tools::ToolRegistry;

/// 装配完成的共享组件（所有会话共用）
pub struct AppComponents {
    pub config: AppConfig,
    pub runner: Arc<RunnerHandle>,
    pub chat: Arc<ChatService>,
    pub admin: Arc<AdminService>,
}

pub struct ConciergeBuilder {
    config: AppConfig,
    store: Option<Arc<dyn ConfigStore>>,
    backend: Option<Arc<dyn ModelBackend>>,
    audit: Option<Arc<dyn AuditSink>>,
    tools: Option<ToolRegistry>,
}

impl ConciergeBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            store: None,
            backend: None,
            audit: None,
            tools: None,
        }
    }

    /// 指定覆盖存储（默认按 [store] 配置创建）
    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 指定模型后端（默认按 [llm] 配置创建）
    pub fn with_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    /// 装配全部组件；初始 Agent 集合不合法时失败
    pub async fn build(self) -> Result<AppComponents, RegistryError> {
        let tools = self.tools.unwrap_or_else(ToolRegistry::with_builtin_tools);
        let store = self
            .store
            .unwrap_or_else(|| create_store_from_config(&self.config));
        let backend = self
            .backend
            .unwrap_or_else(|| create_backend_from_config(&self.config));
        let audit: Arc<dyn AuditSink> = match (self.audit, &self.config.server.audit_log) {
            (Some(a), _) => a,
            (None, Some(path)) => {
                tracing::info!("Conversation audit written to {}", path.display());
                Arc::new(JsonlAuditSink::spawn(path.clone()))
            }
            (None, None) => Arc::new(TracingAuditSink),
        };

        let registry = AgentRegistry::with_builtins(Arc::new(tools), store, &self.config.llm.model);
        let runner = Arc::new(
            RunnerHandle::new(
                registry,
                RouterBuilder::new(self.config.llm.model.clone()),
                backend,
            )
            .await?,
        );

        let engine = OrchestrationEngine::new(EngineConfig::from_app_config(&self.config));
        let chat = Arc::new(ChatService::new(
            runner.clone(),
            engine,
            audit,
            self.config.session_timeout(),
            self.config.app.default_lang.clone(),
        ));
        let admin = Arc::new(AdminService::new(runner.clone()));

        Ok(AppComponents {
            config: self.config,
            runner,
            chat,
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockBackend;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_build_with_injected_parts() {
        let components = ConciergeBuilder::new(AppConfig::default())
            .with_store(Arc::new(MemoryStore::new()))
            .with_backend(Arc::new(MockBackend))
            .build()
            .await
            .unwrap();
        let runner = components.runner.get().await;
        assert_eq!(runner.backend.name(), "mock");
        assert_eq!(runner.tree.fallback().name, "HelpCenter");
        assert_eq!(components.admin.list_tools().len(), 11);
    }
}
