//! 集成测试共用的装配函数

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use concierge::agents::{AgentBlueprint, AgentRegistry, RouterBuilder};
use concierge::core::{EngineConfig, OrchestrationEngine, RunnerHandle, Session};
use concierge::llm::{ModelBackend, RetryConfig};
use concierge::store::ConfigStore;
use concierge::tools::ToolRegistry;

pub fn blueprint(name: &str, is_fallback: bool, tools: &[&str]) -> AgentBlueprint {
    AgentBlueprint {
        name: name.to_string(),
        routing_hint: format!("{name} questions"),
        instruction: format!("You are the {name} agent. Respond in {{lang_name}}."),
        model_ref: None,
        is_fallback,
        tools: tools.iter().map(|t| t.to_string()).collect(),
    }
}

/// 内置 Billing（专家）+ General（fallback）
pub fn billing_registry(store: Arc<dyn ConfigStore>) -> AgentRegistry {
    AgentRegistry::new(
        vec![
            blueprint("Billing", false, &["lookup_reservation"]),
            blueprint("General", true, &["query_help_center"]),
        ],
        Arc::new(ToolRegistry::with_builtin_tools()),
        store,
        "default-model",
    )
}

pub async fn runner_handle(registry: AgentRegistry, backend: Arc<dyn ModelBackend>) -> RunnerHandle {
    RunnerHandle::new(registry, RouterBuilder::new("router-model"), backend)
        .await
        .expect("initial agent set is valid")
}

pub fn engine(max_rounds: usize, max_retries: u32, base_delay: Duration) -> OrchestrationEngine {
    OrchestrationEngine::new(EngineConfig {
        max_rounds,
        retry: RetryConfig {
            max_retries,
            base_delay,
            attempt_timeout: Duration::from_secs(30),
        },
        tool_timeout: Duration::from_secs(5),
    })
}

pub async fn new_session(handle: &RunnerHandle) -> Session {
    let runner = handle.get().await;
    Session::new(
        runner.tree.router().clone(),
        HashMap::from([
            ("lang".to_string(), "en".to_string()),
            ("lang_name".to_string(), "English".to_string()),
        ]),
    )
}
