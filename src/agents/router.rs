//! 路由 Agent 构建
//!
//! 每个专家一条路由规则（按发现顺序），最后一条兜底指向 fallback；
//! 路由的工具集恰好是到每个专家与 fallback 的转接工具。纯函数，每次重建都重新生成。

use std::sync::Arc;

use crate::agents::{AgentDefinition, ROUTER_NAME};
use crate::tools::{Tool, TransferTool};

/// 路由构建器
#[derive(Debug, Clone)]
pub struct RouterBuilder {
    model_ref: String,
}

impl RouterBuilder {
    pub fn new(model_ref: impl Into<String>) -> Self {
        Self {
            model_ref: model_ref.into(),
        }
    }

    pub fn build(
        &self,
        specialists: &[Arc<AgentDefinition>],
        fallback: &Arc<AgentDefinition>,
    ) -> AgentDefinition {
        let tools: Vec<Arc<dyn Tool>> = specialists
            .iter()
            .chain(std::iter::once(fallback))
            .map(|agent| {
                Arc::new(TransferTool::new(
                    &agent.name,
                    format!("Transfer the conversation to {}: {}", agent.name, hint_of(agent)),
                )) as Arc<dyn Tool>
            })
            .collect();

        AgentDefinition {
            name: ROUTER_NAME.to_string(),
            routing_hint: String::new(),
            instruction: routing_instruction(specialists, fallback),
            model_ref: self.model_ref.clone(),
            is_fallback: false,
            tools,
        }
    }
}

fn hint_of(agent: &AgentDefinition) -> &str {
    let hint = agent.routing_hint.trim();
    if hint.is_empty() {
        agent.name.as_str()
    } else {
        hint
    }
}

/// 路由指令全文（`{lang_name}` 留待会话上下文替换）
pub fn routing_instruction(specialists: &[Arc<AgentDefinition>], fallback: &AgentDefinition) -> String {
    let bullets: Vec<String> = specialists
        .iter()
        .map(|agent| format!("• {} → transfer to {}", hint_of(agent), agent.name))
        .collect();

    let mut out = String::from(
        "You are the virtual assistant of a long-stay apartment platform. Always respond in {lang_name}. \
         If the user writes in a different language, follow their language.\n\n\
         Your only job is to understand the user's intent and immediately delegate to the correct specialist. \
         Do NOT answer domain questions yourself. Always transfer:\n\n",
    );
    for bullet in &bullets {
        out.push_str(bullet);
        out.push('\n');
    }
    out.push_str(&format!(
        "• Any other question → transfer to {} (general help center)\n\n",
        fallback.name
    ));
    out.push_str(
        "Questions about the user's OWN booking, ticket or stay go to the matching specialist even without an ID; \
         the specialist will ask for what it needs.\n\
         If you truly cannot determine the topic, ask one short clarifying question in {lang_name}.",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::agent;

    #[test]
    fn test_router_rules_follow_discovery_order() {
        let specialists = vec![
            agent("Booking", "Reservations", false),
            agent("Support", "Incidents", false),
        ];
        let fallback = agent("HelpCenter", "FAQ", true);
        let router = RouterBuilder::new("m").build(&specialists, &fallback);

        assert_eq!(router.name, ROUTER_NAME);
        let booking = router.instruction.find("• Reservations → transfer to Booking").unwrap();
        let support = router.instruction.find("• Incidents → transfer to Support").unwrap();
        let other = router
            .instruction
            .find("• Any other question → transfer to HelpCenter (general help center)")
            .unwrap();
        assert!(booking < support && support < other);
        assert_eq!(
            router.tool_names(),
            vec!["transfer_to_booking", "transfer_to_support", "transfer_to_help_center"]
        );
    }

    #[test]
    fn test_blank_hint_uses_agent_name() {
        let specialists = vec![agent("NewHelper", "  ", false)];
        let fallback = agent("HelpCenter", "", true);
        let text = routing_instruction(&specialists, &fallback);
        assert!(text.contains("• NewHelper → transfer to NewHelper"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let specialists = vec![agent("Booking", "Reservations", false)];
        let fallback = agent("HelpCenter", "FAQ", true);
        let builder = RouterBuilder::new("m");
        assert_eq!(
            builder.build(&specialists, &fallback).instruction,
            builder.build(&specialists, &fallback).instruction
        );
    }
}
