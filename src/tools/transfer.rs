//! 转接工具：transfer_to_<agent>
//!
//! 路由为每个专家生成一个；transfer_to_triage 则被自动加入每个专家的工具集，保证总能回到路由。

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::ROUTER_NAME;
use crate::tools::{Tool, ToolContext, ToolOutcome};

/// 转回路由的工具名
pub const ROUTER_TRANSFER_TOOL: &str = "transfer_to_triage";

/// Agent 名 → 转接工具名：`transfer_to_<snake_case(name)>`
pub fn transfer_tool_name(agent: &str) -> String {
    format!("transfer_to_{}", snake_case(agent))
}

/// 模型端函数名的长度上限
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// 函数名须匹配 `^[a-zA-Z0-9_-]{1,64}$`
pub fn is_valid_tool_name(name: &str) -> bool {
    (1..=MAX_TOOL_NAME_LEN).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// 仅当生成的转接工具名可被模型端接受时返回
pub fn checked_transfer_tool_name(agent: &str) -> Option<String> {
    let tool = transfer_tool_name(agent);
    (!snake_case(agent).is_empty() && is_valid_tool_name(&tool)).then_some(tool)
}

/// "HelpCenter" → "help_center"，"Long Stay" → "long_stay"
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && prev_lower && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

/// 转接到指定 Agent；执行结果为 Handoff，由执行器解析目标
pub struct TransferTool {
    name: String,
    target: String,
    description: String,
}

impl TransferTool {
    pub fn new(target: &str, description: impl Into<String>) -> Self {
        Self {
            name: transfer_tool_name(target),
            target: target.to_string(),
            description: description.into(),
        }
    }

    /// 专家用于退回路由的工具
    pub fn to_router() -> Self {
        Self {
            name: ROUTER_TRANSFER_TOOL.to_string(),
            target: ROUTER_NAME.to_string(),
            description: "Return the conversation to the main assistant when the question is outside your scope.".to_string(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Tool for TransferTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutcome, String> {
        Ok(ToolOutcome::Handoff {
            agent: self.target.clone(),
            note: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("Booking"), "booking");
        assert_eq!(snake_case("HelpCenter"), "help_center");
        assert_eq!(snake_case("NewHelper"), "new_helper");
        assert_eq!(snake_case("Long Stay"), "long_stay");
        assert_eq!(snake_case("VIP-desk 2"), "vip_desk_2");
        assert_eq!(snake_case("Triage"), "triage");
    }

    #[test]
    fn test_checked_transfer_tool_name() {
        assert_eq!(
            checked_transfer_tool_name("Long Stay").as_deref(),
            Some("transfer_to_long_stay")
        );
        assert_eq!(checked_transfer_tool_name("Café Concierge"), None);
        assert_eq!(checked_transfer_tool_name("--"), None);
        assert_eq!(checked_transfer_tool_name(&"a".repeat(53)), None);
        assert!(checked_transfer_tool_name(&"a".repeat(52)).is_some());
    }

    #[test]
    fn test_router_tool_name_matches_generated_name() {
        assert_eq!(transfer_tool_name(ROUTER_NAME), ROUTER_TRANSFER_TOOL);
    }

    #[tokio::test]
    async fn test_transfer_returns_handoff() {
        let tool = TransferTool::new("Booking", "Reservations");
        assert_eq!(tool.name(), "transfer_to_booking");
        let outcome = tool
            .execute(Value::Null, &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ToolOutcome::Handoff {
                agent: "Booking".to_string(),
                note: None
            }
        );
    }
}
