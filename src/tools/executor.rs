//! 工具执行器
//!
//! 按名称在当前 Agent 的工具集中查找工具，在超时内执行，并把结果规整为 ToolResult：
//! 找不到、返回 Err、超时、panic 都变成给模型看的错误文本，不会中断整个回合。
//! 转接请求在此解析为当前 AgentTree 中的目标；每次调用输出结构化审计日志（JSON）。

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::time::timeout;

use crate::agents::{AgentDefinition, AgentTree};
use crate::llm::ToolCall;
use crate::tools::{Tool, ToolContext, ToolOutcome};

/// 单次工具调用规整后的结果
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    /// 作为工具输出交给模型的文本
    pub value: String,
    /// 存在即表示需要切换 active_agent
    pub handoff_target: Option<Arc<AgentDefinition>>,
    pub context_delta: HashMap<String, String>,
}

/// 转接成功后写给模型的过渡文本
pub fn handoff_message(agent: &str) -> String {
    format!(
        "Transfer to {agent} complete. Continue the conversation naturally. \
         Do NOT greet or introduce yourself; answer the user's original request directly."
    )
}

/// 工具执行器：对每次调用施加超时
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 执行一次工具调用；从不失败，所有错误都体现在 value 中
    pub async fn execute(
        &self,
        call: &ToolCall,
        available: &[Arc<dyn Tool>],
        ctx: &ToolContext,
        tree: &AgentTree,
    ) -> ToolResult {
        let mut result = ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            value: String::new(),
            handoff_target: None,
            context_delta: HashMap::new(),
        };

        let Some(tool) = available.iter().find(|t| t.name() == call.name) else {
            tracing::warn!("Model requested unknown tool '{}'", call.name);
            audit(&call.name, false, "not_found", Duration::ZERO, &call.arguments);
            result.value = format!("Error: tool '{}' not found.", call.name);
            return result;
        };

        let start = Instant::now();
        let outcome = timeout(
            self.timeout,
            AssertUnwindSafe(tool.execute(call.arguments.clone(), ctx)).catch_unwind(),
        )
        .await;
        let elapsed = start.elapsed();

        let outcome = match outcome {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => {
                audit(&call.name, false, "error", elapsed, &call.arguments);
                tracing::warn!("Tool '{}' failed: {}", call.name, e);
                result.value = format!("Error executing {}: {}", call.name, e);
                return result;
            }
            Ok(Err(_panic)) => {
                audit(&call.name, false, "panic", elapsed, &call.arguments);
                tracing::error!("Tool '{}' panicked", call.name);
                result.value = format!("Error executing {}: internal tool failure", call.name);
                return result;
            }
            Err(_) => {
                audit(&call.name, false, "timeout", elapsed, &call.arguments);
                result.value = format!(
                    "Error executing {}: timed out after {}s",
                    call.name,
                    self.timeout.as_secs()
                );
                return result;
            }
        };

        match outcome {
            ToolOutcome::Value(value) => {
                audit(&call.name, true, "ok", elapsed, &call.arguments);
                result.value = value;
            }
            ToolOutcome::Update { value, context } => {
                audit(&call.name, true, "ok", elapsed, &call.arguments);
                result.value = value;
                result.context_delta = context;
            }
            ToolOutcome::Handoff { agent, note } => match tree.find(&agent) {
                Some(target) => {
                    audit(&call.name, true, "handoff", elapsed, &call.arguments);
                    result.value = match note {
                        Some(note) if !note.trim().is_empty() => {
                            format!("{} Note: {}", handoff_message(&target.name), note.trim())
                        }
                        _ => handoff_message(&target.name),
                    };
                    result.handoff_target = Some(target);
                }
                None => {
                    audit(&call.name, false, "unknown_agent", elapsed, &call.arguments);
                    tracing::warn!(
                        "Tool '{}' requested handoff to unknown agent '{}'",
                        call.name,
                        agent
                    );
                    result.value = format!("Error: agent '{agent}' is not available.");
                }
            },
        }
        result
    }
}

fn audit(tool: &str, ok: bool, outcome: &str, elapsed: Duration, args: &serde_json::Value) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": elapsed.as_millis() as u64,
        "args_preview": args_preview(args),
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
