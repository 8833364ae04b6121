//! 编排引擎：单个回合的调度循环
//!
//! 状态机 awaiting_model → executing_tools → (awaiting_model | done)，最多 max_rounds 轮：
//! 1. 以会话上下文渲染当前 Agent 的指令
//! 2. 经 RetryPolicy 调用模型（指令 + 工具 Schema + 完整历史）
//! 3. 原样追加模型回复到历史
//! 4. 无工具调用 → 取文本作为最终回复
//! 5. 否则逐个执行工具：合并上下文增量、追加工具结果；若有转接则切换 active_agent 并追加续答提示
//!
//! 超出轮数、限流耗尽、后端错误都降级为面向用户的文本，不向调用方抛错；
//! 只有取消会以 TurnError::Cancelled 返回。

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{Runner, Session, TurnError};
use crate::gateway::messages;
use crate::llm::{ModelRequest, RetryConfig, RetryPolicy, Turn};
use crate::tools::{ToolContext, ToolExecutor};

/// 引擎参数
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_rounds: usize,
    pub retry: RetryConfig,
    pub tool_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: 6,
            retry: RetryConfig::default(),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            max_rounds: cfg.engine.max_rounds.max(1),
            retry: cfg.retry_config(),
            tool_timeout: cfg.tool_timeout(),
        }
    }
}

/// 回合结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// 模型给出了最终文本
    Answered,
    /// 模型结束了回合但没有文本
    Empty,
    RoundBudgetExceeded,
    RateLimited,
    BackendError,
}

impl TurnOutcome {
    /// 是否应以错误通知（而非普通回复）呈现给用户
    pub fn is_error(&self) -> bool {
        matches!(self, TurnOutcome::RateLimited | TurnOutcome::BackendError)
    }
}

/// 回合结果
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub text: String,
    /// 产出回复时的 active_agent
    pub agent: String,
    pub outcome: TurnOutcome,
    pub rounds: usize,
}

/// 回合进行中的事件（供传输层显示“正在输入”等）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    RoundStarted { round: usize, agent: String },
    Handoff { from: String, to: String },
}

/// 写入历史的转接续答提示
pub fn continuation_note(agent: &str) -> String {
    format!(
        "The conversation has been transferred to {agent}. Continue answering the user's original request \
         above. Do not greet the user again or introduce yourself."
    )
}

/// 编排引擎（无会话状态，可在所有会话间共享）
#[derive(Debug, Clone)]
pub struct OrchestrationEngine {
    max_rounds: usize,
    retry: RetryPolicy,
    executor: ToolExecutor,
}

impl OrchestrationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            max_rounds: config.max_rounds.max(1),
            retry: RetryPolicy::new(config.retry),
            executor: ToolExecutor::new(config.tool_timeout),
        }
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// 处理一条用户输入；runner 为回合开始时取得的快照，整回合使用
    pub async fn run_turn(
        &self,
        runner: &Runner,
        session: &mut Session,
        input: &str,
        cancel: &CancellationToken,
        events: Option<&mpsc::UnboundedSender<EngineEvent>>,
    ) -> Result<TurnReply, TurnError> {
        let tree = runner.tree.as_ref();

        // 在本次快照中按名称重新解析当前 Agent；已被删除则回到路由
        session.active_agent = match tree.find(&session.active_agent.name) {
            Some(agent) => agent,
            None => {
                tracing::warn!(
                    session = %session.id,
                    "Active agent '{}' no longer exists, returning to router",
                    session.active_agent.name
                );
                tree.router().clone()
            }
        };

        let turn_start = session.history.len();
        session.history.push(Turn::user(input));
        let lang = session.lang().to_string();

        for round in 1..=self.max_rounds {
            if cancel.is_cancelled() {
                return Err(cancel_turn(session, turn_start, round - 1));
            }

            let agent = session.active_agent.clone();
            tracing::info!(session = %session.id, round, agent = %agent.name, model = %agent.model_ref, "Model round");
            emit(
                events,
                EngineEvent::RoundStarted {
                    round,
                    agent: agent.name.clone(),
                },
            );

            // awaiting_model
            let instruction = agent.render_instruction(&session.context);
            let tools = agent.tool_schemas();
            let result = {
                let backend = &runner.backend;
                let history: &[Turn] = &session.history;
                let model = agent.model_ref.as_str();
                let call = self.retry.call(|| {
                    backend.invoke(ModelRequest {
                        model,
                        instruction: instruction.clone(),
                        tools: tools.clone(),
                        history,
                    })
                });
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    r = call => Some(r),
                }
            };
            let Some(result) = result else {
                return Err(cancel_turn(session, turn_start, round - 1));
            };

            let reply = match result {
                Ok(reply) => reply,
                Err(e) if e.is_rate_limited() => {
                    tracing::error!(session = %session.id, agent = %agent.name, "Rate limit retries exhausted: {}", e);
                    return Ok(TurnReply {
                        text: messages::rate_limited(&lang).to_string(),
                        agent: agent.name.clone(),
                        outcome: TurnOutcome::RateLimited,
                        rounds: round,
                    });
                }
                Err(e) => {
                    tracing::error!(session = %session.id, agent = %agent.name, "Model backend error: {}", e);
                    return Ok(TurnReply {
                        text: messages::backend_error(&lang).to_string(),
                        agent: agent.name.clone(),
                        outcome: TurnOutcome::BackendError,
                        rounds: round,
                    });
                }
            };

            session.history.push(Turn::Model(reply.clone()));

            if !reply.has_tool_calls() {
                // done
                let (text, outcome) = match reply.final_text() {
                    Some(text) => (text.to_string(), TurnOutcome::Answered),
                    None => (messages::no_response(&lang).to_string(), TurnOutcome::Empty),
                };
                return Ok(TurnReply {
                    text,
                    agent: agent.name.clone(),
                    outcome,
                    rounds: round,
                });
            }

            // executing_tools
            let mut handoff = None;
            for call in &reply.tool_calls {
                let ctx = ToolContext::new(session.id.clone(), session.context.clone());
                let result = self.executor.execute(call, &agent.tools, &ctx, tree).await;
                session.context.extend(result.context_delta);
                session.history.push(Turn::ToolResult {
                    call_id: result.call_id,
                    name: result.name,
                    content: result.value,
                });
                if let Some(target) = result.handoff_target {
                    if let Some(previous) = handoff.replace(target) {
                        tracing::warn!(
                            "Multiple handoffs in one round, '{}' superseded",
                            previous.name
                        );
                    }
                }
            }

            if let Some(target) = handoff {
                tracing::info!(session = %session.id, "Handoff {} -> {}", agent.name, target.name);
                emit(
                    events,
                    EngineEvent::Handoff {
                        from: agent.name.clone(),
                        to: target.name.clone(),
                    },
                );
                session
                    .history
                    .push(Turn::system(continuation_note(&target.name)));
                session.active_agent = target;
            }
        }

        tracing::warn!(
            session = %session.id,
            agent = %session.active_agent.name,
            "Round budget of {} exhausted without a final answer",
            self.max_rounds
        );
        Ok(TurnReply {
            text: messages::round_budget(&lang).to_string(),
            agent: session.active_agent.name.clone(),
            outcome: TurnOutcome::RoundBudgetExceeded,
            rounds: self.max_rounds,
        })
    }
}

fn emit(events: Option<&mpsc::UnboundedSender<EngineEvent>>, event: EngineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// 取消：尚未完成任何一轮时撤销本回合对历史的写入
fn cancel_turn(session: &mut Session, turn_start: usize, rounds_completed: usize) -> TurnError {
    if rounds_completed == 0 {
        session.history.truncate(turn_start);
    }
    tracing::info!(
        session = %session.id,
        rounds_completed,
        "Turn cancelled"
    );
    TurnError::Cancelled { rounds_completed }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::agents::{AgentRegistry, RouterBuilder};
    use crate::core::{LlmError, RunnerHandle};
    use crate::llm::{ModelBackend, ModelReply, ScriptedBackend, ToolCall};
    use crate::store::MemoryStore;
    use crate::tools::ToolRegistry;

    fn fast_config() -> EngineConfig {
        EngineConfig {
            max_rounds: 4,
            retry: RetryConfig {
                max_retries: 2,
                base_delay: Duration::from_millis(10),
                attempt_timeout: Duration::from_secs(5),
            },
            tool_timeout: Duration::from_secs(5),
        }
    }

    async fn runner_with(backend: Arc<dyn ModelBackend>) -> Arc<Runner> {
        let registry = AgentRegistry::with_builtins(
            Arc::new(ToolRegistry::with_builtin_tools()),
            Arc::new(MemoryStore::new()),
            "test-model",
        );
        RunnerHandle::new(registry, RouterBuilder::new("router-model"), backend)
            .await
            .unwrap()
            .get()
            .await
    }

    fn session_for(runner: &Runner) -> Session {
        Session::with_id(
            "s1",
            runner.tree.router().clone(),
            HashMap::from([
                ("lang".to_string(), "en".to_string()),
                ("lang_name".to_string(), "English".to_string()),
            ]),
        )
    }

    #[tokio::test]
    async fn test_plain_answer_from_router() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(ModelReply::text("Hi there"))]));
        let runner = runner_with(backend.clone()).await;
        let mut session = session_for(&runner);
        let engine = OrchestrationEngine::new(fast_config());

        let reply = engine
            .run_turn(&runner, &mut session, "hello", &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(reply.text, "Hi there");
        assert_eq!(reply.agent, "Triage");
        assert_eq!(reply.outcome, TurnOutcome::Answered);
        assert_eq!(session.history.len(), 2);

        let req = &backend.requests()[0];
        assert_eq!(req.model, "router-model");
        assert!(req.instruction.contains("Always respond in English"));
        assert!(req.tool_names.contains(&"transfer_to_booking".to_string()));
    }

    #[tokio::test]
    async fn test_handoff_switches_agent_and_instruction() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ScriptedBackend::call("c1", "transfer_to_booking", json!({}))),
            Ok(ModelReply::text("Your booking is confirmed.")),
        ]));
        let runner = runner_with(backend.clone()).await;
        let mut session = session_for(&runner);
        let engine = OrchestrationEngine::new(fast_config());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let reply = engine
            .run_turn(&runner, &mut session, "my booking?", &CancellationToken::new(), Some(&tx))
            .await
            .unwrap();

        assert_eq!(session.active_agent.name, "Booking");
        assert_eq!(reply.agent, "Booking");
        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].instruction.starts_with("You are the reservations specialist"));
        assert!(requests[1].tool_names.contains(&"lookup_reservation".to_string()));

        // user, model(call), tool result, system note, model(text)
        assert!(matches!(session.history[2], Turn::ToolResult { .. }));
        assert!(matches!(&session.history[3], Turn::System { content } if content.contains("Booking")));
        assert_eq!(session.history.len(), 5);

        let mut seen = Vec::new();
        while let Ok(e) = rx.try_recv() {
            seen.push(e);
        }
        assert_eq!(
            seen,
            vec![
                EngineEvent::RoundStarted { round: 1, agent: "Triage".to_string() },
                EngineEvent::Handoff { from: "Triage".to_string(), to: "Booking".to_string() },
                EngineEvent::RoundStarted { round: 2, agent: "Booking".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn test_round_budget_terminates() {
        let backend = Arc::new(ScriptedBackend::repeating(ScriptedBackend::call(
            "c",
            "query_help_center",
            json!({"question": "payment"}),
        )));
        let runner = runner_with(backend.clone()).await;
        let mut session = session_for(&runner);
        session.active_agent = runner.tree.fallback().clone();
        let engine = OrchestrationEngine::new(fast_config());

        let reply = engine
            .run_turn(&runner, &mut session, "loop", &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(reply.outcome, TurnOutcome::RoundBudgetExceeded);
        assert_eq!(reply.text, messages::round_budget("en"));
        assert_eq!(backend.request_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_gives_distinct_message() {
        let limited = || {
            Err(LlmError::RateLimited {
                status: Some(429),
                message: "quota".to_string(),
            })
        };
        let backend = Arc::new(ScriptedBackend::new(vec![limited(), limited(), limited(), limited()]));
        let runner = runner_with(backend.clone()).await;
        let mut session = session_for(&runner);
        let engine = OrchestrationEngine::new(fast_config());

        let reply = engine
            .run_turn(&runner, &mut session, "hi", &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(reply.outcome, TurnOutcome::RateLimited);
        assert_eq!(reply.text, messages::rate_limited("en"));
        // 1 次首调 + 2 次重试
        assert_eq!(backend.request_count(), 3);
    }

    #[tokio::test]
    async fn test_backend_error_is_sanitized_and_session_stays_usable() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(LlmError::Http {
                status: 500,
                message: "stack trace: secret internals".to_string(),
            }),
            Ok(ModelReply::text("recovered")),
        ]));
        let runner = runner_with(backend).await;
        let mut session = session_for(&runner);
        let engine = OrchestrationEngine::new(fast_config());

        let reply = engine
            .run_turn(&runner, &mut session, "hi", &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(reply.outcome, TurnOutcome::BackendError);
        assert!(!reply.text.contains("secret"));

        let reply = engine
            .run_turn(&runner, &mut session, "again", &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(reply.text, "recovered");
    }

    #[tokio::test]
    async fn test_cancel_before_first_round_discards_turn() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(ModelReply::text("never"))]));
        let runner = runner_with(backend.clone()).await;
        let mut session = session_for(&runner);
        let engine = OrchestrationEngine::new(fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .run_turn(&runner, &mut session, "hi", &cancel, None)
            .await
            .unwrap_err();
        assert_eq!(err, TurnError::Cancelled { rounds_completed: 0 });
        assert!(session.history.is_empty());
        assert_eq!(backend.request_count(), 0);
    }

    /// 第一轮请求一次帮助中心查询，第二轮一直挂起
    #[derive(Default)]
    struct StallsInSecondRound {
        second_round: Notify,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ModelBackend for StallsInSecondRound {
        fn name(&self) -> &str {
            "stalls"
        }

        async fn invoke(&self, _request: ModelRequest<'_>) -> Result<ModelReply, LlmError> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Ok(ScriptedBackend::call("c1", "query_help_center", json!({"question": "deposit"})));
            }
            self.second_round.notify_one();
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_turn_keeps_completed_rounds() {
        let backend = Arc::new(StallsInSecondRound::default());
        let runner = runner_with(backend.clone()).await;
        let mut session = session_for(&runner);
        session.active_agent = runner.tree.fallback().clone();
        let engine = OrchestrationEngine::new(fast_config());
        let cancel = CancellationToken::new();

        let (result, ()) = tokio::join!(
            engine.run_turn(&runner, &mut session, "deposit?", &cancel, None),
            async {
                backend.second_round.notified().await;
                cancel.cancel();
            }
        );

        assert_eq!(result.unwrap_err(), TurnError::Cancelled { rounds_completed: 1 });
        assert_eq!(session.history.len(), 3);
        assert_eq!(session.history[0], Turn::user("deposit?"));
        assert!(matches!(
            &session.history[1],
            Turn::Model(reply) if matches!(reply.tool_calls.as_slice(), [ToolCall { name, .. }] if name == "query_help_center")
        ));
        assert!(matches!(
            &session.history[2],
            Turn::ToolResult { call_id, content, .. } if call_id == "c1" && content.contains("deposit")
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_abort_turn() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ScriptedBackend::call("c1", "delete_everything", json!({}))),
            Ok(ModelReply::text("Sorry, I can't do that.")),
        ]));
        let runner = runner_with(backend).await;
        let mut session = session_for(&runner);
        let engine = OrchestrationEngine::new(fast_config());

        let reply = engine
            .run_turn(&runner, &mut session, "hi", &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(reply.outcome, TurnOutcome::Answered);
        assert!(matches!(
            &session.history[2],
            Turn::ToolResult { content, .. } if content == "Error: tool 'delete_everything' not found."
        ));
    }

    #[tokio::test]
    async fn test_context_delta_merged_into_session() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ScriptedBackend::call(
                "c1",
                "lookup_reservation",
                json!({"booking_id": "LS-2024-002"}),
            )),
            Ok(ModelReply::text("Found it.")),
        ]));
        let runner = runner_with(backend).await;
        let mut session = session_for(&runner);
        session.active_agent = runner.tree.find("Booking").unwrap();
        let engine = OrchestrationEngine::new(fast_config());

        engine
            .run_turn(&runner, &mut session, "LS-2024-002", &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(session.context.get("booking_id").map(String::as_str), Some("LS-2024-002"));
    }
}
