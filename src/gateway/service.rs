//! 对话服务：把 RunnerHandle、编排引擎、会话表与审计串起来
//!
//! 传输层（终端 / WebSocket）只负责收发文本，其余都在这里：
//! 建立会话 → 每条消息取一次 Runner 快照跑一个回合 → 把进度与结果转成 ServerEvent。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{
    EngineEvent, OrchestrationEngine, RunnerHandle, Session, TurnError, TurnReply,
};
use crate::gateway::messages;
use crate::gateway::{ServerEvent, SessionManager};
use crate::observability::{AuditEvent, AuditSink};

pub struct ChatService {
    runner: Arc<RunnerHandle>,
    engine: OrchestrationEngine,
    sessions: SessionManager,
    audit: Arc<dyn AuditSink>,
    default_lang: String,
}

impl ChatService {
    pub fn new(
        runner: Arc<RunnerHandle>,
        engine: OrchestrationEngine,
        audit: Arc<dyn AuditSink>,
        session_timeout: Duration,
        default_lang: impl Into<String>,
    ) -> Self {
        let default_lang = default_lang.into();
        let default_lang = messages::normalize_lang(Some(default_lang.as_str()), "en").to_string();
        Self {
            runner,
            engine,
            sessions: SessionManager::new(session_timeout),
            audit,
            default_lang,
        }
    }

    pub fn runner(&self) -> &Arc<RunnerHandle> {
        &self.runner
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// 新建会话，从路由开始；返回会话 ID 与需要立即下发的事件（session_init + 欢迎语）
    pub async fn open_session(
        &self,
        lang: Option<&str>,
        user_id: Option<String>,
    ) -> (String, Vec<ServerEvent>) {
        let lang = messages::normalize_lang(lang, &self.default_lang).to_string();
        let context = HashMap::from([
            ("lang".to_string(), lang.clone()),
            ("lang_name".to_string(), messages::lang_name(&lang).to_string()),
        ]);

        let runner = self.runner.get().await;
        let router = runner.tree.router().clone();
        let mut session = Session::new(router.clone(), context);
        session.user_id = user_id.clone();
        let session_id = self.sessions.insert(session).await;

        tracing::info!(session = %session_id, lang = %lang, "Session opened");
        self.audit.record(AuditEvent::ConversationStarted {
            session_id: session_id.clone(),
            user_id,
            lang: lang.clone(),
        });

        let events = vec![
            ServerEvent::SessionInit {
                session_id: session_id.clone(),
                lang: lang.clone(),
            },
            ServerEvent::message(messages::welcome(&lang), router.name.clone()),
        ];
        (session_id, events)
    }

    /// 会话由一个活动连接持有：空闲清理跳过它，直到 close_session
    pub async fn attach(&self, session_id: &str) -> bool {
        self.sessions.set_attached(session_id, true).await
    }

    /// 处理一条用户消息；空白输入直接忽略（返回 Ok(None)）
    ///
    /// 每轮开始前发送 typing，结束时发送 message 或 error。取消时不发送任何结果。
    pub async fn handle_message(
        &self,
        session_id: &str,
        text: &str,
        cancel: &CancellationToken,
        tx: &mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<Option<TurnReply>, TurnError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let slot = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| TurnError::UnknownSession(session_id.to_string()))?;

        // 同一会话的回合在此串行
        let mut session = slot.session.lock().await;
        self.audit.record(AuditEvent::Message {
            session_id: session_id.to_string(),
            role: "user".to_string(),
            agent: None,
            content: text.to_string(),
        });

        let (etx, mut erx) = mpsc::unbounded_channel::<EngineEvent>();
        let forward_tx = tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = erx.recv().await {
                if let EngineEvent::RoundStarted { agent, .. } = event {
                    let _ = forward_tx.send(ServerEvent::Typing { agent });
                }
            }
        });

        let runner = self.runner.get().await;
        let result = self
            .engine
            .run_turn(&runner, &mut session, text, cancel, Some(&etx))
            .await;
        drop(etx);
        let _ = forwarder.await;
        slot.touch();

        let reply = result?;
        let event = if reply.outcome.is_error() {
            ServerEvent::error(reply.text.clone())
        } else {
            ServerEvent::message(reply.text.clone(), reply.agent.clone())
        };
        let _ = tx.send(event);

        self.audit.record(AuditEvent::Message {
            session_id: session_id.to_string(),
            role: "assistant".to_string(),
            agent: Some(reply.agent.clone()),
            content: reply.text.clone(),
        });
        Ok(Some(reply))
    }

    /// 结束会话：取消进行中的回合并移除会话
    pub async fn close_session(&self, session_id: &str, cancel: &CancellationToken) {
        cancel.cancel();
        if self.sessions.remove(session_id).await {
            tracing::info!(session = %session_id, "Session closed");
            self.audit.record(AuditEvent::ConversationEnded {
                session_id: session_id.to_string(),
            });
        }
    }

    /// 清理空闲会话，并为每个被清理的会话记录结束事件
    pub async fn cleanup_expired(&self) -> usize {
        let expired = self.sessions.cleanup_expired().await;
        for session_id in &expired {
            self.audit.record(AuditEvent::ConversationEnded {
                session_id: session_id.clone(),
            });
        }
        expired.len()
    }

    /// 当前会话的 Agent 名称（终端显示用）
    pub async fn active_agent(&self, session_id: &str) -> Option<String> {
        let slot = self.sessions.get(session_id).await?;
        let session = slot.session.lock().await;
        Some(session.active_agent_name().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::agents::{AgentRegistry, RouterBuilder};
    use crate::core::{EngineConfig, LlmError, TurnOutcome};
    use crate::llm::{ModelBackend, ModelReply, ModelRequest, RetryConfig, ScriptedBackend, Turn};
    use crate::observability::NoopAuditSink;
    use crate::store::MemoryStore;
    use crate::tools::ToolRegistry;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<AuditEvent>>);

    impl AuditSink for CollectingSink {
        fn record(&self, event: AuditEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    async fn service(backend: Arc<dyn ModelBackend>, audit: Arc<dyn AuditSink>) -> ChatService {
        service_with_timeout(backend, audit, Duration::from_secs(60)).await
    }

    async fn service_with_timeout(
        backend: Arc<dyn ModelBackend>,
        audit: Arc<dyn AuditSink>,
        session_timeout: Duration,
    ) -> ChatService {
        let registry = AgentRegistry::with_builtins(
            Arc::new(ToolRegistry::with_builtin_tools()),
            Arc::new(MemoryStore::new()),
            "m",
        );
        let runner = RunnerHandle::new(registry, RouterBuilder::new("m"), backend)
            .await
            .unwrap();
        let engine = OrchestrationEngine::new(EngineConfig {
            max_rounds: 4,
            retry: RetryConfig {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                attempt_timeout: Duration::from_secs(5),
            },
            tool_timeout: Duration::from_secs(5),
        });
        ChatService::new(Arc::new(runner), engine, audit, session_timeout, "en")
    }

    /// 第一次调用停在 gate 上，直到测试放行
    #[derive(Default)]
    struct GatedBackend {
        calls: AtomicUsize,
        entered: Notify,
        gate: Notify,
    }

    #[async_trait]
    impl ModelBackend for GatedBackend {
        fn name(&self) -> &str {
            "gated"
        }

        async fn invoke(&self, _request: ModelRequest<'_>) -> Result<ModelReply, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.entered.notify_one();
            if n == 1 {
                self.gate.notified().await;
            }
            Ok(ModelReply::text(format!("reply {n}")))
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn test_open_session_sends_init_and_localized_welcome() {
        let svc = service(Arc::new(ScriptedBackend::new(vec![])), Arc::new(NoopAuditSink)).await;
        let (id, events) = svc.open_session(Some("es-ES"), None).await;
        assert_eq!(
            events[0],
            ServerEvent::SessionInit {
                session_id: id.clone(),
                lang: "es".into()
            }
        );
        assert_eq!(events[1], ServerEvent::message(messages::welcome("es"), "Triage"));
        assert_eq!(svc.active_agent(&id).await.as_deref(), Some("Triage"));
    }

    #[tokio::test]
    async fn test_typing_precedes_reply_with_authoring_agent() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ScriptedBackend::call("c1", "transfer_to_accommodations", json!({}))),
            Ok(ModelReply::text("WiFi is included.")),
        ]));
        let audit = Arc::new(CollectingSink::default());
        let svc = service(backend, audit.clone()).await;
        let (id, _) = svc.open_session(None, Some("u1".into())).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let reply = svc
            .handle_message(&id, "Is there WiFi?", &CancellationToken::new(), &tx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.agent, "Accommodations");
        assert_eq!(
            drain(&mut rx),
            vec![
                ServerEvent::Typing { agent: "Triage".into() },
                ServerEvent::Typing { agent: "Accommodations".into() },
                ServerEvent::message("WiFi is included.", "Accommodations"),
            ]
        );

        let events = audit.0.lock().unwrap().clone();
        assert!(matches!(&events[0], AuditEvent::ConversationStarted { user_id: Some(u), .. } if u == "u1"));
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_backend_failure_is_error_event() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(LlmError::RateLimited {
            status: Some(429),
            message: "quota".into(),
        })]));
        let svc = service(backend, Arc::new(NoopAuditSink)).await;
        let (id, _) = svc.open_session(Some("fr"), None).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let reply = svc
            .handle_message(&id, "bonjour", &CancellationToken::new(), &tx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.outcome, TurnOutcome::RateLimited);
        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&ServerEvent::error(messages::rate_limited("fr"))));
    }

    #[tokio::test]
    async fn test_blank_input_and_unknown_session() {
        let svc = service(Arc::new(ScriptedBackend::new(vec![])), Arc::new(NoopAuditSink)).await;
        let (id, _) = svc.open_session(None, None).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        assert_eq!(svc.handle_message(&id, "   ", &cancel, &tx).await, Ok(None));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(
            svc.handle_message("nope", "hi", &cancel, &tx).await,
            Err(TurnError::UnknownSession("nope".into()))
        );
    }

    #[tokio::test]
    async fn test_close_session_cancels_and_removes() {
        let svc = service(Arc::new(ScriptedBackend::new(vec![])), Arc::new(NoopAuditSink)).await;
        let (id, _) = svc.open_session(None, None).await;
        let cancel = CancellationToken::new();
        svc.close_session(&id, &cancel).await;
        assert!(cancel.is_cancelled());
        assert_eq!(svc.sessions().active_count().await, 0);
    }

    #[tokio::test]
    async fn test_turns_on_one_session_never_interleave() {
        let backend = Arc::new(GatedBackend::default());
        let svc = Arc::new(service(backend.clone(), Arc::new(NoopAuditSink)).await);
        let (id, _) = svc.open_session(None, None).await;
        let (tx, _rx) = mpsc::unbounded_channel();

        let spawn_turn = |text: &'static str| {
            let (svc, id, tx) = (svc.clone(), id.clone(), tx.clone());
            tokio::spawn(async move {
                svc.handle_message(&id, text, &CancellationToken::new(), &tx)
                    .await
                    .unwrap()
                    .unwrap()
            })
        };

        let first = spawn_turn("first");
        backend.entered.notified().await;
        let second = spawn_turn("second");
        tokio::time::sleep(Duration::from_millis(20)).await;
        // 第二个回合在会话锁上等待，尚未调用模型
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        backend.gate.notify_one();
        assert_eq!(first.await.unwrap().text, "reply 1");
        assert_eq!(second.await.unwrap().text, "reply 2");

        let slot = svc.sessions().get(&id).await.unwrap();
        let session = slot.session.lock().await;
        assert_eq!(
            session.history,
            vec![
                Turn::user("first"),
                Turn::Model(ModelReply::text("reply 1")),
                Turn::user("second"),
                Turn::Model(ModelReply::text("reply 2")),
            ]
        );
    }

    #[tokio::test]
    async fn test_attached_session_survives_idle_cleanup() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(ModelReply::text("still here"))]));
        let svc = service_with_timeout(backend, Arc::new(NoopAuditSink), Duration::from_millis(1)).await;
        let (live, _) = svc.open_session(None, None).await;
        let (idle, _) = svc.open_session(None, None).await;
        assert!(svc.attach(&live).await);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(svc.cleanup_expired().await, 1);
        assert!(svc.sessions().get(&idle).await.is_none());

        let (tx, _rx) = mpsc::unbounded_channel();
        let reply = svc
            .handle_message(&live, "hello?", &CancellationToken::new(), &tx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.text, "still here");
    }
}
