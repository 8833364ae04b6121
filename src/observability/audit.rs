//! 对话审计
//!
//! 会话开始 / 每条消息 / 会话结束三类事件。record 同步且不会失败，不能阻塞回合循环：
//! JsonlAuditSink 只把事件放进无界通道，由后台任务追加写入文件。

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    ConversationStarted {
        session_id: String,
        user_id: Option<String>,
        lang: String,
    },
    Message {
        session_id: String,
        /// user / assistant
        role: String,
        agent: Option<String>,
        content: String,
    },
    ConversationEnded {
        session_id: String,
    },
}

impl AuditEvent {
    pub fn session_id(&self) -> &str {
        match self {
            AuditEvent::ConversationStarted { session_id, .. }
            | AuditEvent::Message { session_id, .. }
            | AuditEvent::ConversationEnded { session_id } => session_id,
        }
    }
}

/// 审计落点（fire-and-forget）
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// 丢弃所有事件
#[derive(Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// 以 debug 级别写入日志
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => tracing::debug!(target: "audit", "{}", line),
            Err(e) => tracing::warn!("Failed to serialize audit event: {}", e),
        }
    }
}

#[derive(Serialize)]
struct Stamped<'a> {
    ts: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// 追加写入 JSONL 文件
pub struct JsonlAuditSink {
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl JsonlAuditSink {
    /// 启动后台写入任务（须在 tokio 运行时内调用）
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEvent>();
        tokio::spawn(async move {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    tracing::warn!("Failed to create audit log directory {:?}: {}", parent, e);
                }
            }
            let mut file = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(f) => f,
                Err(e) => {
                    tracing::error!("Audit log {:?} unavailable, events will be dropped: {}", path, e);
                    while rx.recv().await.is_some() {}
                    return;
                }
            };
            while let Some(event) = rx.recv().await {
                let stamped = Stamped {
                    ts: Utc::now(),
                    event: &event,
                };
                let mut line = match serde_json::to_string(&stamped) {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::warn!("Failed to serialize audit event: {}", e);
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    tracing::warn!("Failed to write audit event: {}", e);
                    continue;
                }
                let _ = file.flush().await;
            }
        });
        Self { tx }
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, event: AuditEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Audit writer stopped, event dropped");
        }
    }
}
