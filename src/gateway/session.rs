//! 会话管理
//!
//! 每个会话放在独立的 `tokio::sync::Mutex` 后面：同一会话的回合严格串行，
//! 不同会话互不阻塞。表本身只在增删查时短暂加锁。
//! 挂在活动连接上的会话不参与空闲清理，只能由连接关闭时移除。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::core::Session;

/// 会话表中的一项
pub struct SessionSlot {
    pub session: Mutex<Session>,
    last_active: std::sync::Mutex<Instant>,
    attached: AtomicBool,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            last_active: std::sync::Mutex::new(Instant::now()),
            attached: AtomicBool::new(false),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::Release);
    }

    pub fn touch(&self) {
        if let Ok(mut t) = self.last_active.lock() {
            *t = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }
}

/// 会话管理器
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    session_timeout: Duration,
}

impl SessionManager {
    pub fn new(session_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_timeout,
        }
    }

    /// 登记会话并返回其 ID
    pub async fn insert(&self, session: Session) -> String {
        let id = session.id.clone();
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(SessionSlot::new(session)));
        id
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionSlot>> {
        let slot = self.sessions.read().await.get(session_id).cloned();
        if let Some(slot) = &slot {
            slot.touch();
        }
        slot
    }

    /// 标记会话是否被活动连接持有；会话不存在时返回 false
    pub async fn set_attached(&self, session_id: &str, attached: bool) -> bool {
        match self.sessions.read().await.get(session_id) {
            Some(slot) => {
                slot.set_attached(attached);
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// 清理空闲超时的会话；挂在连接上或正在处理回合的会话不会被清理
    pub async fn cleanup_expired(&self) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, slot)| {
                !slot.is_attached()
                    && slot.idle_for() > self.session_timeout
                    && slot.session.try_lock().is_ok()
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!("Cleaned up {} expired session(s)", expired.len());
        }
        expired
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::agents::testing::tree_with;

    fn session(id: &str) -> Session {
        let tree = tree_with(&[]);
        Session::with_id(id, tree.router().clone(), HashMap::new())
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let id = manager.insert(session("a")).await;
        assert_eq!(id, "a");
        assert!(manager.get("a").await.is_some());
        assert!(manager.get("b").await.is_none());
        assert!(manager.remove("a").await);
        assert!(!manager.remove("a").await);
        assert_eq!(manager.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_skips_busy_sessions() {
        let manager = SessionManager::new(Duration::ZERO);
        manager.insert(session("idle")).await;
        manager.insert(session("busy")).await;
        let busy = manager.get("busy").await.unwrap();
        let _turn = busy.session.lock().await;
        std::thread::sleep(Duration::from_millis(5));

        let expired = manager.cleanup_expired().await;
        assert_eq!(expired, vec!["idle".to_string()]);
        assert_eq!(manager.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_cleanup_skips_attached_sessions() {
        let manager = SessionManager::new(Duration::ZERO);
        manager.insert(session("live")).await;
        manager.insert(session("orphan")).await;
        assert!(manager.set_attached("live", true).await);
        assert!(!manager.set_attached("missing", true).await);
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(manager.cleanup_expired().await, vec!["orphan".to_string()]);
        assert!(manager.get("live").await.is_some());

        manager.set_attached("live", false).await;
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(manager.cleanup_expired().await, vec!["live".to_string()]);
    }
}
