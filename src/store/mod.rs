//! 覆盖记录存储
//!
//! ConfigStore 以 Agent 名为键保存 OverrideRecord。load_all 从不失败（读取失败时返回空集合，
//! 注册表随之退化为仅内置 Agent）；save / delete 只在真实的 I/O 失败时报错。
//! 并发写入同一名称时以最后一次写入为准。

pub mod blob;
pub mod local;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

pub use crate::agents::OverrideRecord;
use crate::config::AppConfig;
use crate::core::StoreError;
pub use blob::HttpBlobStore;
pub use local::LocalFileStore;
pub use memory::MemoryStore;

/// 覆盖记录表：名称 → 记录
pub type OverrideMap = BTreeMap<String, OverrideRecord>;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// 写入记录时标注的来源
    fn source_tag(&self) -> &'static str;

    /// 读取全部记录；失败时记录告警并返回空表
    async fn load_all(&self) -> OverrideMap;

    /// 插入或替换一条记录（按 name），并标注 source / updated_at
    async fn save(&self, record: OverrideRecord) -> Result<(), StoreError>;

    /// 删除记录；不存在时返回 false
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;
}

/// 写入前补全来源与时间戳
pub(crate) fn stamp(mut record: OverrideRecord, source: &str) -> OverrideRecord {
    record.source = source.to_string();
    record.updated_at = Some(chrono::Utc::now());
    record
}

/// 按 [store] 配置创建存储；blob 缺少 object_url 时退回本地文件
pub fn create_store_from_config(cfg: &AppConfig) -> Arc<dyn ConfigStore> {
    match cfg.store.backend.to_ascii_lowercase().as_str() {
        "memory" => {
            tracing::info!("Agent overrides kept in memory only");
            Arc::new(MemoryStore::new())
        }
        "blob" => match cfg.store.object_url.as_deref() {
            Some(url) => {
                let token = cfg
                    .store
                    .token_env
                    .as_deref()
                    .and_then(|env| std::env::var(env).ok())
                    .filter(|t| !t.trim().is_empty());
                tracing::info!("Agent overrides stored in blob {}", url);
                Arc::new(HttpBlobStore::new(url, token))
            }
            None => {
                tracing::warn!(
                    "store.backend = blob but store.object_url is not set, using local file {}",
                    cfg.store.path.display()
                );
                Arc::new(LocalFileStore::new(cfg.store.path.clone()))
            }
        },
        other => {
            if other != "local" {
                tracing::warn!("Unknown store backend '{}', using local file", other);
            }
            tracing::info!("Agent overrides stored in {}", cfg.store.path.display());
            Arc::new(LocalFileStore::new(cfg.store.path.clone()))
        }
    }
}
