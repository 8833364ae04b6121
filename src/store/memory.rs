//! 进程内存储（开发与测试用）

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::StoreError;
use crate::store::{stamp, ConfigStore, OverrideMap, OverrideRecord};

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<OverrideMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以已有记录初始化
    pub fn with_records(records: impl IntoIterator<Item = OverrideRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    fn source_tag(&self) -> &'static str {
        "memory"
    }

    async fn load_all(&self) -> OverrideMap {
        self.records.read().await.clone()
    }

    async fn save(&self, record: OverrideRecord) -> Result<(), StoreError> {
        let record = stamp(record, self.source_tag());
        self.records.write().await.insert(record.name.clone(), record);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(name).is_some())
    }
}
