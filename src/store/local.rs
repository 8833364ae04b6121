//! 本地 JSON 文件存储
//!
//! 整个表保存在一个 JSON 对象中（名称 → 记录）。写入先落到同目录的临时文件再 rename，
//! 读者不会看到写了一半的文件。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::StoreError;
use crate::store::{stamp, ConfigStore, OverrideMap, OverrideRecord};

pub struct LocalFileStore {
    path: PathBuf,
    /// 串行化本进程内的读-改-写
    write_lock: Mutex<()>,
}

impl LocalFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 严格读取：文件不存在视为空表，内容损坏则报错
    async fn read_map(&self) -> Result<OverrideMap, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(OverrideMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(OverrideMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_map(&self, map: &OverrideMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for LocalFileStore {
    fn source_tag(&self) -> &'static str {
        "local"
    }

    async fn load_all(&self) -> OverrideMap {
        match self.read_map().await {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(
                    "Failed to load agent overrides from {}: {}",
                    self.path.display(),
                    e
                );
                OverrideMap::new()
            }
        }
    }

    async fn save(&self, record: OverrideRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        let record = stamp(record, self.source_tag());
        tracing::info!("Saving agent override '{}'", record.name);
        map.insert(record.name.clone(), record);
        self.write_map(&map).await
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(name).is_none() {
            return Ok(false);
        }
        self.write_map(&map).await?;
        tracing::info!("Deleted agent override '{}'", name);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("agents.json"));
        assert!(store.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_load_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("nested/agents.json"));

        let mut rec = OverrideRecord::named("Billing");
        rec.instruction = Some("X".to_string());
        rec.tools = Some(vec!["lookup_reservation".to_string()]);
        store.save(rec.clone()).await.unwrap();

        let loaded = store.load_all().await;
        let got = loaded.get("Billing").unwrap();
        assert!(got.same_fields(&rec));
        assert_eq!(got.source, "local");
        assert!(got.updated_at.is_some());
        assert!(!dir.path().join("nested/agents.json.tmp").exists());

        assert!(store.delete("Billing").await.unwrap());
        assert!(!store.delete("Billing").await.unwrap());
        assert!(store.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty_but_save_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = LocalFileStore::new(&path);
        assert!(store.load_all().await.is_empty());
        assert!(matches!(
            store.save(OverrideRecord::named("A")).await,
            Err(StoreError::Serde(_))
        ));
        // 损坏的文件不会被覆盖
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }
}
