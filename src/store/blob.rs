//! HTTP 对象存储（如对象存储桶的 JSON 对象）
//!
//! GET 读取整张表（404 视为空），PUT 整体写回；可选 Bearer Token。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::core::StoreError;
use crate::store::{stamp, ConfigStore, OverrideMap, OverrideRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpBlobStore {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    write_lock: tokio::sync::Mutex<()>,
}

impl HttpBlobStore {
    pub fn new(url: &str, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.to_string(),
            token,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn read_map(&self) -> Result<OverrideMap, StoreError> {
        let resp = self
            .authorized(self.client.get(&self.url))
            .send()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(OverrideMap::new()),
            s if s.is_success() => {
                let text = resp
                    .text()
                    .await
                    .map_err(|e| StoreError::Remote(e.to_string()))?;
                if text.trim().is_empty() {
                    Ok(OverrideMap::new())
                } else {
                    Ok(serde_json::from_str(&text)?)
                }
            }
            s => Err(StoreError::Remote(format!("GET {} returned {}", self.url, s))),
        }
    }

    async fn write_map(&self, map: &OverrideMap) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(map)?;
        let resp = self
            .authorized(self.client.put(&self.url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StoreError::Remote(format!(
                "PUT {} returned {}",
                self.url,
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for HttpBlobStore {
    fn source_tag(&self) -> &'static str {
        "blob"
    }

    async fn load_all(&self) -> OverrideMap {
        match self.read_map().await {
            Ok(map) => map,
            Err(e) => {
                tracing::error!("Failed to load agent overrides from blob store: {}", e);
                OverrideMap::new()
            }
        }
    }

    async fn save(&self, record: OverrideRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        let record = stamp(record, self.source_tag());
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
        Ok(true)
    }
}
