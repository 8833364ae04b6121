//! 限流重试：指数退避
//!
//! 只包裹模型后端调用。限流类错误（429 / 配额耗尽）按 base、2*base、4*base... 退避重试，
//! 最多 max_retries 次；其他错误（含超时）立即上抛。每次尝试各自带超时，与重试预算无关。

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::core::LlmError;

/// 重试配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 首次调用之后最多重试的次数
    pub max_retries: u32,
    /// 第一次重试前的等待，之后每次翻倍
    pub base_delay: Duration,
    /// 单次尝试的超时
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

/// 重试策略（无状态，可在多个会话间共享）
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 第 retry 次重试（从 0 开始）前的等待时长
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.config
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }

    /// 完整的退避序列，长度等于 max_retries
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.config.max_retries).map(|r| self.delay_for(r)).collect()
    }

    /// 执行 operation；限流错误按退避重试，其余错误原样返回
    pub async fn call<F, Fut, T>(&self, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut retry = 0u32;
        loop {
            let result = match timeout(self.config.attempt_timeout, operation()).await {
                Ok(r) => r,
                Err(_) => Err(LlmError::Timeout(self.config.attempt_timeout)),
            };

            match result {
                Ok(value) => {
                    if retry > 0 {
                        tracing::debug!("Model call succeeded after {} retries", retry);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_rate_limited() && retry < self.config.max_retries => {
                    let delay = self.delay_for(retry);
                    retry += 1;
                    tracing::warn!(
                        "Rate limit hit (retry {}/{}). Retrying in {:?}: {}",
                        retry,
                        self.config.max_retries,
                        delay,
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    if e.is_rate_limited() {
                        tracing::warn!(
                            "Rate limit retries exhausted ({}): {}",
                            self.config.max_retries,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
