//! 可观测性：日志初始化 + 对话审计

pub mod audit;

pub use audit::{AuditEvent, AuditSink, JsonlAuditSink, NoopAuditSink, TracingAuditSink};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局订阅器；默认 info，可用 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
