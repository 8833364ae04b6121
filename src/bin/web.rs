//! Concierge Web 服务
//!
//! 启动: cargo run --bin concierge-web --features web
//! 对话: ws://127.0.0.1:8000/ws?lang=es ；管理: /admin/api/agents

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use concierge::config::load_config;
use concierge::core::ConciergeBuilder;
use concierge::observability;
use concierge::server::{router, spawn_session_reaper, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load configuration")?;
    let bind_addr = cfg.server.bind_addr.clone();
    if cfg.server.admin_api_key.is_empty() {
        tracing::warn!("server.admin_api_key is empty, admin API is unauthenticated");
    }

    let components = ConciergeBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build the agent set")?;
    let state = Arc::new(AppState::from_components(&components));
    let _reaper = spawn_session_reaper(components.chat.clone(), Duration::from_secs(60));

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    tracing::info!("Concierge listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        })
        .await
        .context("Server error")?;
    Ok(())
}
