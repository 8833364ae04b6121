//! Concierge 终端版
//!
//! 入口：初始化日志、装配组件，在终端里以单个会话与路由 / 专家 Agent 对话。
//! 命令：/agents 列出有效 Agent，/reload 重建 Runner，/quit 退出；Ctrl+C 取消当前回合。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use concierge::config::load_config;
use concierge::core::{ConciergeBuilder, TurnError};
use concierge::gateway::ServerEvent;
use concierge::observability;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::SessionInit { session_id, lang } => {
            println!("(session {session_id}, lang {lang})");
        }
        ServerEvent::Typing { agent } => println!("  … {agent} is typing"),
        ServerEvent::Message { content, agent } => println!("{agent}> {content}"),
        ServerEvent::Error { content } => println!("! {content}"),
    }
}

fn prompt() {
    print!("you> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load configuration")?;
    let components = ConciergeBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build the agent set")?;
    let chat = components.chat.clone();
    let admin = components.admin.clone();

    let lang = std::env::var("CONCIERGE_LANG").ok();
    let (session_id, events) = chat.open_session(lang.as_deref(), None).await;
    chat.attach(&session_id).await;
    events.iter().for_each(print_event);

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let session_cancel = CancellationToken::new();

    prompt();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" | "/exit" => break,
            "/agents" => {
                for agent in admin.list_agents().await {
                    println!(
                        "  {:<16} {:<9} {}{}",
                        agent.name,
                        agent.source,
                        agent.routing_hint,
                        if agent.is_fallback { "  [fallback]" } else { "" }
                    );
                }
            }
            "/reload" => match admin.rebuild().await {
                Ok(report) => println!(
                    "  runner generation {}: {}",
                    report.generation,
                    report.agents.join(", ")
                ),
                Err(e) => println!("  reload failed, previous agents still active: {e}"),
            },
            text => {
                let cancel = session_cancel.child_token();
                let turn = chat.handle_message(&session_id, text, &cancel, &tx);
                tokio::pin!(turn);
                let result = loop {
                    tokio::select! {
                        r = &mut turn => break r,
                        Some(event) = rx.recv() => print_event(&event),
                        _ = tokio::signal::ctrl_c() => cancel.cancel(),
                    }
                };
                while let Ok(event) = rx.try_recv() {
                    print_event(&event);
                }
                match result {
                    Ok(_) => {}
                    Err(TurnError::Cancelled { .. }) => println!("  (cancelled)"),
                    Err(e) => return Err(e).context("Conversation turn failed"),
                }
            }
        }
        prompt();
    }

    chat.close_session(&session_id, &session_cancel).await;
    Ok(())
}
