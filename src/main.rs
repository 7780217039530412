//! Conductor 命令行
//!
//! 入口：加载配置、初始化日志，按行读取用户输入并交给 SessionManager。
//! 使用内存邮箱与日历作为参考适配器；未配置 API Key 时使用 Mock oracle。

use std::sync::Arc;

use anyhow::Context;
use conductor::agents::EngineSettings;
use conductor::config::load_config;
use conductor::core::LoopEvent;
use conductor::llm::{create_oracle_from_config, retrying_from_config};
use conductor::tools::{AdapterRegistry, InMemoryCalendar, InMemoryMailbox};
use conductor::{observability, SessionFactory, SessionManager};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let oracle = Arc::new(retrying_from_config(create_oracle_from_config(&cfg), &cfg));
    let registry = AdapterRegistry::new()
        .with(Arc::new(InMemoryMailbox::demo()))
        .with(Arc::new(InMemoryCalendar::demo()));

    // 循环事件以 debug 级别输出（RUST_LOG=debug 可见）
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel::<LoopEvent>();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            tracing::debug!(event = %serde_json::to_string(&event).unwrap_or_default(), "loop event");
        }
    });

    let factory = SessionFactory::new(oracle, registry, EngineSettings::from_config(&cfg))
        .with_events(events_tx);
    let manager = SessionManager::new(factory, cfg.app.session_timeout_secs);

    let session_id = format!("session_{}", uuid::Uuid::new_v4());
    tracing::info!(session = %session_id, "conductor ready");
    println!("{} ready. Type a request, 'undo', or 'quit'.", cfg.app.name.as_deref().unwrap_or("conductor"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("quit") || text.eq_ignore_ascii_case("exit") {
            break;
        }
        let reply = manager.process_turn(text, &session_id).await;
        println!("{}", reply.message);
        if reply.awaiting_confirmation {
            println!("(awaiting confirmation)");
        }
    }

    manager.end_session(&session_id).await;
    Ok(())
}
