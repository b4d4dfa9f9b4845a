//! Triform 机器人进程
//!
//! 一个进程三件事：Telegram 长轮询分发、管理后台 HTTP 服务、会话清理。
//!
//! 环境变量:
//! - TRIFORM__TELEGRAM__BOT_TOKEN: Bot API 令牌（必需）
//! - TRIFORM__SERVER__ADMIN_TOKEN: 管理 API 的 Bearer 令牌
//! - TRIFORM__SERVER__INTERNAL_API_KEY: /internal/* 的共享密钥
//!
//! 启动: cargo run --bin triform-bot

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use triform::config::load_config;
use triform::content::ContentResolver;
use triform::dispatch::Dispatcher;
use triform::flow::{FlowEngine, SessionStore};
use triform::push::PushService;
use triform::server::{create_router, ServerState};
use triform::store::{self, ConfigStore, OrderRepository};
use triform::submit::SubmissionCoordinator;
use triform::telegram::TelegramClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).context("failed to load configuration")?;

    let token = cfg
        .telegram
        .bot_token
        .clone()
        .context("TRIFORM__TELEGRAM__BOT_TOKEN must be set")?;

    tokio::fs::create_dir_all(&cfg.bot.uploads_dir)
        .await
        .with_context(|| format!("failed to create {}", cfg.bot.uploads_dir.display()))?;

    let pool = store::connect(&cfg.database.url)
        .await
        .with_context(|| format!("failed to open {}", cfg.database.url))?;

    let config_store = Arc::new(ConfigStore::new(pool.clone()));
    config_store.init_tables().await?;
    let repo = Arc::new(OrderRepository::new(pool));
    repo.init_tables().await?;

    let client = Arc::new(
        TelegramClient::new(&cfg.telegram, token, cfg.bot.uploads_dir.clone())
            .context("failed to build Telegram client")?,
    );

    let resolver = Arc::new(ContentResolver::new(
        Arc::clone(&config_store),
        cfg.bot.placeholder_photo_path.clone(),
        cfg.bot.orders_chat_id.clone(),
    ));
    let sessions = Arc::new(SessionStore::new(cfg.bot.session_timeout_secs));
    let submitter = Arc::new(SubmissionCoordinator::new(
        Arc::clone(&repo),
        client.clone() as Arc<dyn triform::telegram::BotGateway>,
    ));
    let engine = Arc::new(FlowEngine::new(
        Arc::clone(&sessions),
        Arc::clone(&repo),
        Arc::clone(&resolver),
        client.clone() as Arc<dyn triform::telegram::BotGateway>,
        submitter,
    ));
    let push = Arc::new(PushService::new(
        Arc::clone(&repo),
        client.clone() as Arc<dyn triform::telegram::BotGateway>,
    ));

    let cancel = CancellationToken::new();

    // HTTP：管理后台 + 内部推送
    let state = Arc::new(ServerState {
        config_store,
        repo,
        push,
        admin_token: cfg.server.admin_token.clone(),
        internal_api_key: cfg.server.internal_api_key.clone(),
    });
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.listen_addr))?;
    tracing::info!("Admin API listening on http://{}", cfg.server.listen_addr);

    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(async move {
        let shutdown = async move { server_cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    // 空闲会话清理
    let cleanup_sessions = Arc::clone(&sessions);
    let cleanup_cancel = cancel.clone();
    let cleanup_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            tokio::select! {
                _ = cleanup_cancel.cancelled() => break,
                _ = interval.tick() => {
                    let removed = cleanup_sessions.cleanup_expired().await;
                    if removed > 0 {
                        tracing::info!(removed, "Idle sessions evicted");
                    }
                }
            }
        }
    });

    // 主循环：长轮询分发，Ctrl-C 触发整体退出
    let dispatcher = Dispatcher::new(client, engine);
    let dispatch_cancel = cancel.clone();
    tokio::select! {
        _ = dispatcher.run(dispatch_cancel) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    cancel.cancel();
    let _ = server_task.await;
    let _ = cleanup_task.await;

    Ok(())
}
