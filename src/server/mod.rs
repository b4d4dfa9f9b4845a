//! HTTP 服务：管理后台 API 与内部推送接口
//!
//! 两套鉴权互相独立：/api/* 用 Bearer admin_token，/internal/* 用
//! X-Internal-Key。对应令牌未配置时放行（开发环境），生产必须配置。

mod admin;
mod internal;

use std::sync::Arc;

use axum::{routing::get, routing::post, Router};

use crate::push::PushService;
use crate::store::{ConfigStore, OrderRepository};

/// HTTP 各 handler 的共享状态
pub struct ServerState {
    pub config_store: Arc<ConfigStore>,
    pub repo: Arc<OrderRepository>,
    pub push: Arc<PushService>,
    pub admin_token: Option<String>,
    pub internal_api_key: Option<String>,
}

pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(
            "/api/bot-config",
            get(admin::get_bot_config).put(admin::put_bot_config),
        )
        .route("/api/orders", get(admin::list_orders))
        .route("/api/orders/stats", get(admin::order_stats))
        .route(
            "/api/orders/:id",
            get(admin::get_order).put(admin::put_order_status),
        )
        .route(
            "/api/orders/:id/messages",
            get(admin::list_order_messages).post(admin::post_order_message),
        )
        .route("/api/orders/:id/files", get(admin::list_order_files))
        .route("/internal/sendMessage", post(internal::send_message))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}
