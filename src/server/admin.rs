//! 管理后台 API：文案配置与订单工作台
//!
//! 约定：列表返回 {items, page, limit}；订单对象附带 status_label 供前端直接
//! 展示；非法状态迁移返回 400 + detail，缺订单返回 404。

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::BotError;
use crate::store::Order;

use super::ServerState;

/// Bearer 鉴权；令牌未配置时放行
fn authorize(state: &ServerState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn internal_error(e: BotError) -> (StatusCode, Json<Value>) {
    tracing::error!("Admin API error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": "internal error" })),
    )
}

fn order_json(order: &Order) -> Value {
    let mut value = serde_json::to_value(order).unwrap_or_else(|_| json!({}));
    value["status_label"] = json!(order.status.label());
    value
}

/// GET /api/bot-config
pub async fn get_bot_config(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<HashMap<String, String>>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers).map_err(|s| (s, Json(json!({ "detail": "unauthorized" }))))?;
    let values = state
        .config_store
        .get_all()
        .await
        .map_err(|e| internal_error(BotError::ConfigUnavailable(e.to_string())))?;
    Ok(Json(values))
}

/// PUT /api/bot-config — 整体 upsert，不删除未提及的键
pub async fn put_bot_config(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(values): Json<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers).map_err(|s| (s, Json(json!({ "detail": "unauthorized" }))))?;
    state
        .config_store
        .set_many(&values)
        .await
        .map_err(|e| internal_error(BotError::ConfigUnavailable(e.to_string())))?;
    tracing::info!(keys = values.len(), "Bot config updated");
    Ok(Json(json!({ "ok": true, "updated": values.len() })))
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub status_filter: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

/// GET /api/orders?page=&limit=&status_filter=
pub async fn list_orders(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers).map_err(|s| (s, Json(json!({ "detail": "unauthorized" }))))?;

    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let offset = (page - 1) * limit;

    let orders = state
        .repo
        .list_paginated(limit, offset, query.status_filter.as_deref())
        .await
        .map_err(internal_error)?;

    let items: Vec<Value> = orders.iter().map(order_json).collect();
    Ok(Json(json!({ "items": items, "page": page, "limit": limit })))
}

/// GET /api/orders/stats
pub async fn order_stats(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers).map_err(|s| (s, Json(json!({ "detail": "unauthorized" }))))?;
    let stats = state.repo.statistics().await.map_err(internal_error)?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_else(|_| json!({}))))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(order_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers).map_err(|s| (s, Json(json!({ "detail": "unauthorized" }))))?;
    let order = state
        .repo
        .get(order_id)
        .await
        .map_err(internal_error)?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "order not found" })),
        ))?;
    Ok(Json(order_json(&order)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    pub status: String,
}

/// PUT /api/orders/{id} — 状态迁移（只进不退，canceled 除外）
pub async fn put_order_status(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(order_id): Path<i64>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers).map_err(|s| (s, Json(json!({ "detail": "unauthorized" }))))?;

    match state.repo.update_status(order_id, &body.status).await {
        Ok(()) => {}
        Err(BotError::InvalidStatus(detail)) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": format!("invalid status transition: {}", detail) })),
            ))
        }
        Err(BotError::Persistence(sqlx::Error::RowNotFound)) => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": "order not found" })),
            ))
        }
        Err(e) => return Err(internal_error(e)),
    }

    let order = state
        .repo
        .get(order_id)
        .await
        .map_err(internal_error)?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "order not found" })),
        ))?;
    tracing::info!(order_id, status = %order.status, "Order status updated");
    Ok(Json(order_json(&order)))
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default = "default_messages_limit")]
    pub limit: i64,
}

fn default_messages_limit() -> i64 {
    50
}

/// GET /api/orders/{id}/messages — 时间正序
pub async fn list_order_messages(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(order_id): Path<i64>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers).map_err(|s| (s, Json(json!({ "detail": "unauthorized" }))))?;
    let messages = state
        .repo
        .list_messages(order_id, query.limit.clamp(1, 200))
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "items": messages })))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    pub text: String,
}

/// POST /api/orders/{id}/messages — 经机器人回复客户
pub async fn post_order_message(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(order_id): Path<i64>,
    Json(body): Json<SendMessageBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers).map_err(|s| (s, Json(json!({ "detail": "unauthorized" }))))?;

    let order = state
        .repo
        .get(order_id)
        .await
        .map_err(internal_error)?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "order not found" })),
        ))?;

    if order.status == crate::store::OrderStatus::Canceled {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "order is canceled" })),
        ));
    }

    match state
        .push
        .push_to_user(order.user_id, &body.text, Some(order_id))
        .await
    {
        Ok(message_id) => Ok(Json(json!({ "ok": true, "telegram_message_id": message_id }))),
        Err(e) => {
            tracing::warn!(order_id, "Message delivery failed: {}", e);
            Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": "delivery failed" })),
            ))
        }
    }
}

/// GET /api/orders/{id}/files
pub async fn list_order_files(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(order_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers).map_err(|s| (s, Json(json!({ "detail": "unauthorized" }))))?;
    let files = state
        .repo
        .list_files(order_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "items": files })))
}
