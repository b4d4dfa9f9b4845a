//! 内部推送接口：后端服务经机器人主动触达用户
//!
//! 鉴权用共享密钥头 X-Internal-Key。投递失败返回 400，调用方必须能
//! 区分「已送达」与「没送出去」。

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::ServerState;

#[derive(Debug, Deserialize)]
pub struct InternalSendBody {
    pub user_id: i64,
    pub text: String,
    pub order_id: Option<i64>,
}

/// POST /internal/sendMessage
pub async fn send_message(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<InternalSendBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(expected) = state.internal_api_key.as_deref() {
        let provided = headers.get("X-Internal-Key").and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "detail": "unauthorized" })),
            ));
        }
    }

    match state
        .push
        .push_to_user(body.user_id, &body.text, body.order_id)
        .await
    {
        Ok(message_id) => {
            tracing::info!(user_id = body.user_id, "Internal push delivered");
            Ok(Json(json!({ "ok": true, "telegram_message_id": message_id })))
        }
        Err(e) => {
            tracing::warn!(user_id = body.user_id, "Internal push failed: {}", e);
            Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": "delivery failed" })),
            ))
        }
    }
}
