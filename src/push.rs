//! 后端 → 用户 的消息推送
//!
//! 管理后台（/internal/sendMessage 与订单页的消息发送）通过这里触达用户。
//! 投递成功才把 out 方向的流水追加到订单；投递失败返回 Dispatch 错误，
//! 不写任何东西 —— 「没送出去」与「送出去了」必须可区分。

use std::sync::Arc;

use crate::error::{BotError, BotResult};
use crate::store::OrderRepository;
use crate::telegram::BotGateway;

pub struct PushService {
    repo: Arc<OrderRepository>,
    gateway: Arc<dyn BotGateway>,
}

impl PushService {
    pub fn new(repo: Arc<OrderRepository>, gateway: Arc<dyn BotGateway>) -> Self {
        Self { repo, gateway }
    }

    /// 发送文本给用户，成功时登记订单流水；返回平台消息 ID
    pub async fn push_to_user(
        &self,
        user_id: i64,
        text: &str,
        order_id: Option<i64>,
    ) -> BotResult<i64> {
        let text = text.trim();
        if text.is_empty() {
            return Err(BotError::Dispatch("empty message text".to_string()));
        }

        let message_id = self.gateway.send_text(&user_id.to_string(), text).await?;

        if let Some(order_id) = order_id {
            // 已投递成功；流水写入失败只记日志，不把成功误报成失败
            if let Err(e) = self
                .repo
                .add_message(order_id, "out", text, Some(message_id))
                .await
            {
                tracing::error!(order_id, user_id, "Delivered but not logged: {}", e);
            }
        }

        Ok(message_id)
    }
}
