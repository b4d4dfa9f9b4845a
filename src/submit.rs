//! 订单提交协调
//!
//! 提交 = 渲染终版摘要 → finalize（draft→new，幂等）→ 尽力通知运营群
//! （订单卡片 + 附件：图片发 photo，其余发 document）。通知失败只降级为
//! 用户确认文案后面的软警告，绝不回滚已完成的 finalize，也不拦截用户侧成功。

use std::sync::Arc;

use crate::content::{defaults, ContentSnapshot};
use crate::error::BotResult;
use crate::flow::{payload_summary, Session, UserRef};
use crate::store::{OrderFile, OrderRepository};
use crate::telegram::BotGateway;

pub struct SubmissionCoordinator {
    repo: Arc<OrderRepository>,
    gateway: Arc<dyn BotGateway>,
}

impl SubmissionCoordinator {
    pub fn new(repo: Arc<OrderRepository>, gateway: Arc<dyn BotGateway>) -> Self {
        Self { repo, gateway }
    }

    /// 提交订单，返回发给用户的确认文案
    pub async fn submit(
        &self,
        snap: &ContentSnapshot,
        user: &UserRef,
        session: &Session,
    ) -> BotResult<String> {
        let summary = payload_summary(&session.payload);

        if let Some(order_id) = session.order_id {
            self.repo.finalize(order_id, &summary).await?;
            tracing::info!(user_id = user.id, order_id, "Order finalized");
        }

        let mut warning = None;
        if let Err(e) = self.notify_ops(snap, user, session.order_id, &summary).await {
            tracing::warn!(
                user_id = user.id,
                order_id = session.order_id.unwrap_or_default(),
                "Ops notification failed: {}",
                e
            );
            warning = Some(snap.text("text_submit_warn", defaults::TEXT_SUBMIT_WARN));
        }

        let ok_text = snap.text("text_submit_ok", defaults::TEXT_SUBMIT_OK);
        let mut text = format!("{}\n\n{}", ok_text, summary);
        if let Some(warning) = warning {
            text.push_str("\n\n");
            text.push_str(&warning);
        }
        Ok(text)
    }

    /// 投递订单卡片与附件到运营群；目的地未配置时静默跳过
    async fn notify_ops(
        &self,
        snap: &ContentSnapshot,
        user: &UserRef,
        order_id: Option<i64>,
        summary: &str,
    ) -> BotResult<()> {
        let Some(chat_id) = snap.orders_chat_id() else {
            return Ok(());
        };

        let username_text = match user.username.as_deref() {
            Some(username) => format!("@{}", escape_html(username)),
            None => "не указан".to_string(),
        };
        let customer_link = format!(
            "<a href=\"tg://user?id={}\">{}</a>",
            user.id,
            escape_html(user.display_name())
        );

        let text = format!(
            "🆕 Заявка №{}\n\n👤 Заказчик: {}\n🔗 Username: {}\n🆔 Telegram ID: {}\n\n{}",
            order_id.unwrap_or_default(),
            customer_link,
            username_text,
            user.id,
            escape_html(summary)
        );

        self.gateway.send_html(&chat_id, &text).await?;

        if let Some(order_id) = order_id {
            for file in self.repo.list_files(order_id).await? {
                // 单个附件失败不影响其余附件
                if let Err(e) = self.forward_file(&chat_id, &file).await {
                    tracing::warn!(order_id, file_id = file.id, "File forward failed: {}", e);
                }
            }
        }

        Ok(())
    }

    async fn forward_file(&self, chat_id: &str, file: &OrderFile) -> BotResult<()> {
        let caption = file.original_name.as_deref();
        if is_image(file) {
            self.gateway
                .send_photo(chat_id, &file.telegram_file_id, caption)
                .await?;
        } else {
            self.gateway
                .send_document(chat_id, &file.telegram_file_id, caption)
                .await?;
        }
        Ok(())
    }
}

/// mime 缺失时按文件名猜测
fn is_image(file: &OrderFile) -> bool {
    if let Some(mime) = file.mime_type.as_deref() {
        return mime.starts_with("image/");
    }
    file.original_name
        .as_deref()
        .map(|name| mime_guess::from_path(name).first_or_octet_stream().type_() == mime_guess::mime::IMAGE)
        .unwrap_or(false)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(mime: Option<&str>, name: Option<&str>) -> OrderFile {
        OrderFile {
            id: 1,
            order_id: 1,
            telegram_file_id: "f".into(),
            original_name: name.map(Into::into),
            mime_type: mime.map(Into::into),
            file_size: None,
            telegram_message_id: None,
            local_path: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn image_detection_prefers_mime_then_name() {
        assert!(is_image(&file(Some("image/jpeg"), None)));
        assert!(!is_image(&file(Some("application/sla"), Some("part.jpg"))));
        assert!(is_image(&file(None, Some("фото.png"))));
        assert!(!is_image(&file(None, Some("model.stl"))));
        assert!(!is_image(&file(None, None)));
    }

    #[test]
    fn html_escaping_covers_markup_chars() {
        assert_eq!(escape_html("a<b & c>d"), "a&lt;b &amp; c&gt;d");
    }
}
