//! 长轮询分发器：getUpdates → FlowInput → FlowEngine → 发送
//!
//! 每个 update 独立 spawn，一个用户的慢回合不阻塞别人。offset 在循环内
//! 单调推进，getUpdates 出错退避后重试，循环只在收到取消信号时退出。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::flow::{FileMeta, FlowEngine, FlowInput, UserRef};
use crate::telegram::types::{Message, Update, User};
use crate::telegram::{BotGateway, TelegramClient};

pub struct Dispatcher {
    client: Arc<TelegramClient>,
    engine: Arc<FlowEngine>,
}

impl Dispatcher {
    pub fn new(client: Arc<TelegramClient>, engine: Arc<FlowEngine>) -> Self {
        Self { client, engine }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut offset: i64 = 0;
        tracing::info!("Dispatcher started");

        loop {
            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.client.get_updates(offset) => result,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("getUpdates failed, backing off: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(3)) => continue,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let client = Arc::clone(&self.client);
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move {
                    handle_update(client, engine, update).await;
                });
            }
        }

        tracing::info!("Dispatcher stopped");
    }
}

async fn handle_update(client: Arc<TelegramClient>, engine: Arc<FlowEngine>, update: Update) {
    if let Some(message) = update.message {
        let Some(from) = message.from.clone() else {
            return;
        };
        let chat_id = message.chat.id.to_string();
        let user = user_ref(&from);
        let Some(input) = classify_message(&message) else {
            return;
        };
        let instruction = engine.handle(&user, input).await;
        if let Err(e) = client.send_step(&chat_id, &instruction).await {
            tracing::error!(user_id = user.id, "Reply send failed: {}", e);
        }
        return;
    }

    if let Some(callback) = update.callback_query {
        // 先应答再处理，按钮的加载态立刻消失
        if let Err(e) = client.answer_callback_query(&callback.id).await {
            tracing::warn!("answerCallbackQuery failed: {}", e);
        }

        let user = user_ref(&callback.from);
        let chat_id = callback
            .message
            .as_ref()
            .map(|m| m.chat.id.to_string())
            .unwrap_or_else(|| callback.from.id.to_string());
        let data = callback.data.unwrap_or_default();
        let input = FlowInput::from_callback(&data);
        let instruction = engine.handle(&user, input).await;
        if let Err(e) = client.send_step(&chat_id, &instruction).await {
            tracing::error!(user_id = user.id, "Reply send failed: {}", e);
        }
    }
}

fn user_ref(user: &User) -> UserRef {
    UserRef {
        id: user.id,
        username: user.username.clone(),
        full_name: user.full_name(),
    }
}

/// 消息分类：/start 命令、附件（document 或相册图片）、普通文本
fn classify_message(message: &Message) -> Option<FlowInput> {
    if let Some(document) = &message.document {
        return Some(FlowInput::File(FileMeta {
            file_id: document.file_id.clone(),
            file_name: document.file_name.clone(),
            mime_type: document.mime_type.clone(),
            file_size: document.file_size,
            message_id: Some(message.message_id),
        }));
    }

    if let Some(photos) = &message.photo {
        // Telegram 给同一张图的多个尺寸，取最后一个（最大）
        if let Some(largest) = photos.last() {
            return Some(FlowInput::File(FileMeta {
                file_id: largest.file_id.clone(),
                file_name: Some(format!("photo_{}.jpg", largest.file_unique_id)),
                mime_type: Some("image/jpeg".to_string()),
                file_size: largest.file_size,
                message_id: Some(message.message_id),
            }));
        }
        return None;
    }

    let text = message.text.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }
    if text == "/start" || text.starts_with("/start ") {
        return Some(FlowInput::Start);
    }
    Some(FlowInput::Text(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::types::{Chat, Document, PhotoSize};

    fn base_message() -> Message {
        Message {
            message_id: 7,
            from: None,
            chat: Chat { id: 42 },
            text: None,
            document: None,
            photo: None,
        }
    }

    #[test]
    fn start_command_is_recognized_with_payload() {
        let mut m = base_message();
        m.text = Some("/start".into());
        assert!(matches!(classify_message(&m), Some(FlowInput::Start)));

        m.text = Some("/start ref123".into());
        assert!(matches!(classify_message(&m), Some(FlowInput::Start)));
    }

    #[test]
    fn document_wins_over_text_caption() {
        let mut m = base_message();
        m.text = Some("вот файл".into());
        m.document = Some(Document {
            file_id: "doc1".into(),
            file_name: Some("model.stl".into()),
            mime_type: Some("application/sla".into()),
            file_size: Some(1024),
        });
        match classify_message(&m) {
            Some(FlowInput::File(meta)) => {
                assert_eq!(meta.file_id, "doc1");
                assert_eq!(meta.message_id, Some(7));
            }
            other => panic!("expected file input, got {:?}", other),
        }
    }

    #[test]
    fn photo_takes_largest_size_and_synthesizes_name() {
        let mut m = base_message();
        m.photo = Some(vec![
            PhotoSize {
                file_id: "small".into(),
                file_unique_id: "u1".into(),
                file_size: Some(100),
            },
            PhotoSize {
                file_id: "big".into(),
                file_unique_id: "u2".into(),
                file_size: Some(9000),
            },
        ]);
        match classify_message(&m) {
            Some(FlowInput::File(meta)) => {
                assert_eq!(meta.file_id, "big");
                assert_eq!(meta.file_name.as_deref(), Some("photo_u2.jpg"));
                assert_eq!(meta.mime_type.as_deref(), Some("image/jpeg"));
            }
            other => panic!("expected file input, got {:?}", other),
        }
    }

    #[test]
    fn blank_text_is_dropped() {
        let mut m = base_message();
        m.text = Some("   ".into());
        assert!(classify_message(&m).is_none());
    }
}
