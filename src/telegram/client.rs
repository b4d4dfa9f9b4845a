//! Telegram Bot API 的 HTTP 客户端（reqwest）
//!
//! 所有出站调用都带统一超时；getUpdates 单独放宽到长轮询等待 + 余量。
//! sendPhoto 支持三种来源：URL、本地文件（multipart）、平台 file_id。
//! 作为 BotGateway 的生产实现，图片步骤发送失败时回退为纯文本。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::TelegramSection;
use crate::error::{BotError, BotResult};
use crate::flow::RenderInstruction;

use super::gateway::BotGateway;
use super::types::{ApiResponse, InlineKeyboardMarkup, Message, TelegramFile, Update};

pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    poll_timeout_secs: u64,
    uploads_dir: PathBuf,
}

impl TelegramClient {
    pub fn new(
        section: &TelegramSection,
        token: String,
        uploads_dir: PathBuf,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: section.api_base.trim_end_matches('/').to_string(),
            token,
            poll_timeout_secs: section.poll_timeout_secs,
            uploads_dir,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> BotResult<T> {
        let request = self.http.post(self.method_url(method)).json(&body);
        self.execute(method, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> BotResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| BotError::Dispatch(format!("{}: {}", method, e)))?;
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| BotError::Dispatch(format!("{}: bad response: {}", method, e)))?;
        if !parsed.ok {
            return Err(BotError::Dispatch(format!(
                "{}: {}",
                method,
                parsed.description.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        parsed
            .result
            .ok_or_else(|| BotError::Dispatch(format!("{}: empty result", method)))
    }

    /// 长轮询取增量更新；offset 为上一批最大 update_id + 1
    pub async fn get_updates(&self, offset: i64) -> BotResult<Vec<Update>> {
        let request = self
            .http
            .post(self.method_url("getUpdates"))
            // 长轮询：服务端最多挂起 poll_timeout_secs，客户端超时再放宽 10 秒
            .timeout(Duration::from_secs(self.poll_timeout_secs + 10))
            .json(&json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }));
        self.execute("getUpdates", request).await
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> BotResult<()> {
        // 结果是布尔 true，丢弃即可
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_query_id }),
            )
            .await?;
        Ok(())
    }

    async fn send_message_inner(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
        parse_mode: Option<&str>,
    ) -> BotResult<i64> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)
                .map_err(|e| BotError::Dispatch(format!("sendMessage: {}", e)))?;
        }
        if let Some(mode) = parse_mode {
            body["parse_mode"] = json!(mode);
        }
        let message: Message = self.call("sendMessage", body).await?;
        Ok(message.message_id)
    }

    async fn send_photo_inner(
        &self,
        chat_id: &str,
        photo: &str,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> BotResult<i64> {
        // 本地文件走 multipart，URL 与 file_id 直接作为 photo 参数
        let is_local = !photo.starts_with("http://")
            && !photo.starts_with("https://")
            && Path::new(photo).exists();

        let message: Message = if is_local {
            let bytes = tokio::fs::read(photo)
                .await
                .map_err(|e| BotError::Dispatch(format!("sendPhoto: read {}: {}", photo, e)))?;
            let file_name = Path::new(photo)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "photo.jpg".to_string());
            let mut form = reqwest::multipart::Form::new()
                .text("chat_id", chat_id.to_string())
                .part(
                    "photo",
                    reqwest::multipart::Part::bytes(bytes).file_name(file_name),
                );
            if let Some(caption) = caption {
                form = form.text("caption", caption.to_string());
            }
            if let Some(keyboard) = keyboard {
                // multipart 中 reply_markup 以 JSON 字符串传递
                let markup = serde_json::to_string(keyboard)
                    .map_err(|e| BotError::Dispatch(format!("sendPhoto: {}", e)))?;
                form = form.text("reply_markup", markup);
            }
            let request = self.http.post(self.method_url("sendPhoto")).multipart(form);
            self.execute("sendPhoto", request).await?
        } else {
            let mut body = json!({ "chat_id": chat_id, "photo": photo });
            if let Some(caption) = caption {
                body["caption"] = json!(caption);
            }
            if let Some(keyboard) = keyboard {
                body["reply_markup"] = serde_json::to_value(keyboard)
                    .map_err(|e| BotError::Dispatch(format!("sendPhoto: {}", e)))?;
            }
            self.call("sendPhoto", body).await?
        };
        Ok(message.message_id)
    }
}

#[async_trait]
impl BotGateway for TelegramClient {
    async fn send_step(&self, chat_id: &str, instruction: &RenderInstruction) -> BotResult<i64> {
        let keyboard = instruction.keyboard().map(InlineKeyboardMarkup::from);
        if let Some(photo) = instruction.photo() {
            match self
                .send_photo_inner(chat_id, photo, Some(instruction.text()), keyboard.as_ref())
                .await
            {
                Ok(message_id) => return Ok(message_id),
                Err(e) => {
                    tracing::warn!(chat_id, photo, "Photo send failed, falling back to text: {}", e);
                }
            }
        }
        self.send_message_inner(chat_id, instruction.text(), keyboard.as_ref(), None)
            .await
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> BotResult<i64> {
        self.send_message_inner(chat_id, text, None, None).await
    }

    async fn send_html(&self, chat_id: &str, text: &str) -> BotResult<i64> {
        self.send_message_inner(chat_id, text, None, Some("HTML"))
            .await
    }

    async fn send_photo(&self, chat_id: &str, photo: &str, caption: Option<&str>) -> BotResult<i64> {
        self.send_photo_inner(chat_id, photo, caption, None).await
    }

    async fn send_document(
        &self,
        chat_id: &str,
        file_ref: &str,
        caption: Option<&str>,
    ) -> BotResult<i64> {
        let mut body = json!({ "chat_id": chat_id, "document": file_ref });
        if let Some(caption) = caption {
            body["caption"] = json!(caption);
        }
        let message: Message = self.call("sendDocument", body).await?;
        Ok(message.message_id)
    }

    async fn download_attachment(&self, file_id: &str, dest_name: &str) -> Option<PathBuf> {
        let result: BotResult<PathBuf> = async {
            let file: TelegramFile = self
                .call("getFile", json!({ "file_id": file_id }))
                .await?;
            let file_path = file
                .file_path
                .ok_or_else(|| BotError::Dispatch("getFile: no file_path".to_string()))?;

            let response = self
                .http
                .get(self.file_url(&file_path))
                .send()
                .await
                .map_err(|e| BotError::Dispatch(format!("file download: {}", e)))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| BotError::Dispatch(format!("file download: {}", e)))?;

            tokio::fs::create_dir_all(&self.uploads_dir)
                .await
                .map_err(|e| BotError::Dispatch(format!("uploads dir: {}", e)))?;
            let dest = self.uploads_dir.join(dest_name);
            tokio::fs::write(&dest, &bytes)
                .await
                .map_err(|e| BotError::Dispatch(format!("write {}: {}", dest.display(), e)))?;
            Ok(dest)
        }
        .await;

        match result {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(file_id, "Attachment mirror failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TelegramClient {
        let section = TelegramSection {
            bot_token: None,
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 25,
            request_timeout_secs: 15,
        };
        TelegramClient::new(&section, "123:ABC".to_string(), PathBuf::from("uploads")).unwrap()
    }

    #[test]
    fn urls_embed_token_and_method() {
        let c = client();
        assert_eq!(
            c.method_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
        assert_eq!(
            c.file_url("documents/file_1.stl"),
            "https://api.telegram.org/file/bot123:ABC/documents/file_1.stl"
        );
    }
}
