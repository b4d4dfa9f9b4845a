//! 投递能力抽象：流程层只通过这个 trait 触达 Telegram
//!
//! chat_id 统一用字符串：用户聊天是数字，通知群可能是 @username 或 -100… 形式。
//! 图片发送失败回退纯文本的策略在实现侧，流程层不感知。

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::BotResult;
use crate::flow::RenderInstruction;

#[async_trait]
pub trait BotGateway: Send + Sync {
    /// 发送一条渲染指令，返回平台消息 ID
    async fn send_step(&self, chat_id: &str, instruction: &RenderInstruction) -> BotResult<i64>;

    /// 纯文本
    async fn send_text(&self, chat_id: &str, text: &str) -> BotResult<i64>;

    /// HTML 文本（通知群的订单卡片用，含客户链接）
    async fn send_html(&self, chat_id: &str, text: &str) -> BotResult<i64>;

    /// 图片：URL / 本地路径 / 平台 file_id 均可
    async fn send_photo(&self, chat_id: &str, photo: &str, caption: Option<&str>) -> BotResult<i64>;

    /// 文档（按平台 file_id 转发）
    async fn send_document(
        &self,
        chat_id: &str,
        file_ref: &str,
        caption: Option<&str>,
    ) -> BotResult<i64>;

    /// 尽力把上传的附件镜像到本地；失败只记日志并返回 None
    async fn download_attachment(&self, file_id: &str, dest_name: &str) -> Option<PathBuf>;
}
