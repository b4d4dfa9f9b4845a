//! Triform - 3D 打印工作室的 Telegram 订单机器人
//!
//! 模块划分:
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **content**: 文案 / 图片 / 开关解析（bot_config 表优先，编译内置兜底）
//! - **dispatch**: Telegram 长轮询分发器
//! - **error**: 统一错误类型
//! - **flow**: 会话状态机（分支选择、表单收集、返回导航、提交）
//! - **push**: 后端 → 用户的消息推送
//! - **server**: 管理后台 API 与内部推送接口（axum）
//! - **store**: SQLite 持久化（bot_config、orders、消息流水、附件）
//! - **submit**: 订单提交与运营群通知
//! - **telegram**: Bot API 客户端与投递抽象

pub mod config;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod flow;
pub mod push;
pub mod server;
pub mod store;
pub mod submit;
pub mod telegram;
