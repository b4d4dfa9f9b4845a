//! Telegram 对接层：wire 类型、HTTP 客户端与投递抽象

mod client;
mod gateway;
pub mod types;

pub use client::TelegramClient;
pub use gateway::BotGateway;
