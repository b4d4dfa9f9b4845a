//! 机器人错误类型
//!
//! FlowEngine 是整个对话面的错误边界：下层（ContentResolver / SessionStore /
//! OrderRepository）的任何错误都不允许终止用户回合，统一映射到这里的分类后
//! 按各自定义的用户可见行为处理（静默降级 / 通用重试提示 / 软警告）。

use thiserror::Error;

/// 对话服务中可能出现的错误分类
#[derive(Error, Debug)]
pub enum BotError {
    /// 配置存储读写失败：对话面就地降级到编译期默认值，管理面按服务端错误上报
    #[error("Config store unavailable: {0}")]
    ConfigUnavailable(String),

    /// 订单状态不在允许集合内，或请求了倒退的状态迁移
    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    /// 订单 / 消息 / 附件持久化失败
    #[error("Persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),

    /// 外发投递失败（通知群、推送给用户）：降级为软警告，不回滚本地状态
    #[error("Dispatch failure: {0}")]
    Dispatch(String),

    /// 未知步骤 / 无法解析的回调数据：回退到主菜单
    #[error("Unrecognized input: {0}")]
    UnrecognizedInput(String),
}

pub type BotResult<T> = Result<T, BotError>;
