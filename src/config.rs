//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TRIFORM__*` 覆盖（双下划线表示嵌套，
//! 如 `TRIFORM__TELEGRAM__BOT_TOKEN=...`）。
//!
//! 注意与管理后台可编辑的 bot_config 表区分：这里是进程级设置（令牌、监听地址、
//! 数据库路径），bot_config 表是文案 / 开关 / 运营参数，后者优先。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub bot: BotSection,
}

/// [telegram] 段：Bot API 令牌与轮询参数
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    /// Bot API 基地址，便于测试时指向本地桩
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// getUpdates 长轮询等待秒数
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// 出站请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    25
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// [database] 段：SQLite 连接串
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:triform.db?mode=rwc".to_string()
}

/// [server] 段：管理后台 API 与内部推送接口
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// 管理 API 的 Bearer 令牌；未设置时放行（仅限开发环境）
    pub admin_token: Option<String>,
    /// /internal/* 的共享密钥（X-Internal-Key）；未设置时放行
    pub internal_api_key: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin_token: None,
            internal_api_key: None,
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8081".to_string()
}

/// [bot] 段：运营参数的进程级兜底（bot_config 表中的同名键优先）
#[derive(Debug, Clone, Deserialize)]
pub struct BotSection {
    /// 接收已提交订单通知的群/频道；空字符串表示不投递
    #[serde(default)]
    pub orders_chat_id: String,
    /// 步骤图片缺失时的占位图
    #[serde(default)]
    pub placeholder_photo_path: String,
    /// 附件本地镜像目录
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    /// 会话空闲超时（秒），超时后由后台任务清理
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            orders_chat_id: String::new(),
            placeholder_photo_path: String::new(),
            uploads_dir: default_uploads_dir(),
            session_timeout_secs: default_session_timeout_secs(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_session_timeout_secs() -> u64 {
    3600
}

/// 从 config 目录加载配置，环境变量 TRIFORM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TRIFORM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TRIFORM")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_any_source() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.telegram.api_base, "https://api.telegram.org");
        assert_eq!(cfg.server.listen_addr, "0.0.0.0:8081");
        assert_eq!(cfg.bot.session_timeout_secs, 3600);
        assert!(cfg.bot.orders_chat_id.is_empty());
    }
}
