//! 持久化层：SQLite（sqlx）
//!
//! - **config_store**: bot_config 键值表（文案 / 图片 / 开关 / 运营参数）
//! - **orders**: 订单、订单消息流水、订单附件
//!
//! 所有共享可变状态只通过这里的具名操作访问（状态单调性、键唯一性等不变量
//! 集中在此处保证），流程层不写裸 SQL。

mod config_store;
mod orders;

pub use config_store::ConfigStore;
pub use orders::{
    Order, OrderFile, OrderMessage, OrderPayload, OrderRepository, OrderStatistics, OrderStatus,
};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// 建立 SQLite 连接池
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}
