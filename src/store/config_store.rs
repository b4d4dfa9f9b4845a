//! bot_config 键值存储
//!
//! 管理后台直接读写的字符串键值表。键按命名约定分四类：文案（text_* / btn_* /
//! *_text）、图片引用（photo_*）、功能开关（enabled_*）、运营参数
//! （orders_chat_id 等）。写入为 upsert，后写覆盖并刷新 updated_at。

use std::collections::HashMap;

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

pub struct ConfigStore {
    pool: SqlitePool,
}

impl ConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 初始化数据库表
    pub async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS bot_config (
                config_key TEXT PRIMARY KEY,
                config_value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 读取全部配置键值
    pub async fn get_all(&self) -> Result<HashMap<String, String>, sqlx::Error> {
        let rows = sqlx::query("SELECT config_key, config_value FROM bot_config")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("config_key"), row.get("config_value")))
            .collect())
    }

    /// 写入单个键（upsert，后写覆盖）
    pub async fn set(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO bot_config (config_key, config_value, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(config_key) DO UPDATE SET
                 config_value = excluded.config_value,
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 批量写入
    pub async fn set_many(&self, values: &HashMap<String, String>) -> Result<(), sqlx::Error> {
        for (key, value) in values {
            self.set(key, value).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::connect;

    async fn test_store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("t.db").display());
        let pool = connect(&url).await.unwrap();
        let store = ConfigStore::new(pool);
        store.init_tables().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn set_is_upsert_last_write_wins() {
        let (_dir, store) = test_store().await;

        store.set("welcome_menu_msg", "Привет").await.unwrap();
        store.set("welcome_menu_msg", "Здравствуйте").await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.get("welcome_menu_msg").unwrap(), "Здравствуйте");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn set_many_writes_every_key() {
        let (_dir, store) = test_store().await;

        let mut values = HashMap::new();
        values.insert("enabled_menu_print".to_string(), "0".to_string());
        values.insert("btn_menu_print".to_string(), "Печать".to_string());
        store.set_many(&values).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.get("enabled_menu_print").unwrap(), "0");
        assert_eq!(all.get("btn_menu_print").unwrap(), "Печать");
    }
}
