//! 订单存储：orders / order_messages / order_files
//!
//! 订单是唯一的持久事实：会话只保留 order_id 反向引用，进程重启丢会话不丢订单。
//! 状态机 draft → new → in_work → done，canceled 可从任意非终态进入；
//! 状态只进不退（取消除外），finalize 幂等。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::{BotError, BotResult};

/// 订单状态（历史数据中的 "submitted" 按 new 的同义词解析）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    New,
    InWork,
    Done,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::New => "new",
            OrderStatus::InWork => "in_work",
            OrderStatus::Done => "done",
            OrderStatus::Canceled => "canceled",
        }
    }

    /// 运营端展示用的状态标签
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "Черновик",
            OrderStatus::New => "Новая заявка",
            OrderStatus::InWork => "В работе",
            OrderStatus::Done => "Готово",
            OrderStatus::Canceled => "Отменено",
        }
    }

    /// 正向推进序；canceled 单独处理
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Draft => 0,
            OrderStatus::New => 1,
            OrderStatus::InWork => 2,
            OrderStatus::Done => 3,
            OrderStatus::Canceled => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Done | OrderStatus::Canceled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(OrderStatus::Draft),
            // "submitted" 在旧版本中与 "new" 混用
            "new" | "submitted" => Ok(OrderStatus::New),
            "in_work" => Ok(OrderStatus::InWork),
            "done" => Ok(OrderStatus::Done),
            "canceled" => Ok(OrderStatus::Canceled),
            other => Err(BotError::InvalidStatus(other.to_string())),
        }
    }
}

/// 表单收集到的字段快照；随每次前向迁移整体覆盖写入订单
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technology: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material_custom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idea_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// 订单记录
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub branch: String,
    pub status: OrderStatus,
    pub payload: OrderPayload,
    pub summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 订单聊天流水（仅追加，读取时按时间正序返回）
#[derive(Debug, Clone, Serialize)]
pub struct OrderMessage {
    pub id: i64,
    pub order_id: i64,
    pub direction: String,
    pub message_text: String,
    pub telegram_message_id: Option<i64>,
    pub created_at: String,
}

/// 订单附件（仅追加，无去重）
#[derive(Debug, Clone, Serialize)]
pub struct OrderFile {
    pub id: i64,
    pub order_id: i64,
    pub telegram_file_id: String,
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub telegram_message_id: Option<i64>,
    pub local_path: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderStatistics {
    pub total_orders: i64,
    pub new_orders: i64,
    pub active_orders: i64,
}

pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 初始化数据库表
    pub async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                username TEXT,
                full_name TEXT,
                branch TEXT NOT NULL,
                status TEXT NOT NULL,
                order_payload TEXT NOT NULL DEFAULT '{}',
                summary TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS order_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                direction TEXT NOT NULL,
                message_text TEXT NOT NULL,
                telegram_message_id INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (order_id) REFERENCES orders(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS order_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                telegram_file_id TEXT NOT NULL,
                original_name TEXT,
                mime_type TEXT,
                file_size INTEGER,
                telegram_message_id INTEGER,
                local_path TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (order_id) REFERENCES orders(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_order_messages_order ON order_messages(order_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_order_files_order ON order_files(order_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// 创建 draft 订单，payload 为空
    pub async fn create(
        &self,
        user_id: i64,
        username: Option<&str>,
        full_name: Option<&str>,
        branch: &str,
    ) -> BotResult<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO orders (user_id, username, full_name, branch, status, order_payload, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'draft', '{}', ?, ?)",
        )
        .bind(user_id)
        .bind(username)
        .bind(full_name)
        .bind(branch)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 整体覆盖 payload 快照与渲染好的摘要
    pub async fn update_payload(
        &self,
        order_id: i64,
        payload: &OrderPayload,
        summary: Option<&str>,
    ) -> BotResult<()> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| BotError::Persistence(sqlx::Error::Encode(Box::new(e))))?;

        sqlx::query("UPDATE orders SET order_payload = ?, summary = ?, updated_at = ? WHERE id = ?")
            .bind(payload_json)
            .bind(summary)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// 刷新下单人的联系方式（每个触及订单的回合都会调用）
    pub async fn update_contact(
        &self,
        order_id: i64,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> BotResult<()> {
        sqlx::query("UPDATE orders SET username = ?, full_name = ?, updated_at = ? WHERE id = ?")
            .bind(username)
            .bind(full_name)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// draft → new，写入终版摘要；订单已过 draft 时不做任何事（幂等）
    pub async fn finalize(&self, order_id: i64, summary: &str) -> BotResult<()> {
        sqlx::query(
            "UPDATE orders SET status = 'new', summary = ?, updated_at = ?
             WHERE id = ? AND status = 'draft'",
        )
        .bind(summary)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 管理端状态变更：集合校验 + 只进不退（canceled 可从任意非终态进入）
    pub async fn update_status(&self, order_id: i64, status: &str) -> BotResult<()> {
        let target: OrderStatus = status.parse()?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;
        let current: OrderStatus = match row {
            Some(row) => row.get::<String, _>("status").parse()?,
            None => return Err(BotError::Persistence(sqlx::Error::RowNotFound)),
        };

        let allowed = if target == OrderStatus::Canceled {
            !current.is_terminal()
        } else {
            !current.is_terminal() && target.rank() >= current.rank()
        };
        if !allowed && target != current {
            return Err(BotError::InvalidStatus(format!(
                "{} -> {}",
                current, target
            )));
        }

        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(target.as_str())
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, order_id: i64) -> BotResult<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(order_from_row).transpose()
    }

    /// 订单列表，最新在前
    pub async fn list_paginated(
        &self,
        limit: i64,
        offset: i64,
        status_filter: Option<&str>,
    ) -> BotResult<Vec<Order>> {
        let rows = match status_filter {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM orders WHERE status = ?
                     ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                )
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM orders ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(order_from_row).collect()
    }

    /// 用户最近的非终态订单；没有则开一个 dialog 分支的 draft（自由文本兜底通道）
    pub async fn find_or_create_active_order(
        &self,
        user_id: i64,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> BotResult<i64> {
        let row = sqlx::query(
            "SELECT id FROM orders
             WHERE user_id = ? AND status IN ('draft', 'new', 'in_work')
             ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(row.get("id"));
        }

        self.create(user_id, username, full_name, "dialog").await
    }

    /// 追加一条聊天流水（direction: "in" | "out"）
    pub async fn add_message(
        &self,
        order_id: i64,
        direction: &str,
        text: &str,
        telegram_message_id: Option<i64>,
    ) -> BotResult<i64> {
        let result = sqlx::query(
            "INSERT INTO order_messages (order_id, direction, message_text, telegram_message_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(direction)
        .bind(text)
        .bind(telegram_message_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 最近 limit 条消息，按时间正序返回（存储按倒序取再反转）
    pub async fn list_messages(&self, order_id: i64, limit: i64) -> BotResult<Vec<OrderMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM order_messages WHERE order_id = ?
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(order_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<OrderMessage> = rows
            .into_iter()
            .map(|row| OrderMessage {
                id: row.get("id"),
                order_id: row.get("order_id"),
                direction: row.get("direction"),
                message_text: row.get("message_text"),
                telegram_message_id: row.get("telegram_message_id"),
                created_at: row.get("created_at"),
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }

    /// 登记附件
    #[allow(clippy::too_many_arguments)]
    pub async fn add_file(
        &self,
        order_id: i64,
        telegram_file_id: &str,
        original_name: Option<&str>,
        mime_type: Option<&str>,
        file_size: Option<i64>,
        telegram_message_id: Option<i64>,
        local_path: Option<&str>,
    ) -> BotResult<i64> {
        let result = sqlx::query(
            "INSERT INTO order_files
                 (order_id, telegram_file_id, original_name, mime_type, file_size, telegram_message_id, local_path, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(telegram_file_id)
        .bind(original_name)
        .bind(mime_type)
        .bind(file_size)
        .bind(telegram_message_id)
        .bind(local_path)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list_files(&self, order_id: i64) -> BotResult<Vec<OrderFile>> {
        let rows = sqlx::query(
            "SELECT * FROM order_files WHERE order_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OrderFile {
                id: row.get("id"),
                order_id: row.get("order_id"),
                telegram_file_id: row.get("telegram_file_id"),
                original_name: row.get("original_name"),
                mime_type: row.get("mime_type"),
                file_size: row.get("file_size"),
                telegram_message_id: row.get("telegram_message_id"),
                local_path: row.get("local_path"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn statistics(&self) -> BotResult<OrderStatistics> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS c FROM orders")
            .fetch_one(&self.pool)
            .await?
            .get("c");
        let new_orders: i64 = sqlx::query("SELECT COUNT(*) AS c FROM orders WHERE status = 'new'")
            .fetch_one(&self.pool)
            .await?
            .get("c");
        let active: i64 =
            sqlx::query("SELECT COUNT(*) AS c FROM orders WHERE status IN ('new', 'in_work')")
                .fetch_one(&self.pool)
                .await?
                .get("c");

        Ok(OrderStatistics {
            total_orders: total,
            new_orders,
            active_orders: active,
        })
    }
}

fn order_from_row(row: sqlx::sqlite::SqliteRow) -> BotResult<Order> {
    let status: OrderStatus = row.get::<String, _>("status").parse()?;
    let payload_json: String = row.get("order_payload");
    // 历史数据中可能有损坏的 JSON，按空 payload 处理而不是让整条查询失败
    let payload: OrderPayload = serde_json::from_str(&payload_json).unwrap_or_default();

    Ok(Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        full_name: row.get("full_name"),
        branch: row.get("branch"),
        status,
        payload,
        summary: row.get("summary"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::connect;

    async fn test_repo() -> (tempfile::TempDir, OrderRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("t.db").display());
        let pool = connect(&url).await.unwrap();
        let repo = OrderRepository::new(pool);
        repo.init_tables().await.unwrap();
        (dir, repo)
    }

    #[test]
    fn status_parsing_accepts_submitted_as_new() {
        assert_eq!("submitted".parse::<OrderStatus>().unwrap(), OrderStatus::New);
        assert_eq!("in_work".parse::<OrderStatus>().unwrap(), OrderStatus::InWork);
        assert!("unknown".parse::<OrderStatus>().is_err());
    }

    #[tokio::test]
    async fn create_starts_as_draft_with_empty_payload() {
        let (_dir, repo) = test_repo().await;

        let id = repo.create(42, Some("ivan"), Some("Иван"), "print").await.unwrap();
        let order = repo.get(id).await.unwrap().unwrap();

        assert_eq!(order.status, OrderStatus::Draft);
        assert_eq!(order.payload, OrderPayload::default());
        assert_eq!(order.branch, "print");
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let (_dir, repo) = test_repo().await;
        let id = repo.create(42, None, None, "print").await.unwrap();

        repo.finalize(id, "• Раздел: Рассчитать печать").await.unwrap();
        let first = repo.get(id).await.unwrap().unwrap();
        assert_eq!(first.status, OrderStatus::New);

        repo.finalize(id, "• Раздел: Рассчитать печать").await.unwrap();
        let second = repo.get(id).await.unwrap().unwrap();
        assert_eq!(second.status, OrderStatus::New);
        assert_eq!(second.summary, first.summary);
    }

    #[tokio::test]
    async fn finalize_does_not_regress_later_statuses() {
        let (_dir, repo) = test_repo().await;
        let id = repo.create(42, None, None, "print").await.unwrap();

        repo.finalize(id, "s").await.unwrap();
        repo.update_status(id, "in_work").await.unwrap();
        repo.finalize(id, "other").await.unwrap();

        let order = repo.get(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::InWork);
    }

    #[tokio::test]
    async fn update_status_rejects_unknown_and_backward() {
        let (_dir, repo) = test_repo().await;
        let id = repo.create(42, None, None, "scan").await.unwrap();

        assert!(matches!(
            repo.update_status(id, "garbage").await,
            Err(BotError::InvalidStatus(_))
        ));

        repo.update_status(id, "in_work").await.unwrap();
        assert!(matches!(
            repo.update_status(id, "new").await,
            Err(BotError::InvalidStatus(_))
        ));

        // canceled 可从任意非终态进入
        repo.update_status(id, "canceled").await.unwrap();
        let order = repo.get(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);

        // 终态之后不再接受变更
        assert!(repo.update_status(id, "done").await.is_err());
    }

    #[tokio::test]
    async fn payload_roundtrip_is_exact() {
        let (_dir, repo) = test_repo().await;
        let id = repo.create(42, None, None, "print").await.unwrap();

        let payload = OrderPayload {
            branch: Some("print".into()),
            technology: Some("FDM".into()),
            material: Some("PLA".into()),
            ..Default::default()
        };
        repo.update_payload(id, &payload, Some("sum")).await.unwrap();

        let order = repo.get(id).await.unwrap().unwrap();
        assert_eq!(order.payload, payload);
        assert_eq!(order.summary.as_deref(), Some("sum"));
    }

    #[tokio::test]
    async fn messages_come_back_oldest_first() {
        let (_dir, repo) = test_repo().await;
        let id = repo.create(42, None, None, "dialog").await.unwrap();

        repo.add_message(id, "in", "первое", None).await.unwrap();
        repo.add_message(id, "out", "второе", Some(10)).await.unwrap();
        repo.add_message(id, "in", "третье", None).await.unwrap();

        let messages = repo.list_messages(id, 30).await.unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.message_text.as_str()).collect();
        assert_eq!(texts, vec!["первое", "второе", "третье"]);
    }

    #[tokio::test]
    async fn find_or_create_reuses_active_order() {
        let (_dir, repo) = test_repo().await;

        let first = repo.find_or_create_active_order(7, None, Some("Пётр")).await.unwrap();
        let second = repo.find_or_create_active_order(7, None, Some("Пётр")).await.unwrap();
        assert_eq!(first, second);

        let order = repo.get(first).await.unwrap().unwrap();
        assert_eq!(order.branch, "dialog");

        // 终态之后会开新订单
        repo.update_status(first, "canceled").await.unwrap();
        let third = repo.find_or_create_active_order(7, None, None).await.unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn statistics_counts_by_status() {
        let (_dir, repo) = test_repo().await;

        let a = repo.create(1, None, None, "print").await.unwrap();
        let b = repo.create(2, None, None, "scan").await.unwrap();
        let _c = repo.create(3, None, None, "idea").await.unwrap();
        repo.finalize(a, "a").await.unwrap();
        repo.finalize(b, "b").await.unwrap();
        repo.update_status(b, "in_work").await.unwrap();

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.new_orders, 1);
        assert_eq!(stats.active_orders, 2);
    }
}
