//! 会话存储：每个用户一个进行中的表单会话，仅驻内存
//!
//! 进程重启即丢——未提交的表单重填成本低，已提交的订单在 SQLite 里。
//! 平台保证同一用户的更新串行送达，会话无需行内锁；不同用户并发访问
//! 走同一张 RwLock 表，持锁时间只有取出/放回两次哈希操作。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::store::OrderPayload;

use super::step::{Branch, Step, WaitingField};

/// 单个用户的表单会话
#[derive(Debug, Clone)]
pub struct Session {
    /// 关联订单；about/主菜单阶段为 None（订单只在进入表单分支时创建）
    pub order_id: Option<i64>,
    pub branch: Option<Branch>,
    /// 已回答字段的累积快照
    pub payload: OrderPayload,
    pub current_step: Step,
    /// 已访问步骤栈，「Назад」按其弹出；main_menu 不入栈
    pub history: Vec<Step>,
    /// 下一条自由文本/附件要填充的字段
    pub waiting_for: Option<WaitingField>,
    pub last_active: Instant,
}

impl Session {
    pub fn new() -> Self {
        Self {
            order_id: None,
            branch: None,
            payload: OrderPayload::default(),
            current_step: Step::MainMenu,
            history: Vec::new(),
            waiting_for: None,
            last_active: Instant::now(),
        }
    }

    /// 前向迁移：当前步骤入栈（main_menu 除外），按目标步骤设置 waiting
    pub fn advance(&mut self, next: Step) {
        if self.current_step != Step::MainMenu {
            self.history.push(self.current_step);
        }
        self.current_step = next;
        self.waiting_for = next.waiting_field();
        self.touch();
    }

    /// 「Назад」：弹栈回上一步；栈空时回主菜单（返回 None）
    pub fn go_back(&mut self) -> Option<Step> {
        let prev = self.history.pop();
        if let Some(step) = prev {
            self.current_step = step;
            self.waiting_for = step.waiting_field();
        }
        self.touch();
        prev
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_active.elapsed() > timeout
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// 用户 ID → 会话 的内存表
pub struct SessionStore {
    sessions: RwLock<HashMap<i64, Session>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 取用户会话的副本；不存在时返回全新会话
    pub async fn get(&self, user_id: i64) -> Session {
        self.sessions
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 放回处理完的会话
    pub async fn replace(&self, user_id: i64, session: Session) {
        self.sessions.write().await.insert(user_id, session);
    }

    /// 清会话（回主菜单 / 提交后）
    pub async fn clear(&self, user_id: i64) {
        self.sessions.write().await.remove(&user_id);
    }

    /// 清理空闲超时的会话，返回清掉的数量
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.timeout));
        before - sessions.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_creates_fresh_session() {
        let store = SessionStore::new(3600);
        let session = store.get(1).await;
        assert_eq!(session.current_step, Step::MainMenu);
        assert!(session.order_id.is_none());
        // 读取不落表
        assert_eq!(store.active_count().await, 0);
    }

    #[tokio::test]
    async fn replace_and_clear() {
        let store = SessionStore::new(3600);

        let mut session = Session::new();
        session.order_id = Some(5);
        session.advance(Step::PrintTech);
        store.replace(1, session).await;

        let loaded = store.get(1).await;
        assert_eq!(loaded.order_id, Some(5));
        assert_eq!(loaded.current_step, Step::PrintTech);

        store.clear(1).await;
        assert!(store.get(1).await.order_id.is_none());
    }

    #[test]
    fn history_round_trip_returns_to_main_menu() {
        let mut session = Session::new();
        session.advance(Step::PrintTech); // main_menu 不入栈
        session.advance(Step::PrintMaterial);
        session.advance(Step::AttachFile);
        assert_eq!(session.history, vec![Step::PrintTech, Step::PrintMaterial]);

        assert_eq!(session.go_back(), Some(Step::PrintMaterial));
        assert_eq!(session.go_back(), Some(Step::PrintTech));
        assert_eq!(session.go_back(), None);
        assert!(session.history.is_empty());
    }

    #[test]
    fn waiting_follows_step() {
        let mut session = Session::new();
        session.advance(Step::PrintTech);
        assert!(session.waiting_for.is_none());

        session.advance(Step::PrintMaterialCustom);
        assert_eq!(session.waiting_for, Some(WaitingField::MaterialCustom));

        session.advance(Step::DescribeTask);
        assert_eq!(session.waiting_for, Some(WaitingField::Description));

        assert_eq!(session.go_back(), Some(Step::PrintMaterialCustom));
        assert_eq!(session.waiting_for, Some(WaitingField::MaterialCustom));
    }

    #[tokio::test]
    async fn cleanup_removes_idle_sessions() {
        let store = SessionStore::new(0);
        store.replace(1, Session::new()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.cleanup_expired().await, 1);
        assert_eq!(store.active_count().await, 0);
    }
}
