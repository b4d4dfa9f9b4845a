//! 管理后台 API 的路由级测试
//!
//! 不起监听端口，直接对 Router 发请求（tower oneshot）。覆盖鉴权、
//! 状态迁移校验、取消订单的回复拦截与内部推送的成败区分。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::util::ServiceExt;

use triform::error::{BotError, BotResult};
use triform::flow::RenderInstruction;
use triform::push::PushService;
use triform::server::{create_router, ServerState};
use triform::store::{self, ConfigStore, OrderRepository};
use triform::telegram::BotGateway;

/// 最小网关桩；fail_send 模拟用户不可达
struct StubGateway {
    fail_send: bool,
}

#[async_trait]
impl BotGateway for StubGateway {
    async fn send_step(&self, _: &str, _: &RenderInstruction) -> BotResult<i64> {
        Ok(1)
    }

    async fn send_text(&self, _: &str, _: &str) -> BotResult<i64> {
        if self.fail_send {
            return Err(BotError::Dispatch("user unreachable".to_string()));
        }
        Ok(2)
    }

    async fn send_html(&self, _: &str, _: &str) -> BotResult<i64> {
        Ok(3)
    }

    async fn send_photo(&self, _: &str, _: &str, _: Option<&str>) -> BotResult<i64> {
        Ok(4)
    }

    async fn send_document(&self, _: &str, _: &str, _: Option<&str>) -> BotResult<i64> {
        Ok(5)
    }

    async fn download_attachment(&self, _: &str, _: &str) -> Option<PathBuf> {
        None
    }
}

struct Api {
    _dir: tempfile::TempDir,
    router: Router,
    repo: Arc<OrderRepository>,
}

async fn api(
    admin_token: Option<&str>,
    internal_key: Option<&str>,
    fail_send: bool,
) -> Api {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("api.db").display());
    let pool = store::connect(&url).await.unwrap();

    let config_store = Arc::new(ConfigStore::new(pool.clone()));
    config_store.init_tables().await.unwrap();
    let repo = Arc::new(OrderRepository::new(pool));
    repo.init_tables().await.unwrap();

    let gateway = Arc::new(StubGateway { fail_send });
    let push = Arc::new(PushService::new(
        Arc::clone(&repo),
        gateway as Arc<dyn BotGateway>,
    ));

    let state = Arc::new(ServerState {
        config_store,
        repo: Arc::clone(&repo),
        push,
        admin_token: admin_token.map(Into::into),
        internal_api_key: internal_key.map(Into::into),
    });

    Api {
        _dir: dir,
        router: create_router(state),
        repo,
    }
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn reply_to_canceled_order_is_rejected() {
    let api = api(None, None, false).await;

    let order_id = api.repo.create(1, None, None, "print").await.unwrap();
    api.repo.finalize(order_id, "s").await.unwrap();
    api.repo.update_status(order_id, "canceled").await.unwrap();

    let response = api
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/orders/{}/messages", order_id),
            r#"{"text":"Мы вернёмся к вам"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // 取消的订单不产生流水
    let messages = api.repo.list_messages(order_id, 10).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn missing_order_is_404() {
    let api = api(None, None, false).await;

    let response = api
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/orders/9999/messages",
            r#"{"text":"есть кто?"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api
        .router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/orders/9999",
            r#"{"status":"done"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_transitions_are_validated_over_http() {
    let api = api(None, None, false).await;

    let order_id = api.repo.create(2, None, None, "scan").await.unwrap();
    api.repo.finalize(order_id, "s").await.unwrap();
    api.repo.update_status(order_id, "done").await.unwrap();

    // 词汇表之外的状态
    let response = api
        .router
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/orders/{}", order_id),
            r#"{"status":"archived"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // 终态之后不允许倒退
    let response = api
        .router
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/orders/{}", order_id),
            r#"{"status":"in_work"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_token_guards_api_routes() {
    let api = api(Some("secret"), None, false).await;

    let bare = Request::builder()
        .uri("/api/bot-config")
        .body(Body::empty())
        .unwrap();
    let response = api.router.clone().oneshot(bare).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let authed = Request::builder()
        .uri("/api/bot-config")
        .header("authorization", "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let response = api.router.clone().oneshot(authed).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn internal_push_distinguishes_delivery_outcomes() {
    let api = api(None, Some("key1"), false).await;

    let order_id = api.repo.create(3, None, None, "idea").await.unwrap();

    // 密钥错误
    let mut request = json_request(
        "POST",
        "/internal/sendMessage",
        r#"{"user_id":3,"text":"готово","order_id":null}"#,
    );
    request
        .headers_mut()
        .insert("X-Internal-Key", "wrong".parse().unwrap());
    let response = api.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // 投递成功：200 + out 流水
    let mut request = json_request(
        "POST",
        "/internal/sendMessage",
        &format!(r#"{{"user_id":3,"text":"Ваш заказ готов","order_id":{}}}"#, order_id),
    );
    request
        .headers_mut()
        .insert("X-Internal-Key", "key1".parse().unwrap());
    let response = api.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let messages = api.repo.list_messages(order_id, 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].direction, "out");

    // 投递失败：400，流水不增长
    let api = api_failing().await;
    let order_id = api.repo.create(4, None, None, "print").await.unwrap();
    let request = json_request(
        "POST",
        "/internal/sendMessage",
        &format!(r#"{{"user_id":4,"text":"привет","order_id":{}}}"#, order_id),
    );
    let response = api.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(api.repo.list_messages(order_id, 10).await.unwrap().is_empty());
}

async fn api_failing() -> Api {
    api(None, None, true).await
}
