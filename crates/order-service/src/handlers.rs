//! 订单 API 处理器
//!
//! 请求层只调用订单服务，不直接访问缓存或数据库。

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::cache::OrderCache;
use crate::error::OrderError;
use crate::models::Order;
use crate::repository::OrderRepositoryTrait;
use crate::state::AppState;

/// 创建订单
///
/// POST /order
///
/// 请求体格式错误或校验失败返回 400，订单已存在返回 409。
pub async fn create_order<R, C>(
    State(state): State<AppState<R, C>>,
    payload: Result<Json<Order>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), OrderError>
where
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    let Json(order) = payload.map_err(|rejection| OrderError::Validation {
        field: "body".to_string(),
        reason: rejection.body_text(),
    })?;

    order.validate()?;
    state.service.create_order(order).await?;

    Ok((StatusCode::CREATED, Json(json!({ "status": "ok" }))))
}

/// 按订单号查询订单
///
/// GET /order/{order_uid}
pub async fn get_order<R, C>(
    State(state): State<AppState<R, C>>,
    Path(order_uid): Path<String>,
) -> Result<Response, OrderError>
where
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    let order = state.service.get_order(&order_uid).await?;
    Ok(Json(order.as_ref()).into_response())
}

/// 存活探针
///
/// GET /ping
pub async fn ping() -> &'static str {
    "pong"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::cache::LruOrderCache;
    use crate::routes::build_router;
    use crate::service::OrderService;
    use crate::state::AppState;
    use crate::test_utils::{InMemoryOrderStore, sample_order};

    use super::*;

    fn app(store: Arc<InMemoryOrderStore>) -> axum::Router {
        let service = Arc::new(OrderService::new(store, Arc::new(LruOrderCache::new(10))));
        build_router(AppState::new(service), Duration::from_secs(5))
    }

    fn post_order(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/order")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let response = app(Arc::new(InMemoryOrderStore::new()))
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"pong");
    }

    #[tokio::test]
    async fn test_create_then_get_order() {
        let store = Arc::new(InMemoryOrderStore::new());
        let app = app(Arc::clone(&store));
        let order = sample_order("b563feb7b2b84b6test");

        let response = app
            .clone()
            .oneshot(post_order(serde_json::to_string(&order).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/order/b563feb7b2b84b6test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let fetched: Order = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(fetched, order);
        // 写入时已进入缓存，读取不再访问存储
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_duplicate_returns_conflict() {
        let store = Arc::new(InMemoryOrderStore::with_orders([sample_order("o1")]));
        let response = app(store)
            .oneshot(post_order(serde_json::to_string(&sample_order("o1")).unwrap()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["code"], "ORDER_ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_create_invalid_order_returns_bad_request() {
        let store = Arc::new(InMemoryOrderStore::new());
        let mut order = sample_order("o1");
        order.payment.currency = "dollars".to_string();

        let response = app(Arc::clone(&store))
            .oneshot(post_order(serde_json::to_string(&order).unwrap()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["message"].as_str().unwrap().contains("payment.currency"));
        assert_eq!(store.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_malformed_json_returns_bad_request() {
        let response = app(Arc::new(InMemoryOrderStore::new()))
            .oneshot(post_order("{\"order_uid\": ".to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_store_failure_returns_internal_error() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.set_fail_inserts(true);

        let response = app(store)
            .oneshot(post_order(serde_json::to_string(&sample_order("o1")).unwrap()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_get_missing_order_returns_not_found() {
        let response = app(Arc::new(InMemoryOrderStore::new()))
            .oneshot(Request::builder().uri("/order/ghost").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "ORDER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_get_store_error_returns_internal_error() {
        let store = Arc::new(InMemoryOrderStore::with_orders([sample_order("o1")]));
        store.fail_get_for("o1");

        let response = app(store)
            .oneshot(Request::builder().uri("/order/o1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], "ORDER_LOOKUP_FAILED");
    }
}
