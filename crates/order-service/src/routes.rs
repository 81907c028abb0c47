//! 路由配置模块

use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use order_shared::observability::middleware as obs_middleware;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;

use crate::cache::OrderCache;
use crate::handlers;
use crate::repository::OrderRepositoryTrait;
use crate::state::AppState;

/// 订单相关路由
pub fn order_routes<R, C>() -> Router<AppState<R, C>>
where
    R: OrderRepositoryTrait + 'static,
    C: OrderCache + 'static,
{
    Router::new()
        .route("/order", post(handlers::create_order::<R, C>))
        .route("/order/{order_uid}", get(handlers::get_order::<R, C>))
        .route("/ping", get(handlers::ping))
}

/// 组装完整的 HTTP 应用
pub fn build_router<R, C>(state: AppState<R, C>, request_timeout: Duration) -> Router
where
    R: OrderRepositoryTrait + 'static,
    C: OrderCache + 'static,
{
    order_routes()
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
