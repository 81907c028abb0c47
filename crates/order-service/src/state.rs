//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use crate::cache::OrderCache;
use crate::repository::OrderRepositoryTrait;
use crate::service::OrderService;

/// Axum 应用共享状态
///
/// HTTP 层只通过订单服务访问数据，不直接接触仓储或缓存
pub struct AppState<R, C>
where
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    pub service: Arc<OrderService<R, C>>,
}

impl<R, C> AppState<R, C>
where
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    pub fn new(service: Arc<OrderService<R, C>>) -> Self {
        Self { service }
    }
}

// 手动实现：派生 Clone 会错误地要求 R、C 本身实现 Clone
impl<R, C> Clone for AppState<R, C>
where
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}
