//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Order;

/// 订单存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepositoryTrait: Send + Sync {
    /// 原子写入订单及其收货、支付、商品信息；主键冲突时返回 `OrderError::Conflict`
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// 完整重建订单；不存在时返回 `OrderError::NotFound`
    async fn get_order(&self, order_uid: &str) -> Result<Order>;

    /// 列出全部订单号（按创建时间倒序），仅用于缓存预热
    async fn list_order_ids(&self) -> Result<Vec<String>>;
}
