//! 订单服务
//!
//! 缓存与存储一致性的唯一执行点：
//!
//! - 写：先持久化，成功后才写入缓存（write-through），失败时缓存保持不变
//! - 读：cache-aside，命中直接返回；未命中回源数据库并回填
//! - 预热：启动时从数据库批量装载订单
//!
//! 存储是唯一的事实来源，缓存只是尽力而为的加速层。
//! 缓存锁只在 `OrderCache` 内部持有，任何数据库调用都不会发生在锁内。

use std::sync::Arc;

use order_shared::observability::metrics;
use tracing::{debug, info, instrument, warn};

use crate::cache::OrderCache;
use crate::error::{OrderError, Result};
use crate::models::Order;
use crate::repository::OrderRepositoryTrait;

/// 订单服务
pub struct OrderService<R, C>
where
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    repo: Arc<R>,
    cache: Arc<C>,
}

impl<R, C> OrderService<R, C>
where
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    pub fn new(repo: Arc<R>, cache: Arc<C>) -> Self {
        Self { repo, cache }
    }

    /// 缓存句柄（用于诊断与测试）
    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// 创建订单
    ///
    /// 调用方负责校验。存储错误（包括重复订单）原样返回，且不会触碰缓存；
    /// 存储成功后总是覆盖同 ID 的缓存条目。
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    pub async fn create_order(&self, order: Order) -> Result<()> {
        self.repo.insert_order(&order).await?;

        let order_uid = order.order_uid.clone();
        self.cache.set(&order_uid, Arc::new(order));

        info!(order_uid = %order_uid, "订单已保存并写入缓存");
        Ok(())
    }

    /// 查询订单
    ///
    /// 缓存命中时不访问数据库；数据库中也不存在时返回 NotFound 且不回填缓存；
    /// 其他存储错误包装为带订单号的 Lookup 错误。
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_uid: &str) -> Result<Arc<Order>> {
        if let Some(order) = self.cache.get(order_uid) {
            debug!("缓存命中");
            return Ok(order);
        }

        match self.repo.get_order(order_uid).await {
            Ok(order) => {
                let order = Arc::new(order);
                self.cache.set(order_uid, Arc::clone(&order));
                debug!("缓存未命中，已从数据库回填");
                Ok(order)
            }
            Err(OrderError::NotFound(_)) => Err(OrderError::NotFound(order_uid.to_string())),
            Err(e) => Err(OrderError::Lookup {
                order_uid: order_uid.to_string(),
                source: Box::new(e),
            }),
        }
    }

    /// 从数据库预热缓存，返回装载的订单数
    ///
    /// 订单号按创建时间倒序返回，最多装载缓存容量条；单个订单读取失败只记录日志并跳过，
    /// 只有列举订单号失败时才返回错误。装载时从旧到新写入，使最新订单处于最近使用端。
    #[instrument(skip(self))]
    pub async fn load_cache(&self) -> Result<usize> {
        let ids = self.repo.list_order_ids().await?;
        let capacity = self.cache.capacity();

        info!(total = ids.len(), capacity, "开始预热订单缓存");

        let mut loaded = Vec::with_capacity(capacity.min(ids.len()));
        let mut failed = 0usize;
        for order_uid in &ids {
            if loaded.len() >= capacity {
                break;
            }
            match self.repo.get_order(order_uid).await {
                Ok(order) => loaded.push(order),
                Err(e) => {
                    failed += 1;
                    warn!(order_uid = %order_uid, error = %e, "预热时读取订单失败，已跳过");
                }
            }
        }

        let count = loaded.len();
        for order in loaded.into_iter().rev() {
            let order_uid = order.order_uid.clone();
            self.cache.set(&order_uid, Arc::new(order));
        }

        metrics::set_cache_warmed_entries(count);
        info!(loaded = count, failed, "订单缓存预热完成");
        Ok(count)
    }
}
