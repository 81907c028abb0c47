//! 订单服务
//!
//! 从 Kafka 摄取订单，校验后持久化到 PostgreSQL，并通过进程内 LRU 缓存提供低延迟的按 ID 查询。
//!
//! ## 核心功能
//!
//! - **订单校验**：结构完整性与业务规则校验，遇到第一个违规字段即返回
//! - **LRU 缓存**：容量受限的线程安全缓存，淘汰最久未使用的订单
//! - **Cache-aside 读写**：先写库再写缓存；读取未命中时回源并回填
//! - **缓存预热**：启动时从数据库加载已有订单
//! - **Kafka 摄取**：探测/消费两阶段状态机，单条消息失败不影响后续消费
//!
//! ## 模块结构
//!
//! - `models`: 订单领域模型
//! - `validation`: 订单校验规则
//! - `error`: 错误类型定义
//! - `cache`: 有界 LRU 缓存
//! - `repository`: 数据库仓储层
//! - `service`: 订单服务（缓存与存储一致性的唯一入口）
//! - `consumer`: Kafka 摄取消费者
//! - `handlers` / `routes` / `state`: HTTP 接口
//! - `test_utils`: 测试夹具与内存实现（仅在测试或启用 `test-utils` feature 时编译）

pub mod cache;
pub mod consumer;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod validation;

pub use cache::{LruOrderCache, OrderCache};
pub use consumer::{IngestionStats, OrderConsumer};
pub use error::{OrderError, Result};
pub use models::*;
pub use repository::{OrderRepository, OrderRepositoryTrait};
pub use service::OrderService;
