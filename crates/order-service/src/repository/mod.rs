//! 数据库仓储层
//!
//! 提供订单聚合的数据访问接口，封装 SQL 操作细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不做校验，也不感知缓存
//! - 一个订单的四张表在同一事务中写入，要么全部成功要么全部回滚
//! - 定义 trait 接口以支持 mock 测试

mod order_repo;
mod traits;

pub use order_repo::OrderRepository;
pub use traits::*;
