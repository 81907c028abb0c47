//! 订单领域模型
//!
//! Order 为聚合根，拥有恰好一个 Delivery、一个 Payment 以及非空的 Item 列表。
//! 线上 JSON 格式与数据库列名保持一致（snake_case）。

mod order;

pub use order::{Delivery, Item, Order, Payment};
