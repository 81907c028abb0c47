//! 订单实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{self, ValidationError};

/// 订单（聚合根）
///
/// `order_uid` 是存储、缓存和消息中唯一的键，创建后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    /// 内部签名，允许为空
    #[serde(default)]
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    /// 分片 ID，必须为正数
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// 收货信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// 支付信息
///
/// 金额类字段以最小货币单位存储。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub transaction: String,
    #[serde(default)]
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// 支付时间（Unix 秒）
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// 订单商品行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl Order {
    /// 以当前时间为基准校验订单
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_order_at(self, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_order;

    #[test]
    fn test_order_json_round_trip() {
        let order = sample_order("b563feb7b2b84b6test");

        let json = serde_json::to_string(&order).unwrap();
        let decoded: Order = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, order);
    }

    #[test]
    fn test_order_wire_field_names() {
        let value = serde_json::to_value(sample_order("b563feb7b2b84b6test")).unwrap();

        for key in [
            "order_uid",
            "track_number",
            "entry",
            "delivery",
            "payment",
            "items",
            "locale",
            "internal_signature",
            "customer_id",
            "delivery_service",
            "shardkey",
            "sm_id",
            "date_created",
            "oof_shard",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert!(value["items"][0].get("chrt_id").is_some());
        assert!(value["items"][0].get("nm_id").is_some());
        assert!(value["payment"].get("payment_dt").is_some());
    }

    #[test]
    fn test_optional_strings_default_to_empty() {
        let mut value = serde_json::to_value(sample_order("o-optional")).unwrap();
        value.as_object_mut().unwrap().remove("internal_signature");
        value["payment"].as_object_mut().unwrap().remove("request_id");

        let order: Order = serde_json::from_value(value).unwrap();
        assert_eq!(order.internal_signature, "");
        assert_eq!(order.payment.request_id, "");
    }

    #[test]
    fn test_date_created_parses_rfc3339() {
        let mut value = serde_json::to_value(sample_order("o-date")).unwrap();
        value["date_created"] = serde_json::json!("2021-11-26T06:22:19Z");

        let order: Order = serde_json::from_value(value).unwrap();
        assert_eq!(order.date_created.timestamp(), 1_637_907_739);
    }
}
