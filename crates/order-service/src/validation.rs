//! 订单校验
//!
//! 纯函数集合，不持有状态、不做 I/O。校验顺序固定：
//! 订单字段 -> 收货信息 -> 支付信息 -> 商品列表（先判空，再逐项校验），
//! 遇到第一个违规字段即返回，错误中携带限定字段路径（如 `delivery.phone`、`items[2].price`）。

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::models::{Delivery, Item, Order, Payment};

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9\s\-\(\)]{6,19}$").unwrap());
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w._%+\-]+@[\w.\-]+\.[A-Za-z]{2,}$").unwrap());
static ZIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4,10}$").unwrap());
static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());
static PROVIDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{2,}$").unwrap());
static BANK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\s-]{2,50}$").unwrap());

/// 支付时间允许超前于当前时间的最大幅度
const MAX_PAYMENT_CLOCK_SKEW_HOURS: i64 = 24;

/// 校验失败：指明违规字段及原因
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 为字段名加上父级路径前缀
    fn within(self, parent: &str) -> Self {
        Self {
            field: format!("{parent}.{}", self.field),
            reason: self.reason,
        }
    }
}

type Result<T = ()> = std::result::Result<T, ValidationError>;

/// 以给定时间为基准校验订单
///
/// `now` 仅用于支付时间的"不得晚于当前时间 24 小时"规则。
pub fn validate_order_at(order: &Order, now: DateTime<Utc>) -> Result {
    required("order_uid", &order.order_uid)?;
    required("track_number", &order.track_number)?;
    required("entry", &order.entry)?;
    required("locale", &order.locale)?;
    required("customer_id", &order.customer_id)?;
    required("delivery_service", &order.delivery_service)?;
    required("shardkey", &order.shardkey)?;
    if order.sm_id <= 0 {
        return Err(ValidationError::new("sm_id", "必须为正数"));
    }
    required("oof_shard", &order.oof_shard)?;

    validate_delivery(&order.delivery).map_err(|e| e.within("delivery"))?;
    validate_payment(&order.payment, now).map_err(|e| e.within("payment"))?;

    if order.items.is_empty() {
        return Err(ValidationError::new("items", "订单至少包含一个商品"));
    }
    for (idx, item) in order.items.iter().enumerate() {
        validate_item(item).map_err(|e| e.within(&format!("items[{idx}]")))?;
    }

    Ok(())
}

/// 收货信息：先检查必填，再检查格式
pub fn validate_delivery(delivery: &Delivery) -> Result {
    required("name", &delivery.name)?;
    required("phone", &delivery.phone)?;
    required("zip", &delivery.zip)?;
    required("city", &delivery.city)?;
    required("address", &delivery.address)?;
    required("region", &delivery.region)?;
    required("email", &delivery.email)?;

    matches("phone", &delivery.phone, &PHONE_RE)?;
    matches("email", &delivery.email, &EMAIL_RE)?;
    matches("zip", &delivery.zip, &ZIP_RE)?;

    Ok(())
}

pub fn validate_payment(payment: &Payment, now: DateTime<Utc>) -> Result {
    required("transaction", &payment.transaction)?;
    matches("currency", &payment.currency, &CURRENCY_RE)?;
    required("provider", &payment.provider)?;
    matches("provider", &payment.provider, &PROVIDER_RE)?;

    if payment.amount <= 0 {
        return Err(ValidationError::new("amount", "必须为正数"));
    }
    non_negative("delivery_cost", payment.delivery_cost)?;
    non_negative("goods_total", payment.goods_total)?;
    non_negative("custom_fee", payment.custom_fee)?;

    if payment.payment_dt <= 0 {
        return Err(ValidationError::new("payment_dt", "必须为正数"));
    }
    let latest = now + Duration::hours(MAX_PAYMENT_CLOCK_SKEW_HOURS);
    if payment.payment_dt > latest.timestamp() {
        return Err(ValidationError::new("payment_dt", "支付时间不能晚于当前时间 24 小时"));
    }

    required("bank", &payment.bank)?;
    matches("bank", &payment.bank, &BANK_RE)?;

    Ok(())
}

pub fn validate_item(item: &Item) -> Result {
    if item.chrt_id == 0 {
        return Err(ValidationError::new("chrt_id", "不能为 0"));
    }
    required("track_number", &item.track_number)?;
    if item.price <= 0 {
        return Err(ValidationError::new("price", "必须为正数"));
    }
    required("rid", &item.rid)?;
    required("name", &item.name)?;
    if item.sale < 0 {
        return Err(ValidationError::new("sale", "不能为负数"));
    }
    required("size", &item.size)?;
    if item.total_price <= 0 {
        return Err(ValidationError::new("total_price", "必须为正数"));
    }
    if item.nm_id == 0 {
        return Err(ValidationError::new("nm_id", "不能为 0"));
    }
    required("brand", &item.brand)?;
    if item.status <= 0 {
        return Err(ValidationError::new("status", "必须为正数"));
    }

    Ok(())
}

fn required(field: &str, value: &str) -> Result {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "不能为空"));
    }
    Ok(())
}

fn matches(field: &str, value: &str, re: &Regex) -> Result {
    if !re.is_match(value) {
        return Err(ValidationError::new(field, format!("格式不正确: {value}")));
    }
    Ok(())
}

fn non_negative(field: &str, value: i64) -> Result {
    if value < 0 {
        return Err(ValidationError::new(field, "不能为负数"));
    }
    Ok(())
}
