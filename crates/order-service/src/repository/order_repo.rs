//! 订单仓储
//!
//! 订单聚合拆分存储在 orders、delivery、payment、items 四张表中，均以 order_uid 关联。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::traits::OrderRepositoryTrait;
use crate::error::{OrderError, Result};
use crate::models::{Delivery, Item, Order, Payment};

/// 订单、收货与支付信息的联表查询结果
#[derive(sqlx::FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
    // delivery
    delivery_name: String,
    phone: String,
    zip: String,
    city: String,
    address: String,
    region: String,
    email: String,
    // payment
    transaction: String,
    request_id: String,
    currency: String,
    provider: String,
    amount: i64,
    payment_dt: i64,
    bank: String,
    delivery_cost: i64,
    goods_total: i64,
    custom_fee: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: Delivery {
                name: self.delivery_name,
                phone: self.phone,
                zip: self.zip,
                city: self.city,
                address: self.address,
                region: self.region,
                email: self.email,
            },
            payment: Payment {
                transaction: self.transaction,
                request_id: self.request_id,
                currency: self.currency,
                provider: self.provider,
                amount: self.amount,
                payment_dt: self.payment_dt,
                bank: self.bank,
                delivery_cost: self.delivery_cost,
                goods_total: self.goods_total,
                custom_fee: self.custom_fee,
            },
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

/// 订单仓储
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在单个事务中写入订单聚合
    ///
    /// 任一步失败时事务随 `tx` 被 drop 而回滚，不会留下部分写入。
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    pub async fn insert_order(&self, order: &Order) -> Result<()> {
        let uid = &order.order_uid;
        let mut tx = self.pool.begin().await?;

        // 1. 订单主表：主键冲突即视为重复订单
        sqlx::query(
            r#"
            INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature,
                                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, uid))?;

        // 2. 收货信息
        let d = &order.delivery;
        sqlx::query(
            r#"
            INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(uid)
        .bind(&d.name)
        .bind(&d.phone)
        .bind(&d.zip)
        .bind(&d.city)
        .bind(&d.address)
        .bind(&d.region)
        .bind(&d.email)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, uid))?;

        // 3. 支付信息
        let p = &order.payment;
        sqlx::query(
            r#"
            INSERT INTO payment (order_uid, transaction, request_id, currency, provider, amount,
                                 payment_dt, bank, delivery_cost, goods_total, custom_fee)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(uid)
        .bind(&p.transaction)
        .bind(&p.request_id)
        .bind(&p.currency)
        .bind(&p.provider)
        .bind(p.amount)
        .bind(p.payment_dt)
        .bind(&p.bank)
        .bind(p.delivery_cost)
        .bind(p.goods_total)
        .bind(p.custom_fee)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, uid))?;

        // 4. 商品行，按原始顺序写入
        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO items (order_uid, chrt_id, track_number, price, rid, name, sale,
                                   size, total_price, nm_id, brand, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(uid)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(items = order.items.len(), "订单已写入数据库");
        Ok(())
    }

    /// 完整重建订单
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_uid: &str) -> Result<Order> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
                   o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created,
                   o.oof_shard,
                   d.name AS delivery_name, d.phone, d.zip, d.city, d.address, d.region, d.email,
                   p.transaction, p.request_id, p.currency, p.provider, p.amount, p.payment_dt,
                   p.bank, p.delivery_cost, p.goods_total, p.custom_fee
            FROM orders o
            JOIN delivery d ON d.order_uid = o.order_uid
            JOIN payment p ON p.order_uid = o.order_uid
            WHERE o.order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| OrderError::NotFound(order_uid.to_string()))?;

        let items = sqlx::query_as::<_, Item>(
            r#"
            SELECT chrt_id, track_number, price, rid, name, sale, size,
                   total_price, nm_id, brand, status
            FROM items
            WHERE order_uid = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_uid)
        .fetch_all(&self.pool)
        .await?;

        Ok(row.into_order(items))
    }

    /// 列出全部订单号，最新的订单排在前面，预热时优先装载
    pub async fn list_order_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT order_uid FROM orders ORDER BY date_created DESC, order_uid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[async_trait]
impl OrderRepositoryTrait for OrderRepository {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.insert_order(order).await
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order> {
        self.get_order(order_uid).await
    }

    async fn list_order_ids(&self) -> Result<Vec<String>> {
        self.list_order_ids().await
    }
}

/// 唯一约束冲突（SQLSTATE 23505）映射为重复订单，其余保持数据库错误
fn map_insert_error(err: sqlx::Error, order_uid: &str) -> OrderError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            OrderError::Conflict(order_uid.to_string())
        }
        _ => OrderError::Database(err),
    }
}
