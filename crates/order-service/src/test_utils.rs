//! 测试工具模块
//!
//! 提供单元测试、集成测试与基准测试共用的测试数据、内存存储和脚本化消息流。
//! 这些实现不依赖 PostgreSQL 或 Kafka，使整条摄取链路可以在进程内验证。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use order_shared::kafka::{ConsumerMessage, MessageStream, StreamError, topics};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::consumer::ConsumerSettings;
use crate::error::{OrderError, Result};
use crate::models::{Delivery, Item, Order, Payment};
use crate::repository::OrderRepositoryTrait;

// ==================== 测试数据 ====================

/// 构造一个可以通过校验的完整订单
pub fn sample_order(order_uid: &str) -> Order {
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1_637_907_727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: 9_934_930,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 453,
            rid: "ab4219087a764ae0btest".to_string(),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2_389_212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        }],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
        oof_shard: "1".to_string(),
    }
}

/// 将订单编码为 Kafka 消息
pub fn order_message(offset: i64, order: &Order) -> ConsumerMessage {
    let payload = serde_json::to_vec(order).unwrap();
    let mut msg = ConsumerMessage::from_payload(topics::ORDERS, offset, payload);
    msg.key = Some(order.order_uid.clone());
    msg
}

/// 以原始字节构造 Kafka 消息（例如非法 JSON）
pub fn raw_message(offset: i64, payload: &str) -> ConsumerMessage {
    ConsumerMessage::from_payload(topics::ORDERS, offset, payload.as_bytes().to_vec())
}

/// 毫秒级的消费者时间参数，避免测试等待真实的秒级超时
pub fn fast_settings() -> ConsumerSettings {
    ConsumerSettings {
        probe_timeout: Duration::from_millis(5),
        read_timeout: Duration::from_millis(5),
        retry_backoff: Duration::from_millis(1),
    }
}

// ==================== 内存订单存储 ====================

/// 内存版订单存储
///
/// 记录每个方法的调用次数，并支持注入失败，用于断言缓存命中时未访问存储等行为。
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
    failing_gets: Mutex<HashSet<String>>,
    fail_inserts: AtomicBool,
    fail_listing: AtomicBool,
    insert_calls: AtomicUsize,
    get_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置订单（不计入调用次数）
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        {
            let mut map = store.orders.lock();
            for order in orders {
                map.insert(order.order_uid.clone(), order);
            }
        }
        store
    }

    /// 令指定订单的读取返回内部错误
    pub fn fail_get_for(&self, order_uid: &str) {
        self.failing_gets.lock().insert(order_uid.to_string());
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        self.orders.lock().contains_key(order_uid)
    }

    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrderRepositoryTrait for InMemoryOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(OrderError::Internal("injected insert failure".to_string()));
        }

        let mut orders = self.orders.lock();
        if orders.contains_key(&order.order_uid) {
            return Err(OrderError::Conflict(order.order_uid.clone()));
        }
        orders.insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_gets.lock().contains(order_uid) {
            return Err(OrderError::Internal(format!(
                "injected read failure: {order_uid}"
            )));
        }

        self.orders
            .lock()
            .get(order_uid)
            .cloned()
            .ok_or_else(|| OrderError::NotFound(order_uid.to_string()))
    }

    async fn list_order_ids(&self) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(OrderError::Internal("injected listing failure".to_string()));
        }

        let orders = self.orders.lock();
        let mut rows: Vec<_> = orders
            .values()
            .map(|o| (o.date_created, o.order_uid.clone()))
            .collect();
        // 与 Postgres 实现一致：按创建时间倒序，时间相同按订单号升序
        rows.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(rows.into_iter().map(|(_, uid)| uid).collect())
    }
}

// ==================== 脚本化消息流 ====================

/// 按脚本依次返回读取结果的消息流
///
/// - 重置位点时，已成功投递过的消息会按原顺序重新排到队首，模拟回到最早位点
/// - 脚本耗尽后若配置了关闭信号则发送关闭，否则每次读取都等待超时
pub struct ScriptedStream {
    steps: VecDeque<std::result::Result<ConsumerMessage, StreamError>>,
    delivered: Vec<ConsumerMessage>,
    shutdown: Option<watch::Sender<bool>>,
    fail_rewind: bool,
    reads: Arc<AtomicUsize>,
    rewinds: Arc<AtomicUsize>,
}

impl ScriptedStream {
    pub fn new(steps: Vec<std::result::Result<ConsumerMessage, StreamError>>) -> Self {
        Self {
            steps: steps.into(),
            delivered: Vec::new(),
            shutdown: None,
            fail_rewind: false,
            reads: Arc::new(AtomicUsize::new(0)),
            rewinds: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 脚本耗尽时发送关闭信号
    pub fn shutdown_when_drained(mut self, tx: watch::Sender<bool>) -> Self {
        self.shutdown = Some(tx);
        self
    }

    /// 令重置位点失败
    pub fn fail_rewind(mut self) -> Self {
        self.fail_rewind = true;
        self
    }

    /// 读取次数计数器（可在流被消费者接管后继续观察）
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }

    /// 重置位点次数计数器
    pub fn rewind_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.rewinds)
    }
}

#[async_trait]
impl MessageStream for ScriptedStream {
    async fn read(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<ConsumerMessage, StreamError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        match self.steps.pop_front() {
            Some(Ok(msg)) => {
                self.delivered.push(msg.clone());
                Ok(msg)
            }
            Some(Err(e)) => Err(e),
            None => {
                match &self.shutdown {
                    Some(tx) => {
                        let _ = tx.send(true);
                    }
                    None => tokio::time::sleep(timeout).await,
                }
                Err(StreamError::Timeout(timeout))
            }
        }
    }

    fn rewind(&mut self) -> std::result::Result<(), StreamError> {
        self.rewinds.fetch_add(1, Ordering::SeqCst);

        if self.fail_rewind {
            return Err(StreamError::Broker("injected seek failure".to_string()));
        }

        for msg in self.delivered.drain(..).rev() {
            self.steps.push_front(Ok(msg));
        }
        Ok(())
    }
}
