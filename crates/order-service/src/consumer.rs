//! Kafka 订单摄取消费者
//!
//! 两阶段状态机：
//!
//! 1. **探测**：以较短的超时读取，直到成功读到一条消息，证明 broker 可用；
//!    随后将读取位点重置到最早消息，进入消费阶段。探测失败时等待固定退避后无限重试。
//! 2. **消费**：以常态超时循环读取，每条消息依次执行反序列化、校验、保存。
//!    任何单条消息的失败（读取错误、非法 JSON、校验失败、存储失败、重复订单）
//!    都只记录日志并丢弃，绝不终止循环。
//!
//! 关闭信号在每轮迭代边界、等待读取以及退避睡眠期间都会被观察到；
//! 已经开始处理的消息总会处理完毕后才退出。

use std::sync::Arc;
use std::time::Duration;

use order_shared::config::KafkaConfig;
use order_shared::kafka::{ConsumerMessage, MessageStream, StreamError};
use order_shared::observability::metrics;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::OrderCache;
use crate::error::OrderError;
use crate::models::Order;
use crate::repository::OrderRepositoryTrait;
use crate::service::OrderService;

/// 消费者时间参数
///
/// 探测超时应明显短于常态读取超时。
#[derive(Debug, Clone, Copy)]
pub struct ConsumerSettings {
    pub probe_timeout: Duration,
    pub read_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self::from(&KafkaConfig::default())
    }
}

impl From<&KafkaConfig> for ConsumerSettings {
    fn from(config: &KafkaConfig) -> Self {
        Self {
            probe_timeout: config.probe_timeout(),
            read_timeout: config.read_timeout(),
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// 消费统计
///
/// `read_errors` 包含探测阶段的全部失败，以及消费阶段的非超时读取错误；
/// 消费阶段的读取超时只表示暂无新消息，不计入。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    pub received: u64,
    pub saved: u64,
    pub discarded: u64,
    pub read_errors: u64,
}

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Saved,
    InvalidJson,
    InvalidOrder,
    Duplicate,
    StoreFailed,
}

impl MessageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::InvalidJson => "invalid_json",
            Self::InvalidOrder => "invalid_order",
            Self::Duplicate => "duplicate",
            Self::StoreFailed => "store_failed",
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Probing,
    Streaming,
}

/// 订单消费者
pub struct OrderConsumer<S, R, C>
where
    S: MessageStream,
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    stream: S,
    service: Arc<OrderService<R, C>>,
    settings: ConsumerSettings,
}

impl<S, R, C> OrderConsumer<S, R, C>
where
    S: MessageStream,
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    pub fn new(stream: S, service: Arc<OrderService<R, C>>, settings: ConsumerSettings) -> Self {
        Self {
            stream,
            service,
            settings,
        }
    }

    /// 运行消费循环，直到收到关闭信号
    ///
    /// 永远不会因单条消息或 broker 故障而返回错误，返回值为本次运行的统计。
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> IngestionStats {
        let mut stats = IngestionStats::default();
        let mut phase = Phase::Probing;

        info!(
            probe_timeout_ms = self.settings.probe_timeout.as_millis() as u64,
            read_timeout_ms = self.settings.read_timeout.as_millis() as u64,
            "订单消费者已启动，开始探测 Kafka"
        );

        loop {
            if shutdown_requested(&shutdown) {
                info!(
                    received = stats.received,
                    saved = stats.saved,
                    discarded = stats.discarded,
                    read_errors = stats.read_errors,
                    "收到关闭信号，订单消费者正常退出"
                );
                return stats;
            }

            phase = match phase {
                Phase::Probing => self.probe(&mut shutdown, &mut stats).await,
                Phase::Streaming => {
                    self.consume_next(&mut shutdown, &mut stats).await;
                    Phase::Streaming
                }
            };
        }
    }

    /// 探测一次 broker 是否可用
    async fn probe(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
        stats: &mut IngestionStats,
    ) -> Phase {
        let result = tokio::select! {
            biased;
            _ = cancelled(shutdown) => return Phase::Probing,
            result = self.stream.read(self.settings.probe_timeout) => result,
        };

        match result {
            Ok(msg) => {
                info!(offset = msg.offset, "Kafka 已可用，重置到最早消息后进入消费阶段");
                if let Err(e) = self.stream.rewind() {
                    // 位点未重置时探测到的消息不会被再次投递，直接处理以免丢失
                    error!(error = %e, "重置读取位点失败，从当前位置继续消费");
                    self.process(&msg, stats).await;
                }
                Phase::Streaming
            }
            Err(e) => {
                stats.read_errors += 1;
                warn!(
                    error = %e,
                    backoff_ms = self.settings.retry_backoff.as_millis() as u64,
                    "Kafka 暂不可用，退避后重试"
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.retry_backoff) => {}
                    _ = cancelled(shutdown) => {}
                }
                Phase::Probing
            }
        }
    }

    /// 读取并处理一条消息
    async fn consume_next(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
        stats: &mut IngestionStats,
    ) {
        let result = tokio::select! {
            biased;
            _ = cancelled(shutdown) => return,
            result = self.stream.read(self.settings.read_timeout) => result,
        };

        match result {
            Ok(msg) => self.process(&msg, stats).await,
            Err(StreamError::Timeout(timeout)) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "暂无新消息");
            }
            Err(e) => {
                stats.read_errors += 1;
                error!(error = %e, "读取 Kafka 消息失败，继续下一轮");
            }
        }
    }

    async fn process(&self, msg: &ConsumerMessage, stats: &mut IngestionStats) {
        stats.received += 1;

        let outcome = handle_message(&self.service, msg).await;
        metrics::record_message_consumed(outcome.as_str());

        if outcome.is_saved() {
            stats.saved += 1;
        } else {
            stats.discarded += 1;
        }
    }
}

/// 处理单条 Kafka 消息：反序列化 -> 校验 -> 保存
///
/// 拆分为独立函数，便于在测试中直接调用而无需构造完整的消费者。
pub async fn handle_message<R, C>(
    service: &OrderService<R, C>,
    msg: &ConsumerMessage,
) -> MessageOutcome
where
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    let order: Order = match msg.deserialize_payload() {
        Ok(order) => order,
        Err(e) => {
            warn!(
                error = %e,
                partition = msg.partition,
                offset = msg.offset,
                "订单消息反序列化失败，已丢弃"
            );
            return MessageOutcome::InvalidJson;
        }
    };

    if let Err(e) = order.validate() {
        warn!(
            order_uid = %order.order_uid,
            field = %e.field,
            reason = %e.reason,
            offset = msg.offset,
            "订单校验失败，已丢弃"
        );
        return MessageOutcome::InvalidOrder;
    }

    let order_uid = order.order_uid.clone();
    match service.create_order(order).await {
        Ok(()) => {
            info!(order_uid = %order_uid, offset = msg.offset, "订单消息处理完成");
            MessageOutcome::Saved
        }
        Err(OrderError::Conflict(_)) => {
            warn!(order_uid = %order_uid, "订单已存在，丢弃重复消息");
            MessageOutcome::Duplicate
        }
        Err(e) => {
            error!(order_uid = %order_uid, error = %e, "保存订单失败，已丢弃");
            MessageOutcome::StoreFailed
        }
    }
}

/// 发送端已关闭也视为关闭请求，避免消费者成为无人管理的孤儿任务
fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// 等待关闭信号
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
