//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Producer/Consumer 抽象，
//! 统一消息序列化、错误映射和读取超时语义，避免各服务重复编写样板代码。
//!
//! 消费端通过 [`MessageStream`] trait 暴露"带超时的单次读取 + 回退到最早位点"两个能力，
//! 消费循环只依赖该 trait，测试中可以用脚本化的实现替换真实 broker。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::Offset;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::error::SharedError;

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

/// 集中管理 Kafka topic 名称，防止字符串散落在各处导致拼写不一致
pub mod topics {
    pub const ORDERS: &str = "orders";
}

/// seek 操作的等待上限
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let timestamp = msg.timestamp().to_millis();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp,
            headers,
        }
    }

    /// 以原始字节构造消息，供本地回放与测试使用
    pub fn from_payload(topic: &str, offset: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: None,
            payload: payload.into(),
            timestamp: None,
            headers: HashMap::new(),
        }
    }

    /// 将 JSON 格式负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, SharedError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| SharedError::Kafka(format!("负载反序列化失败: {e}")))
    }
}

// ---------------------------------------------------------------------------
// MessageStream
// ---------------------------------------------------------------------------

/// 单次读取失败的原因
///
/// 两类错误都是瞬时的：消费循环记录日志后继续下一轮读取，从不向上传播。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// 在给定时限内没有新消息（或 broker 尚不可达）
    #[error("读取超时: {0:?}")]
    Timeout(Duration),

    /// broker 返回的其他错误
    #[error("Kafka 读取失败: {0}")]
    Broker(String),
}

impl StreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// 可按时限拉取消息的流
///
/// 每次 `read` 使用独立的超时时限，保证调用方不会被无限期阻塞。
#[async_trait]
pub trait MessageStream: Send {
    /// 在 `timeout` 内读取下一条消息
    async fn read(&mut self, timeout: Duration) -> Result<ConsumerMessage, StreamError>;

    /// 将读取位置重置到最早可用的消息
    fn rewind(&mut self) -> Result<(), StreamError>;
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer` 并提供类型安全的 JSON 发送方法，
/// 内部已派生 Clone（`FutureProducer` 本身是 Arc 包装的）。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    ///
    /// 设置 `message.timeout.ms` 为 5 秒，超时后由调用方决定是否重试。
    pub fn new(config: &KafkaConfig) -> Result<Self, SharedError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| SharedError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送原始字节消息
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(i32, i64), SharedError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        // rdkafka 0.39+ 返回 Delivery 结构体而非元组
        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| SharedError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 将值序列化为 JSON 后发送
    ///
    /// 序列化与网络发送拆分为两步，便于独立定位故障原因。
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64), SharedError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| SharedError::Kafka(format!("序列化失败: {e}")))?;

        self.send(topic, key, &payload).await
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
///
/// 封装 `StreamConsumer`，以 [`MessageStream`] 的形式提供带超时的读取。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// 创建消费者，加入配置中的消费组
    pub fn new(config: &KafkaConfig) -> Result<Self, SharedError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| SharedError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            "Kafka 消费者已初始化"
        );
        Ok(Self { consumer })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), SharedError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| SharedError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }
}

#[async_trait]
impl MessageStream for KafkaConsumer {
    async fn read(&mut self, timeout: Duration) -> Result<ConsumerMessage, StreamError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Err(StreamError::Timeout(timeout)),
            Ok(Err(e)) => Err(StreamError::Broker(e.to_string())),
            Ok(Ok(borrowed_msg)) => {
                let msg = ConsumerMessage::from_borrowed(&borrowed_msg);
                debug!(
                    topic = %msg.topic,
                    partition = msg.partition,
                    offset = msg.offset,
                    "收到 Kafka 消息"
                );
                Ok(msg)
            }
        }
    }

    /// 将当前分配到的所有分区 seek 到最早位点
    fn rewind(&mut self) -> Result<(), StreamError> {
        let mut assignment = self
            .consumer
            .assignment()
            .map_err(|e| StreamError::Broker(format!("获取分区分配失败: {e}")))?;

        assignment
            .set_all_offsets(Offset::Beginning)
            .map_err(|e| StreamError::Broker(format!("设置分区位点失败: {e}")))?;

        self.consumer
            .seek_partitions(assignment, SEEK_TIMEOUT)
            .map_err(|e| StreamError::Broker(format!("重置读取位点失败: {e}")))?;

        info!("Kafka 读取位点已重置到最早消息");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
