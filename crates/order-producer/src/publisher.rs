//! 带重试的消息发送

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use order_shared::error::SharedError;
use order_shared::kafka::KafkaProducer;
use tracing::{info, warn};

use crate::generator::{Body, GeneratedMessage};

/// 单条消息的最大发送次数
pub const MAX_ATTEMPTS: u32 = 5;

/// 两次发送之间的等待时间
pub const RETRY_PAUSE: Duration = Duration::from_secs(5);

/// 发送一条生成的消息，失败时按固定间隔重试
pub async fn publish(
    producer: &KafkaProducer,
    topic: &str,
    msg: &GeneratedMessage,
) -> Result<(i32, i64), SharedError> {
    let (partition, offset) = with_retry(MAX_ATTEMPTS, RETRY_PAUSE, |_| async move {
        match &msg.body {
            Body::Order(order) => producer.send_json(topic, &msg.order_uid, order).await,
            Body::Raw(bytes) => producer.send(topic, &msg.order_uid, bytes).await,
        }
    })
    .await?;

    info!(
        order_uid = %msg.order_uid,
        corruption = msg.corruption.map(|c| c.as_str()).unwrap_or("none"),
        partition,
        offset,
        "订单消息已发送"
    );
    Ok((partition, offset))
}

/// 最多执行 `attempts` 次操作，每次失败后等待 `pause`，返回最后一次的错误
pub async fn with_retry<T, E, F, Fut>(attempts: u32, pause: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(attempt, max_attempts = attempts, error = %e, "发送失败，稍后重试");
                tokio::time::sleep(pause).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
