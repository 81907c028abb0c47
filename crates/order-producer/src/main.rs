//! 订单模拟生产者
//!
//! 生成随机订单发送到 Kafka，可按比例混入非法消息，用于手工验证订单服务的摄取与丢弃逻辑。

mod cli;
mod generator;
mod publisher;

use anyhow::Context;
use clap::Parser;
use order_shared::config::KafkaConfig;
use order_shared::kafka::KafkaProducer;
use order_shared::observability::{self, ObservabilityConfig};
use tracing::{error, info};

use cli::Cli;
use generator::OrderGenerator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 生产者只需要日志，不启动指标导出
    observability::tracing::init(&ObservabilityConfig {
        service_name: "order-producer".to_string(),
        log_level: cli.log_level.clone(),
        metrics_enabled: false,
        ..Default::default()
    })?;

    let kafka_config = KafkaConfig {
        brokers: cli.brokers.clone(),
        topic: cli.topic.clone(),
        ..Default::default()
    };
    let producer = KafkaProducer::new(&kafka_config).context("创建 Kafka 生产者失败")?;
    let generator = OrderGenerator::new(cli.invalid_ratio);

    info!(
        brokers = %cli.brokers,
        topic = %cli.topic,
        count = cli.count,
        invalid_ratio = cli.invalid_ratio,
        "开始发送模拟订单"
    );

    let mut sent = 0usize;
    let mut failed = 0usize;

    for i in 0..cli.count {
        let msg = generator.next_message();

        match publisher::publish(&producer, &cli.topic, &msg).await {
            Ok(_) => sent += 1,
            Err(e) => {
                failed += 1;
                error!(order_uid = %msg.order_uid, error = %e, "订单消息发送失败，已放弃");
            }
        }

        if i + 1 < cli.count {
            tokio::time::sleep(cli.interval()).await;
        }
    }

    info!(sent, failed, "模拟订单发送完成");

    if failed > 0 {
        anyhow::bail!("{failed} 条订单消息发送失败");
    }
    Ok(())
}
