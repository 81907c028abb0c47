//! CLI 参数定义

use std::time::Duration;

use clap::Parser;

/// 订单模拟生产者
///
/// 生成随机订单并发送到 Kafka，用于手工验证订单服务的摄取链路。
#[derive(Parser, Debug)]
#[command(name = "order-producer")]
#[command(version, about = "向 Kafka 发送模拟订单")]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Kafka brokers 地址
    #[arg(long, default_value = "localhost:9092")]
    pub brokers: String,

    /// 目标 topic
    #[arg(short, long, default_value = "orders")]
    pub topic: String,

    /// 发送的订单数量
    #[arg(short, long, default_value = "5")]
    pub count: usize,

    /// 两次发送之间的间隔（毫秒）
    #[arg(long, default_value = "1000")]
    pub interval_ms: u64,

    /// 故意构造非法消息的比例，取值 0.0 ~ 1.0
    #[arg(long, default_value = "0.0", value_parser = parse_ratio)]
    pub invalid_ratio: f64,
}

impl Cli {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn parse_ratio(s: &str) -> Result<f64, String> {
    let ratio: f64 = s.parse().map_err(|_| format!("无效的比例: {s}"))?;
    if (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(format!("比例必须在 0.0 到 1.0 之间: {ratio}"))
    }
}
