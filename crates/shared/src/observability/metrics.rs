//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标描述，会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "order_messages_total",
        "Kafka order messages processed, labelled by outcome"
    );
    metrics::describe_counter!("order_cache_hits_total", "Order cache hits");
    metrics::describe_counter!("order_cache_misses_total", "Order cache misses");
    metrics::describe_counter!("order_cache_evictions_total", "Order cache LRU evictions");
    metrics::describe_gauge!("order_cache_warmed_entries", "Entries loaded by cache warm-up");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一条订单消息的处理结果（saved / invalid_json / invalid_order / store_failed）
#[inline]
pub fn record_message_consumed(outcome: &'static str) {
    metrics::counter!("order_messages_total", "outcome" => outcome).increment(1);
}

/// 记录一次缓存查询
#[inline]
pub fn record_cache_lookup(hit: bool) {
    if hit {
        metrics::counter!("order_cache_hits_total").increment(1);
    } else {
        metrics::counter!("order_cache_misses_total").increment(1);
    }
}

/// 记录一次 LRU 淘汰
#[inline]
pub fn record_cache_eviction() {
    metrics::counter!("order_cache_evictions_total").increment(1);
}

/// 记录缓存预热装载的条目数
#[inline]
pub fn set_cache_warmed_entries(count: usize) {
    metrics::gauge!("order_cache_warmed_entries").set(count as f64);
}
