//! 订单服务
//!
//! 消费 Kafka 订单消息写入 PostgreSQL，并通过 HTTP 提供带缓存的订单查询。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{Json, Router, routing::get};
use order_service::{
    LruOrderCache, OrderConsumer, OrderRepository, OrderService, consumer::ConsumerSettings,
    routes, state::AppState,
};
use order_shared::{
    config::AppConfig,
    database::Database,
    kafka::KafkaConsumer,
    observability,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// 等待消费者退出的上限，超过后不再等待
const CONSUMER_STOP_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("order-service").context("加载配置失败")?;

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        environment = %config.environment,
        addr = %config.server_addr(),
        "Starting order-service"
    );

    // 初始化基础设施：数据库或 Kafka 客户端无法创建时直接退出
    let db = Database::connect(&config.database)
        .await
        .context("连接数据库失败")?;
    if config.database.run_migrations {
        db.run_migrations().await.context("执行数据库迁移失败")?;
    }

    let repo = Arc::new(OrderRepository::new(db.pool().clone()));
    let cache = Arc::new(LruOrderCache::new(config.cache.capacity));
    let service = Arc::new(OrderService::new(repo, cache));

    // 预热失败不阻止启动，缓存会在读取时逐步回填
    if config.cache.warmup_on_start {
        match service.load_cache().await {
            Ok(loaded) => info!(loaded, "缓存预热完成"),
            Err(e) => warn!(error = %e, "缓存预热失败，以空缓存启动"),
        }
    }

    let kafka_consumer = KafkaConsumer::new(&config.kafka).context("创建 Kafka 消费者失败")?;
    kafka_consumer
        .subscribe(&[config.kafka.topic.as_str()])
        .context("订阅 Kafka topic 失败")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = OrderConsumer::new(
        kafka_consumer,
        Arc::clone(&service),
        ConsumerSettings::from(&config.kafka),
    );
    let consumer_handle = tokio::spawn(consumer.run(shutdown_rx));

    let app = routes::build_router(
        AppState::new(service),
        Duration::from_secs(config.server.request_timeout_seconds),
    )
    .merge(probe_routes(db.clone()));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM 或 Ctrl+C 时停止接收新连接，等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP 停止后再通知消费者，正在处理的消息会处理完毕
    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(CONSUMER_STOP_TIMEOUT, consumer_handle).await {
        Ok(Ok(stats)) => info!(
            received = stats.received,
            saved = stats.saved,
            discarded = stats.discarded,
            read_errors = stats.read_errors,
            "订单消费者已停止"
        ),
        Ok(Err(e)) => error!(error = %e, "订单消费者任务异常退出"),
        Err(_) => warn!("等待订单消费者退出超时"),
    }

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 存活与就绪探针
fn probe_routes(db: Database) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/ready",
            get(move || readiness_check(db.clone())),
        )
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// 存活探针：服务进程正常即返回 ok
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "order-service"
    }))
}

/// 就绪探针：检查数据库连接是否可用
async fn readiness_check(db: Database) -> Json<serde_json::Value> {
    let db_ok = db.ping().await.is_ok();

    Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "service": "order-service",
        "checks": {
            "database": if db_ok { "ok" } else { "fail" }
        }
    }))
}
