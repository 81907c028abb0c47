//! 订单库连接管理
//!
//! 负责创建 PostgreSQL 连接池、启动时校验连通性，以及应用 `migrations/` 下的订单表结构。

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::{Result, SharedError};

/// 订单表结构迁移，编译期从仓库根目录 migrations/ 嵌入
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// 订单库连接池
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 创建连接池并立即做一次连通性检查
    ///
    /// 连接串为空或数据库不可达时直接返回错误，由调用方决定是否退出进程。
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(SharedError::Config("database.url 不能为空".to_string()));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        let db = Self { pool };
        db.ping().await?;

        info!(
            max_connections = config.max_connections,
            "订单库连接池已就绪"
        );
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行 `SELECT 1`，供启动检查与就绪探针使用
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 应用尚未执行的订单表迁移
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!(migrations = MIGRATOR.iter().count(), "订单表结构已是最新");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("订单库连接池已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_schema_is_embedded() {
        let first = MIGRATOR.iter().next().expect("至少一个迁移脚本");
        assert_eq!(first.version, 20250101000000);
        assert!(first.sql.contains("CREATE TABLE IF NOT EXISTS orders"));
        assert!(first.sql.contains("ON DELETE CASCADE"));
    }

    #[tokio::test]
    async fn test_empty_url_rejected_before_connecting() {
        let config = DatabaseConfig {
            url: "  ".to_string(),
            ..Default::default()
        };

        let err = Database::connect(&config).await.err().unwrap();
        assert!(matches!(err, SharedError::Config(_)));
    }

    #[tokio::test]
    #[ignore = "需要 PostgreSQL"]
    async fn test_connect_and_migrate() {
        let config = DatabaseConfig {
            url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url),
            ..Default::default()
        };
        let db = Database::connect(&config).await.unwrap();
        db.run_migrations().await.unwrap();
        db.ping().await.unwrap();
        db.close().await;
    }
}
