//! 订单服务错误类型
//!
//! 定义服务层的业务错误和系统错误，以及到 HTTP 响应的映射

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::validation::ValidationError;

/// 订单服务错误类型
#[derive(Debug, Error)]
pub enum OrderError {
    // === 业务错误 ===
    #[error("参数校验失败: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("订单已存在: {0}")]
    Conflict(String),

    #[error("订单不存在: {0}")]
    NotFound(String),

    /// 读取路径上的非 NotFound 存储错误，附带订单号便于排查
    #[error("查询订单失败: order_uid={order_uid}: {source}")]
    Lookup {
        order_uid: String,
        #[source]
        source: Box<OrderError>,
    },

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 订单服务 Result 类型别名
pub type Result<T> = std::result::Result<T, OrderError>;

impl From<ValidationError> for OrderError {
    fn from(err: ValidationError) -> Self {
        Self::Validation {
            field: err.field,
            reason: err.reason,
        }
    }
}

impl OrderError {
    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Conflict(_) | Self::NotFound(_)
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Conflict(_) => "ORDER_ALREADY_EXISTS",
            Self::NotFound(_) => "ORDER_NOT_FOUND",
            Self::Lookup { .. } => "ORDER_LOOKUP_FAILED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Lookup { .. }
            | Self::Database(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = if self.is_business_error() {
            self.to_string()
        } else {
            tracing::error!(error = %self, code = self.error_code(), "请求处理失败");
            "服务内部错误，请稍后重试".to_string()
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}
