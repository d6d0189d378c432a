//! 服务发现统一错误类型

use super::code::ErrorCode;
use thiserror::Error;

/// 后端错误的装箱类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 服务发现错误
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// 服务没有任何健康实例（空结果集与"未找到"视为同一种情况）
    #[error("no service addresses found for {service}")]
    NotFound { service: String },

    /// 连接参数校验失败，发生在任何网络调用之前
    #[error("invalid option: {0}")]
    Validation(String),

    /// 注册中心后端原样返回的错误
    #[error("{0}")]
    Backend(#[source] BoxError),

    /// 注册中心返回了非 2xx 响应
    #[error("registry responded with {status}: {body}")]
    BackendStatus { status: u16, body: String },

    /// 无法解析的解析器目标地址
    #[error("invalid resolver target: {0}")]
    InvalidTarget(String),

    /// 未提供服务配置
    #[error("service configuration not defined")]
    MissingServiceConfig,

    /// 配置加载失败
    #[error("config error: {0}")]
    Config(String),

    /// 有限次数的重试全部失败，携带最后一次错误
    #[error("all {attempts} attempts used: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<DiscoveryError>,
    },

    /// 退避等待期间上下文被取消
    #[error("operation cancelled")]
    Cancelled,

    /// 健康循环内重连彻底失败，不可恢复
    #[error("registry reconnect failed, service cannot keep running: {source}")]
    FatalReconnect {
        #[source]
        source: Box<DiscoveryError>,
    },
}

impl DiscoveryError {
    /// 创建未找到错误
    pub fn not_found(service: impl Into<String>) -> Self {
        DiscoveryError::NotFound {
            service: service.into(),
        }
    }

    /// 创建参数校验错误
    pub fn validation(reason: impl Into<String>) -> Self {
        DiscoveryError::Validation(reason.into())
    }

    /// 包装任意后端错误
    pub fn backend(error: impl Into<BoxError>) -> Self {
        DiscoveryError::Backend(error.into())
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            DiscoveryError::NotFound { .. } => ErrorCode::ServiceNotFound,
            DiscoveryError::Validation(_) => ErrorCode::InvalidOption,
            DiscoveryError::Backend(_) => ErrorCode::RegistryUnavailable,
            DiscoveryError::BackendStatus { .. } => ErrorCode::RegistryRejected,
            DiscoveryError::InvalidTarget(_) => ErrorCode::InvalidTarget,
            DiscoveryError::MissingServiceConfig => ErrorCode::MissingServiceConfig,
            DiscoveryError::Config(_) => ErrorCode::InvalidConfig,
            DiscoveryError::RetryExhausted { .. } => ErrorCode::RetryExhausted,
            DiscoveryError::Cancelled => ErrorCode::Cancelled,
            DiscoveryError::FatalReconnect { .. } => ErrorCode::FatalReconnect,
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// 是否为取消错误
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DiscoveryError::Cancelled)
    }

    /// 是否为不可恢复的重连失败
    pub fn is_fatal(&self) -> bool {
        matches!(self, DiscoveryError::FatalReconnect { .. })
    }
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(error: reqwest::Error) -> Self {
        DiscoveryError::Backend(Box::new(error))
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, DiscoveryError>;
