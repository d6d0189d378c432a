//! 错误代码定义
//!
//! 错误代码按类别分组，每个类别占用1000个代码范围：
//! - 1000-1999: 注册中心连接相关错误
//! - 2000-2999: 参数校验相关错误
//! - 3000-3999: 服务发现相关错误
//! - 4000-4999: 重试 / 重连相关错误

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 注册中心连接相关错误 (1000-1999)
    // ============================================================
    RegistryUnavailable = 1000,
    RegistryRejected = 1001,

    // ============================================================
    // 参数校验相关错误 (2000-2999)
    // ============================================================
    InvalidOption = 2000,
    InvalidTarget = 2001,
    InvalidConfig = 2002,
    MissingServiceConfig = 2003,

    // ============================================================
    // 服务发现相关错误 (3000-3999)
    // ============================================================
    ServiceNotFound = 3000,

    // ============================================================
    // 重试 / 重连相关错误 (4000-4999)
    // ============================================================
    RetryExhausted = 4000,
    Cancelled = 4001,
    FatalReconnect = 4002,
}

impl ErrorCode {
    /// 获取错误代码的数值
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// 获取错误代码的字符串表示
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::RegistryUnavailable => "REGISTRY_UNAVAILABLE",
            ErrorCode::RegistryRejected => "REGISTRY_REJECTED",
            ErrorCode::InvalidOption => "INVALID_OPTION",
            ErrorCode::InvalidTarget => "INVALID_TARGET",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::MissingServiceConfig => "MISSING_SERVICE_CONFIG",
            ErrorCode::ServiceNotFound => "SERVICE_NOT_FOUND",
            ErrorCode::RetryExhausted => "RETRY_EXHAUSTED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::FatalReconnect => "FATAL_RECONNECT",
        }
    }

    /// 判断该类错误重试后是否可能成功
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::RegistryUnavailable | ErrorCode::RegistryRejected | ErrorCode::ServiceNotFound
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
