//! 重试模块
//!
//! 指数退避重试驱动，用于重建注册中心连接并重新注册

pub mod exponential;
pub mod feedback;
pub mod retrier;

pub use exponential::ExponentialBackoffPolicy;
pub use feedback::Feedback;
pub use retrier::Retrier;

use std::time::Duration;

/// 重试策略 trait
pub trait RetryPolicy: Send + Sync {
    /// 第 `attempt` 次（从 1 开始）失败后是否继续重试
    fn should_retry(&self, attempt: u32) -> bool;
    /// 第 `attempt` 次失败后的等待时间
    fn backoff_duration(&self, attempt: u32) -> Duration;
    /// 最大尝试次数，0 表示不限
    fn max_attempts(&self) -> u32;
}
