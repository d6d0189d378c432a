use super::RetryPolicy;
use std::time::Duration;

/// 指数退避重试策略
///
/// 第 n 次失败后等待 `base_delay << n`（默认 2s、4s、8s……），
/// 超大尝试次数时饱和而不溢出。`max_attempts` 为 0 时无限重试。
#[derive(Debug, Clone)]
pub struct ExponentialBackoffPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// 注册中心重连使用的策略：基准 1 秒，无上限
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::from_secs(1), Duration::MAX)
    }
}

impl Default for ExponentialBackoffPolicy {
    fn default() -> Self {
        Self::with_max_attempts(0)
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }

    fn backoff_duration(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
