use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{ExponentialBackoffPolicy, Feedback, RetryPolicy};
use crate::config::{RegistryConfig, ServiceConfig};
use crate::duration::format_duration;
use crate::error::{DiscoveryError, Result};
use crate::registry::RegistryConnector;

/// 重试驱动
///
/// 状态流转：
/// - 尝试成功 → 发送成功事件并返回结果
/// - 尝试失败且无剩余次数 → 发送 "all attempts used" 并返回 [`DiscoveryError::RetryExhausted`]
/// - 尝试失败且仍有次数 → 发送失败事件，等待退避
/// - 退避期间取消 → 返回 [`DiscoveryError::Cancelled`]，不再发送事件
///
/// 取消只打断退避等待，不会中断正在执行的操作。
pub struct Retrier<P = ExponentialBackoffPolicy> {
    policy: P,
    feedback: mpsc::Sender<Feedback>,
    cancel: CancellationToken,
}

impl<P: RetryPolicy> Retrier<P> {
    pub fn new(policy: P, feedback: mpsc::Sender<Feedback>, cancel: CancellationToken) -> Self {
        Self {
            policy,
            feedback,
            cancel,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// 带退避地重复执行 `operation`，参数为当前尝试序号（从 1 开始）
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            let error = match operation(attempt).await {
                Ok(value) => {
                    info!(attempt, "Retry attempt succeeded");
                    self.emit(Feedback::info(format!("retry attempt {} successful", attempt)))
                        .await;
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !self.policy.should_retry(attempt) {
                warn!(attempt, error = %error, "All retry attempts used");
                self.emit(Feedback::info("all attempts used")).await;
                return Err(DiscoveryError::RetryExhausted {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            let delay = self.policy.backoff_duration(attempt);
            warn!(attempt, delay = ?delay, error = %error, "Retry attempt failed");
            self.emit(Feedback::failure(
                error,
                format!(
                    "retry attempt {} failed repeat after {}",
                    attempt,
                    format_duration(delay)
                ),
            ))
            .await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// 重建注册中心连接并注册服务实例
    pub async fn connect_and_register<C>(
        &self,
        connector: &C,
        instance_id: &str,
        service: &ServiceConfig,
        registry: &RegistryConfig,
    ) -> Result<C::Registry>
    where
        C: RegistryConnector,
    {
        self.run(|_| connector.connect_and_register(instance_id, service, registry))
            .await
    }

    async fn emit(&self, feedback: Feedback) {
        // 观测端已关闭时丢弃事件，不影响重试本身
        let _ = self.feedback.send(feedback).await;
    }
}
