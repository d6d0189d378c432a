//! 健康上报与断线重连循环
//!
//! 按固定间隔向注册中心上报存活状态。上报失败被视为注册中心会话可能已失效，
//! 循环随即启动重试任务重建连接并重新注册，同时把重试进度转发给调用方。
//! 重试次数耗尽时返回 [`DiscoveryError::FatalReconnect`]，由调用方决定退出进程还是重启。

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{HealthConfig, RegistryConfig, ServiceConfig};
use crate::error::{DiscoveryError, Result};
use crate::registry::{Registry, RegistryConnector};
use crate::retry::{ExponentialBackoffPolicy, Feedback, Retrier};

/// 单次重连过程的反馈缓冲
const FEEDBACK_BUFFER: usize = 16;

/// 健康循环
///
/// 当前注册中心句柄只由循环自身持有和替换，多个实例之间互不影响。
pub struct HealthSupervisor<C: RegistryConnector> {
    connector: Arc<C>,
    registry: C::Registry,
    instance_id: String,
    service: ServiceConfig,
    registry_config: RegistryConfig,
    health: HealthConfig,
    feedback: Option<mpsc::Sender<Feedback>>,
}

impl<C: RegistryConnector> HealthSupervisor<C> {
    /// 创建健康循环
    ///
    /// # 参数
    /// * `connector` - 重连时用于重建注册中心并注册实例
    /// * `registry` - 已完成注册的当前句柄
    /// * `instance_id` - 实例 ID
    /// * `service` - 服务配置
    /// * `registry_config` - 重连使用的注册中心配置
    pub fn new(
        connector: C,
        registry: C::Registry,
        instance_id: impl Into<String>,
        service: ServiceConfig,
        registry_config: RegistryConfig,
    ) -> Self {
        Self {
            connector: Arc::new(connector),
            registry,
            instance_id: instance_id.into(),
            service,
            registry_config,
            health: HealthConfig::default(),
            feedback: None,
        }
    }

    pub fn with_health_config(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    /// 设置反馈事件的接收端
    pub fn with_feedback(mut self, feedback: mpsc::Sender<Feedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn registry(&self) -> &C::Registry {
        &self.registry
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// 在独立任务中运行
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(cancel))
    }

    /// 运行直到 `cancel` 被取消
    ///
    /// 正常取消返回 `Ok(())`；重连次数耗尽返回 [`DiscoveryError::FatalReconnect`]；
    /// 上报间隔不合法时直接返回 [`DiscoveryError::Config`]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        self.health.validate()?;
        let interval = self.health.interval();
        info!(
            service = %self.service.name,
            instance_id = %self.instance_id,
            interval = ?interval,
            "Health loop started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let reported = self
                .registry
                .report_healthy_state(&self.service.name, &self.instance_id, &[])
                .await;
            match reported {
                Ok(()) => debug!(instance_id = %self.instance_id, "💓 Healthy state reported"),
                Err(e) => match self.recover(e, &cancel).await {
                    Ok(()) => {}
                    Err(DiscoveryError::Cancelled) => break,
                    Err(e) => return Err(e),
                },
            }

            // 恢复成功后同样等待一个间隔再上报
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// 重建注册中心连接并替换当前句柄
    async fn recover(&mut self, push_error: DiscoveryError, cancel: &CancellationToken) -> Result<()> {
        warn!(
            instance_id = %self.instance_id,
            error = %push_error,
            "⚠️ Failed to report healthy state, rebuilding registry connection"
        );
        self.forward(Feedback::failure(
            push_error,
            "trying new make registry and register",
        ))
        .await;

        let (tx, mut rx) = mpsc::channel(FEEDBACK_BUFFER);
        let retrier = Retrier::new(
            ExponentialBackoffPolicy::with_max_attempts(self.health.max_attempts),
            tx,
            cancel.clone(),
        );
        let connector = self.connector.clone();
        let instance_id = self.instance_id.clone();
        let service = self.service.clone();
        let registry_config = self.registry_config.clone();

        // 重试任务结束时 tx 随 retrier 一起释放，rx 随之关闭
        let retry_task = tokio::spawn(async move {
            retrier
                .connect_and_register(connector.as_ref(), &instance_id, &service, &registry_config)
                .await
        });

        while let Some(feedback) = rx.recv().await {
            self.forward(feedback).await;
        }

        let outcome = match retry_task.await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(DiscoveryError::backend(join_error)),
        };

        match outcome {
            Ok(registry) => {
                self.registry = registry;
                info!(instance_id = %self.instance_id, "✅ Registry connection rebuilt");
                Ok(())
            }
            Err(DiscoveryError::Cancelled) => {
                info!(instance_id = %self.instance_id, "Registry reconnect cancelled");
                Err(DiscoveryError::Cancelled)
            }
            Err(e) => {
                error!(
                    instance_id = %self.instance_id,
                    error = %e,
                    "❌ Registry reconnect failed, service cannot keep running"
                );
                Err(DiscoveryError::FatalReconnect {
                    source: Box::new(e),
                })
            }
        }
    }

    async fn forward(&self, feedback: Feedback) {
        debug!(feedback = %feedback, "Health loop feedback");
        if let Some(tx) = &self.feedback {
            if tx.send(feedback).await.is_err() {
                debug!("Feedback receiver dropped");
            }
        }
    }

    async fn shutdown(&self) {
        if !self.health.deregister_on_shutdown {
            info!(instance_id = %self.instance_id, "🛑 Health loop stopped");
            return;
        }
        match self
            .registry
            .deregister(&self.service.name, &self.instance_id)
            .await
        {
            Ok(()) => info!(instance_id = %self.instance_id, "🛑 Health loop stopped, instance deregistered"),
            Err(e) => warn!(
                instance_id = %self.instance_id,
                error = %e,
                "⚠️ Failed to deregister instance on shutdown"
            ),
        }
    }
}
