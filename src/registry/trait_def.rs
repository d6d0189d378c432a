//! 服务注册中心 Trait 定义

use async_trait::async_trait;
use tonic::transport::Channel;

use crate::config::{RegistryConfig, ServiceConfig};
use crate::error::Result;
use crate::options::ConnectOptions;

/// 服务注册中心
///
/// 每种注册中心后端各自实现，调用方只依赖该 trait
#[async_trait]
pub trait Registry: Send + Sync {
    /// 注册（或覆盖）服务实例，并附带以实例 ID 为键的 TTL 健康检查
    async fn register(
        &self,
        service_name: &str,
        instance_id: &str,
        host: &str,
        port: u16,
        tags: &[String],
    ) -> Result<()>;

    /// 注销服务实例，实例不存在时不报错
    async fn deregister(&self, service_name: &str, instance_id: &str) -> Result<()>;

    /// 获取通过健康检查的实例地址（`host:port`）
    ///
    /// 结果为空时返回 [`DiscoveryError::NotFound`](crate::DiscoveryError::NotFound)
    async fn service_addresses(&self, service_name: &str) -> Result<Vec<String>>;

    /// 上报存活状态，多段备注以 `|` 连接
    ///
    /// 调用间隔必须小于注册时的 TTL，否则实例会被判定为失效
    async fn report_healthy_state(
        &self,
        service_name: &str,
        instance_id: &str,
        comments: &[&str],
    ) -> Result<()>;

    /// 建立到服务全部可解析实例的负载均衡 gRPC 连接
    ///
    /// 返回的 `Channel` 全部 drop 后后台解析任务随之停止
    async fn service_connect_grpc(
        &self,
        service_name: &str,
        options: &ConnectOptions,
    ) -> Result<Channel>;
}

/// 构建注册中心连接并注册服务实例
///
/// 健康循环在上报失败后通过它重建连接
#[async_trait]
pub trait RegistryConnector: Send + Sync + 'static {
    type Registry: Registry + 'static;

    async fn connect_and_register(
        &self,
        instance_id: &str,
        service: &ServiceConfig,
        registry: &RegistryConfig,
    ) -> Result<Self::Registry>;
}
