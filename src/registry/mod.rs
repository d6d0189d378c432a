//! 服务注册模块
//!
//! 注册中心抽象与 Consul 后端实现

pub mod consul;
pub mod trait_def;

pub use consul::{CHECK_TTL, ConsulConnector, ConsulRegistry, REGISTRY_SCHEME};
pub use trait_def::{Registry, RegistryConnector};

/// 生成随机的服务实例 ID
pub fn generate_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
