//! Flare Discovery
//!
//! 服务注册发现客户端：向注册中心注册实例、周期性上报存活状态、
//! 上报失败时指数退避重建连接并重新注册，以及按服务名建立负载均衡的 gRPC 连接。

pub mod config;
pub mod duration;
pub mod error;
pub mod options;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod supervisor;
pub mod telemetry;

// Re-exports
pub use config::{Config, HealthConfig, RegistryConfig, ServiceConfig};
pub use error::{DiscoveryError, ErrorCode, Result};
pub use options::{ConnectOption, ConnectOptions, ConnectOptionsBuilder, NEAR_IP};
pub use registry::{
    ConsulConnector, ConsulRegistry, Registry, RegistryConnector, generate_instance_id,
};
pub use resolver::{ConsulResolver, ResolverTarget};
pub use retry::{ExponentialBackoffPolicy, Feedback, Retrier, RetryPolicy};
pub use supervisor::HealthSupervisor;
pub use telemetry::init_tracing;
