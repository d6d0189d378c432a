//! Consul 服务注册实现

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tonic::transport::Channel;
use tracing::{debug, info};

use super::trait_def::{Registry, RegistryConnector};
use crate::config::{RegistryConfig, ServiceConfig};
use crate::duration::format_duration;
use crate::error::{DiscoveryError, Result};
use crate::options::ConnectOptions;
use crate::resolver::{ConsulResolver, ResolverTarget};

/// `consul://` 目标地址的 scheme
pub const REGISTRY_SCHEME: &str = "consul";

/// 注册时附带的 TTL 检查窗口，上报间隔必须小于它
pub const CHECK_TTL: Duration = Duration::from_secs(5);

/// 单次 agent 请求超时
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// 多段健康备注的连接符
const COMMENT_DELIMITER: &str = "|";

/// Consul 服务注册中心
#[derive(Clone)]
pub struct ConsulRegistry {
    client: reqwest::Client,
    config: RegistryConfig,
    base_url: Url,
}

#[derive(Serialize)]
struct ServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Tags")]
    tags: &'a [String],
    #[serde(rename = "Check")]
    check: TtlCheck<'a>,
}

#[derive(Serialize)]
struct TtlCheck<'a> {
    #[serde(rename = "CheckID")]
    check_id: &'a str,
    #[serde(rename = "TTL")]
    ttl: String,
}

#[derive(Serialize)]
struct CheckUpdate<'a> {
    #[serde(rename = "Status")]
    status: &'a str,
    #[serde(rename = "Output")]
    output: String,
}

#[derive(Deserialize)]
pub(crate) struct HealthEntry {
    #[serde(rename = "Node", default)]
    node: Option<HealthNode>,
    #[serde(rename = "Service")]
    service: HealthService,
}

#[derive(Deserialize)]
struct HealthNode {
    #[serde(rename = "Address", default)]
    address: String,
}

#[derive(Deserialize)]
struct HealthService {
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
}

impl HealthEntry {
    /// 服务未声明地址时回退到节点地址
    pub(crate) fn address(&self) -> String {
        let host = if self.service.address.is_empty() {
            self.node
                .as_ref()
                .map(|node| node.address.as_str())
                .unwrap_or_default()
        } else {
            self.service.address.as_str()
        };
        format!("{}:{}", host, self.service.port)
    }
}

impl ConsulRegistry {
    /// 创建 Consul 注册中心，未提供配置时连接 `localhost:8500`
    pub fn new(config: Option<RegistryConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = Url::parse(&config.base_url()).map_err(|e| {
            DiscoveryError::Config(format!("invalid registry address {}: {}", config.base_url(), e))
        })?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// 构建注册中心并立即注册服务实例
    pub async fn make_and_register(
        instance_id: &str,
        service: Option<&ServiceConfig>,
        config: Option<&RegistryConfig>,
    ) -> Result<Self> {
        let registry = Self::new(config.cloned())?;
        let service = service.ok_or(DiscoveryError::MissingServiceConfig)?;
        registry
            .register(
                &service.name,
                instance_id,
                &service.host,
                service.port,
                &service.tags,
            )
            .await?;
        Ok(registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// 生成负载均衡解析器使用的目标地址
    ///
    /// `consul://[user:password@]host:port/service?query`
    pub fn target_url(&self, service_name: &str, options: &ConnectOptions) -> Result<String> {
        let raw = format!("{}://{}/", REGISTRY_SCHEME, self.config.address());
        let mut url = Url::parse(&raw)
            .map_err(|e| DiscoveryError::InvalidTarget(format!("{}: {}", raw, e)))?;
        url.path_segments_mut()
            .map_err(|_| DiscoveryError::InvalidTarget(format!("{}: cannot be a base", raw)))?
            .clear()
            .push(service_name);

        if let Some((user, pass)) = self.config.credentials() {
            if url.set_username(user).is_err() || url.set_password(Some(pass)).is_err() {
                return Err(DiscoveryError::InvalidTarget(format!(
                    "{}: cannot carry credentials",
                    raw
                )));
            }
        }

        let pairs = options.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        Ok(url.to_string())
    }

    /// 以路径段拼接 agent 地址，服务名与实例 ID 中的 `/`、`?`、`#` 会被转义
    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DiscoveryError::Config(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        let request = self.client.request(method, url);
        Ok(match self.config.user.as_deref().filter(|user| !user.is_empty()) {
            Some(user) => request.basic_auth(user, self.config.pass.as_deref()),
            None => request,
        })
    }
}

/// 非 2xx 响应转换为错误
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DiscoveryError::BackendStatus {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

#[async_trait]
impl Registry for ConsulRegistry {
    async fn register(
        &self,
        service_name: &str,
        instance_id: &str,
        host: &str,
        port: u16,
        tags: &[String],
    ) -> Result<()> {
        let registration = ServiceRegistration {
            id: instance_id,
            name: service_name,
            address: host,
            port,
            tags,
            check: TtlCheck {
                check_id: instance_id,
                ttl: format_duration(CHECK_TTL),
            },
        };

        let response = self
            .request(Method::PUT, &["v1", "agent", "service", "register"])?
            .json(&registration)
            .send()
            .await?;
        check_status(response).await?;

        info!(
            service = service_name,
            instance_id,
            address = %format!("{}:{}", host, port),
            "Service registered with Consul"
        );
        Ok(())
    }

    async fn deregister(&self, service_name: &str, instance_id: &str) -> Result<()> {
        let response = self
            .request(Method::PUT, &["v1", "agent", "service", "deregister", instance_id])?
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(service = service_name, instance_id, "Service already absent from Consul");
            return Ok(());
        }
        check_status(response).await?;

        info!(service = service_name, instance_id, "Service deregistered from Consul");
        Ok(())
    }

    async fn service_addresses(&self, service_name: &str) -> Result<Vec<String>> {
        let response = self
            .request(Method::GET, &["v1", "health", "service", service_name])?
            .query(&[("passing", "true")])
            .send()
            .await?;
        let entries: Vec<HealthEntry> = check_status(response).await?.json().await?;

        if entries.is_empty() {
            return Err(DiscoveryError::not_found(service_name));
        }
        Ok(entries.iter().map(HealthEntry::address).collect())
    }

    async fn report_healthy_state(
        &self,
        _service_name: &str,
        instance_id: &str,
        comments: &[&str],
    ) -> Result<()> {
        let update = CheckUpdate {
            status: "passing",
            output: comments.join(COMMENT_DELIMITER),
        };
        let response = self
            .request(Method::PUT, &["v1", "agent", "check", "update", instance_id])?
            .json(&update)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn service_connect_grpc(
        &self,
        service_name: &str,
        options: &ConnectOptions,
    ) -> Result<Channel> {
        let target = self.target_url(service_name, options)?;
        let resolver = ConsulResolver::new(ResolverTarget::parse(&target)?)?;
        Ok(resolver.connect())
    }
}

/// 基于 Consul 的重建连接器
#[derive(Debug, Clone, Default)]
pub struct ConsulConnector;

#[async_trait]
impl RegistryConnector for ConsulConnector {
    type Registry = ConsulRegistry;

    async fn connect_and_register(
        &self,
        instance_id: &str,
        service: &ServiceConfig,
        registry: &RegistryConfig,
    ) -> Result<ConsulRegistry> {
        ConsulRegistry::make_and_register(instance_id, Some(service), Some(registry)).await
    }
}
