use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DiscoveryError, Result};
use crate::registry::CHECK_TTL;

const DEFAULT_REGISTRY_HOST: &str = "localhost";
const DEFAULT_REGISTRY_PORT: u16 = 8500;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// 被注册的服务描述
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// 注册中心（Consul agent）连接配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_host")]
    pub host: String,
    #[serde(default = "default_registry_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default = "default_scheme")]
    pub scheme: String, // http, https
}

fn default_registry_host() -> String {
    DEFAULT_REGISTRY_HOST.to_string()
}

fn default_registry_port() -> u16 {
    DEFAULT_REGISTRY_PORT
}

fn default_scheme() -> String {
    "http".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: default_registry_host(),
            port: default_registry_port(),
            user: None,
            pass: None,
            scheme: default_scheme(),
        }
    }
}

impl RegistryConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// 设置 HTTP Basic 认证
    pub fn with_basic_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.pass = Some(pass.into());
        self
    }

    /// 从环境变量覆盖默认配置
    ///
    /// - `CONSUL_HTTP_ADDR`: `host:port`，可带 `http://` / `https://` 前缀
    /// - `CONSUL_HTTP_AUTH`: `user:pass`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("CONSUL_HTTP_ADDR") {
            let rest = match addr.split_once("://") {
                Some((scheme, rest)) => {
                    config.scheme = scheme.to_string();
                    rest.to_string()
                }
                None => addr,
            };
            let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
                DiscoveryError::Config(format!("CONSUL_HTTP_ADDR must be host:port, got {}", rest))
            })?;
            config.host = host.to_string();
            config.port = port.parse().map_err(|e| {
                DiscoveryError::Config(format!("invalid port in CONSUL_HTTP_ADDR: {}", e))
            })?;
        }

        if let Ok(auth) = std::env::var("CONSUL_HTTP_AUTH") {
            match auth.split_once(':') {
                Some((user, pass)) => {
                    config.user = Some(user.to_string());
                    config.pass = Some(pass.to_string());
                }
                None => config.user = Some(auth),
            }
        }

        Ok(config)
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `scheme://host:port`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.address())
    }

    /// 用户名和密码都非空时返回认证信息
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.pass.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

/// 健康上报循环配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HealthConfig {
    /// 上报间隔（毫秒）
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// 重连最大尝试次数，0 表示无限重试
    #[serde(default)]
    pub max_attempts: u32,
    /// 取消时是否注销实例
    #[serde(default = "default_deregister_on_shutdown")]
    pub deregister_on_shutdown: bool,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_deregister_on_shutdown() -> bool {
    true
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: 0,
            deregister_on_shutdown: default_deregister_on_shutdown(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// 上报间隔必须大于 0 且小于注册时的 TTL 窗口
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(DiscoveryError::Config(
                "health.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.interval() >= CHECK_TTL {
            return Err(DiscoveryError::Config(format!(
                "health.interval_ms must be less than the {}ms check TTL, got {}",
                CHECK_TTL.as_millis(),
                self.interval_ms
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiscoveryError::Config(format!("failed to read {}: {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| DiscoveryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.name.is_empty() {
            return Err(DiscoveryError::Config("service.name must not be empty".to_string()));
        }
        self.health.validate()
    }
}
