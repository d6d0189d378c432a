//! gRPC 负载均衡连接参数
//!
//! 每个 [`ConnectOption`] 只负责校验并写入 [`ConnectOptions`] 中的一个字段，
//! 因此选项之间互不依赖、与应用顺序无关。校验在写入之前完成，
//! 非法值（负数时长、负数 limit）直接返回 [`DiscoveryError::Validation`]，
//! 不会触发任何网络调用。

use chrono::TimeDelta;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::duration::{format_duration, parse_duration};
use crate::error::{DiscoveryError, Result};

/// `near` 选项唯一接受的取值：按发起请求的源 IP 就近排序
pub const NEAR_IP: &str = "_ip";

/// 单个连接选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOption {
    /// 只选择带有该标签的实例，空字符串忽略
    Tag(String),
    /// 只返回通过全部健康检查的实例，`false` 不写入
    Healthy(bool),
    /// 阻塞查询的等待时间，0 不写入
    Wait(TimeDelta),
    /// 是否允许与 Consul 明文通信（默认允许），只有 `false` 会写入
    Insecure(bool),
    /// 就近排序提示，只接受空串或 [`NEAR_IP`]，其它取值被静默忽略
    Near(String),
    /// 实例数量上限，0 表示不限制
    Limit(i64),
    /// Consul HTTP 客户端超时，0 不写入
    Timeout(TimeDelta),
    /// 重连 Consul 的最大退避时间，0 不写入
    MaxBackoff(TimeDelta),
    /// Consul ACL token
    Token(String),
    /// 数据中心
    Datacenter(String),
    /// 允许读取过期数据
    AllowStale(bool),
    /// 强制一致性读
    RequireConsistent(bool),
}

impl ConnectOption {
    /// 校验并写入对应字段；校验失败时 `options` 保持不变
    pub fn apply(&self, options: &mut ConnectOptions) -> Result<()> {
        match self {
            ConnectOption::Tag(tag) => {
                if !tag.is_empty() {
                    options.tag = Some(tag.clone());
                }
            }
            ConnectOption::Healthy(healthy) => {
                if *healthy {
                    options.healthy = Some(true);
                }
            }
            ConnectOption::Wait(wait) => {
                if let Some(wait) = non_negative("wait time", *wait)? {
                    options.wait = Some(wait);
                }
            }
            ConnectOption::Insecure(insecure) => {
                if !insecure {
                    options.insecure = Some(false);
                }
            }
            // 非法取值不报错，直接忽略
            ConnectOption::Near(near) => {
                if near == NEAR_IP {
                    options.near = Some(NEAR_IP.to_string());
                }
            }
            ConnectOption::Limit(limit) => {
                let limit = u64::try_from(*limit)
                    .map_err(|_| DiscoveryError::validation("limit cannot be less than zero"))?;
                if limit != 0 {
                    options.limit = Some(limit);
                }
            }
            ConnectOption::Timeout(timeout) => {
                if let Some(timeout) = non_negative("timeout", *timeout)? {
                    options.timeout = Some(timeout);
                }
            }
            ConnectOption::MaxBackoff(max_backoff) => {
                if let Some(max_backoff) = non_negative("maxbackoff", *max_backoff)? {
                    options.max_backoff = Some(max_backoff);
                }
            }
            ConnectOption::Token(token) => {
                if !token.is_empty() {
                    options.token = Some(token.clone());
                }
            }
            ConnectOption::Datacenter(dc) => {
                if !dc.is_empty() {
                    options.dc = Some(dc.clone());
                }
            }
            ConnectOption::AllowStale(stale) => options.allow_stale = Some(*stale),
            ConnectOption::RequireConsistent(require) => {
                options.require_consistent = Some(*require)
            }
        }
        Ok(())
    }
}

/// 负值报错，零值返回 `None`
fn non_negative(name: &str, value: TimeDelta) -> Result<Option<Duration>> {
    let duration = value
        .to_std()
        .map_err(|_| DiscoveryError::validation(format!("{} cannot be less than zero", name)))?;
    Ok((!duration.is_zero()).then_some(duration))
}

/// 连接参数快照
///
/// 通过 [`ConnectOptions::builder`] 或 [`ConnectOptions::from_options`] 构建，
/// 构建成功后不可变。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub(crate) tag: Option<String>,
    pub(crate) healthy: Option<bool>,
    pub(crate) wait: Option<Duration>,
    pub(crate) insecure: Option<bool>,
    pub(crate) near: Option<String>,
    pub(crate) limit: Option<u64>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_backoff: Option<Duration>,
    pub(crate) token: Option<String>,
    pub(crate) dc: Option<String>,
    pub(crate) allow_stale: Option<bool>,
    pub(crate) require_consistent: Option<bool>,
}

impl ConnectOptions {
    pub fn builder() -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::default()
    }

    /// 依次应用选项，任意一个校验失败则整体失败
    pub fn from_options<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = ConnectOption>,
    {
        let mut snapshot = Self::default();
        for option in options {
            option.apply(&mut snapshot)?;
        }
        Ok(snapshot)
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn healthy(&self) -> Option<bool> {
        self.healthy
    }

    pub fn wait(&self) -> Option<Duration> {
        self.wait
    }

    pub fn insecure(&self) -> Option<bool> {
        self.insecure
    }

    pub fn near(&self) -> Option<&str> {
        self.near.as_deref()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_backoff(&self) -> Option<Duration> {
        self.max_backoff
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn dc(&self) -> Option<&str> {
        self.dc.as_deref()
    }

    pub fn allow_stale(&self) -> Option<bool> {
        self.allow_stale
    }

    pub fn require_consistent(&self) -> Option<bool> {
        self.require_consistent
    }

    /// 序列化为 `consul://` 目标地址的查询参数，按键名排序
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = BTreeMap::new();
        if let Some(tag) = &self.tag {
            pairs.insert("tag", tag.clone());
        }
        if let Some(healthy) = self.healthy {
            pairs.insert("healthy", healthy.to_string());
        }
        if let Some(wait) = self.wait {
            pairs.insert("wait", format_duration(wait));
        }
        if let Some(insecure) = self.insecure {
            pairs.insert("insecure", insecure.to_string());
        }
        if let Some(near) = &self.near {
            pairs.insert("near", near.clone());
        }
        if let Some(limit) = self.limit {
            pairs.insert("limit", limit.to_string());
        }
        if let Some(timeout) = self.timeout {
            pairs.insert("timeout", format_duration(timeout));
        }
        if let Some(max_backoff) = self.max_backoff {
            pairs.insert("max-backoff", format_duration(max_backoff));
        }
        if let Some(token) = &self.token {
            pairs.insert("token", token.clone());
        }
        if let Some(dc) = &self.dc {
            pairs.insert("dc", dc.clone());
        }
        if let Some(stale) = self.allow_stale {
            pairs.insert("allow-stale", stale.to_string());
        }
        if let Some(require) = self.require_consistent {
            pairs.insert("require-consistent", require.to_string());
        }
        pairs.into_iter().collect()
    }

    /// 从目标地址的查询参数还原快照，未知键忽略
    pub fn from_query_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut options = Self::default();
        for (key, value) in pairs {
            match key {
                "tag" => options.tag = Some(value.to_string()),
                "healthy" => options.healthy = Some(parse_bool(key, value)?),
                "wait" => options.wait = Some(parse_query_duration(key, value)?),
                "insecure" => options.insecure = Some(parse_bool(key, value)?),
                "near" => options.near = Some(value.to_string()),
                "limit" => {
                    options.limit = Some(value.parse().map_err(|_| {
                        DiscoveryError::InvalidTarget(format!("invalid limit: {}", value))
                    })?)
                }
                "timeout" => options.timeout = Some(parse_query_duration(key, value)?),
                "max-backoff" => options.max_backoff = Some(parse_query_duration(key, value)?),
                "token" => options.token = Some(value.to_string()),
                "dc" => options.dc = Some(value.to_string()),
                "allow-stale" => options.allow_stale = Some(parse_bool(key, value)?),
                "require-consistent" => options.require_consistent = Some(parse_bool(key, value)?),
                _ => tracing::debug!(key, "Ignoring unknown resolver parameter"),
            }
        }
        Ok(options)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse()
        .map_err(|_| DiscoveryError::InvalidTarget(format!("invalid {}: {}", key, value)))
}

fn parse_query_duration(key: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| DiscoveryError::InvalidTarget(format!("invalid {}: {}", key, e)))
}

/// 连接参数构建器
#[derive(Debug, Clone, Default)]
pub struct ConnectOptionsBuilder {
    options: Vec<ConnectOption>,
}

impl ConnectOptionsBuilder {
    pub fn option(mut self, option: ConnectOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn tag(self, tag: impl Into<String>) -> Self {
        self.option(ConnectOption::Tag(tag.into()))
    }

    pub fn healthy(self, healthy: bool) -> Self {
        self.option(ConnectOption::Healthy(healthy))
    }

    pub fn wait(self, wait: TimeDelta) -> Self {
        self.option(ConnectOption::Wait(wait))
    }

    pub fn insecure(self, insecure: bool) -> Self {
        self.option(ConnectOption::Insecure(insecure))
    }

    pub fn near(self, near: impl Into<String>) -> Self {
        self.option(ConnectOption::Near(near.into()))
    }

    pub fn limit(self, limit: i64) -> Self {
        self.option(ConnectOption::Limit(limit))
    }

    pub fn timeout(self, timeout: TimeDelta) -> Self {
        self.option(ConnectOption::Timeout(timeout))
    }

    pub fn max_backoff(self, max_backoff: TimeDelta) -> Self {
        self.option(ConnectOption::MaxBackoff(max_backoff))
    }

    pub fn token(self, token: impl Into<String>) -> Self {
        self.option(ConnectOption::Token(token.into()))
    }

    pub fn dc(self, dc: impl Into<String>) -> Self {
        self.option(ConnectOption::Datacenter(dc.into()))
    }

    pub fn allow_stale(self, stale: bool) -> Self {
        self.option(ConnectOption::AllowStale(stale))
    }

    pub fn require_consistent(self, require: bool) -> Self {
        self.option(ConnectOption::RequireConsistent(require))
    }

    /// 校验全部选项并生成快照
    pub fn build(self) -> Result<ConnectOptions> {
        ConnectOptions::from_options(self.options)
    }
}
