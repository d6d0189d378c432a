//! `consul://` 目标地址解析与负载均衡连接
//!
//! 解析 `consul://[user:password@]host:port/service?query` 目标，
//! 通过 Consul 阻塞查询持续监听服务实例变化，并以
//! [`Change`] 的形式推送给 tonic 的 balance channel。

use http::HeaderName;
use reqwest::{Method, Url};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tonic::transport::channel::Change;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

use crate::duration::format_duration;
use crate::error::{DiscoveryError, Result};
use crate::options::ConnectOptions;
use crate::registry::REGISTRY_SCHEME;
use crate::registry::consul::{HealthEntry, check_status};

/// 解析失败或 agent 无法阻塞时的初始退避
const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
/// 未指定 `max-backoff` 时的退避上限
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1);
/// 未指定 `timeout` 时的 HTTP 客户端超时
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// 未指定 `wait` 时的阻塞查询等待时间，需小于 HTTP 超时
const DEFAULT_WAIT: Duration = Duration::from_secs(30);
/// balance channel 的变更缓冲
const CHANGE_BUFFER: usize = 64;

const CONSUL_INDEX: HeaderName = HeaderName::from_static("x-consul-index");
const CONSUL_TOKEN: HeaderName = HeaderName::from_static("x-consul-token");

/// 解析后的 `consul://` 目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverTarget {
    /// Consul agent 地址（`host:port`）
    pub agent: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub service: String,
    pub options: ConnectOptions,
}

impl ResolverTarget {
    pub fn parse(target: &str) -> Result<Self> {
        let invalid = |reason: &str| DiscoveryError::InvalidTarget(format!("{}: {}", target, reason));

        let url = Url::parse(target).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != REGISTRY_SCHEME {
            return Err(invalid("unsupported scheme"));
        }

        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(|| invalid("missing host"))?;
        let agent = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let service = url.path().trim_start_matches('/');
        if service.is_empty() {
            return Err(invalid("missing service name"));
        }

        let decode = |part: &str| {
            urlencoding::decode(part)
                .map(|decoded| decoded.into_owned())
                .map_err(|e| invalid(&e.to_string()))
        };
        let user = Some(decode(url.username())?).filter(|u| !u.is_empty());
        let pass = url.password().map(&decode).transpose()?;
        let service = decode(service)?;

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let options =
            ConnectOptions::from_query_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

        Ok(Self {
            agent,
            user,
            pass,
            service,
            options,
        })
    }

    /// `insecure=false` 时通过 https 访问 agent
    pub fn agent_base_url(&self) -> String {
        let scheme = if self.options.insecure == Some(false) {
            "https"
        } else {
            "http"
        };
        format!("{}://{}", scheme, self.agent)
    }

    /// 健康查询参数
    pub fn health_query(&self, index: u64) -> Vec<(&'static str, String)> {
        let options = &self.options;
        let mut query = Vec::new();
        if options.healthy == Some(true) {
            query.push(("passing", "true".to_string()));
        }
        if let Some(tag) = &options.tag {
            query.push(("tag", tag.clone()));
        }
        if let Some(near) = &options.near {
            query.push(("near", near.clone()));
        }
        if let Some(dc) = &options.dc {
            query.push(("dc", dc.clone()));
        }
        if options.allow_stale == Some(true) {
            query.push(("stale", String::new()));
        }
        if options.require_consistent == Some(true) {
            query.push(("consistent", String::new()));
        }
        if index > 0 {
            query.push(("index", index.to_string()));
            query.push(("wait", format_duration(self.wait())));
        }
        query
    }

    /// `/v1/health/service/<service>`，服务名按路径段转义
    pub fn health_url(&self) -> Result<Url> {
        let base = self.agent_base_url();
        let mut url = Url::parse(&base)
            .map_err(|e| DiscoveryError::InvalidTarget(format!("{}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| DiscoveryError::InvalidTarget(format!("{}: cannot be a base", base)))?
            .pop_if_empty()
            .extend(["v1", "health", "service", self.service.as_str()]);
        Ok(url)
    }

    fn wait(&self) -> Duration {
        self.options.wait.unwrap_or(DEFAULT_WAIT)
    }

    fn max_backoff(&self) -> Duration {
        self.options.max_backoff.unwrap_or(DEFAULT_MAX_BACKOFF)
    }
}

/// Consul 解析器
pub struct ConsulResolver {
    target: ResolverTarget,
    client: reqwest::Client,
}

impl ConsulResolver {
    pub fn new(target: ResolverTarget) -> Result<Self> {
        let timeout = target.options.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { target, client })
    }

    pub fn target(&self) -> &ResolverTarget {
        &self.target
    }

    /// 执行一次（阻塞）健康查询
    ///
    /// 返回新的 `X-Consul-Index` 与按 `limit` 截断后的地址列表
    pub async fn resolve(&self, index: u64) -> Result<(u64, Vec<String>)> {
        let url = self.target.health_url()?;
        let mut request = self
            .client
            .request(Method::GET, url)
            .query(&self.target.health_query(index));
        if let Some(user) = &self.target.user {
            request = request.basic_auth(user, self.target.pass.as_deref());
        }
        if let Some(token) = &self.target.options.token {
            request = request.header(CONSUL_TOKEN, token);
        }

        let response = check_status(request.send().await?).await?;
        let new_index = response
            .headers()
            .get(CONSUL_INDEX)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let entries: Vec<HealthEntry> = response.json().await?;

        let mut addresses: Vec<String> = entries.iter().map(HealthEntry::address).collect();
        if let Some(limit) = self.target.options.limit {
            addresses.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok((new_index, addresses))
    }

    /// 创建负载均衡连接并在后台监听实例变化
    pub fn connect(self) -> Channel {
        let (channel, tx) = Channel::balance_channel::<String>(CHANGE_BUFFER);
        tokio::spawn(self.watch(tx));
        channel
    }

    /// 持续解析并把地址变化推送到 `tx`，接收端关闭后退出
    pub async fn watch(self, tx: mpsc::Sender<Change<String, Endpoint>>) {
        let service = self.target.service.clone();
        let max_backoff = self.target.max_backoff();
        let mut backoff = INITIAL_BACKOFF;
        let mut index = 0u64;
        let mut current: HashSet<String> = HashSet::new();

        info!(service = %service, agent = %self.target.agent, "Consul resolver started");

        loop {
            let resolved = tokio::select! {
                resolved = self.resolve(index) => resolved,
                _ = tx.closed() => break,
            };

            match resolved {
                Ok((new_index, addresses)) => {
                    // 没有 index 或 index 未前进说明这次查询没有阻塞
                    let blocked = new_index > 0 && new_index != index;
                    // index 回退说明 Consul 状态被重置，重新从头查询
                    index = if new_index < index { 0 } else { new_index };

                    let latest: HashSet<String> = addresses.into_iter().collect();
                    if !apply_changes(&tx, &current, &latest).await {
                        break;
                    }
                    current = latest;

                    if blocked {
                        backoff = INITIAL_BACKOFF;
                        continue;
                    }
                    debug!(
                        service = %service,
                        index = new_index,
                        delay = ?backoff,
                        "Consul query did not block"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = tx.closed() => break,
                    }
                    backoff = (backoff * 2).min(max_backoff);
                }
                Err(e) => {
                    warn!(service = %service, error = %e, delay = ?backoff, "Consul resolve failed");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = tx.closed() => break,
                    }
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }

        debug!(service = %service, "Consul resolver stopped");
    }
}

/// 推送地址集合的增量变化，接收端关闭时返回 `false`
async fn apply_changes(
    tx: &mpsc::Sender<Change<String, Endpoint>>,
    current: &HashSet<String>,
    latest: &HashSet<String>,
) -> bool {
    for removed in current.difference(latest) {
        debug!(address = %removed, "Endpoint removed");
        if tx.send(Change::Remove(removed.clone())).await.is_err() {
            return false;
        }
    }
    for added in latest.difference(current) {
        let endpoint = match Endpoint::from_shared(format!("http://{}", added)) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(address = %added, error = %e, "Skipping unparsable endpoint");
                continue;
            }
        };
        debug!(address = %added, "Endpoint added");
        if tx.send(Change::Insert(added.clone(), endpoint)).await.is_err() {
            return false;
        }
    }
    true
}
