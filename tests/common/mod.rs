//! 测试公共设施：内存注册中心、脚本化连接器和 axum 实现的 Consul agent

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use flare_discovery::{
    ConnectOptions, DiscoveryError, Registry, RegistryConfig, RegistryConnector, Result,
    ServiceConfig,
};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tonic::transport::{Channel, Endpoint};

// ============================================================
// 内存注册中心
// ============================================================

/// 所有 FakeRegistry 共享的调用记录
#[derive(Debug, Default)]
pub struct Journal {
    /// (registry id, 上报是否成功)
    pub reports: Vec<(u32, bool)>,
    /// (registry id, instance id)
    pub deregistered: Vec<(u32, String)>,
    /// 连接器被调用的次数
    pub connects: u32,
}

pub type SharedJournal = Arc<Mutex<Journal>>;

pub struct FakeRegistry {
    pub id: u32,
    pub healthy: bool,
    pub journal: SharedJournal,
}

impl FakeRegistry {
    pub fn new(id: u32, healthy: bool, journal: SharedJournal) -> Self {
        Self {
            id,
            healthy,
            journal,
        }
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn register(
        &self,
        _service_name: &str,
        _instance_id: &str,
        _host: &str,
        _port: u16,
        _tags: &[String],
    ) -> Result<()> {
        Ok(())
    }

    async fn deregister(&self, _service_name: &str, instance_id: &str) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .deregistered
            .push((self.id, instance_id.to_string()));
        Ok(())
    }

    async fn service_addresses(&self, service_name: &str) -> Result<Vec<String>> {
        Err(DiscoveryError::not_found(service_name))
    }

    async fn report_healthy_state(
        &self,
        _service_name: &str,
        _instance_id: &str,
        _comments: &[&str],
    ) -> Result<()> {
        self.journal.lock().unwrap().reports.push((self.id, self.healthy));
        if self.healthy {
            Ok(())
        } else {
            Err(DiscoveryError::backend(format!("registry {} connection lost", self.id)))
        }
    }

    async fn service_connect_grpc(
        &self,
        _service_name: &str,
        _options: &ConnectOptions,
    ) -> Result<Channel> {
        Ok(Endpoint::from_static("http://127.0.0.1:1").connect_lazy())
    }
}

/// 按脚本依次返回结果的连接器，脚本耗尽后一直失败
pub struct ScriptedConnector {
    script: Mutex<VecDeque<std::result::Result<u32, String>>>,
    journal: SharedJournal,
}

impl ScriptedConnector {
    pub fn new(
        script: Vec<std::result::Result<u32, String>>,
        journal: SharedJournal,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            journal,
        }
    }
}

#[async_trait]
impl RegistryConnector for ScriptedConnector {
    type Registry = FakeRegistry;

    async fn connect_and_register(
        &self,
        _instance_id: &str,
        _service: &ServiceConfig,
        _registry: &RegistryConfig,
    ) -> Result<FakeRegistry> {
        let attempt = {
            let mut journal = self.journal.lock().unwrap();
            journal.connects += 1;
            journal.connects
        };
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(id)) => Ok(FakeRegistry::new(id, true, self.journal.clone())),
            Some(Err(reason)) => Err(DiscoveryError::backend(reason)),
            None => Err(DiscoveryError::backend(format!("connect attempt {} refused", attempt))),
        }
    }
}

pub fn test_service() -> ServiceConfig {
    ServiceConfig::new("orders", "127.0.0.1", 9000).with_tag("grpc")
}

// ============================================================
// Consul agent
// ============================================================

#[derive(Debug, Default)]
pub struct AgentState {
    /// instance id -> 注册请求体
    pub services: HashMap<String, Value>,
    /// (check id, 更新请求体)
    pub updates: Vec<(String, Value)>,
    /// 每个请求携带的 Authorization 头
    pub authorizations: Vec<Option<String>>,
    /// 健康查询的原始 query string
    pub health_queries: Vec<Option<String>>,
    /// 健康查询不返回 X-Consul-Index
    pub omit_index: bool,
    /// 健康查询返回 500
    pub fail_health: bool,
}

pub type SharedAgent = Arc<Mutex<AgentState>>;

fn record_auth(state: &SharedAgent, headers: &HeaderMap) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    state.lock().unwrap().authorizations.push(auth);
}

async fn register(
    State(state): State<SharedAgent>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    record_auth(&state, &headers);
    let id = body["ID"].as_str().unwrap_or_default().to_string();
    state.lock().unwrap().services.insert(id, body);
    StatusCode::OK
}

async fn deregister(
    State(state): State<SharedAgent>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    record_auth(&state, &headers);
    match state.lock().unwrap().services.remove(&id) {
        Some(_) => (StatusCode::OK, String::new()),
        None => (StatusCode::NOT_FOUND, format!("Unknown service ID {:?}", id)),
    }
}

async fn update_check(
    State(state): State<SharedAgent>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record_auth(&state, &headers);
    let mut state = state.lock().unwrap();
    if !state.services.contains_key(&id) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unknown check ID {:?}", id),
        );
    }
    state.updates.push((id, body));
    (StatusCode::OK, String::new())
}

async fn health(
    State(state): State<SharedAgent>,
    headers: HeaderMap,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    record_auth(&state, &headers);
    let mut state = state.lock().unwrap();
    state.health_queries.push(query);
    if state.fail_health {
        return (StatusCode::INTERNAL_SERVER_ERROR, "agent unavailable").into_response();
    }

    let mut services: Vec<&Value> = state
        .services
        .values()
        .filter(|s| s["Name"].as_str() == Some(name.as_str()))
        .collect();
    services.sort_by_key(|s| s["Port"].as_u64());

    let entries: Vec<Value> = services
        .into_iter()
        .map(|s| {
            json!({
                "Node": { "Node": "node-1", "Address": "10.0.0.1" },
                "Service": {
                    "ID": s["ID"],
                    "Service": s["Name"],
                    "Address": s["Address"],
                    "Port": s["Port"],
                    "Tags": s["Tags"],
                },
                "Checks": [],
            })
        })
        .collect();

    if state.omit_index {
        Json(entries).into_response()
    } else {
        ([("X-Consul-Index", "7")], Json(entries)).into_response()
    }
}

/// 启动 Consul agent，返回监听地址和共享状态
pub async fn spawn_agent() -> (SocketAddr, SharedAgent) {
    let state = SharedAgent::default();
    let app = Router::new()
        .route("/v1/agent/service/register", put(register))
        .route("/v1/agent/service/deregister/{id}", put(deregister))
        .route("/v1/agent/check/update/{id}", put(update_check))
        .route("/v1/health/service/{name}", get(health))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

pub fn agent_config(addr: SocketAddr) -> RegistryConfig {
    RegistryConfig::new(addr.ip().to_string(), addr.port())
}
