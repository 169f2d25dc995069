#![allow(dead_code)]

use anyhow::Context as _;
use mbx_gateway::memory_store::MemoryStore;
use mbx_gateway::session_token::SessionSigner;
use mbx_gateway::store::{RouteDefinition, RouteSpec, Scope, ServerSpec, Store, ToolServerConfig};
use mbx_gateway::template::PlaceholderRenderer;
use mbx_gateway::{AppState, router};
use mbx_http_tools::runtime::HttpToolExecutor;
use mbx_http_tools::safety::OutboundHttpSafety;
use mbx_test_support::TestServer;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

pub const SESSION_SECRET: &str = "test-session-secret";

/// A gateway served in-process over a shared in-memory store.
pub struct Gateway {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
    pub client: reqwest::Client,
}

impl Gateway {
    pub async fn start() -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let executor = HttpToolExecutor::new(OutboundHttpSafety::default(), Duration::from_secs(5))
            .context("build executor")?;
        let state = AppState {
            store: store.clone(),
            templates: Arc::new(PlaceholderRenderer),
            sessions: Some(SessionSigner::new(SESSION_SECRET.as_bytes()).context("session signer")?),
            executor,
        };
        let server = TestServer::start(router(state)).await?;
        Ok(Self {
            server,
            store,
            client: reqwest::Client::new(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        self.server.url(path)
    }

    pub async fn add_route(&self, spec: Value) -> anyhow::Result<RouteDefinition> {
        let spec: RouteSpec = serde_json::from_value(spec).context("route spec")?;
        Ok(self.store.create_route(spec).await?)
    }

    pub async fn add_server(&self, spec: Value) -> anyhow::Result<ToolServerConfig> {
        let spec: ServerSpec = serde_json::from_value(spec).context("server spec")?;
        Ok(self.store.create_server(spec).await?)
    }

    /// POST a JSON-RPC envelope to `/mcp/{slug}`.
    pub async fn rpc(
        &self,
        slug: &str,
        api_key: Option<&str>,
        body: &Value,
    ) -> anyhow::Result<(u16, Value)> {
        let mut req = self
            .client
            .post(self.url(&format!("/mcp/{slug}")))
            .header("Content-Type", "application/json")
            .body(body.to_string());
        if let Some(key) = api_key {
            req = req.header("x-api-key", key);
        }
        let resp = req.send().await.context("POST rpc")?;
        let status = resp.status().as_u16();
        let body = resp.json().await.context("rpc body")?;
        Ok((status, body))
    }
}

pub fn scope(tenant: &str, project: &str) -> Value {
    json!(Scope::new(tenant, project))
}

pub fn session_token(tenant: &str, project: &str) -> String {
    SessionSigner::new(SESSION_SECRET.as_bytes())
        .expect("session signer")
        .issue(Scope::new(tenant, project), Duration::from_secs(3600))
        .expect("issue session token")
}

pub fn rpc_call(id: u64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}
