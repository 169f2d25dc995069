use async_trait::async_trait;
use mbx_http_tools::config::{AuthConfig, HttpToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub type RouteId = i64;
pub type RecordId = i64;
pub type ServerId = i64;
pub type ToolId = i64;

/// Owning tenant + project of a route or tool server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub tenant_id: String,
    pub project_id: String,
}

impl Scope {
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
        }
    }
}

/// Options of a dataset-backed route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetLookupOptions {
    /// Path parameter (or query parameter) carrying the lookup key.
    #[serde(default)]
    pub lookup_param_name: Option<String>,
    #[serde(default)]
    pub not_found_status: Option<u16>,
    #[serde(default)]
    pub not_found_body: Option<Value>,
    /// `None` behaves like `true`.
    #[serde(default)]
    pub return_all_when_no_key: Option<bool>,
}

/// How a route produces its body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseMode {
    #[default]
    Static,
    Template,
    DatasetLookup(DatasetLookupOptions),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVar {
    pub key: String,
    pub value: String,
}

/// Writable part of a mock route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    pub scope: Scope,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub require_api_key: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub response_mode: ResponseMode,
    #[serde(default)]
    pub response_status: Option<u16>,
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub response_body: String,
    #[serde(default = "default_true")]
    pub response_is_json: bool,
    #[serde(default)]
    pub response_delay_ms: u64,
    #[serde(default)]
    pub vars: Vec<TemplateVar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDefinition {
    pub id: RouteId,
    #[serde(flatten)]
    pub spec: RouteSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRecord {
    pub id: RecordId,
    pub route_id: RouteId,
    pub key: String,
    /// Parsed JSON, normalized once on write and served verbatim.
    pub value: Value,
    pub enabled: bool,
}

/// Input for creating a dataset record. `value` may be structured JSON or JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDatasetRecord {
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetRecordPatch {
    pub key: Option<String>,
    pub value: Option<Value>,
    pub enabled: Option<bool>,
}

/// Writable part of a tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    pub scope: Scope,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Default base URL for tools imported from mock routes.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub require_api_key: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolServerConfig {
    pub id: ServerId,
    #[serde(flatten)]
    pub spec: ServerSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRecord {
    pub id: ToolId,
    pub server_id: ServerId,
    #[serde(flatten)]
    pub definition: HttpToolDefinition,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule was violated.
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    /// The input was rejected before anything was written.
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Source of truth for routes, dataset records, tool servers and tools.
///
/// Implementations must return fresh data on every call; callers never cache.
#[async_trait]
pub trait Store: Send + Sync {
    // Routes.
    async fn create_route(&self, spec: RouteSpec) -> StoreResult<RouteDefinition>;
    async fn get_route(&self, id: RouteId) -> StoreResult<Option<RouteDefinition>>;
    async fn update_route(&self, id: RouteId, spec: RouteSpec) -> StoreResult<RouteDefinition>;
    async fn delete_route(&self, id: RouteId) -> StoreResult<()>;
    /// Enabled routes of `scope` with `method`, ascending id.
    async fn list_scoped_routes(&self, scope: &Scope, method: &str)
    -> StoreResult<Vec<RouteDefinition>>;
    /// Enabled route holding `api_key`.
    async fn route_by_api_key(&self, api_key: &str) -> StoreResult<Option<RouteDefinition>>;
    /// Enabled routes with `method` that do not require a key, ascending id.
    async fn list_public_routes(&self, method: &str) -> StoreResult<Vec<RouteDefinition>>;
    /// Routes of `scope` among `ids`, in `ids` order; unknown ids are skipped.
    async fn routes_by_ids(&self, scope: &Scope, ids: &[RouteId])
    -> StoreResult<Vec<RouteDefinition>>;

    // Dataset records.
    async fn create_dataset_record(
        &self,
        route_id: RouteId,
        record: NewDatasetRecord,
    ) -> StoreResult<DatasetRecord>;
    async fn update_dataset_record(
        &self,
        route_id: RouteId,
        record_id: RecordId,
        patch: DatasetRecordPatch,
    ) -> StoreResult<DatasetRecord>;
    async fn delete_dataset_record(&self, route_id: RouteId, record_id: RecordId)
    -> StoreResult<()>;
    /// All records of a route, enabled or not, ascending id.
    async fn list_dataset_records(&self, route_id: RouteId) -> StoreResult<Vec<DatasetRecord>>;
    /// Enabled records of a route, ascending id.
    async fn enabled_dataset_records(&self, route_id: RouteId) -> StoreResult<Vec<DatasetRecord>>;
    /// Enabled record with exactly `key`.
    async fn find_dataset_record(
        &self,
        route_id: RouteId,
        key: &str,
    ) -> StoreResult<Option<DatasetRecord>>;

    // Tool servers.
    async fn create_server(&self, spec: ServerSpec) -> StoreResult<ToolServerConfig>;
    async fn get_server(&self, id: ServerId) -> StoreResult<Option<ToolServerConfig>>;
    /// Enabled server of `scope` with `slug`.
    async fn server_in_scope(&self, scope: &Scope, slug: &str)
    -> StoreResult<Option<ToolServerConfig>>;
    /// Enabled server holding `api_key`.
    async fn server_by_api_key(&self, api_key: &str) -> StoreResult<Option<ToolServerConfig>>;
    /// Enabled server with `slug` that does not require a key.
    async fn public_server(&self, slug: &str) -> StoreResult<Option<ToolServerConfig>>;

    // Tools.
    /// Create all definitions or none.
    async fn create_tools(
        &self,
        server_id: ServerId,
        definitions: Vec<HttpToolDefinition>,
    ) -> StoreResult<Vec<ToolRecord>>;
    async fn list_tools(&self, server_id: ServerId) -> StoreResult<Vec<ToolRecord>>;
    async fn find_tool(&self, server_id: ServerId, name: &str) -> StoreResult<Option<ToolRecord>>;
    async fn update_tool(
        &self,
        server_id: ServerId,
        tool_id: ToolId,
        definition: HttpToolDefinition,
    ) -> StoreResult<ToolRecord>;
    async fn delete_tool(&self, server_id: ServerId, tool_id: ToolId) -> StoreResult<()>;
}
