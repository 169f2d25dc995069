//! JSON-RPC 2.0 bridge exposing a tool server's HTTP tools over MCP.

use crate::AppState;
use crate::identity::caller_identity;
use crate::precedence::ResolveError;
use crate::servers::{normalize_slug, resolve_server};
use crate::store::{StoreError, ToolServerConfig};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use mbx_http_tools::runtime::to_mcp_tool;
use mbx_http_tools::schema::required_arguments;
use rmcp::model::{CallToolResult, Content, ErrorCode, ErrorData, ProtocolVersion};
use serde_json::{Map, Value, json};
use tracing::Instrument as _;

/// Domain failures: missing or invalid API key.
const CREDENTIAL_ERROR: ErrorCode = ErrorCode(-32000);
/// Domain failure: no tool server answers the slug.
const SERVER_NOT_FOUND: ErrorCode = ErrorCode(-32004);

#[derive(Debug, Clone, PartialEq)]
struct RpcFailure {
    status: StatusCode,
    code: ErrorCode,
    message: String,
    data: Option<Value>,
}

impl RpcFailure {
    fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Errors reported inside a successful HTTP exchange.
    fn in_protocol(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, code, message)
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn internal(context: &str, e: &StoreError) -> Self {
        tracing::error!(error = %e, "internal error when {context}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::INTERNAL_ERROR,
            "Internal error",
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RpcEnvelope {
    /// `None` for notifications.
    id: Option<Value>,
    method: String,
    params: Value,
}

fn rpc_response(status: StatusCode, body: &Value) -> Response {
    (status, [(CACHE_CONTROL, "no-store")], Json(body)).into_response()
}

fn jsonrpc_result(id: Value, result: Value) -> Response {
    rpc_response(
        StatusCode::OK,
        &json!({ "jsonrpc": "2.0", "id": id, "result": result }),
    )
}

fn jsonrpc_error(id: Value, failure: RpcFailure) -> Response {
    let error = ErrorData::new(failure.code, failure.message, failure.data);
    rpc_response(
        failure.status,
        &json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    )
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

/// Validate transport and envelope. On failure, returns the id to echo with the error.
fn frame_request(headers: &HeaderMap, body: &[u8]) -> Result<RpcEnvelope, (Value, RpcFailure)> {
    if !is_json_content_type(headers) {
        return Err((
            Value::Null,
            RpcFailure::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorCode::PARSE_ERROR,
                "Content-Type must be application/json",
            ),
        ));
    }
    let value: Value = serde_json::from_slice(body).map_err(|_| {
        (
            Value::Null,
            RpcFailure::new(StatusCode::BAD_REQUEST, ErrorCode::PARSE_ERROR, "Parse error"),
        )
    })?;

    let Value::Object(mut envelope) = value else {
        return Err((
            Value::Null,
            RpcFailure::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::INVALID_REQUEST,
                "Invalid Request",
            ),
        ));
    };
    let id = envelope.remove("id");
    let version_ok = envelope.get("jsonrpc").and_then(Value::as_str) == Some("2.0");
    let method = envelope
        .get("method")
        .and_then(Value::as_str)
        .map(str::to_string);
    let (true, Some(method)) = (version_ok, method) else {
        return Err((
            id.unwrap_or(Value::Null),
            RpcFailure::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::INVALID_REQUEST,
                "Invalid Request",
            ),
        ));
    };

    Ok(RpcEnvelope {
        id,
        method,
        params: envelope.remove("params").unwrap_or(Value::Null),
    })
}

fn resolution_failure(slug: &str, e: ResolveError) -> RpcFailure {
    match e {
        ResolveError::MissingCredential => {
            RpcFailure::new(StatusCode::UNAUTHORIZED, CREDENTIAL_ERROR, "Missing API key")
        }
        ResolveError::InvalidCredential => {
            RpcFailure::new(StatusCode::UNAUTHORIZED, CREDENTIAL_ERROR, "Invalid API key")
        }
        ResolveError::NotFound | ResolveError::KeyMismatch => RpcFailure::new(
            StatusCode::NOT_FOUND,
            SERVER_NOT_FOUND,
            format!("MCP server not found for slug: {slug}"),
        ),
        ResolveError::Store(e) => RpcFailure::internal("resolving tool server", &e),
    }
}

fn initialize_result(server: &ToolServerConfig, params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .map_or_else(|| json!(ProtocolVersion::LATEST), |v| json!(v));
    json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": server.spec.name,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

async fn list_tools(state: &AppState, server: &ToolServerConfig) -> Result<Value, RpcFailure> {
    let tools = state
        .store
        .list_tools(server.id)
        .await
        .map_err(|e| RpcFailure::internal("listing tools", &e))?;
    let tools: Vec<_> = tools
        .iter()
        .filter(|t| t.definition.enabled)
        .map(|t| to_mcp_tool(&t.definition))
        .collect();
    Ok(json!({ "tools": tools }))
}

fn missing_required(schema: &Value, arguments: &Map<String, Value>) -> Vec<String> {
    required_arguments(schema)
        .into_iter()
        .filter(|name| arguments.get(name).is_none_or(Value::is_null))
        .collect()
}

async fn call_tool(
    state: &AppState,
    server: &ToolServerConfig,
    params: &Value,
) -> Result<Value, RpcFailure> {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return Err(RpcFailure::in_protocol(
            ErrorCode::INVALID_PARAMS,
            "tools/call requires a tool name",
        ));
    };
    let tool = state
        .store
        .find_tool(server.id, name)
        .await
        .map_err(|e| RpcFailure::internal("loading tool", &e))?
        .filter(|t| t.definition.enabled)
        .ok_or_else(|| {
            RpcFailure::in_protocol(ErrorCode::INVALID_PARAMS, format!("Unknown tool: {name}"))
        })?;

    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(RpcFailure::in_protocol(
                ErrorCode::INVALID_PARAMS,
                "Tool arguments must be an object",
            ));
        }
    };

    let missing = missing_required(&tool.definition.input_schema, &arguments);
    if !missing.is_empty() {
        return Err(RpcFailure::in_protocol(
            ErrorCode::INVALID_PARAMS,
            format!("Missing required arguments: {}", missing.join(", ")),
        )
        .with_data(json!({ "missing": missing })));
    }

    let result = match state
        .executor
        .execute(&tool.definition, &server.spec.auth, &Value::Object(arguments))
        .await
    {
        Ok(response) => {
            tracing::info!(tool = %name, status = response.status, "tool call completed");
            response.to_call_tool_result()
        }
        Err(e) => {
            tracing::warn!(tool = %name, error = %e, "tool call failed");
            CallToolResult {
                content: vec![Content::text(e.to_string())],
                structured_content: None,
                is_error: Some(true),
                meta: None,
            }
        }
    };
    serde_json::to_value(result).map_err(|e| {
        tracing::error!(error = %e, "unserializable tool result");
        RpcFailure::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::INTERNAL_ERROR,
            "Internal error",
        )
    })
}

async fn dispatch(
    state: &AppState,
    server: &ToolServerConfig,
    envelope: &RpcEnvelope,
) -> Result<Value, RpcFailure> {
    match envelope.method.as_str() {
        "initialize" => Ok(initialize_result(server, &envelope.params)),
        "ping" => Ok(json!({})),
        "tools/list" => list_tools(state, server).await,
        "tools/call" => call_tool(state, server, &envelope.params).await,
        "notifications/initialized" => Ok(Value::Null),
        other => Err(RpcFailure::in_protocol(
            ErrorCode::METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    }
}

/// `POST /mcp/{slug}`.
pub async fn handle_rpc_post(
    State(state): State<AppState>,
    Path(raw_slug): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let span = tracing::info_span!("rpc", slug = %raw_slug, rpc_method = tracing::field::Empty);
    async move {
        let envelope = match frame_request(&headers, &body) {
            Ok(envelope) => envelope,
            Err((id, failure)) => return jsonrpc_error(id, failure),
        };
        tracing::Span::current().record("rpc_method", envelope.method.as_str());

        let Some(id) = envelope.id.clone() else {
            tracing::debug!("notification acknowledged");
            return jsonrpc_result(Value::Null, Value::Null);
        };

        let slug = normalize_slug(&raw_slug);
        if slug.is_empty() {
            return jsonrpc_error(
                id,
                RpcFailure::new(
                    StatusCode::BAD_REQUEST,
                    ErrorCode::INVALID_PARAMS,
                    "Invalid MCP server slug",
                ),
            );
        }

        let identity = caller_identity(&headers, state.sessions.as_ref());
        let server = match resolve_server(state.store.as_ref(), &slug, &identity).await {
            Ok(server) => server,
            Err(e) => return jsonrpc_error(id, resolution_failure(&slug, e)),
        };

        match dispatch(&state, &server, &envelope).await {
            Ok(result) => jsonrpc_result(id, result),
            Err(failure) => jsonrpc_error(id, failure),
        }
    }
    .instrument(span)
    .await
}

/// `GET /mcp/{slug}`: liveness only, no resolution.
pub async fn handle_rpc_get(Path(raw_slug): Path<String>) -> Response {
    let slug = normalize_slug(&raw_slug);
    rpc_response(
        StatusCode::OK,
        &json!({ "ok": true, "slug": slug, "message": "MCP endpoint is running" }),
    )
}
