//! Runtime for executing HTTP-backed tools.
//!
//! A call is turned into a [`PreparedRequest`] by pure transforms (path templating, query
//! mapping, body mapping, header layering) and only then sent. Upstream responses are returned
//! verbatim whatever their status; only transport failures are errors.

use crate::config::{AuthConfig, AuthScheme, HeaderValueSource, HttpToolDefinition};
use crate::safety::{OutboundHttpSafety, sanitize_reqwest_error};
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
const DEFAULT_API_KEY_QUERY: &str = "api_key";

#[derive(Debug, Error)]
pub enum HttpToolsError {
    #[error("config error: {0}")]
    Config(String),
    #[error("outbound HTTP blocked: {0}")]
    Blocked(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("http transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(sanitize_reqwest_error(&value))
    }
}

/// Outbound request built from a tool definition and call arguments, before any I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Upstream response, passed through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpToolResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub raw_body: String,
    /// Parsed body when the upstream sent JSON.
    pub json: Option<Value>,
}

impl HttpToolResponse {
    /// Parsed JSON body, falling back to the raw text.
    #[must_use]
    pub fn body(&self) -> Value {
        self.json
            .clone()
            .unwrap_or_else(|| Value::String(self.raw_body.clone()))
    }

    /// MCP tool result for this response. Upstream 4xx/5xx are flagged with `isError`.
    #[must_use]
    pub fn to_call_tool_result(&self) -> CallToolResult {
        let body = self.body();
        let summary = json!({ "status": self.status, "body": body });
        let text = serde_json::to_string(&summary).unwrap_or_else(|_| summary.to_string());
        CallToolResult {
            content: vec![Content::text(text)],
            structured_content: Some(json!({
                "status": self.status,
                "headers": self.headers,
                "body": body,
            })),
            is_error: Some(self.status >= 400),
            meta: None,
        }
    }
}

/// MCP `Tool` listing entry for a definition.
#[must_use]
pub fn to_mcp_tool(def: &HttpToolDefinition) -> Tool {
    let schema_obj = def
        .input_schema
        .as_object()
        .cloned()
        .unwrap_or_else(JsonObject::new);
    let mut tool = Tool::new(
        def.name.clone(),
        def.description.clone().unwrap_or_default(),
        Arc::new(schema_obj),
    );
    tool.annotations = Some(crate::semantics::annotations_for_method(&def.method));
    tool
}

/// Sends prepared tool requests with one shared client.
#[derive(Clone)]
pub struct HttpToolExecutor {
    client: Client,
    safety: OutboundHttpSafety,
    timeout: Duration,
}

impl HttpToolExecutor {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(safety: OutboundHttpSafety, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(safety.reqwest_redirect_policy())
            .build()
            .map_err(|e| HttpToolsError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            safety,
            timeout,
        })
    }

    /// Execute one tool call.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition cannot produce a valid request, the destination is
    /// blocked by the outbound policy, the transport fails, or the response exceeds the size
    /// cap. Non-2xx upstream statuses are not errors.
    pub async fn execute(
        &self,
        tool: &HttpToolDefinition,
        auth: &AuthConfig,
        arguments: &Value,
    ) -> Result<HttpToolResponse> {
        let prepared = prepare_request(tool, auth, arguments)?;
        self.safety.check_url(&prepared.url)?;

        debug!(
            tool = %tool.name,
            method = %prepared.method,
            url = %crate::safety::redact_url(&prepared.url),
            "sending tool request"
        );

        let mut request = self
            .client
            .request(prepared.method.clone(), prepared.url.clone())
            .headers(to_header_map(&prepared.headers)?)
            .timeout(self.timeout);
        if let Some(body) = &prepared.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| HttpToolsError::Config(format!("unserializable body: {e}")))?;
            request = request.body(bytes);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = collect_response_headers(response.headers());
        let bytes = read_response_body_limited_bytes(response, self.safety.max_response_bytes).await?;
        let raw_body = String::from_utf8_lossy(&bytes).into_owned();
        let json = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };

        Ok(HttpToolResponse {
            status,
            headers,
            raw_body,
            json,
        })
    }
}

/// Build the outbound request for a call without sending it.
///
/// # Errors
///
/// Returns an error if the method is not a valid HTTP token or the resulting URL is invalid.
pub fn prepare_request(
    tool: &HttpToolDefinition,
    auth: &AuthConfig,
    arguments: &Value,
) -> Result<PreparedRequest> {
    let empty = Map::new();
    let args = arguments.as_object().unwrap_or(&empty);

    let method = parse_http_method(&tool.name, &tool.method)?;
    let path = apply_path_template(&tool.path_template, args);
    let mut query = build_query_pairs(&tool.query_mapping, args);
    apply_query_auth(auth, &mut query);
    let url = build_url(&tool.base_url, &path, &query)?;

    let body = build_body(&method, &tool.body_mapping, args);
    let mut headers = build_headers(&tool.headers_mapping, auth, args);
    if body.is_some() && !has_header(&headers, "content-type") {
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
    }

    Ok(PreparedRequest {
        method,
        url,
        headers,
        body,
    })
}

fn parse_http_method(tool_name: &str, method: &str) -> Result<Method> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()).map_err(|_| {
        HttpToolsError::Config(format!(
            "tool '{tool_name}': invalid HTTP method '{method}'"
        ))
    })
}

/// Substitute `{name}` and `:name` tokens with URL-encoded argument values.
///
/// Tokens without a defined (present, non-null) argument are left untouched, except an optional
/// `:name?` token, which is dropped together with its leading `/`.
#[must_use]
pub fn apply_path_template(template: &str, args: &Map<String, Value>) -> String {
    let braced = replace_braced_tokens(template, args);
    replace_colon_tokens(&braced, args)
}

fn defined_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|v| !v.is_null())
}

fn replace_braced_tokens(template: &str, args: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match defined_arg(args, name.trim()) {
            Some(value) if !name.trim().is_empty() => {
                out.push_str(&encode_path_component(&value_to_string(value)));
            }
            _ => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn replace_colon_tokens(template: &str, args: &Map<String, Value>) -> String {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    let mut literal_start = 0;
    while i < bytes.len() {
        if bytes[i] != b':' {
            i += 1;
            continue;
        }
        let name_start = i + 1;
        let mut name_end = name_start;
        while name_end < bytes.len() && is_param_name_byte(bytes[name_end]) {
            name_end += 1;
        }
        if name_end == name_start {
            i += 1;
            continue;
        }
        let optional = bytes.get(name_end) == Some(&b'?');
        let token_end = if optional { name_end + 1 } else { name_end };
        let name = &template[name_start..name_end];

        match defined_arg(args, name) {
            Some(value) => {
                out.push_str(&template[literal_start..i]);
                out.push_str(&encode_path_component(&value_to_string(value)));
            }
            None if optional => {
                let mut literal = &template[literal_start..i];
                if literal.ends_with('/') {
                    literal = &literal[..literal.len() - 1];
                }
                out.push_str(literal);
            }
            None => {
                out.push_str(&template[literal_start..token_end]);
            }
        }
        i = token_end;
        literal_start = token_end;
    }
    out.push_str(&template[literal_start..]);
    out
}

fn is_param_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Query pairs from the mapping (destination name -> argument key) for defined arguments.
#[must_use]
pub fn build_query_pairs(
    mapping: &BTreeMap<String, String>,
    args: &Map<String, Value>,
) -> Vec<(String, String)> {
    mapping
        .iter()
        .filter_map(|(dest, arg_key)| {
            defined_arg(args, arg_key).map(|v| (dest.clone(), value_to_string(v)))
        })
        .collect()
}

/// Request body for a call.
///
/// GET and HEAD never carry a body. With an empty mapping the whole argument object is sent
/// (nothing when there are no arguments); otherwise only mapped keys present in the arguments.
#[must_use]
pub fn build_body(
    method: &Method,
    mapping: &BTreeMap<String, String>,
    args: &Map<String, Value>,
) -> Option<Value> {
    if method == Method::GET || method == Method::HEAD {
        return None;
    }

    if mapping.is_empty() {
        return if args.is_empty() {
            None
        } else {
            Some(Value::Object(args.clone()))
        };
    }

    let mut body = Map::new();
    for (dest, arg_key) in mapping {
        if let Some(value) = args.get(arg_key) {
            body.insert(dest.clone(), value.clone());
        }
    }
    Some(Value::Object(body))
}

/// Outbound headers, layered: tool headers, then auth extra headers, then the auth scheme.
///
/// Names compare case-insensitively and later layers replace earlier ones.
#[must_use]
pub fn build_headers(
    mapping: &BTreeMap<String, HeaderValueSource>,
    auth: &AuthConfig,
    args: &Map<String, Value>,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for (name, source) in mapping {
        match source {
            HeaderValueSource::Static(value) => set_header(&mut headers, name, value.clone()),
            HeaderValueSource::FromArg { from_arg } => {
                if let Some(value) = defined_arg(args, from_arg) {
                    set_header(&mut headers, name, value_to_string(value));
                }
            }
        }
    }

    for (name, value) in &auth.extra_headers {
        set_header(&mut headers, name, value.clone());
    }

    match &auth.scheme {
        AuthScheme::ApiKeyHeader { header_name, value } if !value.is_empty() => {
            let name = header_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(DEFAULT_API_KEY_HEADER);
            set_header(&mut headers, name, value.clone());
        }
        AuthScheme::BearerToken { token } if !token.is_empty() => {
            set_header(&mut headers, "Authorization", format!("Bearer {token}"));
        }
        AuthScheme::Basic { username, password } if !username.is_empty() || !password.is_empty() => {
            let encoded =
                base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
            set_header(&mut headers, "Authorization", format!("Basic {encoded}"));
        }
        _ => {}
    }

    headers
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value));
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
}

fn apply_query_auth(auth: &AuthConfig, query: &mut Vec<(String, String)>) {
    if let AuthScheme::ApiKeyQuery { param_name, value } = &auth.scheme
        && !value.is_empty()
    {
        let name = param_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_API_KEY_QUERY);
        query.push((name.to_string(), value.clone()));
    }
}

fn build_url(base_url: &str, path: &str, query: &[(String, String)]) -> Result<Url> {
    let path = if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let joined = format!("{}{}", base_url.trim().trim_end_matches('/'), path);
    let mut url = Url::parse(&joined)
        .map_err(|e| HttpToolsError::Config(format!("invalid tool URL '{joined}': {e}")))?;

    if !query.is_empty() {
        let mut encoded = url.query().unwrap_or_default().to_string();
        for (key, value) in query {
            if !encoded.is_empty() {
                encoded.push('&');
            }
            encoded.push_str(&encode_query_component(key));
            encoded.push('=');
            encoded.push_str(&encode_query_component(value));
        }
        url.set_query(Some(&encoded));
    }

    Ok(url)
}

fn to_header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HttpToolsError::Config(format!("invalid header name '{name}'")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| HttpToolsError::Config(format!("invalid value for header '{name}'")))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn collect_response_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

async fn read_response_body_limited_bytes(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
) -> Result<Vec<u8>> {
    let Some(max) = max_bytes else {
        let bytes = response.bytes().await.map_err(HttpToolsError::from)?;
        return Ok(bytes.to_vec());
    };

    if let Some(len) = response.content_length()
        && len > max as u64
    {
        return Err(HttpToolsError::Http(format!(
            "Response too large: {len} bytes (limit {max})"
        )));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(HttpToolsError::from)? {
        if out.len().saturating_add(chunk.len()) > max {
            return Err(HttpToolsError::Http(format!(
                "Response too large: exceeded {max} bytes"
            )));
        }
        out.extend_from_slice(&chunk);
    }

    Ok(out)
}

/// Percent-encode like `encodeURIComponent`.
fn encode_path_component(s: &str) -> String {
    percent_encode(s, |b| {
        is_unreserved(b) || matches!(b, b'!' | b'*' | b'\'' | b'(' | b')')
    })
}

fn encode_query_component(s: &str) -> String {
    percent_encode(s, is_unreserved)
}

fn percent_encode(s: &str, keep: impl Fn(u8) -> bool) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if keep(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}
