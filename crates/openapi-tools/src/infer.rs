//! Document-level inference: base URL, auth scheme, and tool names for a selection.

use crate::extract::OpenApiOperation;
use mbx_http_tools::config::AuthScheme;
use mbx_http_tools::naming::reserve_unique_tool_name;
use serde_json::Value;
use std::collections::HashSet;

/// Base URL declared by the document: first `servers[].url`, else Swagger `basePath`, else empty.
#[must_use]
pub fn infer_base_url(document: &Value) -> String {
    if let Some(url) = document
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first())
        .and_then(|server| server.get("url"))
        .and_then(Value::as_str)
    {
        return url.trim().to_string();
    }

    document
        .get("basePath")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Auth scheme the document asks for, with empty credentials.
///
/// The primary scheme is the first key of the first global `security` requirement, falling back
/// to the first declared security scheme.
#[must_use]
pub fn infer_auth(document: &Value) -> AuthScheme {
    let schemes = document
        .pointer("/components/securitySchemes")
        .or_else(|| document.get("securityDefinitions"))
        .and_then(Value::as_object);

    let primary_key = document
        .get("security")
        .and_then(Value::as_array)
        .and_then(|reqs| reqs.first())
        .and_then(Value::as_object)
        .and_then(|req| req.keys().next().cloned())
        .or_else(|| schemes.and_then(|s| s.keys().next().cloned()));

    let Some(scheme) = primary_key.and_then(|key| schemes.and_then(|s| s.get(&key))) else {
        return AuthScheme::None;
    };

    let field = |name: &str| scheme.get(name).and_then(Value::as_str).unwrap_or_default();
    let declared_name = || {
        Some(field("name").trim().to_string()).filter(|n| !n.is_empty())
    };

    match field("type") {
        "apiKey" => match field("in") {
            "header" => AuthScheme::ApiKeyHeader {
                header_name: Some(declared_name().unwrap_or_else(|| "X-API-Key".to_string())),
                value: String::new(),
            },
            "query" => AuthScheme::ApiKeyQuery {
                param_name: Some(declared_name().unwrap_or_else(|| "api_key".to_string())),
                value: String::new(),
            },
            _ => AuthScheme::None,
        },
        "http" => match field("scheme").to_ascii_lowercase().as_str() {
            "bearer" => AuthScheme::BearerToken {
                token: String::new(),
            },
            "basic" => AuthScheme::Basic {
                username: String::new(),
                password: String::new(),
            },
            _ => AuthScheme::None,
        },
        "basic" => AuthScheme::Basic {
            username: String::new(),
            password: String::new(),
        },
        _ => AuthScheme::None,
    }
}

/// An operation together with the unique tool name it will be created under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedOperation {
    pub tool_name: String,
    pub operation: OpenApiOperation,
}

/// Assign collision-free tool names, avoiding `existing` and each other.
#[must_use]
pub fn assign_tool_names<I>(operations: Vec<OpenApiOperation>, existing: I) -> Vec<NamedOperation>
where
    I: IntoIterator<Item = String>,
{
    let mut taken: HashSet<String> = existing.into_iter().collect();
    operations
        .into_iter()
        .map(|operation| NamedOperation {
            tool_name: reserve_unique_tool_name(&mut taken, &operation.suggested_name),
            operation,
        })
        .collect()
}
