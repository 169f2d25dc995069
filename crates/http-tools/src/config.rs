use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Outbound authentication scheme of a tool server.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "authType", rename_all = "snake_case")]
pub enum AuthScheme {
    /// No authentication.
    #[default]
    None,
    /// API key sent as a request header (`X-API-Key` unless overridden).
    ApiKeyHeader {
        #[serde(default, rename = "headerName")]
        header_name: Option<String>,
        #[serde(default)]
        value: String,
    },
    /// API key appended to the query string (`api_key` unless overridden).
    ApiKeyQuery {
        #[serde(default, rename = "paramName")]
        param_name: Option<String>,
        #[serde(default)]
        value: String,
    },
    /// `Authorization: Bearer <token>`.
    BearerToken {
        #[serde(default)]
        token: String,
    },
    /// `Authorization: Basic base64(username:password)`.
    Basic {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
}

/// Authentication configuration attached to a tool server.
///
/// `extraHeaders` are sent on every call and are applied before the scheme's own header.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(flatten)]
    pub scheme: AuthScheme,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

impl AuthConfig {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_scheme(scheme: AuthScheme) -> Self {
        Self {
            scheme,
            extra_headers: BTreeMap::new(),
        }
    }
}

/// Source of an outbound header value.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum HeaderValueSource {
    /// Fixed value sent on every call.
    Static(String),
    /// Copied from the named call argument when it is defined.
    FromArg {
        #[serde(rename = "fromArg")]
        from_arg: String,
    },
}

/// An HTTP-backed tool: how call arguments become one outbound request.
///
/// Mapping tables go from destination name (query parameter / body property / header) to
/// argument key. An empty body mapping forwards the whole argument object as the body.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub base_url: String,
    pub path_template: String,
    #[serde(default)]
    pub query_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub body_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub headers_mapping: BTreeMap<String, HeaderValueSource>,
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_input_schema() -> Value {
    serde_json::json!({"type": "object", "additionalProperties": true, "properties": {}})
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn auth_config_reads_flat_camel_case_shape() {
        let cfg: AuthConfig = serde_json::from_value(json!({
            "authType": "api_key_header",
            "headerName": "X-Token",
            "value": "k1",
            "extraHeaders": {"X-Tenant": "acme"}
        }))
        .expect("auth config");

        assert_eq!(
            cfg.scheme,
            AuthScheme::ApiKeyHeader {
                header_name: Some("X-Token".to_string()),
                value: "k1".to_string(),
            }
        );
        assert_eq!(cfg.extra_headers.get("X-Tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn auth_config_defaults_to_none() {
        let cfg: AuthConfig = serde_json::from_value(json!({"authType": "none"})).expect("none");
        assert_eq!(cfg, AuthConfig::none());
    }

    #[test]
    fn header_mapping_accepts_static_and_from_arg() {
        let def: HttpToolDefinition = serde_json::from_value(json!({
            "name": "get_user",
            "pathTemplate": "/users/{id}",
            "headersMapping": {
                "X-Static": "1",
                "X-Trace": {"fromArg": "trace"}
            }
        }))
        .expect("definition");

        assert_eq!(def.method, "GET");
        assert!(def.enabled);
        assert_eq!(
            def.headers_mapping.get("X-Static"),
            Some(&HeaderValueSource::Static("1".to_string()))
        );
        assert_eq!(
            def.headers_mapping.get("X-Trace"),
            Some(&HeaderValueSource::FromArg {
                from_arg: "trace".to_string()
            })
        );
    }
}
