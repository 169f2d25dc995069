//! Turning a matched route into an HTTP response.

use crate::dataset::{normalize_json, resolve_dataset_payload};
use crate::error::MockError;
use crate::request::MockRequest;
use crate::routing::MatchedRoute;
use crate::store::{ResponseMode, Store};
use crate::template::TemplateRenderer;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResponse {
    pub status: StatusCode,
    /// Lower-case header names.
    pub headers: BTreeMap<String, String>,
    pub body: Value,
    pub delay: Duration,
}

impl IntoResponse for RenderedResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        (self.status, headers, self.body.to_string()).into_response()
    }
}

fn response_headers(custom: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::from([
        (CONTENT_TYPE.as_str().to_string(), "application/json".to_string()),
        (CACHE_CONTROL.as_str().to_string(), "no-store".to_string()),
    ]);
    for (name, value) in custom {
        headers.insert(name.trim().to_ascii_lowercase(), value.clone());
    }
    headers
}

/// Context handed to the template renderer.
#[must_use]
pub fn template_context(matched: &MatchedRoute, request: &MockRequest, now: OffsetDateTime) -> Value {
    let params: Map<String, Value> = matched
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone().map_or(Value::Null, Value::String)))
        .collect();
    let vars: Map<String, Value> = matched
        .route
        .spec
        .vars
        .iter()
        .map(|v| (v.key.clone(), Value::String(v.value.clone())))
        .collect();
    let body = match (&request.json, request.raw_body.is_empty()) {
        (Some(json), _) => json.clone(),
        (None, true) => Value::Null,
        (None, false) => Value::String(request.raw_body.clone()),
    };
    let now = now.format(&Rfc3339).unwrap_or_default();

    json!({
        "request": {
            "method": request.method,
            "path": request.path,
            "url": request.url,
            "params": params,
            "query": request.query,
            "headers": request.headers,
            "body": body,
            "rawBody": request.raw_body,
            "json": request.json,
        },
        "params": params,
        "vars": vars,
        "now": now,
    })
}

fn finish_body(rendered: &str, is_json: bool) -> Result<Value, MockError> {
    if !is_json {
        return Ok(json!({ "body": rendered }));
    }
    normalize_json(&Value::String(rendered.to_string()))
        .map_err(|_| MockError::Render("Invalid JSON in route.responseBody".to_string()))
}

/// Produce the response a matched route serves for `request`.
///
/// # Errors
///
/// Returns [`MockError::Render`] when stored content cannot be rendered as declared.
pub async fn render_response(
    store: &dyn Store,
    renderer: &dyn TemplateRenderer,
    matched: &MatchedRoute,
    request: &MockRequest,
    now: OffsetDateTime,
) -> Result<RenderedResponse, MockError> {
    let spec = &matched.route.spec;
    let configured_status = spec
        .response_status
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::OK);

    let (status, body) = match &spec.response_mode {
        ResponseMode::Static => (
            configured_status,
            finish_body(&spec.response_body, spec.response_is_json)?,
        ),
        ResponseMode::Template => {
            let context = template_context(matched, request, now);
            let rendered = renderer
                .render(&spec.response_body, &context)
                .map_err(|e| MockError::Render(format!("Template rendering failed: {e}")))?;
            (configured_status, finish_body(&rendered, spec.response_is_json)?)
        }
        ResponseMode::DatasetLookup(options) => {
            let payload = resolve_dataset_payload(
                store,
                matched.route.id,
                options,
                &matched.params,
                &request.query,
            )
            .await?;
            (payload.status, payload.body)
        }
    };

    Ok(RenderedResponse {
        status,
        headers: response_headers(&spec.response_headers),
        body,
        delay: Duration::from_millis(spec.response_delay_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::PathParams;
    use crate::memory_store::MemoryStore;
    use crate::store::{RouteDefinition, RouteSpec, Scope, TemplateVar};
    use crate::template::PlaceholderRenderer;
    use axum::http::{Method, Uri};

    fn matched(spec: Value, params: &[(&str, Option<&str>)]) -> MatchedRoute {
        let mut spec = spec;
        spec["scope"] = json!(Scope::new("t", "p"));
        spec.as_object_mut()
            .expect("object")
            .entry("path")
            .or_insert(json!("/x"));
        let spec: RouteSpec = serde_json::from_value(spec).expect("spec");
        let params: PathParams = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.map(str::to_string)))
            .collect();
        MatchedRoute {
            route: RouteDefinition { id: 1, spec },
            params,
        }
    }

    fn request(uri: &str, body: &[u8]) -> MockRequest {
        let uri: Uri = uri.parse().expect("uri");
        MockRequest::from_parts(&Method::POST, &uri, &HeaderMap::new(), body)
    }

    async fn render(m: &MatchedRoute, req: &MockRequest) -> Result<RenderedResponse, MockError> {
        let store = MemoryStore::new();
        render_response(&store, &PlaceholderRenderer, m, req, OffsetDateTime::UNIX_EPOCH).await
    }

    #[tokio::test]
    async fn static_json_body_with_defaults() {
        let m = matched(json!({"responseBody": " {\"ok\": true} "}), &[]);
        let out = render(&m, &request("/x", b"")).await.expect("render");
        assert_eq!(out.status, StatusCode::OK);
        assert_eq!(out.body, json!({"ok": true}));
        assert_eq!(
            out.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(out.headers.get("cache-control").map(String::as_str), Some("no-store"));
    }

    #[tokio::test]
    async fn custom_headers_and_status_override_defaults() {
        let m = matched(
            json!({
                "responseBody": "plain words",
                "responseIsJson": false,
                "responseStatus": 201,
                "responseHeaders": {"Content-Type": "text/plain", "X-Mock": "1"},
                "responseDelayMs": 25,
            }),
            &[],
        );
        let out = render(&m, &request("/x", b"")).await.expect("render");
        assert_eq!(out.status, StatusCode::CREATED);
        assert_eq!(out.body, json!({"body": "plain words"}));
        assert_eq!(out.headers.get("content-type").map(String::as_str), Some("text/plain"));
        assert_eq!(out.headers.get("x-mock").map(String::as_str), Some("1"));
        assert_eq!(out.delay, Duration::from_millis(25));
    }

    #[tokio::test]
    async fn broken_static_json_is_an_internal_error() {
        let m = matched(json!({"responseBody": "{nope"}), &[]);
        let err = render(&m, &request("/x", b"")).await.expect_err("invalid");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Invalid JSON in route.responseBody");
    }

    #[tokio::test]
    async fn template_sees_request_params_and_vars() {
        let mut m = matched(
            json!({
                "responseMode": {"mode": "TEMPLATE"},
                "responseBody": r#"{"id": "{{ params.id }}", "q": "{{ request.query.q }}", "n": {{ request.json.n }}, "env": "{{ vars.env }}", "opt": "{{ params.opt }}", "at": "{{ now }}"}"#,
            }),
            &[("id", Some("7")), ("opt", None)],
        );
        m.route.spec.vars.push(TemplateVar {
            key: "env".to_string(),
            value: "test".to_string(),
        });
        let out = render(&m, &request("/x?q=hello", br#"{"n": 3}"#))
            .await
            .expect("render");
        assert_eq!(
            out.body,
            json!({"id": "7", "q": "hello", "n": 3, "env": "test", "opt": "", "at": "1970-01-01T00:00:00Z"})
        );
    }

    #[tokio::test]
    async fn template_errors_surface_as_render_errors() {
        let m = matched(
            json!({"responseMode": {"mode": "TEMPLATE"}, "responseBody": "{{ params.id"}),
            &[],
        );
        let err = render(&m, &request("/x", b"")).await.expect_err("unterminated");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn context_body_falls_back_to_raw_text() {
        let m = matched(json!({}), &[]);
        let ctx = template_context(&m, &request("/x", b"a=1"), OffsetDateTime::UNIX_EPOCH);
        assert_eq!(ctx["request"]["body"], json!("a=1"));
        assert_eq!(ctx["request"]["json"], Value::Null);
        assert_eq!(ctx["request"]["method"], json!("POST"));
    }
}
