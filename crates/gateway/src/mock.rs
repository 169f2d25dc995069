//! Catch-all handler serving mock routes.

use crate::AppState;
use crate::error::MockError;
use crate::identity::caller_identity;
use crate::render::{RenderedResponse, render_response};
use crate::request::MockRequest;
use crate::routing::{is_supported_method, resolve_route};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;
use tracing::Instrument as _;

/// Prefix owned by the RPC bridge; never served as a mock path.
const RPC_PREFIX: &str = "/mcp";

fn is_reserved(path: &str) -> bool {
    path == RPC_PREFIX || path.starts_with("/mcp/")
}

async fn serve(
    state: &AppState,
    headers: &HeaderMap,
    request: &MockRequest,
) -> Result<RenderedResponse, MockError> {
    if !is_supported_method(&request.method) {
        return Err(MockError::MethodNotAllowed);
    }
    if is_reserved(&request.raw_path) {
        return Err(MockError::NotFound("Route not found".to_string()));
    }
    let identity = caller_identity(headers, state.sessions.as_ref());
    let matched = resolve_route(
        state.store.as_ref(),
        &request.method,
        &request.raw_path,
        &identity,
    )
    .await?;
    tracing::Span::current().record("route_id", matched.route.id);

    let rendered = render_response(
        state.store.as_ref(),
        state.templates.as_ref(),
        &matched,
        request,
        OffsetDateTime::now_utc(),
    )
    .await?;
    if !rendered.delay.is_zero() {
        tokio::time::sleep(rendered.delay).await;
    }
    Ok(rendered)
}

pub async fn handle_mock(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = MockRequest::from_parts(&method, &uri, &headers, &body);
    let span = tracing::info_span!(
        "mock",
        method = %request.method,
        path = %request.path,
        route_id = tracing::field::Empty,
    );
    async move {
        match serve(&state, &headers, &request).await {
            Ok(rendered) => {
                tracing::debug!(status = rendered.status.as_u16(), "mock response");
                rendered.into_response()
            }
            Err(e) => {
                tracing::debug!(status = e.status().as_u16(), error = %e, "mock request rejected");
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_prefix_is_reserved() {
        assert!(is_reserved("/mcp"));
        assert!(is_reserved("/mcp/a/b"));
        assert!(!is_reserved("/mcpx"));
        assert!(!is_reserved("/api/mcp"));
    }
}
