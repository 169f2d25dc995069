//! Mock HTTP endpoints and HTTP-backed MCP tool servers behind one listener.
//!
//! Every path not claimed by `/health` or `/mcp/{slug}` is served from the mock route table.
//! `/mcp/{slug}` speaks JSON-RPC 2.0 and exposes a tool server's HTTP tools.

pub mod config;
pub mod dataset;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod memory_store;
pub mod mock;
pub mod precedence;
pub mod render;
pub mod request;
pub mod routing;
pub mod rpc;
pub mod servers;
pub mod session_token;
pub mod store;
pub mod template;
pub mod tool_import;

use axum::http::StatusCode;
use axum::response::IntoResponse as _;
use axum::routing::{get, post};
use axum::{Json, Router};
use mbx_http_tools::runtime::HttpToolExecutor;
use serde_json::json;
use std::sync::Arc;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn store::Store>,
    pub templates: Arc<dyn template::TemplateRenderer>,
    /// `None` disables session identity; every caller is unauthenticated.
    pub sessions: Option<session_token::SessionSigner>,
    pub executor: HttpToolExecutor,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": VERSION }))
}

async fn rpc_method_not_allowed() -> axum::response::Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(axum::http::header::CACHE_CONTROL, "no-store")],
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/mcp/{slug}",
            post(rpc::handle_rpc_post)
                .get(rpc::handle_rpc_get)
                .fallback(rpc_method_not_allowed),
        )
        .fallback(mock::handle_mock)
        .with_state(state)
}
