//! HTTP-backed MCP tools: definitions, input schemas, naming, and the outbound executor.
//!
//! Storage and server selection live in the gateway; this crate only knows how one tool
//! definition plus one set of call arguments becomes one HTTP request.

pub mod config;
pub mod naming;
pub mod runtime;
pub mod safety;
pub mod schema;
pub mod semantics;
