//! OpenAPI document parsing and operation extraction for tool imports.
//!
//! Documents are walked as plain JSON values, so Swagger 2.0 and OpenAPI 3.x inputs both work
//! as far as the fields used here overlap.

pub mod error;
pub mod extract;
pub mod infer;

pub use error::{OpenApiToolsError, Result};
pub use extract::{OpenApiOperation, ParsedSpec, SpecFormat, extract_operations, parse_spec};
pub use infer::{NamedOperation, assign_tool_names, infer_auth, infer_base_url};
