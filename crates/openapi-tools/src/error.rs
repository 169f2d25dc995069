//! Error types for `mbx-openapi-tools`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Blank input.
    #[error("OpenAPI document is empty")]
    EmptyDocument,

    /// Neither valid JSON nor valid YAML.
    #[error("Unable to parse OpenAPI spec: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
    },

    /// Parsed, but not an OpenAPI-shaped document.
    #[error("Invalid OpenAPI document: {0}")]
    InvalidDocument(String),
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
