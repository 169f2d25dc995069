//! Input-schema construction for generated tools.
//!
//! Every generated schema is an open JSON object schema (`additionalProperties: true`) and
//! carries its provenance under [`SOURCE_KEY`] so a tool can later be traced back to the mock
//! route or OpenAPI operation it was created from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashSet;

/// Schema extension key holding the tool provenance.
pub const SOURCE_KEY: &str = "x-mbx-source";

/// Where a generated tool came from.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ToolSource {
    #[serde(rename = "mock-route", rename_all = "camelCase")]
    MockRoute { route_id: i64 },
    #[serde(rename = "openapi", rename_all = "camelCase")]
    OpenApi {
        operation_id: String,
        path: String,
        method: String,
    },
}

/// A query parameter or body property contributing to an input schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    /// JSON-schema-ish type label; `string` when absent.
    pub type_name: Option<String>,
    pub description: Option<String>,
    pub required: bool,
}

impl SchemaField {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Everything the builder needs for one tool.
#[derive(Debug, Clone, Default)]
pub struct SchemaInputs<'a> {
    pub path_params: &'a [String],
    pub query_params: &'a [SchemaField],
    pub body_properties: &'a [SchemaField],
    pub summary: Option<&'a str>,
    pub source: Option<&'a ToolSource>,
}

/// Build the input schema for a tool.
///
/// Path parameters are always required strings. Query parameters and body properties keep their
/// declared type and required flag. When the same property name appears more than once, the
/// first occurrence wins.
#[must_use]
pub fn build_input_schema(inputs: &SchemaInputs<'_>) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();

    for name in inputs.path_params {
        if name.is_empty() || properties.contains_key(name) {
            continue;
        }
        properties.insert(
            name.clone(),
            json!({"type": "string", "description": "Path parameter"}),
        );
        required.push(name.clone());
    }

    let groups = [
        (inputs.query_params, "Query parameter"),
        (inputs.body_properties, "Body property"),
    ];
    for (fields, default_description) in groups {
        for field in fields {
            if field.name.is_empty() || properties.contains_key(&field.name) {
                continue;
            }
            let type_name = field
                .type_name
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or("string");
            let description = field
                .description
                .as_deref()
                .filter(|d| !d.is_empty())
                .unwrap_or(default_description);
            properties.insert(
                field.name.clone(),
                json!({"type": type_name, "description": description}),
            );
            if field.required {
                required.push(field.name.clone());
            }
        }
    }

    let mut seen = HashSet::new();
    required.retain(|name| seen.insert(name.clone()));

    let mut schema = json!({
        "type": "object",
        "additionalProperties": true,
        "properties": properties,
        "required": required,
    });
    if let Some(summary) = inputs.summary.filter(|s| !s.trim().is_empty()) {
        schema["description"] = Value::String(summary.to_string());
    }
    if let Some(source) = inputs.source
        && let Ok(value) = serde_json::to_value(source)
    {
        schema[SOURCE_KEY] = value;
    }
    schema
}

/// Read the provenance back out of a schema built by [`build_input_schema`].
#[must_use]
pub fn describe_source(schema: &Value) -> Option<ToolSource> {
    let meta = schema.get(SOURCE_KEY)?;
    serde_json::from_value(meta.clone()).ok()
}

/// Argument names listed under the schema's `required` array.
#[must_use]
pub fn required_arguments(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
