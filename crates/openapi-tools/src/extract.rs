use crate::error::{OpenApiToolsError, Result};
use mbx_http_tools::naming::{extract_path_params, method_path_label, slugify_tool_name};
use mbx_http_tools::schema::SchemaField;
use serde_json::{Map, Value};
use tracing::debug;

const HTTP_METHODS: [&str; 7] = ["get", "post", "put", "patch", "delete", "options", "head"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSpec {
    pub document: Value,
    pub format: SpecFormat,
}

/// One path+method pair of the document, flattened for tool generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenApiOperation {
    /// Stable selection key: `METHOD_path_operationId`.
    pub id: String,
    /// Declared `operationId`, or `METHOD_path` when the document has none.
    pub operation_id: String,
    /// Upper-case HTTP method.
    pub method: String,
    pub path: String,
    pub summary: String,
    pub description: String,
    pub suggested_name: String,
    pub path_params: Vec<String>,
    pub query_params: Vec<SchemaField>,
    pub body_properties: Vec<SchemaField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamLocation {
    Path,
    Query,
}

/// Parse OpenAPI text, trying JSON first and YAML second.
///
/// # Errors
///
/// Returns an error if the text is blank, parses as neither format, or the root is not a
/// mapping.
pub fn parse_spec(raw: &str) -> Result<ParsedSpec> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(OpenApiToolsError::EmptyDocument);
    }

    let (document, format) = match serde_json::from_str::<Value>(text) {
        Ok(doc) => (doc, SpecFormat::Json),
        Err(json_err) => {
            debug!(error = %json_err, "OpenAPI text is not JSON; trying YAML");
            let yaml: serde_yaml::Value = serde_yaml::from_str(text)
                .map_err(|source| OpenApiToolsError::Parse { source })?;
            (yaml_to_json(yaml), SpecFormat::Yaml)
        }
    };

    if !document.is_object() {
        return Err(OpenApiToolsError::InvalidDocument(
            "expected a mapping at the document root".to_string(),
        ));
    }

    Ok(ParsedSpec { document, format })
}

fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Map::new();
            for (k, v) in mapping {
                out.insert(yaml_key_to_string(k), yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

// Status-code keys like `200:` arrive as numbers.
fn yaml_key_to_string(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Flatten every operation of the document.
///
/// Paths are visited in key order and methods in `get, post, put, patch, delete, options, head`
/// order. Path-item parameters apply to every operation below them; an operation parameter with
/// the same location and name replaces the path-item one. `$ref` values are never followed:
/// referenced parameters are skipped and referenced bodies contribute no fields.
#[must_use]
pub fn extract_operations(document: &Value) -> Vec<OpenApiOperation> {
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut operations = Vec::new();
    for (path, path_item) in paths {
        let Some(path_item) = path_item.as_object() else {
            continue;
        };
        for method_key in HTTP_METHODS {
            let Some(op) = path_item.get(method_key).and_then(Value::as_object) else {
                continue;
            };
            operations.push(build_operation(path, method_key, path_item, op));
        }
    }
    operations
}

fn build_operation(
    path: &str,
    method_key: &str,
    path_item: &Map<String, Value>,
    op: &Map<String, Value>,
) -> OpenApiOperation {
    let method = method_key.to_ascii_uppercase();
    let text = |key: &str| {
        op.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };
    let summary = text("summary");
    let description = text("description");
    let declared_id = text("operationId");
    let operation_id = if declared_id.is_empty() {
        method_path_label(&method, path)
    } else {
        declared_id.clone()
    };
    let name_source = [declared_id.as_str(), summary.as_str()]
        .into_iter()
        .find(|s| !s.is_empty())
        .map_or_else(|| method_path_label(&method, path), str::to_string);

    let params = collect_parameters(path_item, op);
    let mut path_params: Vec<String> = params
        .iter()
        .filter(|(loc, _)| *loc == ParamLocation::Path)
        .map(|(_, field)| field.name.clone())
        .collect();
    if path_params.is_empty() {
        path_params = extract_path_params(path);
    }
    let query_params = params
        .into_iter()
        .filter(|(loc, _)| *loc == ParamLocation::Query)
        .map(|(_, field)| field)
        .collect();

    OpenApiOperation {
        id: format!("{method}_{path}_{operation_id}"),
        operation_id,
        method,
        path: path.to_string(),
        summary,
        description,
        suggested_name: slugify_tool_name(&name_source),
        path_params,
        query_params,
        body_properties: collect_body_properties(op),
    }
}

fn collect_parameters(
    path_item: &Map<String, Value>,
    op: &Map<String, Value>,
) -> Vec<(ParamLocation, SchemaField)> {
    let declared = |container: &Map<String, Value>| -> Vec<Value> {
        container
            .get("parameters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    let mut out: Vec<(ParamLocation, SchemaField)> = Vec::new();
    for raw in declared(path_item).iter().chain(declared(op).iter()) {
        let Some(param) = raw.as_object().filter(|p| !p.contains_key("$ref")) else {
            continue;
        };
        let name = param
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let location = match param.get("in").and_then(Value::as_str).unwrap_or("query") {
            "path" => ParamLocation::Path,
            "query" => ParamLocation::Query,
            _ => continue,
        };

        // Swagger 2.0 keeps the type on the parameter itself.
        let schema = param
            .get("schema")
            .or_else(|| param.contains_key("type").then_some(raw));
        let (type_name, schema_description) = normalize_schema(schema);
        let description = param
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|d| !d.is_empty())
            .or(schema_description);

        let field = SchemaField {
            name: name.to_string(),
            type_name: Some(type_name),
            description,
            required: param.get("required").and_then(Value::as_bool).unwrap_or(false),
        };

        if let Some(existing) = out
            .iter_mut()
            .find(|(loc, f)| *loc == location && f.name == field.name)
        {
            existing.1 = field;
        } else {
            out.push((location, field));
        }
    }
    out
}

/// Per-field body mapping for an inline JSON object schema. Referenced, array and other
/// shapes are opaque.
fn collect_body_properties(op: &Map<String, Value>) -> Vec<SchemaField> {
    let Some(request_body) = op
        .get("requestBody")
        .and_then(Value::as_object)
        .filter(|b| !b.contains_key("$ref"))
    else {
        return Vec::new();
    };
    let Some(content) = request_body.get("content").and_then(Value::as_object) else {
        return Vec::new();
    };

    let media = content.get("application/json").or_else(|| {
        content
            .iter()
            .find(|(media_type, _)| is_json_media_type(media_type))
            .map(|(_, media)| media)
    });
    let Some(schema) = media
        .and_then(|m| m.get("schema"))
        .and_then(Value::as_object)
        .filter(|s| !s.contains_key("$ref"))
        .filter(|s| s.get("type").is_none_or(|t| t.as_str() == Some("object")))
    else {
        return Vec::new();
    };
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    properties
        .iter()
        .map(|(name, prop_schema)| {
            let (type_name, description) = normalize_schema(Some(prop_schema));
            SchemaField {
                name: name.clone(),
                type_name: Some(type_name),
                description,
                required: required.contains(&name.as_str()),
            }
        })
        .collect()
}

fn is_json_media_type(media_type: &str) -> bool {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

/// Type label and description for a schema fragment.
///
/// Arrays become `array<item>`; references stay opaque objects.
fn normalize_schema(schema: Option<&Value>) -> (String, Option<String>) {
    let Some(obj) = schema.and_then(Value::as_object) else {
        return ("string".to_string(), None);
    };
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    if obj.get("type").and_then(Value::as_str) == Some("array")
        && let Some(items) = obj.get("items")
    {
        let (child, _) = normalize_schema(Some(items));
        return (format!("array<{child}>"), description);
    }
    if obj.contains_key("$ref") {
        return ("object".to_string(), Some("Referenced schema".to_string()));
    }

    let type_name = obj
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or("string");
    (type_name.to_string(), description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PETSTORE_YAML: &str = r"
openapi: 3.0.0
info:
  title: Pets
  version: '1.0'
servers:
  - url: ' https://pets.example.com/v1 '
paths:
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
        schema:
          type: string
      - name: verbose
        in: query
        description: path level
        schema:
          type: boolean
    get:
      operationId: getPet
      summary: Fetch a pet
      parameters:
        - name: verbose
          in: query
          description: operation level
          schema:
            type: string
        - name: X-Trace
          in: header
          schema:
            type: string
      responses:
        200:
          description: ok
  /pets:
    post:
      summary: Create Pet
      requestBody:
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/NewPet'
      responses:
        201:
          description: created
    put:
      operationId: replacePets
      parameters:
        - $ref: '#/components/parameters/Limit'
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [name]
              properties:
                name:
                  type: string
                tags:
                  type: array
                  items:
                    type: string
                owner:
                  $ref: '#/components/schemas/Owner'
      responses:
        200:
          description: ok
components:
  parameters:
    Limit:
      name: limit
      in: query
      schema:
        type: integer
  schemas:
    NewPet:
      type: object
      required: [name]
      properties:
        name:
          type: string
        tags:
          type: array
          items:
            type: string
        owner:
          $ref: '#/components/schemas/Owner'
    Owner:
      type: object
";

    #[test]
    fn parse_prefers_json_then_yaml() {
        let json_spec = parse_spec(r#"{"openapi": "3.0.0", "paths": {}}"#).expect("json");
        assert_eq!(json_spec.format, SpecFormat::Json);

        let yaml_spec = parse_spec(PETSTORE_YAML).expect("yaml");
        assert_eq!(yaml_spec.format, SpecFormat::Yaml);
        assert!(yaml_spec.document["paths"]["/pets"]["post"]["responses"]["201"].is_object());
    }

    #[test]
    fn parse_rejects_blank_and_garbage() {
        assert!(matches!(
            parse_spec("   "),
            Err(OpenApiToolsError::EmptyDocument)
        ));
        let err = parse_spec("paths: [unclosed").expect_err("garbage");
        assert!(err.to_string().starts_with("Unable to parse OpenAPI spec:"));
        assert!(matches!(
            parse_spec("just words"),
            Err(OpenApiToolsError::InvalidDocument(_))
        ));
    }

    #[test]
    fn operation_params_override_path_item_params() {
        let spec = parse_spec(PETSTORE_YAML).expect("yaml");
        let ops = extract_operations(&spec.document);
        let get = ops.iter().find(|o| o.method == "GET").expect("GET op");

        assert_eq!(get.operation_id, "getPet");
        assert_eq!(get.suggested_name, "getpet");
        assert_eq!(get.path_params, vec!["petId".to_string()]);
        assert_eq!(get.query_params.len(), 1);
        assert_eq!(get.query_params[0].name, "verbose");
        assert_eq!(get.query_params[0].type_name.as_deref(), Some("string"));
        assert_eq!(
            get.query_params[0].description.as_deref(),
            Some("operation level")
        );
        assert!(get.body_properties.is_empty());
    }

    #[test]
    fn referenced_bodies_and_parameters_stay_opaque() {
        let spec = parse_spec(PETSTORE_YAML).expect("yaml");
        let ops = extract_operations(&spec.document);
        let post = ops.iter().find(|o| o.method == "POST").expect("POST op");

        assert_eq!(post.operation_id, "POST_/pets");
        assert_eq!(post.suggested_name, "create_pet");
        assert_eq!(post.id, "POST_/pets_POST_/pets");
        assert!(post.body_properties.is_empty());

        let put = ops.iter().find(|o| o.method == "PUT").expect("PUT op");
        assert!(put.query_params.is_empty());
    }

    #[test]
    fn inline_object_bodies_map_per_field() {
        let spec = parse_spec(PETSTORE_YAML).expect("yaml");
        let ops = extract_operations(&spec.document);
        let put = ops.iter().find(|o| o.method == "PUT").expect("PUT op");

        let by_name = |n: &str| {
            put.body_properties
                .iter()
                .find(|p| p.name == n)
                .expect("property")
        };
        assert!(by_name("name").required);
        assert_eq!(by_name("tags").type_name.as_deref(), Some("array<string>"));
        assert!(!by_name("tags").required);
        assert_eq!(by_name("owner").type_name.as_deref(), Some("object"));
        assert_eq!(
            by_name("owner").description.as_deref(),
            Some("Referenced schema")
        );
    }

    #[test]
    fn non_object_body_schemas_are_opaque() {
        let doc = json!({
            "paths": {"/batch": {"post": {"requestBody": {"content": {"application/json": {
                "schema": {"type": "array", "properties": {"id": {"type": "integer"}}}
            }}}}}}
        });
        let ops = extract_operations(&doc);
        assert!(ops[0].body_properties.is_empty());

        let untyped = json!({
            "paths": {"/one": {"post": {"requestBody": {"content": {"application/json": {
                "schema": {"properties": {"id": {"type": "integer"}}}
            }}}}}}
        });
        let ops = extract_operations(&untyped);
        assert_eq!(ops[0].body_properties[0].name, "id");
    }

    #[test]
    fn vendor_json_media_types_count_as_json() {
        let doc = json!({
            "paths": {
                "/things": {
                    "put": {
                        "requestBody": {"content": {"application/vnd.api+json": {"schema": {
                            "type": "object",
                            "properties": {"id": {"type": "integer"}}
                        }}}}
                    },
                    "trace": {"summary": "ignored"}
                }
            }
        });
        let ops = extract_operations(&doc);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].body_properties[0].name, "id");
        assert_eq!(ops[0].body_properties[0].type_name.as_deref(), Some("integer"));
        assert_eq!(ops[0].suggested_name, "put_things");
    }

    #[test]
    fn swagger2_parameter_types_are_read_inline() {
        let doc = json!({
            "swagger": "2.0",
            "paths": {"/users/{id}": {"get": {"parameters": [
                {"name": "id", "in": "path", "required": true, "type": "integer"},
                {"name": "limit", "in": "query", "type": "integer"}
            ]}}}
        });
        let ops = extract_operations(&doc);
        assert_eq!(ops[0].path_params, vec!["id".to_string()]);
        assert_eq!(ops[0].query_params[0].type_name.as_deref(), Some("integer"));
    }

    #[test]
    fn undeclared_path_params_come_from_the_template() {
        let doc = json!({"paths": {"/orgs/{org}/repos": {"get": {}}}});
        let ops = extract_operations(&doc);
        assert_eq!(ops[0].path_params, vec!["org".to_string()]);
        assert_eq!(ops[0].operation_id, "GET_/orgs/{org}/repos");
    }
}
