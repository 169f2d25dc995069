//! Generating HTTP tools for a tool server from mock routes or an OpenAPI document.

use crate::store::{RouteId, Store, StoreError, ToolRecord, ToolServerConfig};
use mbx_http_tools::config::{AuthScheme, HttpToolDefinition};
use mbx_http_tools::naming::{
    extract_path_params, method_path_label, reserve_unique_tool_name, slugify_tool_name,
};
use mbx_http_tools::schema::{SchemaInputs, ToolSource, build_input_schema};
use mbx_openapi_tools::{
    OpenApiOperation, OpenApiToolsError, assign_tool_names, extract_operations, infer_auth,
    infer_base_url, parse_spec,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{0}")]
    NothingToImport(String),
    #[error(transparent)]
    OpenApi(#[from] OpenApiToolsError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One route picked for import, optionally renamed/redescribed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteToolSelection {
    pub route_id: RouteId,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiImport {
    pub spec: String,
    /// Operation ids (or generated `METHOD_path_opId` ids) to import; empty imports all.
    #[serde(default)]
    pub operations: Vec<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub created: Vec<ToolRecord>,
    /// Auth scheme the document declares; reported only, never applied.
    pub inferred_auth: Option<AuthScheme>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn taken_names(store: &dyn Store, server: &ToolServerConfig) -> Result<HashSet<String>, StoreError> {
    Ok(store
        .list_tools(server.id)
        .await?
        .into_iter()
        .map(|t| t.definition.name)
        .collect())
}

/// Create one tool per selected route of the server's scope.
///
/// # Errors
///
/// Returns [`ImportError::NothingToImport`] when none of the selected routes exist in scope,
/// or the store error that rejected the batch.
pub async fn import_route_tools(
    store: &dyn Store,
    server: &ToolServerConfig,
    selections: &[RouteToolSelection],
) -> Result<ImportReport, ImportError> {
    let ids: Vec<RouteId> = selections.iter().map(|s| s.route_id).collect();
    let routes = store.routes_by_ids(&server.spec.scope, &ids).await?;
    if routes.is_empty() {
        return Err(ImportError::NothingToImport(
            "None of the selected routes exist in this project".to_string(),
        ));
    }

    let mut taken = taken_names(store, server).await?;
    let mut definitions = Vec::with_capacity(routes.len());
    for route in &routes {
        let selection = selections.iter().find(|s| s.route_id == route.id);
        let spec = &route.spec;
        let label = non_blank(selection.and_then(|s| s.tool_name.as_deref()))
            .or_else(|| non_blank(spec.name.as_deref()))
            .map_or_else(|| method_path_label(&spec.method, &spec.path), str::to_string);
        let name = reserve_unique_tool_name(&mut taken, &slugify_tool_name(&label));
        let description = non_blank(selection.and_then(|s| s.description.as_deref()))
            .or_else(|| non_blank(spec.description.as_deref()))
            .or_else(|| non_blank(spec.name.as_deref()))
            .map(str::to_string);

        let path_params = extract_path_params(&spec.path);
        let source = ToolSource::MockRoute { route_id: route.id };
        let input_schema = build_input_schema(&SchemaInputs {
            path_params: &path_params,
            summary: description.as_deref(),
            source: Some(&source),
            ..SchemaInputs::default()
        });

        definitions.push(HttpToolDefinition {
            name,
            description,
            method: spec.method.clone(),
            base_url: server.spec.base_url.clone(),
            path_template: spec.path.clone(),
            query_mapping: BTreeMap::new(),
            body_mapping: BTreeMap::new(),
            headers_mapping: BTreeMap::new(),
            input_schema,
            enabled: true,
        });
    }

    let created = store.create_tools(server.id, definitions).await?;
    tracing::info!(server_id = server.id, count = created.len(), "imported tools from routes");
    Ok(ImportReport {
        created,
        inferred_auth: None,
    })
}

fn identity_mapping<'a>(names: impl Iterator<Item = &'a str>) -> BTreeMap<String, String> {
    names.map(|n| (n.to_string(), n.to_string())).collect()
}

fn operation_tool(name: String, op: &OpenApiOperation, base_url: &str) -> HttpToolDefinition {
    let description = non_blank(Some(op.summary.as_str()))
        .or_else(|| non_blank(Some(op.description.as_str())))
        .map(str::to_string);
    let source = ToolSource::OpenApi {
        operation_id: op.operation_id.clone(),
        path: op.path.clone(),
        method: op.method.clone(),
    };
    let input_schema = build_input_schema(&SchemaInputs {
        path_params: &op.path_params,
        query_params: &op.query_params,
        body_properties: &op.body_properties,
        summary: description.as_deref(),
        source: Some(&source),
    });

    HttpToolDefinition {
        name,
        description,
        method: op.method.clone(),
        base_url: base_url.to_string(),
        path_template: op.path.clone(),
        query_mapping: identity_mapping(op.query_params.iter().map(|f| f.name.as_str())),
        body_mapping: identity_mapping(op.body_properties.iter().map(|f| f.name.as_str())),
        headers_mapping: BTreeMap::new(),
        input_schema,
        enabled: true,
    }
}

/// Create one tool per (selected) operation of an OpenAPI document.
///
/// # Errors
///
/// Returns a parse error for unreadable documents, [`ImportError::NothingToImport`] when no
/// operation is selected, or the store error that rejected the batch.
pub async fn import_openapi_tools(
    store: &dyn Store,
    server: &ToolServerConfig,
    import: &OpenApiImport,
) -> Result<ImportReport, ImportError> {
    let parsed = parse_spec(&import.spec)?;
    let mut operations = extract_operations(&parsed.document);
    if !import.operations.is_empty() {
        operations.retain(|op| {
            import
                .operations
                .iter()
                .any(|wanted| *wanted == op.operation_id || *wanted == op.id)
        });
    }
    if operations.is_empty() {
        return Err(ImportError::NothingToImport(
            "No operations selected for import".to_string(),
        ));
    }

    let base_url = non_blank(import.base_url.as_deref())
        .map(str::to_string)
        .or_else(|| {
            let inferred = infer_base_url(&parsed.document);
            (!inferred.is_empty()).then_some(inferred)
        })
        .unwrap_or_else(|| server.spec.base_url.clone());
    let inferred_auth = infer_auth(&parsed.document);

    let taken = taken_names(store, server).await?;
    let definitions: Vec<HttpToolDefinition> = assign_tool_names(operations, taken)
        .into_iter()
        .map(|named| operation_tool(named.tool_name, &named.operation, &base_url))
        .collect();

    let created = store.create_tools(server.id, definitions).await?;
    tracing::info!(
        server_id = server.id,
        count = created.len(),
        format = ?parsed.format,
        "imported tools from OpenAPI document"
    );
    Ok(ImportReport {
        created,
        inferred_auth: Some(inferred_auth),
    })
}
