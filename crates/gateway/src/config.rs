//! YAML seed file: routes, dataset records and tool servers loaded at startup.

use crate::store::{NewDatasetRecord, RouteId, RouteSpec, Scope, ServerSpec, Store};
use crate::tool_import::{
    OpenApiImport, RouteToolSelection, import_openapi_tools, import_route_tools,
};
use anyhow::Context as _;
use mbx_http_tools::config::{AuthScheme, HttpToolDefinition};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedConfig {
    #[serde(default)]
    pub routes: Vec<SeedRoute>,
    #[serde(default)]
    pub servers: Vec<SeedServer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRoute {
    #[serde(flatten)]
    pub spec: RouteSpec,
    #[serde(default)]
    pub datasets: Vec<NewDatasetRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedServer {
    #[serde(flatten)]
    pub spec: ServerSpec,
    #[serde(default)]
    pub tools: Vec<HttpToolDefinition>,
    #[serde(default)]
    pub import_routes: Vec<SeedRouteImport>,
    #[serde(default)]
    pub openapi_imports: Vec<SeedOpenApiImport>,
}

/// Import of a seeded route, referenced by its name within the server's scope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRouteImport {
    pub route: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedOpenApiImport {
    /// Inline document text.
    #[serde(default)]
    pub spec: Option<String>,
    /// Document path, relative to the seed file.
    #[serde(default)]
    pub spec_file: Option<PathBuf>,
    #[serde(default)]
    pub operations: Vec<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub routes: usize,
    pub records: usize,
    pub servers: usize,
    pub tools: usize,
}

pub fn load_seed(path: &Path) -> anyhow::Result<SeedConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read seed file {}", path.display()))?;
    let cfg: SeedConfig =
        serde_yaml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

fn openapi_text(import: &SeedOpenApiImport, base_dir: &Path) -> anyhow::Result<String> {
    match (&import.spec, &import.spec_file) {
        (Some(text), None) => Ok(text.clone()),
        (None, Some(file)) => {
            let path = base_dir.join(file);
            std::fs::read_to_string(&path)
                .with_context(|| format!("read OpenAPI document {}", path.display()))
        }
        _ => anyhow::bail!("openapi import needs exactly one of spec / specFile"),
    }
}

/// Write the seed into `store` through the regular store operations.
///
/// Relative `specFile` paths resolve against `base_dir`.
pub async fn seed_store(
    store: &dyn Store,
    cfg: SeedConfig,
    base_dir: &Path,
) -> anyhow::Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    let mut route_ids: HashMap<(Scope, String), RouteId> = HashMap::new();

    for seed in cfg.routes {
        let label = format!("{} {}", seed.spec.method, seed.spec.path);
        let route = store
            .create_route(seed.spec)
            .await
            .with_context(|| format!("seed route {label}"))?;
        if let Some(name) = &route.spec.name {
            route_ids.insert((route.spec.scope.clone(), name.clone()), route.id);
        }
        for record in seed.datasets {
            let key = record.key.clone();
            store
                .create_dataset_record(route.id, record)
                .await
                .with_context(|| format!("seed dataset record {key} of route {label}"))?;
            summary.records += 1;
        }
        summary.routes += 1;
    }

    for seed in cfg.servers {
        let slug = seed.spec.slug.clone();
        let server = store
            .create_server(seed.spec)
            .await
            .with_context(|| format!("seed server {slug}"))?;
        summary.servers += 1;

        if !seed.tools.is_empty() {
            let created = store
                .create_tools(server.id, seed.tools)
                .await
                .with_context(|| format!("seed tools of server {slug}"))?;
            summary.tools += created.len();
        }

        if !seed.import_routes.is_empty() {
            let selections = seed
                .import_routes
                .iter()
                .map(|import| {
                    let route_id = route_ids
                        .get(&(server.spec.scope.clone(), import.route.clone()))
                        .copied()
                        .with_context(|| {
                            format!("server {slug} imports unknown route {}", import.route)
                        })?;
                    Ok(RouteToolSelection {
                        route_id,
                        tool_name: import.tool_name.clone(),
                        description: import.description.clone(),
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let report = import_route_tools(store, &server, &selections)
                .await
                .with_context(|| format!("import routes into server {slug}"))?;
            summary.tools += report.created.len();
        }

        for import in &seed.openapi_imports {
            let import = OpenApiImport {
                spec: openapi_text(import, base_dir)?,
                operations: import.operations.clone(),
                base_url: import.base_url.clone(),
            };
            let report = import_openapi_tools(store, &server, &import)
                .await
                .with_context(|| format!("import OpenAPI document into server {slug}"))?;
            summary.tools += report.created.len();
            if let Some(auth) = report.inferred_auth.filter(|a| *a != AuthScheme::None) {
                tracing::info!(
                    slug = %slug,
                    inferred_auth = ?auth,
                    "OpenAPI document declares an auth scheme; configure credentials on the server"
                );
            }
        }
    }

    Ok(summary)
}
