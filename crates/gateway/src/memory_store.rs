//! In-process [`Store`] over plain maps behind a single lock.

use crate::dataset::normalize_json;
use crate::matcher::{PathPattern, normalize_path};
use crate::routing::is_supported_method;
use crate::servers::normalize_slug;
use crate::store::{
    DatasetRecord, DatasetRecordPatch, NewDatasetRecord, RecordId, ResponseMode, RouteDefinition,
    RouteId, RouteSpec, Scope, ServerId, ServerSpec, Store, StoreError, StoreResult, ToolId,
    ToolRecord, ToolServerConfig,
};
use async_trait::async_trait;
use mbx_http_tools::config::HttpToolDefinition;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

#[derive(Default)]
struct Tables {
    next_id: i64,
    routes: BTreeMap<RouteId, RouteDefinition>,
    records: BTreeMap<RecordId, DatasetRecord>,
    servers: BTreeMap<ServerId, ToolServerConfig>,
    tools: BTreeMap<ToolId, ToolRecord>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn route_key_taken(&self, api_key: &str, except: Option<RouteId>) -> bool {
        self.routes
            .values()
            .any(|r| Some(r.id) != except && r.spec.api_key.as_deref() == Some(api_key))
    }

    fn record_key_taken(&self, route_id: RouteId, key: &str, except: Option<RecordId>) -> bool {
        self.records
            .values()
            .any(|r| r.route_id == route_id && r.key == key && Some(r.id) != except)
    }

    fn tool_name_taken(&self, server_id: ServerId, name: &str, except: Option<ToolId>) -> bool {
        self.tools.values().any(|t| {
            t.server_id == server_id && t.definition.name == name && Some(t.id) != except
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn trimmed_key(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

fn validate_status(status: Option<u16>, field: &str) -> StoreResult<()> {
    match status {
        Some(s) if !(100..=599).contains(&s) => Err(StoreError::Validation(format!(
            "{field} must be between 100 and 599"
        ))),
        _ => Ok(()),
    }
}

fn validate_route(mut spec: RouteSpec) -> StoreResult<RouteSpec> {
    spec.method = spec.method.trim().to_ascii_uppercase();
    if !is_supported_method(&spec.method) {
        return Err(StoreError::Validation(format!(
            "Unsupported method: {}",
            spec.method
        )));
    }
    spec.path = normalize_path(spec.path.trim());
    PathPattern::compile(&spec.path)
        .map_err(|e| StoreError::Validation(format!("Invalid path pattern: {e}")))?;
    spec.api_key = trimmed_key(spec.api_key);
    validate_status(spec.response_status, "responseStatus")?;
    if let ResponseMode::DatasetLookup(options) = &spec.response_mode {
        validate_status(options.not_found_status, "notFoundStatus")?;
    }
    Ok(spec)
}

fn parse_record_value(value: Option<Value>) -> StoreResult<Value> {
    let value = value
        .filter(|v| !v.is_null())
        .ok_or_else(|| StoreError::Validation("valueJson is required".to_string()))?;
    normalize_json(&value)
        .map_err(|e| StoreError::Validation(format!("valueJson must be valid JSON: {e}")))
}

fn record_key(key: &str) -> StoreResult<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(StoreError::Validation("key is required".to_string()));
    }
    Ok(key.to_string())
}

fn duplicate_record() -> StoreError {
    StoreError::Conflict("A record with this key already exists for this route".to_string())
}

fn validate_tool(mut definition: HttpToolDefinition) -> StoreResult<HttpToolDefinition> {
    definition.name = definition.name.trim().to_string();
    if definition.name.is_empty() {
        return Err(StoreError::Validation("Tool name is required".to_string()));
    }
    definition.method = definition.method.trim().to_ascii_uppercase();
    if definition.method.is_empty() || !definition.method.chars().all(|c| c.is_ascii_alphabetic())
    {
        return Err(StoreError::Validation(format!(
            "Invalid HTTP method for tool {}",
            definition.name
        )));
    }
    if !definition.input_schema.is_object() {
        return Err(StoreError::Validation(format!(
            "inputSchema of tool {} must be an object",
            definition.name
        )));
    }
    Ok(definition)
}

fn duplicate_tool(name: &str) -> StoreError {
    StoreError::Conflict(format!("Tool name already in use for this server: {name}"))
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_route(&self, spec: RouteSpec) -> StoreResult<RouteDefinition> {
        let spec = validate_route(spec)?;
        let mut tables = self.tables.write();
        if let Some(key) = spec.api_key.as_deref()
            && tables.route_key_taken(key, None)
        {
            return Err(StoreError::Conflict("API key already in use".to_string()));
        }
        let id = tables.allocate_id();
        let route = RouteDefinition { id, spec };
        tables.routes.insert(id, route.clone());
        Ok(route)
    }

    async fn get_route(&self, id: RouteId) -> StoreResult<Option<RouteDefinition>> {
        Ok(self.tables.read().routes.get(&id).cloned())
    }

    async fn update_route(&self, id: RouteId, spec: RouteSpec) -> StoreResult<RouteDefinition> {
        let spec = validate_route(spec)?;
        let mut tables = self.tables.write();
        if !tables.routes.contains_key(&id) {
            return Err(StoreError::NotFound("Route not found".to_string()));
        }
        if let Some(key) = spec.api_key.as_deref()
            && tables.route_key_taken(key, Some(id))
        {
            return Err(StoreError::Conflict("API key already in use".to_string()));
        }
        let route = RouteDefinition { id, spec };
        tables.routes.insert(id, route.clone());
        Ok(route)
    }

    async fn delete_route(&self, id: RouteId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.routes.remove(&id).is_none() {
            return Err(StoreError::NotFound("Route not found".to_string()));
        }
        tables.records.retain(|_, r| r.route_id != id);
        Ok(())
    }

    async fn list_scoped_routes(
        &self,
        scope: &Scope,
        method: &str,
    ) -> StoreResult<Vec<RouteDefinition>> {
        let tables = self.tables.read();
        Ok(tables
            .routes
            .values()
            .filter(|r| {
                r.spec.enabled && &r.spec.scope == scope && r.spec.method.eq_ignore_ascii_case(method)
            })
            .cloned()
            .collect())
    }

    async fn route_by_api_key(&self, api_key: &str) -> StoreResult<Option<RouteDefinition>> {
        let tables = self.tables.read();
        Ok(tables
            .routes
            .values()
            .find(|r| r.spec.enabled && r.spec.api_key.as_deref() == Some(api_key))
            .cloned())
    }

    async fn list_public_routes(&self, method: &str) -> StoreResult<Vec<RouteDefinition>> {
        let tables = self.tables.read();
        Ok(tables
            .routes
            .values()
            .filter(|r| {
                r.spec.enabled && !r.spec.require_api_key && r.spec.method.eq_ignore_ascii_case(method)
            })
            .cloned()
            .collect())
    }

    async fn routes_by_ids(
        &self,
        scope: &Scope,
        ids: &[RouteId],
    ) -> StoreResult<Vec<RouteDefinition>> {
        let tables = self.tables.read();
        Ok(ids
            .iter()
            .filter_map(|id| tables.routes.get(id))
            .filter(|r| &r.spec.scope == scope)
            .cloned()
            .collect())
    }

    async fn create_dataset_record(
        &self,
        route_id: RouteId,
        record: NewDatasetRecord,
    ) -> StoreResult<DatasetRecord> {
        let key = record_key(&record.key)?;
        let value = parse_record_value(record.value)?;
        let mut tables = self.tables.write();
        if !tables.routes.contains_key(&route_id) {
            return Err(StoreError::NotFound("Route not found".to_string()));
        }
        if tables.record_key_taken(route_id, &key, None) {
            return Err(duplicate_record());
        }
        let id = tables.allocate_id();
        let stored = DatasetRecord {
            id,
            route_id,
            key,
            value,
            enabled: record.enabled,
        };
        tables.records.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_dataset_record(
        &self,
        route_id: RouteId,
        record_id: RecordId,
        patch: DatasetRecordPatch,
    ) -> StoreResult<DatasetRecord> {
        let key = patch.key.as_deref().map(record_key).transpose()?;
        let value = match patch.value {
            Some(v) => Some(parse_record_value(Some(v))?),
            None => None,
        };
        let mut tables = self.tables.write();
        let mut record = tables
            .records
            .get(&record_id)
            .filter(|r| r.route_id == route_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Record not found".to_string()))?;
        if let Some(key) = key {
            if tables.record_key_taken(route_id, &key, Some(record_id)) {
                return Err(duplicate_record());
            }
            record.key = key;
        }
        if let Some(value) = value {
            record.value = value;
        }
        if let Some(enabled) = patch.enabled {
            record.enabled = enabled;
        }
        tables.records.insert(record_id, record.clone());
        Ok(record)
    }

    async fn delete_dataset_record(
        &self,
        route_id: RouteId,
        record_id: RecordId,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write();
        match tables.records.get(&record_id) {
            Some(r) if r.route_id == route_id => {
                tables.records.remove(&record_id);
                Ok(())
            }
            _ => Err(StoreError::NotFound("Record not found".to_string())),
        }
    }

    async fn list_dataset_records(&self, route_id: RouteId) -> StoreResult<Vec<DatasetRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .records
            .values()
            .filter(|r| r.route_id == route_id)
            .cloned()
            .collect())
    }

    async fn enabled_dataset_records(&self, route_id: RouteId) -> StoreResult<Vec<DatasetRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .records
            .values()
            .filter(|r| r.route_id == route_id && r.enabled)
            .cloned()
            .collect())
    }

    async fn find_dataset_record(
        &self,
        route_id: RouteId,
        key: &str,
    ) -> StoreResult<Option<DatasetRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .records
            .values()
            .find(|r| r.route_id == route_id && r.enabled && r.key == key)
            .cloned())
    }

    async fn create_server(&self, mut spec: ServerSpec) -> StoreResult<ToolServerConfig> {
        spec.slug = normalize_slug(&spec.slug);
        if spec.slug.is_empty() {
            return Err(StoreError::Validation("Invalid MCP server slug".to_string()));
        }
        spec.name = spec.name.trim().to_string();
        if spec.name.is_empty() {
            return Err(StoreError::Validation("Server name is required".to_string()));
        }
        spec.api_key = trimmed_key(spec.api_key);

        let mut tables = self.tables.write();
        if tables
            .servers
            .values()
            .any(|s| s.spec.scope == spec.scope && s.spec.slug == spec.slug)
        {
            return Err(StoreError::Conflict(format!(
                "Slug already in use: {}",
                spec.slug
            )));
        }
        if let Some(key) = spec.api_key.as_deref()
            && tables
                .servers
                .values()
                .any(|s| s.spec.api_key.as_deref() == Some(key))
        {
            return Err(StoreError::Conflict("API key already in use".to_string()));
        }
        let id = tables.allocate_id();
        let server = ToolServerConfig { id, spec };
        tables.servers.insert(id, server.clone());
        Ok(server)
    }

    async fn get_server(&self, id: ServerId) -> StoreResult<Option<ToolServerConfig>> {
        Ok(self.tables.read().servers.get(&id).cloned())
    }

    async fn server_in_scope(
        &self,
        scope: &Scope,
        slug: &str,
    ) -> StoreResult<Option<ToolServerConfig>> {
        let tables = self.tables.read();
        Ok(tables
            .servers
            .values()
            .find(|s| s.spec.enabled && &s.spec.scope == scope && s.spec.slug == slug)
            .cloned())
    }

    async fn server_by_api_key(&self, api_key: &str) -> StoreResult<Option<ToolServerConfig>> {
        let tables = self.tables.read();
        Ok(tables
            .servers
            .values()
            .find(|s| s.spec.enabled && s.spec.api_key.as_deref() == Some(api_key))
            .cloned())
    }

    async fn public_server(&self, slug: &str) -> StoreResult<Option<ToolServerConfig>> {
        let tables = self.tables.read();
        Ok(tables
            .servers
            .values()
            .find(|s| s.spec.enabled && !s.spec.require_api_key && s.spec.slug == slug)
            .cloned())
    }

    async fn create_tools(
        &self,
        server_id: ServerId,
        definitions: Vec<HttpToolDefinition>,
    ) -> StoreResult<Vec<ToolRecord>> {
        let definitions = definitions
            .into_iter()
            .map(validate_tool)
            .collect::<StoreResult<Vec<_>>>()?;

        let mut tables = self.tables.write();
        if !tables.servers.contains_key(&server_id) {
            return Err(StoreError::NotFound("Tool server not found".to_string()));
        }
        let mut batch = HashSet::new();
        for def in &definitions {
            if tables.tool_name_taken(server_id, &def.name, None) || !batch.insert(def.name.as_str())
            {
                return Err(duplicate_tool(&def.name));
            }
        }

        let mut created = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let id = tables.allocate_id();
            let record = ToolRecord {
                id,
                server_id,
                definition,
            };
            tables.tools.insert(id, record.clone());
            created.push(record);
        }
        Ok(created)
    }

    async fn list_tools(&self, server_id: ServerId) -> StoreResult<Vec<ToolRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .tools
            .values()
            .filter(|t| t.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn find_tool(&self, server_id: ServerId, name: &str) -> StoreResult<Option<ToolRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .tools
            .values()
            .find(|t| t.server_id == server_id && t.definition.name == name)
            .cloned())
    }

    async fn update_tool(
        &self,
        server_id: ServerId,
        tool_id: ToolId,
        definition: HttpToolDefinition,
    ) -> StoreResult<ToolRecord> {
        let definition = validate_tool(definition)?;
        let mut tables = self.tables.write();
        match tables.tools.get(&tool_id) {
            Some(t) if t.server_id == server_id => {}
            _ => return Err(StoreError::NotFound("Tool not found".to_string())),
        }
        if tables.tool_name_taken(server_id, &definition.name, Some(tool_id)) {
            return Err(duplicate_tool(&definition.name));
        }
        let record = ToolRecord {
            id: tool_id,
            server_id,
            definition,
        };
        tables.tools.insert(tool_id, record.clone());
        Ok(record)
    }

    async fn delete_tool(&self, server_id: ServerId, tool_id: ToolId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        match tables.tools.get(&tool_id) {
            Some(t) if t.server_id == server_id => {
                tables.tools.remove(&tool_id);
                Ok(())
            }
            _ => Err(StoreError::NotFound("Tool not found".to_string())),
        }
    }
}
