//! Dataset-backed responses: pick a record by key, or list all of them.

use crate::error::MockError;
use crate::matcher::PathParams;
use crate::request::QueryParams;
use crate::store::{DatasetLookupOptions, RouteId, Store};
use axum::http::StatusCode;
use serde_json::{Value, json};

/// Query parameters consulted when the route's own lookup parameter yields nothing.
const LEGACY_KEY_PARAMS: [&str; 2] = ["key", "bookingId"];

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPayload {
    pub status: StatusCode,
    pub body: Value,
}

/// Structured JSON as-is; a string is parsed as (trimmed) JSON text.
///
/// # Errors
///
/// Returns an error if a string value is not valid JSON.
pub fn normalize_json(value: &Value) -> Result<Value, serde_json::Error> {
    match value {
        Value::String(text) => serde_json::from_str(text.trim()),
        other => Ok(other.clone()),
    }
}

fn has_lookup_key(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Lookup key for a request: the route's lookup parameter (path first, then query), then the
/// `key` and `bookingId` query parameters.
#[must_use]
pub fn lookup_key(
    options: &DatasetLookupOptions,
    params: &PathParams,
    query: &QueryParams,
) -> Option<String> {
    let from_route_param = options
        .lookup_param_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .and_then(|name| {
            params
                .get(name)
                .and_then(Option::as_deref)
                .or_else(|| query.get(name).map(String::as_str))
        });
    if has_lookup_key(from_route_param) {
        return from_route_param.map(str::to_string);
    }

    let legacy = LEGACY_KEY_PARAMS
        .iter()
        .find_map(|name| query.get(*name).map(String::as_str));
    if has_lookup_key(legacy) {
        return legacy.map(str::to_string);
    }
    None
}

fn not_found(options: &DatasetLookupOptions) -> DatasetPayload {
    let status = options
        .not_found_status
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::NOT_FOUND);
    let default_body = json!({ "error": "Not found" });
    let body = options
        .not_found_body
        .as_ref()
        .and_then(|b| normalize_json(b).ok())
        .unwrap_or(default_body);
    DatasetPayload { status, body }
}

/// Resolve the dataset response of a route.
///
/// # Errors
///
/// Returns a store error. Record values were normalized on write and are served as stored.
pub async fn resolve_dataset_payload(
    store: &dyn Store,
    route_id: RouteId,
    options: &DatasetLookupOptions,
    params: &PathParams,
    query: &QueryParams,
) -> Result<DatasetPayload, MockError> {
    let Some(key) = lookup_key(options, params, query) else {
        if options.return_all_when_no_key == Some(false) {
            return Ok(not_found(options));
        }
        let records = store.enabled_dataset_records(route_id).await?;
        let mut items = Vec::with_capacity(records.len());
        for record in &records {
            items.push(json!({ "key": record.key, "value": record.value }));
        }
        return Ok(DatasetPayload {
            status: StatusCode::OK,
            body: json!({ "count": items.len(), "items": items }),
        });
    };

    match store.find_dataset_record(route_id, &key).await? {
        Some(record) => Ok(DatasetPayload {
            status: StatusCode::OK,
            body: record.value,
        }),
        None => Ok(not_found(options)),
    }
}
