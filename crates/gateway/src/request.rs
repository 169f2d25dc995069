//! Snapshot of an incoming mock request, decoupled from axum types.

use crate::matcher::{normalize_path, percent_decode};
use axum::http::{HeaderMap, Method, Uri};
use serde_json::Value;
use std::collections::BTreeMap;

/// Query parameters; the first occurrence of a key wins.
pub type QueryParams = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct MockRequest {
    /// Upper-case method.
    pub method: String,
    /// Normalized, percent-decoded path.
    pub path: String,
    /// Normalized path as received (still percent-encoded), used for matching.
    pub raw_path: String,
    /// Path plus `?query`, as received.
    pub url: String,
    pub query: QueryParams,
    /// Lower-case header names.
    pub headers: BTreeMap<String, String>,
    pub raw_body: String,
    /// Body parsed as JSON, when it is JSON.
    pub json: Option<Value>,
}

impl MockRequest {
    #[must_use]
    pub fn from_parts(method: &Method, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Self {
        let raw_path = normalize_path(uri.path());
        let url = match uri.query() {
            Some(q) => format!("{}?{q}", uri.path()),
            None => uri.path().to_string(),
        };

        let mut header_map = BTreeMap::new();
        for (name, value) in headers {
            if let Ok(v) = value.to_str() {
                header_map
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| v.to_string());
            }
        }

        let raw_body = String::from_utf8_lossy(body).into_owned();
        let json = if raw_body.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&raw_body).ok()
        };

        Self {
            method: method.as_str().to_ascii_uppercase(),
            path: percent_decode(&raw_path),
            raw_path,
            url,
            query: parse_query(uri.query()),
            headers: header_map,
            raw_body,
            json,
        }
    }
}

#[must_use]
pub fn parse_query(query: Option<&str>) -> QueryParams {
    let mut out = QueryParams::new();
    let Some(query) = query else {
        return out;
    };
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        out.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_query_value_wins() {
        let q = parse_query(Some("key=a&key=b&name=x%20y&flag"));
        assert_eq!(q.get("key").map(String::as_str), Some("a"));
        assert_eq!(q.get("name").map(String::as_str), Some("x y"));
        assert_eq!(q.get("flag").map(String::as_str), Some(""));
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn request_snapshot_normalizes_path_and_parses_body() {
        let uri: Uri = "/users/a%20b/?x=1".parse().expect("uri");
        let mut headers = HeaderMap::new();
        headers.insert("X-Trace", "t1".parse().expect("header"));

        let req = MockRequest::from_parts(&Method::POST, &uri, &headers, br#"{"a": 1}"#);
        assert_eq!(req.method, "POST");
        assert_eq!(req.raw_path, "/users/a%20b");
        assert_eq!(req.path, "/users/a b");
        assert_eq!(req.url, "/users/a%20b/?x=1");
        assert_eq!(req.headers.get("x-trace").map(String::as_str), Some("t1"));
        assert_eq!(req.json, Some(serde_json::json!({"a": 1})));

        let text = MockRequest::from_parts(&Method::PUT, &uri, &headers, b"not json");
        assert_eq!(text.raw_body, "not json");
        assert_eq!(text.json, None);
    }
}
