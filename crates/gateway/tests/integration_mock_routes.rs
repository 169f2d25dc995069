mod common;

use common::{Gateway, scope, session_token};
use mbx_gateway::store::{NewDatasetRecord, Store as _};
use serde_json::{Value, json};
use std::time::{Duration, Instant};

async fn get_json(
    gw: &Gateway,
    path: &str,
    headers: &[(&str, String)],
) -> anyhow::Result<(u16, Value)> {
    let mut req = gw.client.get(gw.url(path));
    for (name, value) in headers {
        req = req.header(*name, value);
    }
    let resp = req.send().await?;
    let status = resp.status().as_u16();
    Ok((status, resp.json().await?))
}

#[tokio::test]
async fn public_static_route_is_served_with_default_headers() -> anyhow::Result<()> {
    let gw = Gateway::start().await?;
    gw.add_route(json!({
        "scope": scope("t1", "p1"),
        "path": "/hello/",
        "requireApiKey": false,
        "responseBody": "{\"hello\": \"world\"}",
        "responseHeaders": {"X-Mock": "yes"},
    }))
    .await?;

    let resp = gw.client.get(gw.url("/hello")).send().await?;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["cache-control"], "no-store");
    assert_eq!(resp.headers()["content-type"], "application/json");
    assert_eq!(resp.headers()["x-mock"], "yes");
    assert_eq!(resp.json::<Value>().await?, json!({"hello": "world"}));

    gw.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn api_keys_gate_private_routes() -> anyhow::Result<()> {
    let gw = Gateway::start().await?;
    gw.add_route(json!({
        "scope": scope("t1", "p1"),
        "path": "/orders/:id",
        "apiKey": "orders-key",
        "responseMode": {"mode": "TEMPLATE"},
        "responseBody": "{\"order\": \"{{ params.id }}\"}",
    }))
    .await?;
    gw.add_route(json!({
        "scope": scope("t1", "p1"),
        "path": "/invoices/:id",
        "apiKey": "invoices-key",
    }))
    .await?;

    let (status, body) = get_json(&gw, "/orders/42", &[]).await?;
    assert_eq!((status, body), (401, json!({"error": "Missing API key"})));

    let (status, body) = get_json(&gw, "/orders/42", &[("x-api-key", "nope".into())]).await?;
    assert_eq!((status, body), (401, json!({"error": "Invalid API key"})));

    let (status, body) =
        get_json(&gw, "/orders/42", &[("x-api-key", "invoices-key".into())]).await?;
    assert_eq!(
        (status, body),
        (404, json!({"error": "API key does not match this route"}))
    );

    let (status, body) = get_json(&gw, "/orders/42", &[("x-api-key", "orders-key".into())]).await?;
    assert_eq!((status, body), (200, json!({"order": "42"})));

    gw.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn sessions_see_their_own_routes_only() -> anyhow::Result<()> {
    let gw = Gateway::start().await?;
    gw.add_route(json!({
        "scope": scope("t1", "p1"),
        "path": "/me",
        "responseBody": "{\"who\": \"p1\"}",
    }))
    .await?;
    gw.add_route(json!({
        "scope": scope("t2", "p2"),
        "path": "/public",
        "requireApiKey": false,
        "responseBody": "{}",
    }))
    .await?;

    let bearer = ("authorization", format!("Bearer {}", session_token("t1", "p1")));
    let (status, body) = get_json(&gw, "/me", std::slice::from_ref(&bearer)).await?;
    assert_eq!((status, body), (200, json!({"who": "p1"})));

    let cookie = ("cookie", format!("mbx_session={}", session_token("t1", "p1")));
    let (status, _) = get_json(&gw, "/me", &[cookie]).await?;
    assert_eq!(status, 200);

    let (status, body) = get_json(&gw, "/public", &[bearer]).await?;
    assert_eq!((status, body), (404, json!({"error": "Route not found"})));

    let (status, _) = get_json(&gw, "/public", &[]).await?;
    assert_eq!(status, 200);

    gw.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn dataset_routes_serve_records() -> anyhow::Result<()> {
    let gw = Gateway::start().await?;
    let route = gw
        .add_route(json!({
            "scope": scope("t1", "p1"),
            "path": "/bookings/:ref?",
            "requireApiKey": false,
            "responseMode": {
                "mode": "DATASET_LOOKUP",
                "lookupParamName": "ref",
                "notFoundStatus": 410,
            },
        }))
        .await?;
    for (key, value) in [("A1", json!({"seat": "1A"})), ("B2", json!("[1, 2]"))] {
        gw.store
            .create_dataset_record(
                route.id,
                NewDatasetRecord {
                    key: key.to_string(),
                    value: Some(value),
                    enabled: true,
                },
            )
            .await?;
    }

    let (status, body) = get_json(&gw, "/bookings/A1", &[]).await?;
    assert_eq!((status, body), (200, json!({"seat": "1A"})));

    let (status, body) = get_json(&gw, "/bookings?bookingId=B2", &[]).await?;
    assert_eq!((status, body), (200, json!([1, 2])));

    let (status, body) = get_json(&gw, "/bookings", &[]).await?;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 2);
    assert_eq!(body["items"][0], json!({"key": "A1", "value": {"seat": "1A"}}));

    let (status, body) = get_json(&gw, "/bookings/ZZ", &[]).await?;
    assert_eq!((status, body), (410, json!({"error": "Not found"})));

    gw.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn template_routes_see_the_request_body() -> anyhow::Result<()> {
    let gw = Gateway::start().await?;
    gw.add_route(json!({
        "scope": scope("t1", "p1"),
        "method": "POST",
        "path": "/users/{id}/notes",
        "requireApiKey": false,
        "responseStatus": 201,
        "responseMode": {"mode": "TEMPLATE"},
        "responseBody": "{\"user\": \"{{ params.id }}\", \"note\": {{ request.json }}, \"tag\": \"{{ request.query.tag }}\"}",
    }))
    .await?;

    let resp = gw
        .client
        .post(gw.url("/users/u%207/notes?tag=x&tag=y"))
        .json(&json!({"text": "hi"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 201);
    assert_eq!(
        resp.json::<Value>().await?,
        json!({"user": "u 7", "note": {"text": "hi"}, "tag": "x"})
    );

    gw.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn broken_stored_json_is_a_500() -> anyhow::Result<()> {
    let gw = Gateway::start().await?;
    gw.add_route(json!({
        "scope": scope("t1", "p1"),
        "path": "/broken",
        "requireApiKey": false,
        "responseBody": "{not json",
    }))
    .await?;

    let (status, body) = get_json(&gw, "/broken", &[]).await?;
    assert_eq!(
        (status, body),
        (500, json!({"error": "Invalid JSON in route.responseBody"}))
    );

    gw.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unsupported_methods_and_reserved_paths() -> anyhow::Result<()> {
    let gw = Gateway::start().await?;

    let resp = gw
        .client
        .request(reqwest::Method::OPTIONS, gw.url("/anything"))
        .send()
        .await?;
    assert_eq!(resp.status(), 405);
    assert_eq!(resp.json::<Value>().await?, json!({"error": "Method not allowed"}));

    let (status, _) = get_json(&gw, "/mcp", &[]).await?;
    assert_eq!(status, 404);

    for reserved in ["/mcp", "/mcp/a/b"] {
        let resp = gw
            .client
            .request(reqwest::Method::OPTIONS, gw.url(reserved))
            .send()
            .await?;
        assert_eq!(resp.status(), 405, "{reserved}");
    }

    let (status, body) = get_json(&gw, "/nowhere", &[]).await?;
    assert_eq!((status, body), (401, json!({"error": "Missing API key"})));

    gw.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn delay_postpones_the_response() -> anyhow::Result<()> {
    let gw = Gateway::start().await?;
    gw.add_route(json!({
        "scope": scope("t1", "p1"),
        "path": "/slow",
        "requireApiKey": false,
        "responseBody": "{}",
        "responseDelayMs": 150,
    }))
    .await?;

    let started = Instant::now();
    let (status, _) = get_json(&gw, "/slow", &[]).await?;
    assert_eq!(status, 200);
    assert!(started.elapsed() >= Duration::from_millis(150));

    gw.server.shutdown().await;
    Ok(())
}
