// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! # Server Tests
//!
//! Starts the flow and reflection servers on free ports and talks to them
//! over HTTP.

use genkit_core::context::{ApiKeyAuth, ApiKeyPolicy};
use genkit_core::error::Error;
use genkit_core::flow::{define_flow, define_flow_with_options, define_streaming_flow, FlowOptions};
use genkit_core::registry::Registry;
use genkit_core::server::{self, ServerHandle, ServerMode, ServerOptions};
use genkit_core::status::StatusCode;
use genkit_core::tracing::exporter::LocalTraceStore;
use serde_json::{json, Value};
use std::sync::Arc;

fn registry() -> Registry {
    let registry = Registry::new();
    define_flow(&registry, "basic", |name: String, _| async move {
        Ok(format!("hello {name}"))
    })
    .unwrap();
    define_streaming_flow(&registry, "streamy", |count: u32, args| async move {
        for i in 0..count {
            args.send_chunk(json!({ "count": i }))?;
        }
        Ok(format!("done: {count}"))
    })
    .unwrap();
    define_flow(&registry, "throwy", |_: String, _| async move {
        Err::<String, _>(Error::new_user_facing(
            StatusCode::FailedPrecondition,
            "not today",
            None,
        ))
    })
    .unwrap();
    let auth = ApiKeyAuth::new(ApiKeyPolicy::Require("secret".to_string()));
    define_flow_with_options(
        &registry,
        "guarded",
        FlowOptions {
            auth: Some(Arc::new(auth)),
            ..Default::default()
        },
        |_: Value, _: genkit_core::ActionFnArg<()>| async move {
            Ok("let in".to_string())
        },
    )
    .unwrap();
    registry
}

async fn start(mode: ServerMode) -> ServerHandle {
    let options = ServerOptions {
        mode,
        port: Some(0),
        trace_store: Some(LocalTraceStore::new()),
        ..Default::default()
    };
    server::start(registry(), options).await.unwrap()
}

#[tokio::test]
async fn flow_server_runs_flows() {
    let handle = start(ServerMode::Flows).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/basic", handle.address()))
        .json(&json!({ "data": "world" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "result": "hello world" }));

    let resp = client
        .post(format!("{}/missing", handle.address()))
        .json(&json!({ "data": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn flow_server_reports_errors_as_status() {
    let handle = start(ServerMode::Flows).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/throwy", handle.address()))
        .json(&json!({ "data": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "not today");
    assert_eq!(body["error"]["code"], 9);

    let resp = client
        .post(format!("{}/basic", handle.address()))
        .json(&json!({ "data": 42 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn flow_server_applies_auth() {
    let handle = start(ServerMode::Flows).await;
    let client = reqwest::Client::new();
    let url = format!("{}/guarded", handle.address());

    let resp = client
        .post(&url)
        .json(&json!({ "data": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(&url)
        .header("Authorization", "wrong")
        .json(&json!({ "data": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .post(&url)
        .header("Authorization", "secret")
        .json(&json!({ "data": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"], "let in");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn flow_server_streams_ndjson() {
    let handle = start(ServerMode::Flows).await;
    let text = reqwest::Client::new()
        .post(format!("{}/streamy?stream=true", handle.address()))
        .json(&json!({ "data": 2 }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let lines: Vec<Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], json!({ "message": { "count": 0 } }));
    assert_eq!(lines[1], json!({ "message": { "count": 1 } }));
    assert_eq!(lines[2]["result"], "done: 2");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn reflection_server_lists_and_runs_actions() {
    let handle = start(ServerMode::Reflection).await;
    let client = reqwest::Client::new();
    let base = handle.address();

    let health = client
        .get(format!("{base}/api/__health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);

    let actions: Value = client
        .get(format!("{base}/api/actions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(actions["/flow/basic"]["name"], "basic");
    assert!(actions["/flow/basic"]["inputSchema"].is_object());
    assert!(actions.get("/flow/streamy").is_some());

    let out: Value = client
        .post(format!("{base}/api/runAction"))
        .json(&json!({ "key": "/flow/basic", "input": "dev" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(out["result"], "hello dev");
    assert!(out["telemetry"]["traceId"].is_string());

    let missing = client
        .post(format!("{base}/api/runAction"))
        .json(&json!({ "key": "/flow/nope", "input": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    let traces = client
        .get(format!("{base}/api/envs/dev/traces"))
        .send()
        .await
        .unwrap();
    assert_eq!(traces.status(), 200);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn reflection_server_quits_on_request() {
    let handle = start(ServerMode::Reflection).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/__quitquitquit", handle.address()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    handle.stop().await.unwrap();
}
