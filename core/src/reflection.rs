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


//! # Reflection API
//!
//! The developer API the Genkit tooling talks to while an app runs in the
//! `dev` environment. Served by [`crate::server::start`] in
//! [`ServerMode::Reflection`](crate::server::ServerMode::Reflection).

use crate::context::ActionContext;
use crate::error::{Error, Result};
use crate::server::{
    error_response, json_response, not_found, read_json, streaming_response, text_response,
    wants_stream, BoxBody, ServerState,
};
use crate::status::StatusCode;
use crate::tracing::exporter::set_telemetry_server_url;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};

const DEFAULT_TRACE_LIMIT: usize = 100;

#[derive(Deserialize)]
struct RunActionRequest {
    key: String,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    context: Option<ActionContext>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyRequest {
    #[serde(default)]
    telemetry_server_url: Option<String>,
}

pub(crate) async fn route(req: Request<Incoming>, state: &ServerState) -> Result<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (req.method(), segments.as_slice()) {
        (&Method::GET, ["api", "__health"]) => Ok(text_response("OK")),
        (&Method::POST, ["api", "__quitquitquit"]) => {
            log::info!("reflection server asked to quit");
            state.shutdown();
            Ok(text_response("OK"))
        }
        (&Method::GET, ["api", "envs"]) => Ok(json_response(&state.options.configured_envs)),
        (&Method::POST, ["api", "notify"]) => {
            let body: NotifyRequest = read_json(req, state.options.body_limit).await?;
            if let Some(url) = body.telemetry_server_url.filter(|u| !u.is_empty()) {
                log::debug!("telemetry server set to {}", url);
                set_telemetry_server_url(url);
            }
            Ok(text_response("OK"))
        }
        (&Method::GET, ["api", "actions"]) => Ok(json_response(&list_actions(state))),
        (&Method::POST, ["api", "runAction"]) => run_action(req, state).await,
        (&Method::GET, ["api", "envs", _env, "traces"]) => {
            let store = trace_store(state)?;
            Ok(json_response(&json!({ "traces": store.list(DEFAULT_TRACE_LIMIT) })))
        }
        (&Method::GET, ["api", "envs", _env, "traces", trace_id]) => {
            let store = trace_store(state)?;
            match store.get(trace_id) {
                Some(trace) => Ok(json_response(&trace)),
                None => Err(Error::new_user_facing(
                    StatusCode::NotFound,
                    format!("trace {} not found", trace_id),
                    None,
                )),
            }
        }
        _ => Err(not_found()),
    }
}

/// Every registered action keyed by its registry key.
fn list_actions(state: &ServerState) -> Map<String, Value> {
    state
        .registry
        .list_actions()
        .into_iter()
        .map(|(key, action)| {
            let meta = action.metadata();
            let desc = json!({
                "key": key,
                "name": meta.name,
                "description": meta.description,
                "inputSchema": meta.input_schema,
                "outputSchema": meta.output_schema,
                "metadata": meta.metadata,
            });
            (key, desc)
        })
        .collect()
}

async fn run_action(req: Request<Incoming>, state: &ServerState) -> Result<Response<BoxBody>> {
    let stream = wants_stream(&req);
    let body: RunActionRequest = read_json(req, state.options.body_limit).await?;
    let action = state.registry.lookup_action(&body.key).ok_or_else(|| {
        Error::new_user_facing(
            StatusCode::NotFound,
            format!("no action with key {:?}", body.key),
            None,
        )
    })?;
    log::debug!("running action {}", body.key);

    if stream {
        return Ok(streaming_response(action, body.input, body.context));
    }
    match action.run_json(body.input, body.context, None).await {
        Ok(out) => Ok(json_response(&out)),
        Err(e) => Ok(error_response(&e)),
    }
}

fn trace_store(state: &ServerState) -> Result<&crate::tracing::exporter::LocalTraceStore> {
    state.options.trace_store.as_ref().ok_or_else(|| {
        Error::new_user_facing(StatusCode::Unavailable, "no local trace store", None)
    })
}
