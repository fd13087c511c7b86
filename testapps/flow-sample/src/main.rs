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


//! Sample flows, served over HTTP.
//!
//! With `GENKIT_ENV=dev` the reflection API listens on port 3100:
//!
//! ```text
//! curl -d '{"key":"/flow/parent", "input":{}}' http://localhost:3100/api/runAction
//! ```
//!
//! Otherwise each flow is served on port 3400:
//!
//! ```text
//! curl -d '{}' http://localhost:3400/parent
//! curl -H 'Authorization: authorized' -d '{"data":"x"}' http://localhost:3400/withContext
//! curl -d '{"data":3}' 'http://localhost:3400/streamy?stream=true'
//! ```

use async_trait::async_trait;
use genkit::{
    run, ActionContext, Error, FlowAuth, FlowOptions, Genkit, GenkitOptions, Result, StatusCode,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Treats the `Authorization` header as a user name; only `authorized` may
/// call the flow.
struct TestAuth;

#[async_trait]
impl FlowAuth for TestAuth {
    async fn provide_auth_context(&self, auth_header: Option<&str>) -> Result<ActionContext> {
        Ok(ActionContext::with_auth(json!({ "username": auth_header })))
    }

    fn check_auth_policy(&self, context: Option<&ActionContext>, _input: &Value) -> Result<()> {
        let Some(auth) = context.and_then(|c| c.auth.as_ref()) else {
            return Err(Error::new_user_facing(
                StatusCode::Unauthenticated,
                "auth is required",
                None,
            ));
        };
        if auth.get("username").and_then(Value::as_str) != Some("authorized") {
            return Err(Error::new_user_facing(
                StatusCode::PermissionDenied,
                "unauthorized",
                None,
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
struct Complex {
    key: String,
    value: i64,
}

#[derive(Serialize, Deserialize, JsonSchema)]
struct Chunk {
    count: u32,
}

fn define_flows(genkit: &Genkit) -> Result<()> {
    let basic = genkit.define_flow("basic", |subject: String, _| async move {
        let foo = run("call-llm", || async { Ok(format!("subject: {}", subject)) }).await?;
        run("call-llm", || async { Ok(format!("foo: {}", foo)) }).await
    })?;

    genkit.define_flow_with_options(
        "withContext",
        FlowOptions {
            auth: Some(Arc::new(TestAuth)),
            ..Default::default()
        },
        |subject: String, args: genkit::ActionFnArg<()>| async move {
            let auth = args.context.and_then(|c| c.auth).unwrap_or(Value::Null);
            Ok(format!("subject={},auth={}", subject, auth))
        },
    )?;

    genkit.define_flow("parent", move |_: Value, _| {
        let basic = basic.clone();
        async move { basic.call("foo".to_string()).await }
    })?;

    genkit.define_flow("complex", |c: Complex, _| async move {
        run("call-llm", || async { Ok(format!("{}: {}", c.key, c.value)) }).await
    })?;

    genkit.define_flow("throwy", |err: String, _| async move {
        Err::<String, _>(Error::new_internal(err))
    })?;

    genkit.define_streaming_flow("streamy", |count: u32, args: genkit::ActionFnArg<Chunk>| async move {
        let mut streamed = 0;
        if args.streaming_requested {
            for i in 0..count {
                args.send_chunk(Chunk { count: i })?;
                streamed += 1;
            }
        }
        Ok(format!("done: {}, streamed: {} times", count, streamed))
    })?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = genkit::logging::init() {
        eprintln!("logger already installed: {}", e);
    }
    let genkit = Genkit::init(GenkitOptions::default()).await?;
    define_flows(&genkit)?;

    let server = genkit.start_server(None).await?;
    log::info!("listening on {}", server.address());
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::with_source("waiting for ctrl-c", e))?;
    server.stop().await
}
