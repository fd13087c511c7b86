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


//! # Flows
//!
//! A flow is an [`Action`] of type `flow` whose body runs under a
//! [`FlowContext`] and inside a root `flow` span. Steps created with [`run`]
//! become child `flowStep` spans.

use crate::action::{Action, ActionBuilder, ActionFnArg};
use crate::context::{get_flow_context, run_with_flow_context, FlowAuth, FlowContext};
use crate::error::{Error, Result};
use crate::registry::{ActionType, Registry};
use crate::status::StatusCode;
use crate::tracing::{in_new_span, SpanMetadata};
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;

/// A flow with input `I`, output `O` and stream chunks `S`.
pub type Flow<I, O, S = ()> = Action<I, O, S>;

#[derive(Default, Clone)]
pub struct FlowOptions {
    pub description: Option<String>,
    /// Checked against the invocation context before the body runs.
    pub auth: Option<Arc<dyn FlowAuth>>,
}

/// Defines a non-streaming flow and registers it as `/flow/{name}`.
pub fn define_flow<I, O, F, Fut>(registry: &Registry, name: &str, func: F) -> Result<Flow<I, O>>
where
    I: Serialize + DeserializeOwned + JsonSchema + Send + 'static,
    O: Serialize + JsonSchema + Send + 'static,
    F: Fn(I, ActionFnArg<()>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send,
{
    define_flow_with_options(registry, name, FlowOptions::default(), func)
}

/// Defines a flow that emits chunks of type `S` through
/// [`ActionFnArg::send_chunk`].
pub fn define_streaming_flow<I, O, S, F, Fut>(
    registry: &Registry,
    name: &str,
    func: F,
) -> Result<Flow<I, O, S>>
where
    I: Serialize + DeserializeOwned + JsonSchema + Send + 'static,
    O: Serialize + JsonSchema + Send + 'static,
    S: Serialize + JsonSchema + Send + 'static,
    F: Fn(I, ActionFnArg<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send,
{
    define_flow_with_options(registry, name, FlowOptions::default(), func)
}

pub fn define_flow_with_options<I, O, S, F, Fut>(
    registry: &Registry,
    name: &str,
    options: FlowOptions,
    func: F,
) -> Result<Flow<I, O, S>>
where
    I: Serialize + DeserializeOwned + JsonSchema + Send + 'static,
    O: Serialize + JsonSchema + Send + 'static,
    S: Serialize + JsonSchema + Send + 'static,
    F: Fn(I, ActionFnArg<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send,
{
    let func = Arc::new(func);
    let flow_name = name.to_string();
    let auth = options.auth.clone();
    let body = move |input: I, args: ActionFnArg<S>| {
        let func = func.clone();
        let flow_name = flow_name.clone();
        let auth = auth.clone();
        async move {
            if let Some(auth) = auth {
                let input_json = serde_json::to_value(&input)?;
                auth.check_auth_policy(args.context.as_ref(), &input_json)?;
            }
            let flow_context = FlowContext {
                flow_id: format!("{}-{}", flow_name, args.trace.trace_id),
                flow_name,
            };
            run_with_flow_context(flow_context, (*func)(input, args)).await
        }
    };

    let mut builder = ActionBuilder::new(ActionType::Flow, name, body);
    if let Some(description) = options.description {
        builder = builder.with_description(description);
    }
    if let Some(auth) = options.auth {
        builder = builder.with_auth(auth);
    }
    let flow = builder.build();
    registry.register_action(flow.clone())?;
    Ok(flow)
}

/// Runs `func` as a named, traced step of the enclosing flow.
pub async fn run<O, F, Fut>(name: &str, func: F) -> Result<O>
where
    O: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<O>>,
{
    if get_flow_context().is_none() {
        return Err(Error::new_user_facing(
            StatusCode::FailedPrecondition,
            format!("run({:?}): must be called from inside a flow", name),
            None,
        ));
    }
    let (output, _) = in_new_span(SpanMetadata::new(name, "flowStep"), |_| func()).await?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionRunOptions;
    use crate::context::{ActionContext, ApiKeyAuth, ApiKeyPolicy};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Serialize, Deserialize, JsonSchema, Debug, PartialEq, Clone)]
    struct Greeting {
        name: String,
    }

    #[tokio::test]
    async fn flow_runs_its_steps() {
        let registry = Registry::new();
        let flow = define_flow(&registry, "greet", |input: Greeting, _| async move {
            let upper = run("uppercase", || async move { Ok(input.name.to_uppercase()) }).await?;
            run("format", || async move { Ok(format!("Hello, {}", upper)) }).await
        })
        .unwrap();

        assert_eq!(
            flow.call(Greeting {
                name: "world".into()
            })
            .await
            .unwrap(),
            "Hello, WORLD"
        );
        assert!(registry.lookup_action("/flow/greet").is_some());
    }

    #[tokio::test]
    async fn flow_id_combines_name_and_trace() {
        let registry = Registry::new();
        let flow = define_flow(&registry, "whoami", |_: (), args| async move {
            let ctx = get_flow_context().unwrap();
            Ok((ctx.flow_name, ctx.flow_id, args.trace.trace_id))
        })
        .unwrap();
        let (name, id, trace_id) = flow.call(()).await.unwrap();
        assert_eq!(name, "whoami");
        assert_eq!(id, format!("whoami-{}", trace_id));
    }

    #[tokio::test]
    async fn run_outside_a_flow_fails() {
        let err = run("orphan", || async { Ok(1) }).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FailedPrecondition);
    }

    #[tokio::test]
    async fn streaming_flow_sends_chunks_in_order() {
        let registry = Registry::new();
        let flow = define_streaming_flow(&registry, "count", |n: u32, args| async move {
            for i in 0..n {
                args.send_chunk(i)?;
            }
            Ok(format!("done: {}", n))
        })
        .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let result = flow
            .run(
                3,
                ActionRunOptions::with_callback(Arc::new(move |c: u32| {
                    sink.lock().unwrap().push(c);
                    Ok(())
                })),
            )
            .await
            .unwrap();

        assert_eq!(result.result, "done: 3");
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn callback_error_aborts_the_flow() {
        let registry = Registry::new();
        let flow = define_streaming_flow(&registry, "stop", |n: u32, args| async move {
            for i in 0..n {
                args.send_chunk(i)?;
            }
            Ok(n)
        })
        .unwrap();

        let err = flow
            .run(
                5,
                ActionRunOptions::with_callback(Arc::new(|c: u32| {
                    if c == 1 {
                        Err(Error::new_internal("listener gone"))
                    } else {
                        Ok(())
                    }
                })),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "listener gone");
    }

    #[tokio::test]
    async fn auth_policy_is_checked_before_the_body() {
        let registry = Registry::new();
        let options = FlowOptions {
            auth: Some(Arc::new(ApiKeyAuth::new(ApiKeyPolicy::Require(
                "secret".into(),
            )))),
            ..Default::default()
        };
        let flow = define_flow_with_options(
            &registry,
            "guarded",
            options,
            |s: String, _: ActionFnArg<()>| async move { Ok(s) },
        )
        .unwrap();

        let err = flow.call("hi".into()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Unauthenticated);

        let ok = flow
            .run(
                "hi".into(),
                ActionRunOptions::with_context(ActionContext::with_auth(
                    json!({"apiKey": "secret"}),
                )),
            )
            .await
            .unwrap();
        assert_eq!(ok.result, "hi");
    }

    #[tokio::test]
    async fn stream_exposes_chunks_and_output() {
        use futures::StreamExt;

        let registry = Registry::new();
        let flow = define_streaming_flow(&registry, "streamy", |n: u32, args| async move {
            for i in 0..n {
                args.send_chunk(json!({"count": i}))?;
            }
            Ok(format!("done: {}, streamed: {} times", n, n))
        })
        .unwrap();

        let response = flow.stream(2, None);
        let chunks: Vec<_> = response.stream.collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].as_ref().unwrap(), &json!({"count": 1}));
        assert_eq!(response.output.await.unwrap(), "done: 2, streamed: 2 times");
    }
}
