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


//! # Actions
//!
//! An [`Action`] is a named, typed, traced unit of work. Models, prompts,
//! tools, retrievers and flows are all actions; the [`Registry`] stores them
//! under `/{type}/{name}` and the reflection server runs them by key.
//!
//! Partial results are delivered through a [`StreamingCallback`]: a
//! synchronous function called once per chunk, in order. An error returned by
//! the callback aborts the action.
//!
//! [`Registry`]: crate::registry::Registry

use crate::async_utils::channel;
use crate::context::{self, ActionContext, FlowAuth};
use crate::error::{Error, Result};
use crate::registry::ActionType;
use crate::schema::{parse_schema, schema_for};
use crate::tracing::{self, SpanMetadata, TraceContext};
use async_trait::async_trait;
use futures::{Future, Stream};
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Receives each chunk of a streaming action.
pub type StreamingCallback<S> = Arc<dyn Fn(S) -> Result<()> + Send + Sync>;

/// Describes an action to the registry and to the developer tooling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    pub action_type: ActionType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_schema: Option<Value>,
    pub metadata: HashMap<String, Value>,
}

impl ActionMetadata {
    /// The registry key, `/{type}/{name}`.
    pub fn key(&self) -> String {
        format!("/{}/{}", self.action_type.as_str(), self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionResult<O> {
    pub result: O,
    pub telemetry: TelemetryInfo,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryInfo {
    pub trace_id: String,
    pub span_id: String,
}

/// Chunks and final output of an action started with [`Action::stream`].
///
/// If the action fails, `stream` ends with an error item carrying the same
/// message and `output` resolves to the original error.
pub struct StreamingResponse<O, S> {
    pub stream: Pin<Box<dyn Stream<Item = Result<S>> + Send>>,
    pub output: Pin<Box<dyn Future<Output = Result<O>> + Send>>,
}

/// Per-invocation arguments handed to an action's function.
pub struct ActionFnArg<S> {
    /// True when the caller supplied a chunk callback.
    pub streaming_requested: bool,
    pub chunk_sender: Option<StreamingCallback<S>>,
    pub context: Option<ActionContext>,
    pub trace: TraceContext,
    pub abort_signal: CancellationToken,
}

impl<S> ActionFnArg<S> {
    /// Delivers `chunk` to the caller. A no-op when nobody is listening.
    pub fn send_chunk(&self, chunk: S) -> Result<()> {
        match &self.chunk_sender {
            Some(callback) => callback(chunk),
            None => Ok(()),
        }
    }
}

/// Options for a single [`Action::run`].
pub struct ActionRunOptions<S> {
    /// Overrides the context inherited from the calling task.
    pub context: Option<ActionContext>,
    pub on_chunk: Option<StreamingCallback<S>>,
    pub abort_signal: Option<CancellationToken>,
}

impl<S> Default for ActionRunOptions<S> {
    fn default() -> Self {
        Self {
            context: None,
            on_chunk: None,
            abort_signal: None,
        }
    }
}

impl<S> ActionRunOptions<S> {
    pub fn with_context(context: ActionContext) -> Self {
        Self {
            context: Some(context),
            ..Default::default()
        }
    }

    pub fn with_callback(on_chunk: StreamingCallback<S>) -> Self {
        Self {
            on_chunk: Some(on_chunk),
            ..Default::default()
        }
    }
}

/// The body of an action.
#[async_trait]
pub trait ActionFn<I, O, S>: Send + Sync {
    async fn run(&self, input: I, args: ActionFnArg<S>) -> Result<O>;
}

#[async_trait]
impl<F, Fut, I, O, S> ActionFn<I, O, S> for F
where
    F: Fn(I, ActionFnArg<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send,
    I: Send + 'static,
    O: Send + 'static,
    S: Send + 'static,
{
    async fn run(&self, input: I, args: ActionFnArg<S>) -> Result<O> {
        (self)(input, args).await
    }
}

pub struct Action<I, O, S = ()> {
    pub meta: Arc<ActionMetadata>,
    func: Arc<dyn ActionFn<I, O, S>>,
    auth: Option<Arc<dyn FlowAuth>>,
}

impl<I, O, S> Clone for Action<I, O, S> {
    fn clone(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            func: self.func.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<I, O, S> Action<I, O, S> {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn key(&self) -> String {
        self.meta.key()
    }

    /// The auth hooks of a flow, if it was defined with any.
    pub fn auth(&self) -> Option<Arc<dyn FlowAuth>> {
        self.auth.clone()
    }

    fn span_metadata(&self) -> SpanMetadata {
        match self.meta.action_type {
            ActionType::Flow => SpanMetadata::new(self.meta.name.clone(), "flow"),
            other => {
                SpanMetadata::new(self.meta.name.clone(), "action").with_subtype(other.as_str())
            }
        }
    }
}

impl<I, O, S> Action<I, O, S>
where
    I: Serialize + DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    S: Send + 'static,
{
    /// Runs the action in a new span and returns its output with the span ids.
    pub async fn run(&self, input: I, options: ActionRunOptions<S>) -> Result<ActionResult<O>> {
        let mut span = self.span_metadata();
        if let Ok(json) = serde_json::to_value(&input) {
            span = span.with_input(json);
        }
        let context = options.context.or_else(context::get_context);
        let func = self.func.clone();

        let (result, telemetry) = tracing::in_new_span(span, |trace| async move {
            let args = ActionFnArg {
                streaming_requested: options.on_chunk.is_some(),
                chunk_sender: options.on_chunk,
                context: context.clone(),
                trace,
                abort_signal: options.abort_signal.unwrap_or_default(),
            };
            match context {
                Some(ctx) => context::run_with_context(ctx, func.run(input, args)).await,
                None => func.run(input, args).await,
            }
        })
        .await?;
        Ok(ActionResult { result, telemetry })
    }

    /// Runs the action and returns only its output.
    pub async fn call(&self, input: I) -> Result<O> {
        Ok(self.run(input, ActionRunOptions::default()).await?.result)
    }

    /// Runs the action on a JSON input, validated against the input schema.
    pub async fn run_json(
        &self,
        input: Value,
        options: ActionRunOptions<Value>,
    ) -> Result<ActionResult<Value>>
    where
        S: Serialize,
    {
        let input: I = parse_schema(input, self.meta.input_schema.as_ref())?;
        let on_chunk = options.on_chunk.map(|cb| -> StreamingCallback<S> {
            Arc::new(move |chunk: S| cb(serde_json::to_value(chunk)?))
        });
        let out = self
            .run(
                input,
                ActionRunOptions {
                    context: options.context,
                    on_chunk,
                    abort_signal: options.abort_signal,
                },
            )
            .await?;
        Ok(ActionResult {
            result: serde_json::to_value(out.result)?,
            telemetry: out.telemetry,
        })
    }

    /// Starts the action on a tokio task, exposing its chunks as a stream.
    pub fn stream(&self, input: I, context: Option<ActionContext>) -> StreamingResponse<O, S> {
        let (tx, rx) = channel::<S>();
        let sender = tx.clone();
        let options = ActionRunOptions {
            context,
            on_chunk: Some(Arc::new(move |chunk: S| sender.send(chunk))),
            abort_signal: None,
        };
        let action = self.clone();
        let task = tokio::spawn(async move {
            let result = action.run(input, options).await;
            match &result {
                Ok(_) => tx.close(),
                Err(e) => tx.error(Error::new_internal(e.to_string())),
            }
            result.map(|r| r.result)
        });
        let output = async move {
            task.await
                .map_err(|e| Error::with_source("streaming action task failed", e))?
        };
        StreamingResponse {
            stream: Box::pin(rx),
            output: Box::pin(output),
        }
    }
}

/// Builds an [`Action`], deriving its schemas from the type parameters.
pub struct ActionBuilder<I, O, S, F> {
    action_type: ActionType,
    name: String,
    description: Option<String>,
    input_schema: Option<Value>,
    metadata: HashMap<String, Value>,
    auth: Option<Arc<dyn FlowAuth>>,
    func: F,
    _marker: std::marker::PhantomData<fn(I) -> (O, S)>,
}

impl<I, O, S, F, Fut> ActionBuilder<I, O, S, F>
where
    I: JsonSchema + Send + 'static,
    O: JsonSchema + Send + 'static,
    S: JsonSchema + Send + 'static,
    F: Fn(I, ActionFnArg<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send,
{
    pub fn new(action_type: ActionType, name: impl Into<String>, func: F) -> Self {
        Self {
            action_type,
            name: name.into(),
            description: None,
            input_schema: None,
            metadata: HashMap::new(),
            auth: None,
            func,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Replaces the schema derived from `I`, e.g. when `I` is a raw JSON value.
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn FlowAuth>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn build(self) -> Action<I, O, S> {
        let meta = ActionMetadata {
            action_type: self.action_type,
            name: self.name,
            description: self.description,
            input_schema: Some(self.input_schema.unwrap_or_else(schema_for::<I>)),
            output_schema: Some(schema_for::<O>()),
            stream_schema: Some(schema_for::<S>()),
            metadata: self.metadata,
        };
        Action {
            meta: Arc::new(meta),
            func: Arc::new(self.func),
            auth: self.auth,
        }
    }
}
