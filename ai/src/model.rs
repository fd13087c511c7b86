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


//! # Generative Models
//!
//! A model is an action from [`GenerateRequest`] to [`GenerateResponse`] that
//! may stream [`GenerateResponseChunk`]s. Providers register models with
//! [`define_model`] under `/model/{provider}/{name}`; callers find them again
//! with [`lookup_model`].

use crate::document::{Document, Part};
use crate::message::{MessageData, Role};
use crate::tool::ToolDefinition;
use genkit_core::action::{Action, ActionBuilder, ActionFnArg, ActionRunOptions, StreamingCallback};
use genkit_core::error::{Error, Result};
use genkit_core::registry::{ActionType, Registry};
use genkit_core::status::StatusCode;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

/// What a model can handle. Requests using anything unsupported are
/// rejected before they reach the provider.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfoSupports {
    #[serde(default)]
    pub multiturn: bool,
    #[serde(default)]
    pub media: bool,
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub system_role: bool,
    /// Output formats the model can produce natively.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default)]
    pub supports: ModelInfoSupports,
}

/// Configuration understood by most models.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationCommonConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Text,
    Media,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct OutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub messages: Vec<MessageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,
    /// Documents the model should ground its answer on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Blocked,
    Other,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_characters: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_characters: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageData>,
    #[serde(default)]
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<GenerationUsage>,
    /// The request that produced this response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<GenerateRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

impl GenerateResponse {
    /// The text of the response message, or an empty string.
    pub fn text(&self) -> String {
        self.message.as_ref().map(MessageData::text).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponseChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub index: u32,
    pub content: Vec<Part>,
}

impl GenerateResponseChunk {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

pub type ModelStreamingCallback = StreamingCallback<GenerateResponseChunk>;

/// A registered model.
#[derive(Clone)]
pub struct ModelAction(pub Action<GenerateRequest, GenerateResponse, GenerateResponseChunk>);

impl std::fmt::Debug for ModelAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAction")
            .field("meta", &self.0.meta)
            .finish_non_exhaustive()
    }
}

impl Deref for ModelAction {
    type Target = Action<GenerateRequest, GenerateResponse, GenerateResponseChunk>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ModelAction {
    /// Runs the model, streaming chunks to `callback` when one is given.
    pub async fn generate(
        &self,
        request: GenerateRequest,
        callback: Option<ModelStreamingCallback>,
    ) -> Result<GenerateResponse> {
        let options = ActionRunOptions {
            on_chunk: callback,
            ..Default::default()
        };
        Ok(self.0.run(request, options).await?.result)
    }

    /// The capabilities the model was registered with.
    pub fn info(&self) -> ModelInfo {
        self.meta
            .metadata
            .get("model")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

fn model_name(provider: &str, name: &str) -> String {
    format!("{}/{}", provider, name)
}

/// Defines a model and registers it as `/model/{provider}/{name}`.
///
/// `func` receives the request and, when the caller is streaming, the chunk
/// callback. Requests are checked against `info.supports` first.
pub fn define_model<F, Fut>(
    registry: &Registry,
    provider: &str,
    name: &str,
    info: ModelInfo,
    func: F,
) -> Result<ModelAction>
where
    F: Fn(GenerateRequest, Option<ModelStreamingCallback>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<GenerateResponse>> + Send,
{
    let full_name = model_name(provider, name);
    let func = Arc::new(func);
    let supports = Arc::new(info.supports.clone());
    let checked_name = full_name.clone();

    let body = move |request: GenerateRequest, args: ActionFnArg<GenerateResponseChunk>| {
        let func = func.clone();
        let supports = supports.clone();
        let name = checked_name.clone();
        async move {
            validate_support(&name, &supports, &request)?;
            (*func)(request, args.chunk_sender).await
        }
    };

    let action = ActionBuilder::new(ActionType::Model, full_name, body)
        .with_metadata("model", json!(info))
        .build();
    registry.register_action(action.clone())?;
    log::debug!("defined model {}", action.key());
    Ok(ModelAction(action))
}

/// The model registered as `{provider}/{name}`, if any.
pub fn lookup_model(registry: &Registry, provider: &str, name: &str) -> Option<ModelAction> {
    registry
        .lookup::<GenerateRequest, GenerateResponse, GenerateResponseChunk>(
            ActionType::Model,
            &model_name(provider, name),
        )
        .map(ModelAction)
}

pub fn is_defined_model(registry: &Registry, provider: &str, name: &str) -> bool {
    lookup_model(registry, provider, name).is_some()
}

/// Rejects requests that use features the model does not support.
pub fn validate_support(
    name: &str,
    supports: &ModelInfoSupports,
    request: &GenerateRequest,
) -> Result<()> {
    let unsupported = |what: String| {
        Error::new_user_facing(
            StatusCode::InvalidArgument,
            format!("model {:?} does not support {}", name, what),
            None,
        )
    };
    let parts = || request.messages.iter().flat_map(|m| m.content.iter());

    if !supports.media && parts().any(Part::is_media) {
        return Err(unsupported("media, but media was provided".into()));
    }
    if !supports.tools && !request.tools.is_empty() {
        return Err(unsupported("tool use, but tools were provided".into()));
    }
    if !supports.multiturn && request.messages.len() > 1 {
        return Err(unsupported(format!(
            "multiple messages, but {} were provided",
            request.messages.len()
        )));
    }
    if !supports.system_role && request.messages.iter().any(|m| m.role == Role::System) {
        return Err(unsupported("system role, but system role was provided".into()));
    }
    Ok(())
}
