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


//! # Prompts
//!
//! A prompt is an action that renders its input into a [`GenerateRequest`]
//! without calling a model. Template engines such as dotprompt register their
//! prompts through [`define_prompt`] so that rendering is traced and visible
//! to the developer tooling.

use crate::model::GenerateRequest;
use genkit_core::action::{Action, ActionBuilder, ActionFnArg};
use genkit_core::error::Result;
use genkit_core::registry::{ActionType, Registry};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

#[derive(Clone)]
pub struct PromptAction(pub Action<Value, GenerateRequest, ()>);

impl Deref for PromptAction {
    type Target = Action<Value, GenerateRequest, ()>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PromptAction {
    /// Renders `input` into a model request.
    pub async fn render(&self, input: Value) -> Result<GenerateRequest> {
        self.0.call(input).await
    }
}

/// Registers `render` as `/prompt/{provider}/{name}`.
///
/// When `input_schema` is given, JSON inputs arriving through the registry
/// are validated against it.
pub fn define_prompt<F, Fut>(
    registry: &Registry,
    provider: &str,
    name: &str,
    metadata: HashMap<String, Value>,
    input_schema: Option<Value>,
    render: F,
) -> Result<PromptAction>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<GenerateRequest>> + Send,
{
    let render = Arc::new(render);
    let body = move |input: Value, _: ActionFnArg<()>| {
        let render = render.clone();
        async move { (*render)(input).await }
    };
    let mut builder = ActionBuilder::new(ActionType::Prompt, format!("{}/{}", provider, name), body);
    for (key, value) in metadata {
        builder = builder.with_metadata(key, value);
    }
    if let Some(schema) = input_schema {
        builder = builder.with_input_schema(schema);
    }
    let action = builder.build();
    registry.register_action(action.clone())?;
    Ok(PromptAction(action))
}

pub fn lookup_prompt(registry: &Registry, provider: &str, name: &str) -> Option<PromptAction> {
    registry
        .lookup::<Value, GenerateRequest, ()>(ActionType::Prompt, &format!("{}/{}", provider, name))
        .map(PromptAction)
}
