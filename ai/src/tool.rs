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


//! # Tools
//!
//! Tools are actions a model may ask to call. [`define_tool`] registers one
//! under `/tool/{name}`; its [`ToolDefinition`] is what gets sent to the
//! model.

use genkit_core::action::{Action, ActionBuilder, ActionFnArg, ActionMetadata};
use genkit_core::context::ActionContext;
use genkit_core::error::Result;
use genkit_core::registry::{ActionType, ErasedAction, Registry};
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

/// A tool as described to a model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl From<&ActionMetadata> for ToolDefinition {
    fn from(meta: &ActionMetadata) -> Self {
        ToolDefinition {
            name: meta.name.clone(),
            description: meta.description.clone().unwrap_or_default(),
            input_schema: meta.input_schema.clone(),
            output_schema: meta.output_schema.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ToolAction<I = Value, O = Value>(pub Action<I, O, ()>);

impl<I, O> Deref for ToolAction<I, O> {
    type Target = Action<I, O, ()>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<I, O> ToolAction<I, O> {
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::from(self.0.meta.as_ref())
    }
}

/// Defines a tool and registers it as `/tool/{name}`.
///
/// `runner` receives the decoded input and the context of the invocation.
pub fn define_tool<I, O, F, Fut>(
    registry: &Registry,
    name: &str,
    description: &str,
    runner: F,
) -> Result<ToolAction<I, O>>
where
    I: JsonSchema + Serialize + DeserializeOwned + Send + 'static,
    O: JsonSchema + Serialize + Send + 'static,
    F: Fn(I, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send,
{
    let action = ActionBuilder::new(ActionType::Tool, name, move |input: I, args: ActionFnArg<()>| {
        runner(input, args.context.unwrap_or_default())
    })
    .with_description(description)
    .build();
    registry.register_action(action.clone())?;
    Ok(ToolAction(action))
}

/// The tool registered under `name`, with its types erased.
pub fn lookup_tool(registry: &Registry, name: &str) -> Option<Arc<dyn ErasedAction>> {
    registry.lookup_action(&format!("/{}/{}", ActionType::Tool.as_str(), name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize, Serialize, JsonSchema)]
    struct Dish {
        name: String,
    }

    #[tokio::test]
    async fn tools_describe_themselves_and_run() {
        let registry = Registry::new();
        let tool = define_tool(
            &registry,
            "price",
            "looks up the price of a dish",
            |dish: Dish, _ctx| async move { Ok(dish.name.len() as f64 * 1.5) },
        )
        .unwrap();

        let def = tool.definition();
        assert_eq!(def.name, "price");
        assert_eq!(def.description, "looks up the price of a dish");
        assert!(def.input_schema.unwrap()["properties"]["name"].is_object());

        let erased = lookup_tool(&registry, "price").unwrap();
        let out = erased
            .run_json(json!({"name": "soup"}), None, None)
            .await
            .unwrap();
        assert_eq!(out.result, json!(6.0));
    }
}
