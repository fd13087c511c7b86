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


//! # Generation
//!
//! [`generate`] builds a [`GenerateRequest`] from [`GenerateOptions`], calls
//! the model and resolves any tool requests in its answer: the tools are run,
//! their responses are appended to the conversation and the model is called
//! again, up to [`GenerateOptions::max_turns`] times.

use crate::document::{Document, Part, ToolRequest};
use crate::message::MessageData;
use crate::model::{
    GenerateRequest, GenerateResponse, GenerationCommonConfig, ModelAction,
    ModelStreamingCallback, OutputConfig,
};
use crate::tool::{lookup_tool, ToolDefinition};
use genkit_core::error::{Error, Result};
use genkit_core::registry::Registry;
use genkit_core::status::StatusCode;
use serde_json::Value;

pub const DEFAULT_MAX_TURNS: u32 = 5;

/// Everything [`generate`] needs besides the model.
#[derive(Clone, Default)]
pub struct GenerateOptions {
    pub system: Option<String>,
    pub messages: Vec<MessageData>,
    pub prompt: Option<String>,
    pub config: Option<Value>,
    /// Names of registered tools the model may call.
    pub tools: Vec<String>,
    pub output: Option<OutputConfig>,
    pub context: Vec<Document>,
    pub on_chunk: Option<ModelStreamingCallback>,
    pub max_turns: Option<u32>,
    /// Return tool requests to the caller instead of running them.
    pub return_tool_requests: bool,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user message holding `text` after any other messages.
    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.prompt = Some(text.into());
        self
    }

    /// Prepends a system message holding `text`.
    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.system = Some(text.into());
        self
    }

    pub fn messages(mut self, messages: Vec<MessageData>) -> Self {
        self.messages = messages;
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn common_config(self, config: &GenerationCommonConfig) -> Result<Self> {
        let value = serde_json::to_value(config)?;
        Ok(self.config(value))
    }

    pub fn tools<T: Into<String>>(mut self, tools: impl IntoIterator<Item = T>) -> Self {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn output(mut self, output: OutputConfig) -> Self {
        self.output = Some(output);
        self
    }

    pub fn context(mut self, docs: Vec<Document>) -> Self {
        self.context = docs;
        self
    }

    pub fn on_chunk(mut self, callback: ModelStreamingCallback) -> Self {
        self.on_chunk = Some(callback);
        self
    }

    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn return_tool_requests(mut self, value: bool) -> Self {
        self.return_tool_requests = value;
        self
    }

    /// The request the first model call receives.
    pub fn to_request(&self, registry: &Registry) -> Result<GenerateRequest> {
        let mut messages = Vec::with_capacity(self.messages.len() + 2);
        if let Some(system) = &self.system {
            messages.push(MessageData::system(vec![Part::text(system.clone())]));
        }
        messages.extend(self.messages.iter().cloned());
        if let Some(prompt) = &self.prompt {
            messages.push(MessageData::user(vec![Part::text(prompt.clone())]));
        }

        let tools = self
            .tools
            .iter()
            .map(|name| {
                lookup_tool(registry, name)
                    .map(|tool| ToolDefinition::from(tool.metadata()))
                    .ok_or_else(|| tool_not_found(name))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GenerateRequest {
            messages,
            config: self.config.clone(),
            tools,
            output: self.output.clone(),
            context: self.context.clone(),
            candidates: None,
        })
    }
}

fn tool_not_found(name: &str) -> Error {
    Error::new_user_facing(
        StatusCode::NotFound,
        format!("tool {:?} not found", name),
        None,
    )
}

/// Generates a response from `model`, running requested tools in between.
pub async fn generate(
    registry: &Registry,
    model: &ModelAction,
    options: GenerateOptions,
) -> Result<GenerateResponse> {
    let mut request = options.to_request(registry)?;
    let max_turns = options.max_turns.unwrap_or(DEFAULT_MAX_TURNS);
    let mut turns = 0;

    loop {
        let response = model
            .generate(request.clone(), options.on_chunk.clone())
            .await?;
        let Some(message) = response.message.clone() else {
            return Ok(response);
        };
        let tool_requests: Vec<ToolRequest> =
            message.tool_requests().into_iter().cloned().collect();
        if tool_requests.is_empty() || options.return_tool_requests {
            return Ok(response);
        }
        if turns >= max_turns {
            return Err(Error::new_user_facing(
                StatusCode::ResourceExhausted,
                format!("exceeded maximum tool call iterations ({})", max_turns),
                None,
            ));
        }
        turns += 1;

        let mut responses = Vec::with_capacity(tool_requests.len());
        for req in tool_requests {
            let tool = lookup_tool(registry, &req.name).ok_or_else(|| tool_not_found(&req.name))?;
            log::debug!("model {} called tool {}", model.name(), req.name);
            let out = tool
                .run_json(req.input.unwrap_or(Value::Null), None, None)
                .await?;
            responses.push(Part::tool_response(req.name, Some(out.result), req.r#ref));
        }
        request.messages.push(message);
        request.messages.push(MessageData::tool(responses));
    }
}

/// Like [`generate`], returning only the response text.
pub async fn generate_text(
    registry: &Registry,
    model: &ModelAction,
    options: GenerateOptions,
) -> Result<String> {
    Ok(generate(registry, model, options).await?.text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::model::{define_model, FinishReason, ModelInfo, ModelInfoSupports};
    use crate::tool::define_tool;
    use serde_json::json;

    fn supports() -> ModelInfo {
        ModelInfo {
            label: "Scripted".into(),
            supports: ModelInfoSupports {
                multiturn: true,
                tools: true,
                system_role: true,
                ..Default::default()
            },
        }
    }

    /// Asks for the `double` tool until it sees a tool response, then
    /// answers with the tool output.
    fn scripted_model(registry: &Registry) -> ModelAction {
        define_model(registry, "test", "scripted", supports(), |req: GenerateRequest, _| async move {
            let last = req.messages.last().cloned().unwrap();
            let content = match last.role {
                Role::Tool => {
                    let out = last.content[0].tool_response.as_ref().unwrap().output.clone();
                    vec![Part::text(format!("result: {}", out.unwrap()))]
                }
                _ => vec![Part::tool_request("double", Some(json!(21)), Some("r1".into()))],
            };
            Ok(GenerateResponse {
                message: Some(MessageData::model(content)),
                finish_reason: FinishReason::Stop,
                ..Default::default()
            })
        })
        .unwrap()
    }

    #[tokio::test]
    async fn builds_the_request_from_options() {
        let registry = Registry::new();
        let req = GenerateOptions::new()
            .system("be brief")
            .messages(vec![MessageData::model(vec![Part::text("hi")])])
            .prompt("tell me a joke")
            .config(json!({"temperature": 0.5}))
            .to_request(&registry)
            .unwrap();
        let roles: Vec<Role> = req.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Model, Role::User]);
        assert_eq!(req.messages[2].text(), "tell me a joke");
        assert_eq!(req.config, Some(json!({"temperature": 0.5})));
    }

    #[tokio::test]
    async fn unknown_tools_are_rejected() {
        let registry = Registry::new();
        let err = GenerateOptions::new()
            .tools(["missing"])
            .to_request(&registry)
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn runs_requested_tools_and_calls_the_model_again() {
        let registry = Registry::new();
        define_tool(&registry, "double", "doubles a number", |n: i64, _| async move {
            Ok(n * 2)
        })
        .unwrap();
        let model = scripted_model(&registry);

        let text = generate_text(
            &registry,
            &model,
            GenerateOptions::new().prompt("double 21").tools(["double"]),
        )
        .await
        .unwrap();
        assert_eq!(text, "result: 42");
    }

    #[tokio::test]
    async fn can_return_tool_requests_instead() {
        let registry = Registry::new();
        define_tool(&registry, "double", "doubles a number", |n: i64, _| async move {
            Ok(n * 2)
        })
        .unwrap();
        let model = scripted_model(&registry);

        let resp = generate(
            &registry,
            &model,
            GenerateOptions::new()
                .prompt("double 21")
                .tools(["double"])
                .return_tool_requests(true),
        )
        .await
        .unwrap();
        let requests = resp.message.as_ref().unwrap().tool_requests().len();
        assert_eq!(requests, 1);
    }

    #[tokio::test]
    async fn stops_after_max_turns() {
        let registry = Registry::new();
        define_tool(&registry, "double", "doubles a number", |n: i64, _| async move {
            Ok(n * 2)
        })
        .unwrap();
        let model = define_model(&registry, "test", "loopy", supports(), |_, _| async move {
            Ok(GenerateResponse {
                message: Some(MessageData::model(vec![Part::tool_request(
                    "double",
                    Some(json!(1)),
                    None,
                )])),
                ..Default::default()
            })
        })
        .unwrap();

        let err = generate(
            &registry,
            &model,
            GenerateOptions::new().prompt("loop").tools(["double"]).max_turns(2),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::ResourceExhausted);
    }
}
