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


//! Running a prompt against a model.

use crate::prompt::Prompt;
use crate::{Error, Result};
use genkit_ai::model::lookup_model;
use genkit_ai::{
    Document, GenerateResponse, GenerationCommonConfig, ModelAction, ModelStreamingCallback,
};
use genkit_core::tracing::set_custom_metadata_attr;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request to render a prompt and pass the result to a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    /// Template variables; an object or `null`.
    #[serde(default)]
    pub variables: Value,
    /// Overrides the prompt's candidate count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<u32>,
    /// Replaces the prompt's generation config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<GenerationCommonConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Document>,
    /// A `provider/name` model reference overriding the prompt's model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl PromptRequest {
    pub fn new(variables: &impl Serialize) -> Result<Self> {
        Ok(Self {
            variables: serde_json::to_value(variables)?,
            ..Default::default()
        })
    }
}

impl Prompt {
    fn resolve_model(&self, requested: Option<&str>) -> Result<ModelAction> {
        if let Some(model) = &self.config().model {
            return Ok(model.clone());
        }
        let name = requested
            .filter(|name| !name.is_empty())
            .or(self.config().model_name.as_deref())
            .filter(|name| !name.is_empty())
            .ok_or(Error::ModelNotSpecified)?;
        let (provider, name) = name.split_once('/').ok_or(Error::ModelNameFormat)?;
        lookup_model(&self.registry()?, provider, name).ok_or_else(|| Error::ModelNotFound {
            provider: provider.to_string(),
            name: name.to_string(),
        })
    }

    /// Renders the prompt with `request.variables` and calls the model,
    /// streaming chunks to `callback` when given.
    pub async fn generate(
        &self,
        request: PromptRequest,
        callback: Option<ModelStreamingCallback>,
    ) -> Result<GenerateResponse> {
        set_custom_metadata_attr("subtype", "prompt");

        let mut model_request = match self.action() {
            Some(action) => action.render(request.variables).await?,
            None => self.build_request(&request.variables)?,
        };
        if let Some(config) = request.config {
            model_request.config = Some(serde_json::to_value(config)?);
        }
        if !request.context.is_empty() {
            model_request.context = request.context;
        }
        if request.candidates.is_some() {
            model_request.candidates = request.candidates;
        }

        let model = self.resolve_model(request.model.as_deref())?;
        Ok(model.generate(model_request, callback).await?)
    }
}
