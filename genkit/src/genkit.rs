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


//! The [`Genkit`] handle: one registry plus the plugins initialized on it.

use genkit_ai::model::{define_model, lookup_model, ModelStreamingCallback};
use genkit_ai::tool::define_tool;
use genkit_ai::{
    generate, GenerateOptions, GenerateRequest, GenerateResponse, ModelAction, ModelInfo,
    ToolAction,
};
use genkit_core::action::ActionFnArg;
use genkit_core::context::ActionContext;
use genkit_core::error::{Error, Result};
use genkit_core::flow::{self, Flow, FlowOptions};
use genkit_core::plugin::{init_plugin, Plugin};
use genkit_core::registry::Registry;
use genkit_core::server::{self, ServerHandle, ServerOptions};
use genkit_core::status::StatusCode;
use genkit_core::telemetry::TelemetryConfig;
use genkit_core::tracing::enable_telemetry;
use genkit_core::tracing::exporter::LocalTraceStore;
use genkit_core::utils::is_dev_env;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

#[derive(Default)]
pub struct GenkitOptions {
    /// Initialized in order by [`Genkit::init`].
    pub plugins: Vec<Arc<dyn Plugin>>,
    /// `provider/name` of the model used when none is given.
    pub default_model: Option<String>,
}

#[derive(Clone)]
pub struct Genkit {
    registry: Registry,
}

impl Genkit {
    /// Creates a registry and initializes every plugin on it.
    pub async fn init(options: GenkitOptions) -> Result<Self> {
        let registry = Registry::new();
        for plugin in options.plugins {
            init_plugin(&registry, plugin).await?;
        }
        if let Some(model) = options.default_model {
            registry.set_default_model(model);
        }
        Ok(Self { registry })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn define_flow<I, O, F, Fut>(&self, name: &str, func: F) -> Result<Flow<I, O>>
    where
        I: Serialize + DeserializeOwned + JsonSchema + Send + 'static,
        O: Serialize + JsonSchema + Send + 'static,
        F: Fn(I, ActionFnArg<()>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send,
    {
        flow::define_flow(&self.registry, name, func)
    }

    pub fn define_streaming_flow<I, O, S, F, Fut>(&self, name: &str, func: F) -> Result<Flow<I, O, S>>
    where
        I: Serialize + DeserializeOwned + JsonSchema + Send + 'static,
        O: Serialize + JsonSchema + Send + 'static,
        S: Serialize + JsonSchema + Send + 'static,
        F: Fn(I, ActionFnArg<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send,
    {
        flow::define_streaming_flow(&self.registry, name, func)
    }

    pub fn define_flow_with_options<I, O, S, F, Fut>(
        &self,
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
        flow::define_flow_with_options(&self.registry, name, options, func)
    }

    /// Runs `func` as a traced step of the enclosing flow.
    pub async fn run<O, F, Fut>(&self, name: &str, func: F) -> Result<O>
    where
        O: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<O>>,
    {
        flow::run(name, func).await
    }

    pub fn define_model<F, Fut>(
        &self,
        provider: &str,
        name: &str,
        info: ModelInfo,
        func: F,
    ) -> Result<ModelAction>
    where
        F: Fn(GenerateRequest, Option<ModelStreamingCallback>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GenerateResponse>> + Send,
    {
        define_model(&self.registry, provider, name, info, func)
    }

    pub fn define_tool<I, O, F, Fut>(
        &self,
        name: &str,
        description: &str,
        func: F,
    ) -> Result<ToolAction<I, O>>
    where
        I: JsonSchema + Serialize + DeserializeOwned + Send + 'static,
        O: JsonSchema + Serialize + Send + 'static,
        F: Fn(I, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send,
    {
        define_tool(&self.registry, name, description, func)
    }

    /// Looks a model up by its `provider/name` reference.
    pub fn model(&self, reference: &str) -> Result<ModelAction> {
        let (provider, name) = reference.split_once('/').ok_or_else(|| {
            Error::new_user_facing(
                StatusCode::InvalidArgument,
                format!("model {:?} is not in provider/name format", reference),
                None,
            )
        })?;
        lookup_model(&self.registry, provider, name).ok_or_else(|| {
            Error::new_user_facing(
                StatusCode::NotFound,
                format!("no model named {:?} for provider {:?}", name, provider),
                None,
            )
        })
    }

    fn default_model(&self) -> Result<ModelAction> {
        let reference = self.registry.default_model().ok_or_else(|| {
            Error::new_user_facing(
                StatusCode::FailedPrecondition,
                "no model given and no default model configured",
                None,
            )
        })?;
        self.model(&reference)
    }

    /// Generates with `model`, or the default model when `None`.
    pub async fn generate(
        &self,
        model: Option<&ModelAction>,
        options: GenerateOptions,
    ) -> Result<GenerateResponse> {
        match model {
            Some(model) => generate(&self.registry, model, options).await,
            None => generate(&self.registry, &self.default_model()?, options).await,
        }
    }

    pub async fn generate_text(
        &self,
        model: Option<&ModelAction>,
        options: GenerateOptions,
    ) -> Result<String> {
        Ok(self.generate(model, options).await?.text())
    }

    /// Serves this instance's actions over HTTP.
    ///
    /// Without explicit options, a development environment (`GENKIT_ENV=dev`)
    /// gets the reflection API on port 3100 with traces kept in memory;
    /// anywhere else the flows are served on port 3400.
    pub async fn start_server(&self, options: Option<ServerOptions>) -> Result<ServerHandle> {
        let options = match options {
            Some(options) => options,
            None if is_dev_env() => {
                let store = LocalTraceStore::new();
                enable_telemetry(TelemetryConfig::dev(store.clone()))?;
                ServerOptions::reflection(Some(store))
            }
            None => ServerOptions::flows(),
        };
        log::info!("starting {:?} server", options.mode);
        server::start(self.registry.clone(), options).await
    }
}
