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


//! # Genkit Ollama Plugin
//!
//! Runs models served by a local or remote [Ollama](https://ollama.com)
//! server. Initialize the plugin once per registry with [`init`], then
//! define each model you want to use:
//!
//! ```no_run
//! # async fn example() -> genkit_core::Result<()> {
//! use genkit_ollama::{init, Config, ModelDefinition};
//!
//! let registry = genkit_core::Registry::new();
//! let ollama = init(&registry, Config::new("http://127.0.0.1:11434")).await?;
//! let gemma = ollama.define_model(ModelDefinition::generate("gemma2"), None)?;
//! # let _ = gemma;
//! # Ok(())
//! # }
//! ```

pub mod model;
pub mod transport;
pub mod types;

pub use model::{ModelDefinition, MEDIA_SUPPORTED_MODELS};
pub use transport::{HttpResponse, ReqwestTransport, Transport};

use async_trait::async_trait;
use genkit_ai::model::{define_model, is_defined_model, lookup_model};
use genkit_ai::{ModelAction, ModelInfo, ModelInfoSupports};
use genkit_core::plugin::{init_plugin, Plugin};
use genkit_core::registry::{Registry, WeakRegistry};
use genkit_core::status::StatusCode;
use std::sync::Arc;
use thiserror::Error;

pub const PROVIDER: &str = "ollama";
pub const DEFAULT_SERVER_ADDRESS: &str = "http://127.0.0.1:11434";

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] genkit_core::Error),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse response JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to translate chunk: {0}")]
    Chunk(serde_json::Error),
    #[error("server returned non-200 status: {status}, body: {body}")]
    Status { status: u16, body: String },
    #[error("ollama: {0}")]
    Server(String),
    #[error("unknown content type")]
    UnknownContent,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for genkit_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(e) => e,
            Error::UnknownContent => genkit_core::Error::new_user_facing(
                StatusCode::InvalidArgument,
                "unknown content type",
                None,
            ),
            other => {
                let message = other.to_string();
                genkit_core::Error::with_source(message, other)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Ollama server, without a trailing slash.
    pub server_address: String,
}

impl Config {
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_ADDRESS)
    }
}

/// An initialized Ollama plugin bound to one registry.
#[derive(Clone)]
pub struct Ollama {
    registry: WeakRegistry,
    server_address: String,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Ollama {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ollama")
            .field("server_address", &self.server_address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Plugin for Ollama {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn initialize(&self, _registry: &Registry) -> genkit_core::Result<()> {
        log::debug!("ollama: using server at {}", self.server_address);
        Ok(())
    }
}

/// Initializes the plugin on `registry`, talking to the server over HTTP.
pub async fn init(registry: &Registry, config: Config) -> genkit_core::Result<Ollama> {
    let transport = ReqwestTransport::new()?;
    init_with_transport(registry, config, Arc::new(transport)).await
}

/// Like [`init`], with a caller supplied [`Transport`].
pub async fn init_with_transport(
    registry: &Registry,
    config: Config,
    transport: Arc<dyn Transport>,
) -> genkit_core::Result<Ollama> {
    if config.server_address.is_empty() {
        return Err(genkit_core::Error::new_user_facing(
            StatusCode::InvalidArgument,
            "ollama: need ServerAddress",
            None,
        ));
    }
    let ollama = Ollama {
        registry: registry.downgrade(),
        server_address: config.server_address.trim_end_matches('/').to_string(),
        transport,
    };
    init_plugin(registry, Arc::new(ollama.clone())).await?;
    Ok(ollama)
}

impl Ollama {
    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    fn registry(&self) -> genkit_core::Result<Registry> {
        self.registry.upgrade().ok_or_else(|| {
            genkit_core::Error::new_user_facing(
                StatusCode::FailedPrecondition,
                "ollama: the registry was dropped",
                None,
            )
        })
    }

    /// Defines `ollama/{name}`. Without `supports`, the model is assumed to
    /// handle multi-turn conversations and system prompts, and media only
    /// when it is known to.
    pub fn define_model(
        &self,
        definition: ModelDefinition,
        supports: Option<ModelInfoSupports>,
    ) -> genkit_core::Result<ModelAction> {
        let info = ModelInfo {
            label: format!("Ollama - {}", definition.name),
            supports: supports.unwrap_or_else(|| model::default_supports(&definition.name)),
        };
        let name = definition.name.clone();
        let transport = self.transport.clone();
        let server_address = self.server_address.clone();
        let definition = Arc::new(definition);

        define_model(&self.registry()?, PROVIDER, &name, info, move |request, callback| {
            let transport = transport.clone();
            let server_address = server_address.clone();
            let definition = definition.clone();
            async move {
                model::generate(
                    transport.as_ref(),
                    &server_address,
                    &definition,
                    request,
                    callback,
                )
                .await
                .map_err(genkit_core::Error::from)
            }
        })
    }

    /// The model defined as `ollama/{name}`, if any.
    pub fn model(&self, name: &str) -> Option<ModelAction> {
        lookup_model(&self.registry.upgrade()?, PROVIDER, name)
    }

    pub fn is_defined_model(&self, name: &str) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| is_defined_model(&registry, PROVIDER, name))
    }
}
