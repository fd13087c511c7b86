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


//! # Genkit Dotprompt
//!
//! Prompts written as Handlebars templates, bound to a model, its config and
//! the shape of their input and output. A prompt renders its variables into a
//! [`GenerateRequest`](genkit_ai::GenerateRequest) and can call the model
//! directly with [`Prompt::generate`].
//!
//! Templates may use `{{role "system"}}` to start a message with another role,
//! `{{media url=... contentType=...}}` to attach media and `{{json value}}` to
//! embed JSON.

pub mod generate;
pub mod prompt;
mod render;

pub use generate::PromptRequest;
pub use prompt::{build_variables, define, Config, Prompt};

use genkit_core::status::StatusCode;
use thiserror::Error;

/// Provider under which prompts are registered.
pub const PROVIDER: &str = "dotprompt";

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] genkit_core::Error),
    #[error("dotprompt: template error: {0}")]
    Template(#[from] handlebars::TemplateError),
    #[error("dotprompt: render error: {0}")]
    Render(#[from] handlebars::RenderError),
    #[error("dotprompt: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dotprompt: fields not a struct or pointer to a struct or a map")]
    Variables,
    #[error("dotprompt: unknown role {0:?}")]
    UnknownRole(String),
    #[error("dotprompt: tool {0:?} not found")]
    ToolNotFound(String),
    #[error("attempt to register unnamed prompt")]
    UnnamedPrompt,
    #[error("dotprompt execution: model not specified")]
    ModelNotSpecified,
    #[error("dotprompt model not in provider/name format")]
    ModelNameFormat,
    #[error("no model named {name:?} for provider {provider:?}")]
    ModelNotFound { provider: String, name: String },
    #[error("dotprompt: the registry was dropped")]
    RegistryDropped,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for genkit_core::Error {
    fn from(e: Error) -> Self {
        let code = match e {
            Error::Core(inner) => return inner,
            Error::ToolNotFound(_) | Error::ModelNotFound { .. } => StatusCode::NotFound,
            Error::UnnamedPrompt | Error::ModelNotSpecified | Error::RegistryDropped => {
                StatusCode::FailedPrecondition
            }
            _ => StatusCode::InvalidArgument,
        };
        genkit_core::Error::new_user_facing(code, e.to_string(), None)
    }
}
