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


//! # Genkit
//!
//! The public entry point. Re-exports the building blocks from `genkit-core`
//! and `genkit-ai` and adds [`Genkit`], which owns a registry and the plugins
//! initialized on it.
//!
//! ```no_run
//! use genkit::{Genkit, GenkitOptions};
//!
//! # async fn example() -> genkit::Result<()> {
//! let genkit = Genkit::init(GenkitOptions::default()).await?;
//! genkit.define_flow("hello", |name: String, _| async move {
//!     Ok(format!("Hello, {}!", name))
//! })?;
//! let server = genkit.start_server(None).await?;
//! # server.stop().await
//! # }
//! ```

mod genkit;

pub use self::genkit::{Genkit, GenkitOptions};

pub use genkit_ai::{
    define_indexer, define_model, define_prompt, define_retriever, define_tool, generate,
    generate_text, index, is_defined_model, lookup_indexer, lookup_model, lookup_prompt,
    lookup_retriever, retrieve, Document, FinishReason, GenerateOptions, GenerateRequest,
    GenerateResponse, GenerateResponseChunk, GenerationCommonConfig, GenerationUsage,
    IndexerAction, IndexerRequest, Media, MessageData, ModelAction, ModelInfo, ModelInfoSupports,
    ModelStreamingCallback, OutputConfig, OutputFormat, Part, PromptAction, RetrieverAction,
    RetrieverRequest, RetrieverResponse, Role, ToolAction, ToolDefinition, ToolRequest,
    ToolResponse,
};
pub use genkit_core::{
    define_flow, define_flow_with_options, define_streaming_flow, get_flow_context, init_plugin,
    run, Action, ActionContext, ActionFnArg, ActionRunOptions, ActionType, ApiKeyAuth, ApiKeyPolicy,
    ErasedAction, Error, Flow, FlowAuth, FlowContext, FlowOptions, Plugin, Registry, Result, ServerHandle, ServerMode,
    ServerOptions, Status, StatusCode, StreamingCallback, TelemetryConfig,
};

/// Logging setup.
pub use genkit_core::logging;
