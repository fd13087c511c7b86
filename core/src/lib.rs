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


//! # Genkit Core
//!
//! The primitives the rest of Genkit is built on: typed, traced [`Action`]s,
//! the [`Registry`] that stores them, [`Flow`]s and their steps, plugin
//! initialization and the HTTP servers that expose a registry.

pub mod action;
pub mod async_utils;
pub mod context;
pub mod error;
pub mod flow;
pub mod logging;
pub mod plugin;
pub mod reflection;
pub mod registry;
pub mod schema;
pub mod server;
pub mod status;
pub mod telemetry;
pub mod tracing;
pub mod utils;

pub use action::{
    Action, ActionBuilder, ActionFn, ActionFnArg, ActionMetadata, ActionResult, ActionRunOptions,
    StreamingCallback, StreamingResponse, TelemetryInfo,
};
pub use context::{
    get_flow_context, ActionContext, ApiKeyAuth, ApiKeyPolicy, FlowAuth, FlowContext,
};
pub use error::{Error, Result};
pub use flow::{define_flow, define_flow_with_options, define_streaming_flow, run, Flow, FlowOptions};
pub use plugin::{init_plugin, Plugin};
pub use registry::{ActionType, ErasedAction, Registry, WeakRegistry};
pub use server::{ServerHandle, ServerMode, ServerOptions};
pub use status::{Status, StatusCode};
pub use telemetry::TelemetryConfig;
