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


//! # Genkit AI
//!
//! Model, tool, prompt and retriever abstractions built on `genkit-core`
//! actions, plus [`generate`], which drives a model through tool calls.

pub mod document;
pub mod generate;
pub mod message;
pub mod model;
pub mod prompt;
pub mod retriever;
pub mod tool;

pub use document::{Document, Media, Part, ToolRequest, ToolResponse};
pub use generate::{generate, generate_text, GenerateOptions};
pub use message::{MessageData, Role};
pub use model::{
    define_model, is_defined_model, lookup_model, FinishReason, GenerateRequest, GenerateResponse,
    GenerateResponseChunk, GenerationCommonConfig, GenerationUsage, ModelAction, ModelInfo,
    ModelInfoSupports, ModelStreamingCallback, OutputConfig, OutputFormat,
};
pub use prompt::{define_prompt, lookup_prompt, PromptAction};
pub use retriever::{
    define_indexer, define_retriever, index, lookup_indexer, lookup_retriever, retrieve,
    IndexerAction, IndexerRequest, RetrieverAction, RetrieverRequest, RetrieverResponse,
};
pub use tool::{define_tool, ToolAction, ToolDefinition};
