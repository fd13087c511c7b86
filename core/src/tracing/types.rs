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


//! # Trace data types
//!
//! The JSON shapes the Genkit tooling expects for traces: what the reflection
//! API returns and what is posted to the telemetry server.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SpanState {
    Success,
    Error,
}

impl SpanState {
    pub fn as_str(self) -> &'static str {
        match self {
            SpanState::Success => "success",
            SpanState::Error => "error",
        }
    }
}

/// What a span describes. Turned into `genkit:*` attributes when the span
/// is opened.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpanMetadata {
    pub name: String,
    /// `flow`, `flowStep`, `action`, `model`, ...
    #[serde(rename = "type")]
    pub span_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub metadata: HashMap<String, String>,
}

impl SpanMetadata {
    pub fn new(name: impl Into<String>, span_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span_type: span_type.into(),
            ..Default::default()
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SpanStatus {
    /// 0 = ok, 2 = error.
    pub code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Annotation {
    pub attributes: HashMap<String, Value>,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TimeEvent {
    pub time: u64,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeEvents {
    pub time_event: Vec<TimeEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationLibrary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpanData {
    pub span_id: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// Milliseconds since the epoch.
    pub start_time: u64,
    pub end_time: u64,
    pub attributes: HashMap<String, Value>,
    pub display_name: String,
    pub instrumentation_library: InstrumentationLibrary,
    pub span_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_events: Option<TimeEvents>,
}

impl SpanData {
    /// Reads a `genkit:{name}` attribute as a string.
    pub fn genkit_attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(&format!("genkit:{}", name))
            .and_then(Value::as_str)
    }
}

/// All spans of one trace, keyed by span id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TraceData {
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    pub spans: HashMap<String, SpanData>,
}
