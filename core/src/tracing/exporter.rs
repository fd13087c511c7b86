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


//! # Span exporters
//!
//! Two `SpanExporter`s turn OpenTelemetry spans into Genkit [`TraceData`]:
//! [`TraceServerExporter`] posts them to the telemetry server and
//! [`LocalTraceStore`] keeps them in memory for the reflection API.

use super::types::{
    Annotation, InstrumentationLibrary, SpanData, SpanStatus, TimeEvent, TimeEvents, TraceData,
};
use once_cell::sync::Lazy;
use opentelemetry::trace::{SpanId, SpanKind, Status as OtelStatus};
use opentelemetry::KeyValue;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{SpanData as OtelSpanData, SpanExporter};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

static TELEMETRY_SERVER_URL: Lazy<Mutex<Option<String>>> =
    Lazy::new(|| Mutex::new(crate::utils::telemetry_server_from_env()));

/// Sets the telemetry server that [`TraceServerExporter`] posts to.
pub fn set_telemetry_server_url(url: impl Into<String>) {
    *TELEMETRY_SERVER_URL
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(url.into());
}

pub fn telemetry_server_url() -> Option<String> {
    TELEMETRY_SERVER_URL
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn millis(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn attr_value(value: &opentelemetry::Value) -> Value {
    match value {
        opentelemetry::Value::Bool(b) => Value::Bool(*b),
        opentelemetry::Value::I64(i) => Value::from(*i),
        opentelemetry::Value::F64(f) => Value::from(*f),
        opentelemetry::Value::String(s) => Value::String(s.as_str().to_string()),
        other => Value::String(other.to_string()),
    }
}

fn attributes(kvs: &[KeyValue]) -> HashMap<String, Value> {
    kvs.iter()
        .map(|kv| (kv.key.to_string(), attr_value(&kv.value)))
        .collect()
}

fn span_kind(kind: &SpanKind) -> &'static str {
    match kind {
        SpanKind::Client => "CLIENT",
        SpanKind::Server => "SERVER",
        SpanKind::Producer => "PRODUCER",
        SpanKind::Consumer => "CONSUMER",
        SpanKind::Internal => "INTERNAL",
    }
}

fn is_root(span: &OtelSpanData) -> bool {
    span.parent_span_id == SpanId::INVALID
}

/// Converts one OpenTelemetry span into the Genkit shape.
pub fn convert_span(span: &OtelSpanData) -> SpanData {
    SpanData {
        span_id: span.span_context.span_id().to_string(),
        trace_id: span.span_context.trace_id().to_string(),
        parent_span_id: (!is_root(span)).then(|| span.parent_span_id.to_string()),
        start_time: millis(span.start_time),
        end_time: millis(span.end_time),
        attributes: attributes(&span.attributes),
        display_name: span.name.to_string(),
        instrumentation_library: InstrumentationLibrary {
            name: span.instrumentation_scope.name().to_string(),
            version: span.instrumentation_scope.version().map(str::to_string),
        },
        span_kind: span_kind(&span.span_kind).to_string(),
        status: match &span.status {
            OtelStatus::Ok => Some(SpanStatus {
                code: 0,
                message: None,
            }),
            OtelStatus::Error { description } => Some(SpanStatus {
                code: 2,
                message: Some(description.to_string()),
            }),
            OtelStatus::Unset => None,
        },
        time_events: Some(TimeEvents {
            time_event: span
                .events
                .iter()
                .map(|event| TimeEvent {
                    time: millis(event.timestamp),
                    annotation: Annotation {
                        description: event.name.to_string(),
                        attributes: attributes(&event.attributes),
                    },
                })
                .collect(),
        }),
    }
}

/// Groups a batch by trace id, merging into `existing` traces when given.
fn merge_batch(traces: &mut HashMap<String, TraceData>, batch: &[OtelSpanData]) {
    for span in batch {
        let trace_id = span.span_context.trace_id().to_string();
        let trace = traces.entry(trace_id.clone()).or_insert_with(|| TraceData {
            trace_id,
            ..Default::default()
        });
        if is_root(span) {
            trace.display_name = Some(span.name.to_string());
            trace.start_time = Some(millis(span.start_time));
            trace.end_time = Some(millis(span.end_time));
        }
        trace
            .spans
            .insert(span.span_context.span_id().to_string(), convert_span(span));
    }
}

/// Posts finished traces to `{telemetry_server_url}/api/traces`.
///
/// Export is a no-op until a server URL is known, either from
/// `GENKIT_TELEMETRY_SERVER` or from [`set_telemetry_server_url`].
#[derive(Debug, Clone)]
pub struct TraceServerExporter {
    client: reqwest::Client,
    runtime: Option<tokio::runtime::Handle>,
}

impl Default for TraceServerExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceServerExporter {
    /// Captures the current tokio runtime; batch processors export from their
    /// own thread and the HTTP client needs a reactor.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            runtime: tokio::runtime::Handle::try_current().ok(),
        }
    }

    async fn save(client: reqwest::Client, url: String, trace: TraceData) -> reqwest::Result<()> {
        client
            .post(format!("{}/api/traces", url))
            .json(&trace)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl SpanExporter for TraceServerExporter {
    fn export(&self, batch: Vec<OtelSpanData>) -> impl Future<Output = OTelSdkResult> + Send {
        let client = self.client.clone();
        let runtime = self.runtime.clone();
        async move {
            let Some(url) = telemetry_server_url() else {
                return Ok(());
            };
            let Some(runtime) = runtime else {
                return Err(OTelSdkError::InternalFailure(
                    "trace export needs a tokio runtime".to_string(),
                ));
            };
            let mut traces = HashMap::new();
            merge_batch(&mut traces, &batch);

            let task = runtime.spawn(async move {
                let saves = traces
                    .into_values()
                    .map(|trace| Self::save(client.clone(), url.clone(), trace));
                futures::future::join_all(saves).await
            });
            let results = task
                .await
                .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?;
            if let Some(Err(e)) = results.into_iter().find(Result::is_err) {
                log::warn!("failed to export traces: {}", e);
                return Err(OTelSdkError::InternalFailure(e.to_string()));
            }
            Ok(())
        }
    }
}

/// An in-memory trace store, served by the reflection API.
#[derive(Debug, Clone, Default)]
pub struct LocalTraceStore {
    traces: Arc<Mutex<HashMap<String, TraceData>>>,
}

impl LocalTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, trace_id: &str) -> Option<TraceData> {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(trace_id)
            .cloned()
    }

    /// Up to `limit` traces, most recently started first.
    pub fn list(&self, limit: usize) -> Vec<TraceData> {
        let mut traces: Vec<TraceData> = self
            .traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        traces.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        traces.truncate(limit);
        traces
    }

    /// Stores an already converted trace, merging spans with any it already has.
    pub fn save(&self, trace: TraceData) {
        let mut traces = self.traces.lock().unwrap_or_else(PoisonError::into_inner);
        match traces.get_mut(&trace.trace_id) {
            Some(existing) => {
                existing.spans.extend(trace.spans);
                if trace.display_name.is_some() {
                    existing.display_name = trace.display_name;
                    existing.start_time = trace.start_time;
                    existing.end_time = trace.end_time;
                }
            }
            None => {
                traces.insert(trace.trace_id.clone(), trace);
            }
        }
    }
}

impl SpanExporter for LocalTraceStore {
    fn export(&self, batch: Vec<OtelSpanData>) -> impl Future<Output = OTelSdkResult> + Send {
        let mut traces = self.traces.lock().unwrap_or_else(PoisonError::into_inner);
        merge_batch(&mut traces, &batch);
        std::future::ready(Ok(()))
    }
}
