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


//! # Span instrumentation
//!
//! [`in_new_span`] opens an OpenTelemetry span for a unit of work, makes it the
//! parent of every span opened inside that work, and records the Genkit
//! attributes (`genkit:name`, `genkit:type`, `genkit:path`, ...) the tooling
//! uses to rebuild flow hierarchies.
//!
//! The active span and its path are carried in a tokio task-local rather
//! than OpenTelemetry's thread-local current context, so they survive
//! `.await` points on multi-threaded runtimes.

use super::types::{SpanMetadata, SpanState};
use super::TraceContext;
use crate::action::TelemetryInfo;
use crate::error::Result;
use opentelemetry::trace::{Status, TraceContextExt, Tracer};
use opentelemetry::{global, Context, KeyValue};
use serde::Serialize;
use std::future::Future;

pub const ATTR_PREFIX: &str = "genkit";
pub const SPAN_TYPE_ATTR: &str = "genkit:type";
const TRACER_NAME: &str = "genkit-tracer";

#[derive(Clone)]
struct ActiveSpan {
    cx: Context,
    path: String,
}

tokio::task_local! {
    static ACTIVE_SPAN: ActiveSpan;
}

fn attr(name: &str) -> String {
    format!("{}:{}", ATTR_PREFIX, name)
}

/// Runs `f` inside a new span described by `meta`.
///
/// On success the serialized output is recorded as `genkit:output`; on
/// failure the error is recorded and returned unchanged.
pub async fn in_new_span<F, Fut, T>(meta: SpanMetadata, f: F) -> Result<(T, TelemetryInfo)>
where
    F: FnOnce(TraceContext) -> Fut,
    Fut: Future<Output = Result<T>>,
    T: Serialize,
{
    let parent = ACTIVE_SPAN.try_with(Clone::clone).ok();
    let is_root = parent.is_none();
    let (parent_cx, parent_path) = match parent {
        Some(active) => (active.cx, active.path),
        None => (Context::new(), String::new()),
    };
    let path = format!("{}/{{{},t:{}}}", parent_path, meta.name, meta.span_type);

    let span = global::tracer(TRACER_NAME).start_with_context(meta.name.clone(), &parent_cx);
    let cx = parent_cx.with_span(span);

    let trace = {
        let span = cx.span();
        let span_context = span.span_context();
        let trace = TraceContext {
            trace_id: span_context.trace_id().to_string(),
            span_id: span_context.span_id().to_string(),
        };
        let mut attributes = vec![
            KeyValue::new(attr("name"), meta.name.clone()),
            KeyValue::new(SPAN_TYPE_ATTR, meta.span_type.clone()),
            KeyValue::new(attr("path"), path.clone()),
        ];
        if is_root {
            attributes.push(KeyValue::new(attr("isRoot"), true));
        }
        if let Some(subtype) = &meta.subtype {
            attributes.push(KeyValue::new(attr("metadata:subtype"), subtype.clone()));
        }
        if let Some(input) = &meta.input {
            attributes.push(KeyValue::new(attr("input"), input.to_string()));
        }
        for (key, value) in &meta.metadata {
            attributes.push(KeyValue::new(attr(&format!("metadata:{}", key)), value.clone()));
        }
        span.set_attributes(attributes);
        trace
    };

    let telemetry = TelemetryInfo {
        trace_id: trace.trace_id.clone(),
        span_id: trace.span_id.clone(),
    };
    let active = ActiveSpan {
        cx: cx.clone(),
        path,
    };
    let result = ACTIVE_SPAN.scope(active, f(trace)).await;

    let span = cx.span();
    match &result {
        Ok(output) => {
            if let Ok(json) = serde_json::to_string(output) {
                span.set_attribute(KeyValue::new(attr("output"), json));
            }
            span.set_attribute(KeyValue::new(attr("state"), SpanState::Success.as_str()));
            span.set_status(Status::Ok);
        }
        Err(e) => {
            span.set_attribute(KeyValue::new(attr("state"), SpanState::Error.as_str()));
            span.set_status(Status::error(e.to_string()));
            span.record_error(e);
        }
    }
    span.end();

    result.map(|output| (output, telemetry))
}

/// Sets `genkit:metadata:{key}` on the innermost active span. Returns false
/// when called outside any span.
pub fn set_custom_metadata_attr(key: &str, value: impl Into<String>) -> bool {
    let value = value.into();
    ACTIVE_SPAN
        .try_with(|active| {
            active.cx.span().set_attribute(KeyValue::new(
                attr(&format!("metadata:{}", key)),
                value,
            ))
        })
        .is_ok()
}

/// The `genkit:path` of the innermost active span.
pub fn current_path() -> Option<String> {
    ACTIVE_SPAN.try_with(|active| active.path.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn nested_spans_extend_the_path() {
        let ((outer, inner), _) = in_new_span(SpanMetadata::new("parent", "flow"), |_| async {
            let outer = current_path();
            let (inner, _) = in_new_span(SpanMetadata::new("call-llm", "flowStep"), |_| async {
                Ok(current_path())
            })
            .await?;
            Ok((outer, inner))
        })
        .await
        .unwrap();

        assert_eq!(outer.as_deref(), Some("/{parent,t:flow}"));
        assert_eq!(
            inner.as_deref(),
            Some("/{parent,t:flow}/{call-llm,t:flowStep}")
        );
        assert_eq!(current_path(), None);
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let err = in_new_span(SpanMetadata::new("throwy", "flow"), |_| async {
            Err::<(), _>(Error::new_internal("boom"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn custom_metadata_outside_span_is_ignored() {
        assert!(!set_custom_metadata_attr("subtype", "prompt"));
    }
}
