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


//! # Tracing
//!
//! Every action run, flow and flow step is recorded as an OpenTelemetry span.
//! Spans go nowhere until [`enable_telemetry`] installs a tracer provider.

pub mod exporter;
pub mod instrumentation;
pub mod types;

pub use self::instrumentation::{current_path, in_new_span, set_custom_metadata_attr};
pub use self::types::SpanMetadata;

use crate::error::{Error, Result};
use crate::telemetry::TelemetryConfig;
use exporter::{set_telemetry_server_url, TraceServerExporter};
use once_cell::sync::OnceCell;
use opentelemetry_sdk::trace::SdkTracerProvider;

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Identifiers of the span a piece of work runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

/// Installs the global tracer provider. Only the first call has an effect.
///
/// Must be called from within a tokio runtime when traces are exported to a
/// telemetry server.
pub fn enable_telemetry(config: TelemetryConfig) -> Result<()> {
    TRACER_PROVIDER.get_or_try_init(|| {
        if let Some(url) = &config.telemetry_server_url {
            set_telemetry_server_url(url.clone());
        }
        let mut builder =
            SdkTracerProvider::builder().with_batch_exporter(TraceServerExporter::new());
        if let Some(store) = config.local_store {
            builder = builder.with_simple_exporter(store);
        }
        if let Some(sampler) = config.sampler {
            builder = builder.with_sampler(sampler);
        }
        let provider = builder.build();
        opentelemetry::global::set_tracer_provider(provider.clone());
        log::debug!("telemetry enabled");
        Ok::<_, Error>(provider)
    })?;
    Ok(())
}

/// Flushes and shuts down the tracer provider installed by [`enable_telemetry`].
pub fn flush_tracing() -> Result<()> {
    match TRACER_PROVIDER.get() {
        Some(provider) => provider
            .shutdown()
            .map_err(|e| Error::new_internal(format!("failed to flush traces: {}", e))),
        None => Ok(()),
    }
}
