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


//! # Telemetry configuration

use crate::tracing::exporter::LocalTraceStore;
use opentelemetry_sdk::trace::Sampler;

/// How [`enable_telemetry`](crate::tracing::enable_telemetry) sets up the
/// global tracer provider.
#[derive(Debug, Default)]
pub struct TelemetryConfig {
    /// Export finished traces to this Genkit telemetry server. Falls back to
    /// `GENKIT_TELEMETRY_SERVER`; the URL may also arrive later through the
    /// reflection API's `/api/notify`.
    pub telemetry_server_url: Option<String>,
    /// Keep traces in memory as well, e.g. for the reflection API.
    pub local_store: Option<LocalTraceStore>,
    pub sampler: Option<Sampler>,
}

impl TelemetryConfig {
    /// Export to the telemetry server and keep a local copy in `store`.
    pub fn dev(store: LocalTraceStore) -> Self {
        Self {
            local_store: Some(store),
            ..Default::default()
        }
    }
}
