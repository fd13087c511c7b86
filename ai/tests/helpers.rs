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


//! Fake model plugins shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use genkit_ai::model::{define_model, ModelStreamingCallback};
use genkit_ai::{
    FinishReason, GenerateRequest, GenerateResponse, GenerateResponseChunk, MessageData,
    ModelInfo, ModelInfoSupports, Part, Role,
};
use genkit_core::error::Result;
use genkit_core::plugin::Plugin;
use genkit_core::registry::Registry;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

pub type ProgrammableModelHandler = Arc<
    dyn Fn(
            GenerateRequest,
            Option<ModelStreamingCallback>,
        ) -> Pin<Box<dyn Future<Output = Result<GenerateResponse>> + Send>>
        + Send
        + Sync,
>;

/// Defines `test/programmable`, whose behavior tests swap at runtime.
#[derive(Clone)]
pub struct ProgrammableModelPlugin {
    pub last_request: Arc<Mutex<Option<GenerateRequest>>>,
    handler: Arc<Mutex<ProgrammableModelHandler>>,
}

impl ProgrammableModelPlugin {
    pub fn new() -> Self {
        let empty: ProgrammableModelHandler =
            Arc::new(|_, _| Box::pin(async { Ok(GenerateResponse::default()) }));
        Self {
            last_request: Arc::new(Mutex::new(None)),
            handler: Arc::new(Mutex::new(empty)),
        }
    }

    pub fn respond_with(&self, handler: ProgrammableModelHandler) {
        *self.handler.lock().unwrap() = handler;
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Plugin for ProgrammableModelPlugin {
    fn name(&self) -> &str {
        "programmableModel"
    }

    async fn initialize(&self, registry: &Registry) -> Result<()> {
        let info = ModelInfo {
            label: "Programmable".into(),
            supports: ModelInfoSupports {
                multiturn: true,
                tools: true,
                system_role: true,
                ..Default::default()
            },
        };
        let last_request = self.last_request.clone();
        let handler = self.handler.clone();
        define_model(
            registry,
            "test",
            "programmable",
            info,
            move |req: GenerateRequest, cb: Option<ModelStreamingCallback>| {
                *last_request.lock().unwrap() = Some(req.clone());
                let handler = handler.lock().unwrap().clone();
                (*handler)(req, cb)
            },
        )?;
        Ok(())
    }
}

/// Defines `test/echo`: streams a `3, 2, 1` countdown, then answers with the
/// text of every message joined by commas and the request config.
pub struct EchoModelPlugin;

#[async_trait]
impl Plugin for EchoModelPlugin {
    fn name(&self) -> &str {
        "echoModel"
    }

    async fn initialize(&self, registry: &Registry) -> Result<()> {
        let info = ModelInfo {
            label: "Echo".into(),
            supports: ModelInfoSupports {
                multiturn: true,
                system_role: true,
                ..Default::default()
            },
        };
        define_model(
            registry,
            "test",
            "echo",
            info,
            |req: GenerateRequest, cb: Option<ModelStreamingCallback>| async move {
                if let Some(cb) = cb {
                    for i in (1..=3).rev() {
                        (*cb)(GenerateResponseChunk {
                            content: vec![Part::text(i.to_string())],
                            ..Default::default()
                        })?;
                    }
                }
                let echoed = req
                    .messages
                    .iter()
                    .map(|m| match m.role {
                        Role::System => format!("system: {}", m.text()),
                        _ => m.text(),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                let config = req
                    .config
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_default();
                Ok(GenerateResponse {
                    message: Some(MessageData::model(vec![
                        Part::text(format!("Echo: {}", echoed)),
                        Part::text(format!("; config: {}", config)),
                    ])),
                    finish_reason: FinishReason::Stop,
                    request: Some(req),
                    ..Default::default()
                })
            },
        )?;
        Ok(())
    }
}
