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


mod helpers;

use genkit_ai::{
    define_tool, generate, generate_text, lookup_model, GenerateOptions, GenerateResponse,
    GenerateResponseChunk, MessageData, ModelStreamingCallback, Part, Role,
};
use genkit_core::error::Error;
use genkit_core::plugin::init_plugin;
use genkit_core::registry::Registry;
use genkit_core::status::StatusCode;
use helpers::{EchoModelPlugin, ProgrammableModelPlugin};
use serde_json::json;
use std::sync::{Arc, Mutex};

async fn echo_registry() -> Registry {
    let registry = Registry::new();
    init_plugin(&registry, Arc::new(EchoModelPlugin)).await.unwrap();
    registry
}

#[tokio::test]
async fn echoes_system_prompt_and_config() {
    let registry = echo_registry().await;
    let model = lookup_model(&registry, "test", "echo").unwrap();

    let text = generate_text(
        &registry,
        &model,
        GenerateOptions::new()
            .system("talk like a pirate")
            .prompt("hi")
            .config(json!({"temperature": 11})),
    )
    .await
    .unwrap();
    assert_eq!(
        text,
        "Echo: system: talk like a pirate,hi; config: {\"temperature\":11}"
    );
}

#[tokio::test]
async fn streams_chunks_before_the_final_response() {
    let registry = echo_registry().await;
    let model = lookup_model(&registry, "test", "echo").unwrap();
    let chunks = Arc::new(Mutex::new(Vec::new()));
    let sink = chunks.clone();
    let on_chunk: ModelStreamingCallback = Arc::new(move |chunk: GenerateResponseChunk| {
        sink.lock().unwrap().push(chunk.text());
        Ok(())
    });

    let resp = generate(
        &registry,
        &model,
        GenerateOptions::new().prompt("count").on_chunk(on_chunk),
    )
    .await
    .unwrap();
    assert_eq!(*chunks.lock().unwrap(), vec!["3", "2", "1"]);
    assert!(resp.text().starts_with("Echo: count"));
}

#[tokio::test]
async fn callback_errors_abort_generation() {
    let registry = echo_registry().await;
    let model = lookup_model(&registry, "test", "echo").unwrap();
    let on_chunk: ModelStreamingCallback = Arc::new(|_| {
        Err(Error::new_user_facing(
            StatusCode::Cancelled,
            "client went away",
            None,
        ))
    });

    let err = generate(
        &registry,
        &model,
        GenerateOptions::new().prompt("count").on_chunk(on_chunk),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::Cancelled);
}

#[tokio::test]
async fn unsupported_tools_are_rejected() {
    let registry = echo_registry().await;
    define_tool(&registry, "noop", "does nothing", |_: (), _| async { Ok(()) }).unwrap();
    let model = lookup_model(&registry, "test", "echo").unwrap();

    let err = generate(
        &registry,
        &model,
        GenerateOptions::new().prompt("hi").tools(["noop"]),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    assert!(err.to_string().contains("does not support tool use"));
}

#[tokio::test]
async fn tool_output_is_sent_back_to_the_model() {
    let registry = Registry::new();
    let plugin = ProgrammableModelPlugin::new();
    init_plugin(&registry, Arc::new(plugin.clone())).await.unwrap();
    define_tool(&registry, "specials", "today's specials", |_: (), _| async {
        Ok(vec!["soup".to_string(), "pie".to_string()])
    })
    .unwrap();

    plugin.respond_with(Arc::new(|req, _| {
        Box::pin(async move {
            let last = req.messages.last().cloned().unwrap();
            let part = match last.role {
                Role::Tool => {
                    let output = last.content[0]
                        .tool_response
                        .as_ref()
                        .and_then(|r| r.output.clone())
                        .unwrap_or_default();
                    Part::text(format!("specials: {}", output))
                }
                _ => Part::tool_request("specials", None, Some("0".into())),
            };
            Ok(GenerateResponse {
                message: Some(MessageData::model(vec![part])),
                ..Default::default()
            })
        })
    }));

    let model = lookup_model(&registry, "test", "programmable").unwrap();
    let text = generate_text(
        &registry,
        &model,
        GenerateOptions::new().prompt("what's good?").tools(["specials"]),
    )
    .await
    .unwrap();
    assert_eq!(text, "specials: [\"soup\",\"pie\"]");

    let last = plugin.last_request().unwrap();
    assert_eq!(last.tools.len(), 1);
    assert_eq!(last.tools[0].name, "specials");
    let roles: Vec<Role> = last.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Model, Role::Tool]);
    assert_eq!(
        last.messages[2].content[0].tool_response.as_ref().unwrap().r#ref,
        Some("0".to_string())
    );
}

#[tokio::test]
async fn plugins_initialize_once() {
    let registry = echo_registry().await;
    let err = init_plugin(&registry, Arc::new(EchoModelPlugin))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::FailedPrecondition);
    assert!(registry.is_plugin_registered("echoModel"));
}
