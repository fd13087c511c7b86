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


//! Translation between Genkit model requests and the Ollama chat and
//! generate endpoints.

use crate::transport::{HttpResponse, Transport};
use crate::types::{ChatMessage, ChatRequest, CompletionRequest, ResponseLine};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::StreamExt;
use genkit_ai::{
    FinishReason, GenerateRequest, GenerateResponse, GenerateResponseChunk, GenerationUsage,
    MessageData, ModelInfoSupports, ModelStreamingCallback, Part, Role,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

/// Models that accept image input.
pub const MEDIA_SUPPORTED_MODELS: &[&str] = &["llava"];

/// Names an Ollama model and the endpoint used to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    /// `"chat"` uses `/api/chat`; anything else uses `/api/generate`.
    #[serde(rename = "type")]
    pub r#type: String,
}

impl ModelDefinition {
    pub fn chat(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            r#type: "chat".to_string(),
        }
    }

    pub fn generate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            r#type: "generate".to_string(),
        }
    }

    pub fn is_chat(&self) -> bool {
        self.r#type == "chat"
    }
}

/// Capabilities assumed when a model is defined without explicit ones.
pub fn default_supports(name: &str) -> ModelInfoSupports {
    ModelInfoSupports {
        multiturn: true,
        system_role: true,
        media: MEDIA_SUPPORTED_MODELS.contains(&name),
        ..Default::default()
    }
}

fn to_ollama_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

fn from_ollama_role(role: &str) -> Role {
    match role {
        "user" => Role::User,
        "system" => Role::System,
        "tool" => Role::Tool,
        _ => Role::Model,
    }
}

fn encode_media(part: &Part) -> Result<String> {
    let (_, data) = part.media_data()?;
    Ok(STANDARD.encode(data))
}

/// Text parts become the content, media parts become base64 images.
fn convert_parts(parts: &[Part]) -> Result<(String, Vec<String>)> {
    let mut content = String::new();
    let mut images = Vec::new();
    for part in parts {
        if let Some(text) = &part.text {
            content.push_str(text);
        } else if part.is_media() {
            images.push(encode_media(part)?);
        } else {
            return Err(Error::UnknownContent);
        }
    }
    Ok((content, images))
}

pub fn to_chat_request(model: &str, request: &GenerateRequest, stream: bool) -> Result<ChatRequest> {
    let messages = request
        .messages
        .iter()
        .map(|message| {
            let (content, images) = convert_parts(&message.content)?;
            Ok(ChatMessage {
                role: to_ollama_role(message.role).to_string(),
                content,
                images,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ChatRequest {
        messages,
        model: model.to_string(),
        stream,
    })
}

fn concat_text(request: &GenerateRequest, roles: &[Role]) -> String {
    request
        .messages
        .iter()
        .filter(|m| roles.contains(&m.role))
        .flat_map(|m| m.content.iter())
        .filter_map(|part| part.text.as_deref())
        .collect()
}

fn concat_images(request: &GenerateRequest, roles: &[Role]) -> Result<Vec<String>> {
    request
        .messages
        .iter()
        .filter(|m| roles.contains(&m.role))
        .flat_map(|m| m.content.iter())
        .filter(|part| part.is_media())
        .map(encode_media)
        .collect()
}

/// Flattens the conversation into a single prompt for `/api/generate`.
pub fn to_completion_request(
    model: &str,
    request: &GenerateRequest,
    stream: bool,
) -> Result<CompletionRequest> {
    let system = concat_text(request, &[Role::System]);
    Ok(CompletionRequest {
        system: (!system.is_empty()).then_some(system),
        images: concat_images(request, &[Role::User, Role::Model])?,
        model: model.to_string(),
        prompt: concat_text(request, &[Role::User, Role::Model, Role::Tool]),
        stream,
    })
}

fn usage(line: &ResponseLine) -> GenerationUsage {
    let total = match (line.prompt_eval_count, line.eval_count) {
        (None, None) => None,
        (input, output) => Some(input.unwrap_or(0).saturating_add(output.unwrap_or(0))),
    };
    GenerationUsage {
        input_tokens: line.prompt_eval_count,
        output_tokens: line.eval_count,
        total_tokens: total,
        ..Default::default()
    }
}

fn has_counts(line: &ResponseLine) -> bool {
    line.prompt_eval_count.is_some() || line.eval_count.is_some()
}

fn parse_line(bytes: &[u8]) -> Result<ResponseLine> {
    let line: ResponseLine = serde_json::from_slice(bytes)?;
    match line.error {
        Some(message) => Err(Error::Server(message)),
        None => Ok(line),
    }
}

/// Translates a complete (non-streaming) response.
pub fn translate_response(line: ResponseLine, chat: bool) -> GenerateResponse {
    let role = match (&line.message, chat) {
        (Some(message), true) => from_ollama_role(&message.role),
        _ => Role::Model,
    };
    let usage = (!chat || has_counts(&line)).then(|| usage(&line));
    GenerateResponse {
        message: Some(MessageData::new(role, vec![Part::text(line.text())])),
        finish_reason: FinishReason::Stop,
        usage,
        ..Default::default()
    }
}

/// Translates one line of a streamed response.
pub fn translate_chunk(line: &[u8]) -> Result<(GenerateResponseChunk, ResponseLine)> {
    let parsed = parse_line(line).map_err(|e| match e {
        Error::Json(e) => Error::Chunk(e),
        other => other,
    })?;
    let chunk = GenerateResponseChunk {
        content: vec![Part::text(parsed.text())],
        ..Default::default()
    };
    Ok((chunk, parsed))
}

async fn stream_response(
    response: HttpResponse,
    callback: ModelStreamingCallback,
) -> Result<GenerateResponse> {
    let body = response.body.map(|item| item.map_err(std::io::Error::other));
    let mut reader = StreamReader::new(body);
    let mut line = Vec::new();
    let mut content = Vec::new();
    let mut usage_line = None;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let (chunk, parsed) = translate_chunk(&line)?;
        (*callback)(chunk.clone())?;
        content.extend(chunk.content);
        if parsed.done && has_counts(&parsed) {
            usage_line = Some(parsed);
        }
    }

    Ok(GenerateResponse {
        message: Some(MessageData::model(content)),
        finish_reason: FinishReason::Stop,
        usage: usage_line.as_ref().map(usage),
        ..Default::default()
    })
}

/// Runs `request` against the model at `server_address`.
pub async fn generate(
    transport: &dyn Transport,
    server_address: &str,
    model: &ModelDefinition,
    request: GenerateRequest,
    callback: Option<ModelStreamingCallback>,
) -> Result<GenerateResponse> {
    let stream = callback.is_some();
    let (url, body) = if model.is_chat() {
        let body = to_chat_request(&model.name, &request, stream)?;
        (format!("{}/api/chat", server_address), serde_json::to_value(body)?)
    } else {
        let body = to_completion_request(&model.name, &request, stream)?;
        (format!("{}/api/generate", server_address), serde_json::to_value(body)?)
    };
    log::debug!("ollama request to {}: {}", url, body);

    let response = transport.post_json(&url, &body).await?;
    if response.status != 200 {
        let status = response.status;
        let body = String::from_utf8_lossy(&response.bytes().await?).into_owned();
        log::error!("ollama error: {} - {}", status, body);
        return Err(Error::Status { status, body });
    }

    let mut result = match callback {
        Some(callback) => stream_response(response, callback).await?,
        None => translate_response(parse_line(&response.bytes().await?)?, model.is_chat()),
    };
    result.request = Some(request);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use genkit_ai::MessageData;
    use rstest::rstest;

    fn request(messages: Vec<MessageData>) -> GenerateRequest {
        GenerateRequest {
            messages,
            ..Default::default()
        }
    }

    fn png() -> Part {
        Part::media("data:image/png;base64,iVBORw0K", "image/png")
    }

    #[test]
    fn chat_request_maps_roles_and_images() {
        let req = request(vec![
            MessageData::system(vec![Part::text("be kind")]),
            MessageData::user(vec![Part::text("what is "), Part::text("this?"), png()]),
            MessageData::model(vec![Part::text("a cat")]),
        ]);
        let chat = to_chat_request("llava", &req, false).unwrap();
        let roles: Vec<&str> = chat.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(chat.messages[1].content, "what is this?");
        assert_eq!(chat.messages[1].images, vec!["iVBORw0K".to_string()]);
        assert!(!chat.stream);
    }

    #[test]
    fn chat_request_rejects_other_parts() {
        let req = request(vec![MessageData::user(vec![Part::data(serde_json::json!(1))])]);
        let err = to_chat_request("llama3", &req, false).unwrap_err();
        assert_eq!(err.to_string(), "unknown content type");
    }

    #[test]
    fn completion_request_flattens_the_conversation() {
        let req = request(vec![
            MessageData::system(vec![Part::text("terse")]),
            MessageData::user(vec![Part::text("hi "), png()]),
            MessageData::model(vec![Part::text("hello ")]),
            MessageData::tool(vec![Part::text("42")]),
        ]);
        let body = to_completion_request("llava", &req, true).unwrap();
        assert_eq!(body.system.as_deref(), Some("terse"));
        assert_eq!(body.prompt, "hi hello 42");
        assert_eq!(body.images.len(), 1);
        assert!(body.stream);

        let json = serde_json::to_value(to_completion_request("gemma", &request(vec![]), false).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"model": "gemma", "prompt": "", "stream": false}));
    }

    #[rstest]
    #[case("llava", true)]
    #[case("llama3", false)]
    fn media_support_by_name(#[case] name: &str, #[case] media: bool) {
        let supports = default_supports(name);
        assert_eq!(supports.media, media);
        assert!(supports.multiturn && supports.system_role);
        assert!(!supports.tools);
    }

    #[test]
    fn chat_response_keeps_the_server_role() {
        let line: ResponseLine = serde_json::from_str(
            r#"{"message":{"role":"assistant","content":"hi"},"done":true}"#,
        )
        .unwrap();
        let resp = translate_response(line, true);
        let message = resp.message.unwrap();
        assert_eq!(message.role, Role::Model);
        assert_eq!(message.text(), "hi");
        assert_eq!(resp.finish_reason, FinishReason::Stop);
        assert!(resp.usage.is_none());
    }

    #[test]
    fn completion_response_reports_usage() {
        let line: ResponseLine = serde_json::from_str(
            r#"{"response":"hey","done":true,"prompt_eval_count":7,"eval_count":3}"#,
        )
        .unwrap();
        let usage = translate_response(line, false).usage.unwrap();
        assert_eq!(usage.input_tokens, Some(7));
        assert_eq!(usage.output_tokens, Some(3));
        assert_eq!(usage.total_tokens, Some(10));
    }

    #[test]
    fn total_usage_saturates() {
        let line: ResponseLine = serde_json::from_value(serde_json::json!({
            "response": "",
            "done": true,
            "prompt_eval_count": u32::MAX,
            "eval_count": 1,
        }))
        .unwrap();
        let usage = translate_response(line, false).usage.unwrap();
        assert_eq!(usage.total_tokens, Some(u32::MAX));
    }

    #[rstest]
    #[case::not_json(b"{not json".to_vec())]
    #[case::not_utf8(b"{\"response\":\"\xff\",\"done\":false}".to_vec())]
    fn malformed_chunks_fail_to_translate(#[case] line: Vec<u8>) {
        let err = translate_chunk(&line).unwrap_err();
        assert!(err.to_string().starts_with("failed to translate chunk"));
    }

    #[test]
    fn server_errors_are_surfaced() {
        let err = translate_chunk(br#"{"error":"model \"nope\" not found"}"#).unwrap_err();
        assert_eq!(err.to_string(), "ollama: model \"nope\" not found");
    }
}
