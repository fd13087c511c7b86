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


//! # Content Primitives
//!
//! [`Part`] is the unit of content in messages and documents. A part holds
//! exactly one kind of content: text, media, a tool request, a tool response
//! or arbitrary data.

use base64::Engine;
use genkit_core::error::{Error, Result};
use genkit_core::status::StatusCode;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A media item referenced by URL. Inline media uses a `data:` URL.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    /// IANA media type, e.g. `image/png`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub url: String,
}

/// A request from a model to invoke a tool.
#[derive(Default, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    /// Matches the request with its [`ToolResponse`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

/// The output of a tool, sent back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_request: Option<ToolRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<ToolResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn media(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        let content_type: String = content_type.into();
        Part {
            media: Some(Media {
                url: url.into(),
                content_type: (!content_type.is_empty()).then_some(content_type),
            }),
            ..Default::default()
        }
    }

    pub fn data(data: Value) -> Self {
        Part {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn tool_request(name: impl Into<String>, input: Option<Value>, r#ref: Option<String>) -> Self {
        Part {
            tool_request: Some(ToolRequest {
                name: name.into(),
                input,
                r#ref,
            }),
            ..Default::default()
        }
    }

    pub fn tool_response(
        name: impl Into<String>,
        output: Option<Value>,
        r#ref: Option<String>,
    ) -> Self {
        Part {
            tool_response: Some(ToolResponse {
                name: name.into(),
                output,
                r#ref,
            }),
            ..Default::default()
        }
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn is_media(&self) -> bool {
        self.media.is_some()
    }

    pub fn is_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_tool_request(&self) -> bool {
        self.tool_request.is_some()
    }

    pub fn is_tool_response(&self) -> bool {
        self.tool_response.is_some()
    }

    /// Decodes the payload of a media part held in a `data:` URL.
    ///
    /// Returns the content type (the part's own, else the one in the URL)
    /// and the raw bytes.
    pub fn media_data(&self) -> Result<(String, Vec<u8>)> {
        let media = self.media.as_ref().ok_or_else(|| {
            Error::new_user_facing(StatusCode::InvalidArgument, "part is not media", None)
        })?;
        let rest = media.url.strip_prefix("data:").ok_or_else(|| {
            Error::new_user_facing(
                StatusCode::InvalidArgument,
                format!("unsupported media URL, expected a data: URL: {}", media.url),
                None,
            )
        })?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| {
            Error::new_user_facing(StatusCode::InvalidArgument, "malformed data URL", None)
        })?;

        let (mime, bytes) = match header.strip_suffix(";base64") {
            Some(mime) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(payload)
                    .map_err(|e| {
                        Error::new_user_facing(
                            StatusCode::InvalidArgument,
                            format!("invalid base64 in data URL: {}", e),
                            None,
                        )
                    })?;
                (mime, bytes)
            }
            None => (header, payload.as_bytes().to_vec()),
        };

        let content_type = match &media.content_type {
            Some(ct) if !ct.is_empty() => ct.clone(),
            _ if !mime.is_empty() => mime.to_string(),
            _ => "text/plain".to_string(),
        };
        Ok((content_type, bytes))
    }
}

/// A piece of content with metadata, as stored by indexers and returned by
/// retrievers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Document {
    pub content: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl Document {
    pub fn new(content: Vec<Part>, metadata: Option<HashMap<String, Value>>) -> Self {
        Document { content, metadata }
    }

    pub fn from_text(text: impl Into<String>, metadata: Option<HashMap<String, Value>>) -> Self {
        Document::new(vec![Part::text(text)], metadata)
    }

    /// Concatenates all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("data:image/png;base64,aGVsbG8=", None, "image/png", b"hello".to_vec())]
    #[case("data:image/png;base64,aGVsbG8=", Some("image/jpeg"), "image/jpeg", b"hello".to_vec())]
    #[case("data:,plain", None, "text/plain", b"plain".to_vec())]
    #[case("data:text/csv,a;b", None, "text/csv", b"a;b".to_vec())]
    fn decodes_data_urls(
        #[case] url: &str,
        #[case] content_type: Option<&str>,
        #[case] want_type: &str,
        #[case] want_bytes: Vec<u8>,
    ) {
        let part = Part::media(url, content_type.unwrap_or(""));
        let (ct, bytes) = part.media_data().unwrap();
        assert_eq!(ct, want_type);
        assert_eq!(bytes, want_bytes);
    }

    #[rstest]
    #[case("https://example.com/cat.png")]
    #[case("data:image/png;base64")]
    #[case("data:image/png;base64,***")]
    fn rejects_undecodable_media(#[case] url: &str) {
        assert!(Part::media(url, "image/png").media_data().is_err());
    }

    #[test]
    fn text_part_is_not_media() {
        let part = Part::text("hi");
        assert!(part.is_text());
        assert!(!part.is_media());
        assert!(part.media_data().is_err());
    }

    #[test]
    fn parts_serialize_only_their_content() {
        assert_eq!(serde_json::to_value(Part::text("hi")).unwrap(), json!({"text": "hi"}));
        let req = Part::tool_request("menu", Some(json!({"day": "mon"})), None);
        assert_eq!(
            serde_json::to_value(req).unwrap(),
            json!({"toolRequest": {"name": "menu", "input": {"day": "mon"}}})
        );
    }

    #[test]
    fn document_text_concatenates_parts() {
        let doc = Document::new(vec![Part::text("a"), Part::data(json!(1)), Part::text("b")], None);
        assert_eq!(doc.text(), "ab");
    }
}
