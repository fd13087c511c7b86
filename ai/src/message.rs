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


//! # Messages
//!
//! A [`MessageData`] is one turn of a conversation with a model.

use crate::document::{Part, ToolRequest};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Who produced a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    System,
    User,
    Model,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MessageData {
    pub role: Role,
    pub content: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl MessageData {
    pub fn new(role: Role, content: Vec<Part>) -> Self {
        Self {
            role,
            content,
            metadata: None,
        }
    }

    pub fn user(content: Vec<Part>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn model(content: Vec<Part>) -> Self {
        Self::new(Role::Model, content)
    }

    pub fn system(content: Vec<Part>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn tool(content: Vec<Part>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Concatenates the text of every text part.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect()
    }

    pub fn tool_requests(&self) -> Vec<&ToolRequest> {
        self.content
            .iter()
            .filter_map(|part| part.tool_request.as_ref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roles_use_lower_case_names() {
        assert_eq!(serde_json::to_value(Role::Model).unwrap(), json!("model"));
        assert_eq!(
            serde_json::from_value::<Role>(json!("system")).unwrap(),
            Role::System
        );
    }

    #[test]
    fn text_skips_non_text_parts() {
        let msg = MessageData::model(vec![
            Part::text("Hello, "),
            Part::tool_request("lookup", None, None),
            Part::text("world"),
        ]);
        assert_eq!(msg.text(), "Hello, world");
        assert_eq!(msg.tool_requests().len(), 1);
    }
}
