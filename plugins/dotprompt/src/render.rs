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


//! Handlebars rendering of prompt templates into messages.
//!
//! Helpers leave markers in the rendered text; [`to_messages`] splits the
//! text at those markers. `{{role "system"}}` starts a new message with the
//! given role and `{{media url=... contentType=...}}` inserts a media part.
//! Text before the first role marker belongs to a user message.

use crate::{Error, Result};
use genkit_ai::{MessageData, Part, Role};
use handlebars::{
    no_escape, Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderErrorReason,
};
use serde_json::Value;

pub(crate) const TEMPLATE_NAME: &str = "prompt";

const MARKER_START: &str = "<<<dotprompt:";
const MARKER_END: &str = ">>>";

fn role_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let role = h
        .param(0)
        .and_then(|p| p.value().as_str())
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("role", 0))?;
    out.write(&format!("{}role:{}{}", MARKER_START, role, MARKER_END))?;
    Ok(())
}

fn media_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let url = h
        .hash_get("url")
        .and_then(|v| v.value().as_str())
        .ok_or_else(|| RenderErrorReason::ParamNotFoundForName("media", "url".to_string()))?;
    let content_type = h
        .hash_get("contentType")
        .and_then(|v| v.value().as_str())
        .unwrap_or_default();
    out.write(&format!(
        "{}media:url {} {}{}",
        MARKER_START, url, content_type, MARKER_END
    ))?;
    Ok(())
}

/// `{{json value}}` writes `value` as compact JSON.
fn json_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).map(|p| p.value()).unwrap_or(&Value::Null);
    out.write(&value.to_string())?;
    Ok(())
}

/// A template engine holding `template` under [`TEMPLATE_NAME`].
pub(crate) fn compile(template: &str) -> Result<Handlebars<'static>> {
    let mut engine = Handlebars::new();
    engine.register_escape_fn(no_escape);
    engine.register_helper("role", Box::new(role_helper));
    engine.register_helper("media", Box::new(media_helper));
    engine.register_helper("json", Box::new(json_helper));
    engine.register_template_string(TEMPLATE_NAME, template)?;
    Ok(engine)
}

fn parse_role(role: &str) -> Result<Role> {
    serde_json::from_value(Value::String(role.to_string()))
        .map_err(|_| Error::UnknownRole(role.to_string()))
}

fn push_text(message: &mut MessageData, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        message.content.push(Part::text(text));
    }
}

/// Splits rendered template output into messages.
pub(crate) fn to_messages(rendered: &str) -> Result<Vec<MessageData>> {
    let mut messages = Vec::new();
    let mut current = MessageData::user(Vec::new());
    let mut rest = rendered;

    while let Some(start) = rest.find(MARKER_START) {
        let after = &rest[start + MARKER_START.len()..];
        let Some(end) = after.find(MARKER_END) else {
            break;
        };
        push_text(&mut current, &rest[..start]);
        let marker = &after[..end];
        rest = &after[end + MARKER_END.len()..];

        if let Some(role) = marker.strip_prefix("role:") {
            let next = MessageData::new(parse_role(role)?, Vec::new());
            let done = std::mem::replace(&mut current, next);
            if !done.content.is_empty() {
                messages.push(done);
            }
        } else if let Some(media) = marker.strip_prefix("media:url ") {
            let mut fields = media.split_whitespace();
            let url = fields.next().unwrap_or_default();
            let content_type = fields.next().unwrap_or_default();
            current.content.push(Part::media(url, content_type));
        }
    }
    push_text(&mut current, rest);
    if !current.content.is_empty() {
        messages.push(current);
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(template: &str, data: Value) -> String {
        compile(template)
            .unwrap()
            .render(TEMPLATE_NAME, &data)
            .unwrap()
    }

    #[test]
    fn does_not_escape_html() {
        assert_eq!(render("{{dish}}", json!({"dish": "mac & cheese"})), "mac & cheese");
    }

    #[test]
    fn json_helper_writes_compact_json() {
        assert_eq!(
            render("{{json item}}", json!({"item": {"price": 9.5}})),
            r#"{"price":9.5}"#
        );
    }

    #[test]
    fn splits_messages_at_role_markers() {
        let text = render(
            "{{role \"system\"}} You are a waiter.\n{{role \"user\"}} Any soup? {{media url=photo contentType=\"image/jpeg\"}}",
            json!({"photo": "https://example.com/soup.jpg"}),
        );
        let messages = to_messages(&text).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].text(), "You are a waiter.");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content.len(), 2);
        let media = messages[1].content[1].media.as_ref().unwrap();
        assert_eq!(media.url, "https://example.com/soup.jpg");
        assert_eq!(media.content_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn plain_text_is_one_user_message() {
        let messages = to_messages("  hello  ").unwrap();
        assert_eq!(messages, vec![MessageData::user(vec![Part::text("hello")])]);
        assert!(to_messages("").unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_roles() {
        let err = to_messages("<<<dotprompt:role:narrator>>>hi").unwrap_err();
        assert_eq!(err.to_string(), "dotprompt: unknown role \"narrator\"");
    }

    #[test]
    fn missing_media_url_fails_to_render() {
        let engine = compile("{{media contentType=\"image/png\"}}").unwrap();
        assert!(engine.render(TEMPLATE_NAME, &json!({})).is_err());
    }
}
